//! Dense reranking of lexical candidates.
//!
//! Each candidate is scored by cosine similarity between its stored embedding
//! and the query embedding, plus a fixed boost when it shares a named entity
//! with the query. Candidates whose payloads cannot be decoded are excluded
//! and reported; candidates whose similarity is undefined are kept at `-inf`.

use tracing::{debug, warn};

use crate::document::{ChunkField, ChunkRecord, Entity, ScoredChunk};
use crate::error::RetrievalError;
use crate::similarity::{EntityMatch, cosine_similarity};

/// The result of reranking one candidate list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RerankOutcome {
    /// Surviving candidates, best first, at most `n` long.
    pub ranked: Vec<ScoredChunk>,
    /// Per-chunk problems: [`RetrievalError::DeserializationError`] for
    /// excluded chunks, [`RetrievalError::UndefinedSimilarity`] for chunks
    /// ranked last.
    pub diagnostics: Vec<RetrievalError>,
}

/// Reorders sparse candidates by embedding similarity and entity overlap.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseReranker {
    entity_match: EntityMatch,
}

impl DenseReranker {
    /// Create a reranker comparing entities with the given policy.
    pub fn new(entity_match: EntityMatch) -> Self {
        Self { entity_match }
    }

    /// The entity matching policy in use.
    pub fn entity_match(&self) -> EntityMatch {
        self.entity_match
    }

    /// Rerank `candidates`, given in sparse order, and keep the best `n`.
    ///
    /// The sort is stable: equal final scores keep their sparse order.
    pub fn rerank(
        &self,
        candidates: Vec<ChunkRecord>,
        query_embedding: &[f64],
        query_entities: &[Entity],
        boost: f64,
        n: usize,
    ) -> RerankOutcome {
        let query_surfaces = self.entity_match.surface_set(query_entities);
        let mut outcome = RerankOutcome::default();

        for (position, record) in candidates.into_iter().enumerate() {
            let chunk_id = record.id;

            let embedding = match record.embedding {
                Some(Ok(embedding)) => embedding,
                Some(Err(e)) => {
                    outcome.diagnostics.push(exclude(e.into_retrieval_error(chunk_id)));
                    continue;
                }
                None => {
                    outcome.diagnostics.push(exclude(RetrievalError::DeserializationError {
                        chunk_id,
                        field: ChunkField::Embedding,
                        message: "embedding is missing".to_string(),
                    }));
                    continue;
                }
            };
            if embedding.len() != query_embedding.len() {
                outcome.diagnostics.push(exclude(RetrievalError::DeserializationError {
                    chunk_id,
                    field: ChunkField::Embedding,
                    message: format!(
                        "embedding has {} components, expected {}",
                        embedding.len(),
                        query_embedding.len()
                    ),
                }));
                continue;
            }

            let entities = match record.entities {
                Some(Ok(entities)) => entities,
                Some(Err(e)) => {
                    outcome.diagnostics.push(exclude(e.into_retrieval_error(chunk_id)));
                    continue;
                }
                None => Vec::new(),
            };

            let similarity = cosine_similarity(&embedding, query_embedding);
            let entity_match = self.entity_match.overlaps(&entities, &query_surfaces);
            let score = match similarity {
                Some(sim) if entity_match => sim + boost,
                Some(sim) => sim,
                None => {
                    let err = RetrievalError::UndefinedSimilarity { chunk_id };
                    warn!(error = %err, "ranking chunk last");
                    outcome.diagnostics.push(err);
                    f64::NEG_INFINITY
                }
            };

            outcome.ranked.push(ScoredChunk {
                id: chunk_id,
                text: record.text.unwrap_or_default(),
                similarity,
                entity_match,
                score,
                sparse_position: position,
            });
        }

        outcome.ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        outcome.ranked.truncate(n);

        debug!(
            ranked = outcome.ranked.len(),
            diagnostics = outcome.diagnostics.len(),
            "dense rerank"
        );
        outcome
    }
}

fn exclude(err: RetrievalError) -> RetrievalError {
    warn!(error = %err, "excluding chunk from ranking");
    err
}
