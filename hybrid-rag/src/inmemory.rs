//! In-memory chunk store with BM25 lexical ranking.
//!
//! This module provides [`InMemoryChunkStore`], a [`ChunkStore`] backed by
//! ordered maps protected by a `tokio::sync::RwLock`. Payload columns are kept
//! as JSON values, exactly as a database row would hold them, and decoded on
//! fetch. It is suitable for development, testing, and small corpora.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::chunkstore::{ChunkStore, validate_chunk};
use crate::codec;
use crate::document::{ChunkField, ChunkId, ChunkRecord, DocumentId, NewChunk, StoredDocument};
use crate::error::{RetrievalError, Result};
use crate::hashing::lexical_terms;

const BACKEND: &str = "memory";

/// BM25 term-frequency saturation.
const BM25_K1: f64 = 1.2;
/// BM25 length normalisation.
const BM25_B: f64 = 0.75;

/// A chunk row whose payload columns are raw JSON, as written by any
/// ingestion version: native arrays or JSON-encoded strings.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    /// The owning document.
    pub document_id: DocumentId,
    /// Raw passage text.
    pub text: String,
    /// Stored tokens payload.
    pub tokens: Value,
    /// Stored embedding payload.
    pub embedding: Value,
    /// Stored POS payload.
    pub pos: Value,
    /// Stored entities payload.
    pub entities: Value,
}

impl From<&NewChunk> for RawChunk {
    fn from(chunk: &NewChunk) -> Self {
        Self {
            document_id: chunk.document_id,
            text: chunk.text.clone(),
            tokens: codec::encode_tokens(&chunk.tokens),
            embedding: codec::encode_embedding(&chunk.embedding),
            pos: codec::encode_pos(&chunk.pos),
            entities: codec::encode_entities(&chunk.entities),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredChunk {
    raw: RawChunk,
    terms: HashMap<String, usize>,
    length: usize,
}

#[derive(Debug, Default)]
struct State {
    next_document: i64,
    next_chunk: i64,
    documents: BTreeMap<DocumentId, StoredDocument>,
    chunks: BTreeMap<ChunkId, StoredChunk>,
    total_length: usize,
}

impl State {
    fn document_mut(&mut self, id: DocumentId) -> Result<&mut StoredDocument> {
        self.documents.get_mut(&id).ok_or_else(|| RetrievalError::StorageError {
            backend: BACKEND.to_string(),
            message: format!("document {id} does not exist"),
        })
    }
}

/// An in-memory [`ChunkStore`] ranking chunk text with BM25.
///
/// Chunk and document ids are assigned from 1 upwards, so ascending id order
/// is insertion order. When constructed with
/// [`with_dimensions`](Self::with_dimensions), inserts of [`NewChunk`]s whose
/// embedding length differs are rejected.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_rag::{ChunkStore, InMemoryChunkStore};
///
/// let store = InMemoryChunkStore::with_dimensions(384);
/// let doc = store.create_document("s3://bucket/handbook.pdf").await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    state: RwLock<State>,
    dimensions: Option<usize>,
}

impl InMemoryChunkStore {
    /// Create a new empty store accepting any embedding dimension.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty store enforcing embedding dimension `dimensions`.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { state: RwLock::default(), dimensions: Some(dimensions) }
    }

    /// Insert rows whose payload columns are stored verbatim.
    ///
    /// No payload validation happens here; malformed payloads surface as
    /// decode errors on [`fetch`](ChunkStore::fetch). This is how rows written
    /// by older ingestion versions are imported.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::StorageError`] if a row references an unknown
    /// document. No row is written in that case.
    pub async fn insert_raw(&self, rows: Vec<RawChunk>) -> Result<Vec<ChunkId>> {
        let mut state = self.state.write().await;
        for row in &rows {
            state.document_mut(row.document_id)?;
        }

        let now = Utc::now();
        let mut ids = Vec::with_capacity(rows.len());
        for raw in rows {
            state.next_chunk += 1;
            let id = ChunkId(state.next_chunk);

            let analysed = lexical_terms(&raw.text);
            let length = analysed.len();
            let mut terms = HashMap::new();
            for term in analysed {
                *terms.entry(term).or_insert(0) += 1;
            }

            state.document_mut(raw.document_id)?.updated_at = now;
            state.total_length += length;
            state.chunks.insert(id, StoredChunk { raw, terms, length });
            ids.push(id);
        }

        debug!(backend = BACKEND, count = ids.len(), "inserted chunks");
        Ok(ids)
    }
}

/// Okapi BM25 inverse document frequency, always positive.
fn idf(total_docs: usize, doc_freq: usize) -> f64 {
    let n = total_docs as f64;
    let df = doc_freq as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

fn project(id: ChunkId, chunk: &StoredChunk, fields: &[ChunkField]) -> ChunkRecord {
    let raw = &chunk.raw;
    let mut record = ChunkRecord::bare(id, raw.document_id);
    for field in fields {
        match field {
            ChunkField::Text => record.text = Some(raw.text.clone()),
            ChunkField::Tokens => record.tokens = Some(codec::decode_tokens(&raw.tokens)),
            ChunkField::Embedding => {
                record.embedding = Some(codec::decode_embedding(&raw.embedding))
            }
            ChunkField::Pos => record.pos = Some(codec::decode_pos(&raw.pos)),
            ChunkField::Entities => record.entities = Some(codec::decode_entities(&raw.entities)),
        }
    }
    record
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn create_document(&self, locator: &str) -> Result<DocumentId> {
        let mut state = self.state.write().await;
        state.next_document += 1;
        let id = DocumentId(state.next_document);
        let now = Utc::now();
        state.documents.insert(
            id,
            StoredDocument { id, locator: locator.to_string(), created_at: now, updated_at: now },
        );
        Ok(id)
    }

    async fn document(&self, id: DocumentId) -> Result<Option<StoredDocument>> {
        Ok(self.state.read().await.documents.get(&id).cloned())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.documents.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<ChunkId> = state
            .chunks
            .iter()
            .filter(|(_, chunk)| chunk.raw.document_id == id)
            .map(|(chunk_id, _)| *chunk_id)
            .collect();
        for chunk_id in &owned {
            if let Some(chunk) = state.chunks.remove(chunk_id) {
                state.total_length -= chunk.length;
            }
        }
        debug!(backend = BACKEND, document.id = %id, chunk_count = owned.len(), "deleted document");
        Ok(true)
    }

    async fn insert_batch(&self, chunks: &[NewChunk]) -> Result<Vec<ChunkId>> {
        for chunk in chunks {
            validate_chunk(BACKEND, self.dimensions, chunk)?;
        }
        self.insert_raw(chunks.iter().map(RawChunk::from).collect()).await
    }

    async fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<(ChunkId, f64)>> {
        let query_terms: HashSet<String> = lexical_terms(query).into_iter().collect();
        if query_terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let total_docs = state.chunks.len();
        if total_docs == 0 {
            return Ok(Vec::new());
        }
        let avg_length = (state.total_length as f64 / total_docs as f64).max(1.0);

        let idfs: Vec<(&String, f64)> = query_terms
            .iter()
            .map(|term| {
                let df = state.chunks.values().filter(|c| c.terms.contains_key(term)).count();
                (term, idf(total_docs, df))
            })
            .collect();

        let mut ranked: Vec<(ChunkId, f64)> = state
            .chunks
            .iter()
            .filter_map(|(id, chunk)| {
                let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * chunk.length as f64 / avg_length);
                let score: f64 = idfs
                    .iter()
                    .filter_map(|(term, idf)| {
                        let tf = *chunk.terms.get(*term)? as f64;
                        Some(idf * tf * (BM25_K1 + 1.0) / (tf + norm))
                    })
                    .sum();
                (score > 0.0).then_some((*id, score))
            })
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn fetch(&self, ids: &[ChunkId], fields: &[ChunkField]) -> Result<Vec<ChunkRecord>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.chunks.get(id).map(|chunk| project(*id, chunk, fields)))
            .collect())
    }

    async fn document_chunks(&self, id: DocumentId) -> Result<Vec<ChunkId>> {
        let state = self.state.read().await;
        Ok(state
            .chunks
            .iter()
            .filter(|(_, chunk)| chunk.raw.document_id == id)
            .map(|(chunk_id, _)| *chunk_id)
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.chunks.len())
    }
}
