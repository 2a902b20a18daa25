//! Hybrid retrieval orchestrator.
//!
//! The [`HybridRetriever`] runs one linear pipeline per query:
//! validate → extract → sparse retrieve → dense rerank → project.
//!
//! # Example
//!
//! ```rust,ignore
//! use hybrid_rag::{ExtractorConfig, ExtractorHandle, HybridRetriever, InMemoryChunkStore};
//!
//! let extractor = ExtractorHandle::hashing(ExtractorConfig::default()).await?;
//! let retriever = HybridRetriever::builder()
//!     .extractor(extractor.clone())
//!     .store(Arc::new(InMemoryChunkStore::new()))
//!     .build()?;
//!
//! let passages = retriever.retrieve("Computer Science courses").await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::chunkstore::ChunkStore;
use crate::config::RetrievalConfig;
use crate::document::{ChunkField, ChunkRecord, RetrievedPassage};
use crate::error::{RetrievalError, Result};
use crate::extractor::ExtractorHandle;
use crate::reranker::DenseReranker;
use crate::sparse::SparseScorer;

/// Ranked passages plus the per-chunk problems met while ranking them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome {
    /// Passages, best first.
    pub passages: Vec<RetrievedPassage>,
    /// Excluded chunks ([`RetrievalError::DeserializationError`]) and chunks
    /// ranked last ([`RetrievalError::UndefinedSimilarity`]).
    pub diagnostics: Vec<RetrievalError>,
    /// Number of lexical candidates considered.
    pub candidate_count: usize,
}

/// Run `fut`, failing with [`RetrievalError::Timeout`] once `limit` elapses.
pub(crate) async fn with_deadline<T>(
    limit: Option<Duration>,
    stage: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some(limit) = limit else {
        return fut.await;
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RetrievalError::Timeout {
            stage,
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// The hybrid retrieval orchestrator.
///
/// Holds the shared [`ExtractorHandle`] and [`ChunkStore`]; both are read-only
/// during retrieval, so one retriever can serve concurrent calls. Construct
/// one via [`HybridRetriever::builder()`].
pub struct HybridRetriever {
    config: RetrievalConfig,
    extractor: ExtractorHandle,
    store: Arc<dyn ChunkStore>,
}

impl HybridRetriever {
    /// Create a new [`HybridRetrieverBuilder`].
    pub fn builder() -> HybridRetrieverBuilder {
        HybridRetrieverBuilder::default()
    }

    /// Return a reference to the default retrieval configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Return a reference to the extractor handle.
    pub fn extractor(&self) -> &ExtractorHandle {
        &self.extractor
    }

    /// Return a reference to the chunk store.
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Retrieve the best passages for `query` with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`retrieve_detailed_with`](Self::retrieve_detailed_with).
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        Ok(self.retrieve_detailed_with(query, &self.config).await?.passages)
    }

    /// Retrieve the best passages for `query` with per-call parameters.
    ///
    /// # Errors
    ///
    /// See [`retrieve_detailed_with`](Self::retrieve_detailed_with).
    pub async fn retrieve_with(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<RetrievedPassage>> {
        Ok(self.retrieve_detailed_with(query, config).await?.passages)
    }

    /// Retrieve with the default configuration, keeping diagnostics.
    ///
    /// # Errors
    ///
    /// See [`retrieve_detailed_with`](Self::retrieve_detailed_with).
    pub async fn retrieve_detailed(&self, query: &str) -> Result<RetrievalOutcome> {
        self.retrieve_detailed_with(query, &self.config).await
    }

    /// Run the full pipeline: validate → extract → sparse → rerank → project.
    ///
    /// At most `min(sparse_k, dense_k)` passages are returned. An empty
    /// candidate set is not an error. Chunks with undecodable payloads are
    /// excluded and listed in [`RetrievalOutcome::diagnostics`].
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::ConfigError`] for invalid parameters.
    /// - [`RetrievalError::ExtractionError`] from the extractor, unchanged.
    /// - [`RetrievalError::StorageError`] from the store, unchanged.
    /// - [`RetrievalError::Timeout`] if a configured deadline elapses.
    pub async fn retrieve_detailed_with(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<RetrievalOutcome> {
        // 1. Validate
        config.validate()?;
        let timeout = config.timeout();

        // 2. Extract query features
        let features = with_deadline(timeout, "extract", self.extractor.extract(query))
            .await
            .map_err(|e| {
                error!(error = %e, "feature extraction failed during retrieval");
                e
            })?;

        // 3. Sparse retrieve
        let scorer = SparseScorer::new(Arc::clone(&self.store)).with_min_rank(config.min_rank);
        let candidates =
            with_deadline(timeout, "lexical_search", scorer.candidates(query, config.sparse_k))
                .await
                .map_err(|e| {
                    error!(error = %e, "lexical search failed");
                    e
                })?;
        if candidates.is_empty() {
            info!(result_count = 0, "retrieval completed (no lexical candidates)");
            return Ok(RetrievalOutcome::default());
        }

        let ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
        let fetched = with_deadline(timeout, "fetch", self.store.fetch(&ids, ChunkField::RERANK))
            .await
            .map_err(|e| {
                error!(error = %e, "candidate fetch failed");
                e
            })?;

        let mut by_id: HashMap<_, ChunkRecord> = fetched.into_iter().map(|r| (r.id, r)).collect();
        let records: Vec<ChunkRecord> = candidates
            .iter()
            .filter_map(|candidate| {
                let record = by_id.remove(&candidate.id);
                if record.is_none() {
                    warn!(chunk.id = %candidate.id, "lexical candidate missing from fetch");
                }
                record
            })
            .collect();
        debug!(candidate_count = candidates.len(), fetched = records.len(), "fetched candidates");

        // 4. Dense rerank
        let outcome = DenseReranker::new(config.entity_match).rerank(
            records,
            &features.embedding,
            &features.entities,
            config.boost,
            config.dense_k,
        );

        // 5. Project
        let passages: Vec<RetrievedPassage> =
            outcome.ranked.into_iter().map(RetrievedPassage::from).collect();
        info!(
            result_count = passages.len(),
            candidate_count = candidates.len(),
            diagnostics = outcome.diagnostics.len(),
            "retrieval completed"
        );

        Ok(RetrievalOutcome {
            passages,
            diagnostics: outcome.diagnostics,
            candidate_count: candidates.len(),
        })
    }
}

/// Builder for constructing a [`HybridRetriever`].
///
/// `extractor` and `store` are required; `config` defaults to
/// [`RetrievalConfig::default()`].
#[derive(Default)]
pub struct HybridRetrieverBuilder {
    config: Option<RetrievalConfig>,
    extractor: Option<ExtractorHandle>,
    store: Option<Arc<dyn ChunkStore>>,
}

impl HybridRetrieverBuilder {
    /// Set the default retrieval configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the feature extractor handle.
    pub fn extractor(mut self, extractor: ExtractorHandle) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the chunk store.
    pub fn store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the [`HybridRetriever`].
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if a required field is missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<HybridRetriever> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let extractor = self
            .extractor
            .ok_or_else(|| RetrievalError::ConfigError("extractor is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| RetrievalError::ConfigError("store is required".to_string()))?;

        Ok(HybridRetriever { config, extractor, store })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::document::{ChunkId, Entity, FeatureRecord};
    use crate::extractor::FeatureExtractor;
    use crate::inmemory::{InMemoryChunkStore, RawChunk};

    /// Returns canned features per query text.
    struct TableExtractor {
        table: HashMap<String, FeatureRecord>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl FeatureExtractor for TableExtractor {
        async fn extract(&self, text: &str) -> Result<FeatureRecord> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self
                .table
                .get(text)
                .cloned()
                .unwrap_or_else(|| FeatureRecord {
                    embedding: vec![0.0, 0.0],
                    ..Default::default()
                }))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    fn at(sim: f64) -> Vec<f64> {
        vec![sim, (1.0 - sim * sim).sqrt()]
    }

    const QUERY: &str = "Computer Science courses";

    fn query_features() -> FeatureRecord {
        FeatureRecord {
            embedding: vec![1.0, 0.0],
            entities: vec![Entity::new("Computer Science", "MISC", 0, 16)],
            ..Default::default()
        }
    }

    async fn retriever(delay: Option<Duration>) -> (HybridRetriever, Arc<InMemoryChunkStore>) {
        let table = HashMap::from([(QUERY.to_string(), query_features())]);
        let extractor =
            ExtractorHandle::init(Arc::new(TableExtractor { table, delay })).await.unwrap();
        let store = Arc::new(InMemoryChunkStore::with_dimensions(2));
        let retriever =
            HybridRetriever::builder().extractor(extractor).store(store.clone()).build().unwrap();
        (retriever, store)
    }

    async fn seed(
        store: &InMemoryChunkStore,
        rows: Vec<(&str, serde_json::Value, serde_json::Value)>,
    ) -> Vec<ChunkId> {
        let doc = store.create_document("s3://bucket/catalog.pdf").await.unwrap();
        let rows = rows
            .into_iter()
            .map(|(text, embedding, entities)| RawChunk {
                document_id: doc,
                text: text.to_string(),
                tokens: json!([]),
                embedding,
                pos: json!([]),
                entities,
            })
            .collect();
        store.insert_raw(rows).await.unwrap()
    }

    #[tokio::test]
    async fn entity_boost_overtakes_higher_similarity() {
        let (retriever, store) = retriever(None).await;
        let ids = seed(
            &store,
            vec![
                (
                    "Computer Science courses at the university",
                    json!(at(0.8)),
                    json!([["Computer Science", "MISC", 0, 16]]),
                ),
                ("Engineering courses", json!(at(0.85)), json!([])),
            ],
        )
        .await;

        let passages = retriever.retrieve(QUERY).await.unwrap();
        let order: Vec<ChunkId> = passages.iter().map(|p| p.id).collect();
        assert_eq!(order, ids);
        assert!((passages[0].score - 0.9).abs() < 1e-9);
        assert!((passages[1].score - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_boost_ranks_by_similarity_only() {
        let (retriever, store) = retriever(None).await;
        let ids = seed(
            &store,
            vec![
                (
                    "Computer Science courses at the university",
                    json!(at(0.8)),
                    json!([["Computer Science", "MISC", 0, 16]]),
                ),
                ("Engineering courses", json!(at(0.85)), json!([])),
            ],
        )
        .await;

        let config = RetrievalConfig::builder().boost(0.0).build().unwrap();
        let passages = retriever.retrieve_with(QUERY, &config).await.unwrap();
        assert_eq!(passages.iter().map(|p| p.id).collect::<Vec<_>>(), vec![ids[1], ids[0]]);
    }

    #[tokio::test]
    async fn result_count_is_bounded_by_both_limits() {
        let (retriever, store) = retriever(None).await;
        let rows =
            (0..6).map(|i| ("courses catalog", json!(at(0.1 * f64::from(i))), json!([]))).collect();
        seed(&store, rows).await;

        let narrow = RetrievalConfig::builder().sparse_k(2).dense_k(5).build().unwrap();
        assert_eq!(retriever.retrieve_with(QUERY, &narrow).await.unwrap().len(), 2);
        assert_eq!(retriever.retrieve(QUERY).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn no_lexical_match_is_empty_not_error() {
        let (retriever, store) = retriever(None).await;
        seed(&store, vec![("Marine biology", json!(at(0.9)), json!([]))]).await;

        let outcome = retriever.retrieve_detailed(QUERY).await.unwrap();
        assert!(outcome.passages.is_empty());
        assert_eq!(outcome.candidate_count, 0);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let (retriever, store) = retriever(None).await;
        seed(&store, vec![("Computer Science courses", json!(at(0.9)), json!([]))]).await;
        assert!(retriever.retrieve("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_chunk_is_excluded_with_diagnostic() {
        let (retriever, store) = retriever(None).await;
        let ids = seed(
            &store,
            vec![
                ("Computer Science courses", json!("not-json"), json!([])),
                ("Engineering courses", json!(at(0.5)), json!([])),
            ],
        )
        .await;

        let outcome = retriever.retrieve_detailed(QUERY).await.unwrap();
        assert_eq!(outcome.passages.len(), 1);
        assert_eq!(outcome.passages[0].id, ids[1]);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(matches!(
            outcome.diagnostics[0],
            RetrievalError::DeserializationError { field: ChunkField::Embedding, .. }
        ));
        assert_eq!(outcome.diagnostics[0].chunk_id(), Some(ids[0]));
    }

    #[tokio::test]
    async fn invalid_per_call_config_is_rejected() {
        let (retriever, _store) = retriever(None).await;
        let config = RetrievalConfig { dense_k: 0, ..Default::default() };
        let err = retriever.retrieve_with(QUERY, &config).await.unwrap_err();
        assert!(matches!(err, RetrievalError::ConfigError(_)));
    }

    #[tokio::test]
    async fn slow_extraction_times_out() {
        let (retriever, _store) = retriever(Some(Duration::from_millis(500))).await;
        let config = RetrievalConfig::builder().timeout(Duration::from_millis(10)).build().unwrap();
        let err = retriever.retrieve_with(QUERY, &config).await.unwrap_err();
        assert_eq!(err, RetrievalError::Timeout { stage: "extract", millis: 10 });
    }

    #[tokio::test]
    async fn builder_requires_extractor_and_store() {
        let err = HybridRetriever::builder().build().err().unwrap();
        assert!(err.to_string().contains("extractor is required"));

        let config = crate::config::ExtractorConfig { dimensions: 8 };
        let extractor = ExtractorHandle::hashing(config).await.unwrap();
        let err = HybridRetriever::builder().extractor(extractor).build().err().unwrap();
        assert!(err.to_string().contains("store is required"));
    }
}
