//! Lexical candidate selection.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::chunkstore::ChunkStore;
use crate::document::ChunkRef;
use crate::error::Result;

/// Selects the top lexical candidates for a query from a [`ChunkStore`].
///
/// The store's ordering is not trusted for ties: candidates are re-sorted by
/// descending rank with ascending chunk id as the secondary key, so the same
/// corpus and query always produce the same candidate list.
#[derive(Clone)]
pub struct SparseScorer {
    store: Arc<dyn ChunkStore>,
    min_rank: f64,
}

impl SparseScorer {
    /// Create a scorer over `store` keeping every positively ranked chunk.
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store, min_rank: 0.0 }
    }

    /// Drop candidates whose rank is below `min_rank`.
    pub fn with_min_rank(mut self, min_rank: f64) -> Self {
        self.min_rank = min_rank;
        self
    }

    /// Return at most `k` candidates ordered by descending lexical rank.
    ///
    /// Zero matches is not an error and yields an empty list.
    ///
    /// # Errors
    ///
    /// Propagates [`RetrievalError::StorageError`](crate::RetrievalError::StorageError)
    /// from the store.
    pub async fn candidates(&self, query: &str, k: usize) -> Result<Vec<ChunkRef>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.store.lexical_search(query, k).await?;
        let mut candidates: Vec<ChunkRef> = hits
            .into_iter()
            .filter(|(_, rank)| rank.is_finite() && *rank >= self.min_rank)
            .map(|(id, rank)| ChunkRef { id, rank })
            .collect();

        candidates.sort_by(|a, b| {
            b.rank.partial_cmp(&a.rank).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(k);

        debug!(
            backend = self.store.backend(),
            k,
            candidate_count = candidates.len(),
            "sparse retrieval"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::document::{ChunkField, ChunkId, ChunkRecord, DocumentId, NewChunk, StoredDocument};

    /// Returns a fixed, deliberately misordered hit list.
    struct FixedHits(Vec<(ChunkId, f64)>);

    #[async_trait]
    impl ChunkStore for FixedHits {
        fn backend(&self) -> &str {
            "fixed"
        }
        async fn create_document(&self, _locator: &str) -> Result<DocumentId> {
            Ok(DocumentId(1))
        }
        async fn document(&self, _id: DocumentId) -> Result<Option<StoredDocument>> {
            Ok(None)
        }
        async fn delete_document(&self, _id: DocumentId) -> Result<bool> {
            Ok(false)
        }
        async fn insert_batch(&self, _chunks: &[NewChunk]) -> Result<Vec<ChunkId>> {
            Ok(Vec::new())
        }
        async fn lexical_search(&self, _query: &str, _limit: usize) -> Result<Vec<(ChunkId, f64)>> {
            Ok(self.0.clone())
        }
        async fn fetch(
            &self,
            _ids: &[ChunkId],
            _fields: &[ChunkField],
        ) -> Result<Vec<ChunkRecord>> {
            Ok(Vec::new())
        }
        async fn document_chunks(&self, _id: DocumentId) -> Result<Vec<ChunkId>> {
            Ok(Vec::new())
        }
        async fn len(&self) -> Result<usize> {
            Ok(self.0.len())
        }
    }

    fn ids(candidates: &[ChunkRef]) -> Vec<i64> {
        candidates.iter().map(|c| c.id.0).collect()
    }

    #[tokio::test]
    async fn ties_break_by_ascending_id() {
        let store = FixedHits(vec![
            (ChunkId(9), 0.5),
            (ChunkId(4), 0.8),
            (ChunkId(2), 0.5),
            (ChunkId(7), 0.5),
        ]);
        let scorer = SparseScorer::new(Arc::new(store));
        let candidates = scorer.candidates("q", 10).await.unwrap();
        assert_eq!(ids(&candidates), vec![4, 2, 7, 9]);
    }

    #[tokio::test]
    async fn truncates_to_k() {
        let store = FixedHits(vec![(ChunkId(1), 0.9), (ChunkId(2), 0.8), (ChunkId(3), 0.7)]);
        let scorer = SparseScorer::new(Arc::new(store));
        assert_eq!(ids(&scorer.candidates("q", 2).await.unwrap()), vec![1, 2]);
        assert!(scorer.candidates("q", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn min_rank_filters_weak_matches() {
        let store = FixedHits(vec![(ChunkId(1), 0.05), (ChunkId(2), 0.3), (ChunkId(3), f64::NAN)]);
        let scorer = SparseScorer::new(Arc::new(store)).with_min_rank(0.1);
        assert_eq!(ids(&scorer.candidates("q", 10).await.unwrap()), vec![2]);
    }

    #[tokio::test]
    async fn no_matches_is_empty() {
        let scorer = SparseScorer::new(Arc::new(FixedHits(Vec::new())));
        assert!(scorer.candidates("q", 5).await.unwrap().is_empty());
    }
}
