//! Chunk store trait for persisting chunks and ranking them lexically.

use async_trait::async_trait;

use crate::document::{ChunkField, ChunkId, ChunkRecord, DocumentId, NewChunk, StoredDocument};
use crate::error::{RetrievalError, Result};

/// A storage backend for documents and their feature-carrying chunks.
///
/// Implementations persist chunks under their owning document, rank chunk text
/// against a raw query with a full-text relevance function, and fetch
/// projections of chunks by id. Payload fields returned by
/// [`fetch`](ChunkStore::fetch) are already normalised through
/// [`codec`](crate::codec), whatever their physical representation.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_rag::{ChunkField, ChunkStore, InMemoryChunkStore};
///
/// let store = InMemoryChunkStore::new();
/// let doc = store.create_document("s3://bucket/handbook.pdf").await?;
/// let ids = store.insert_batch(&chunks).await?;
/// let hits = store.lexical_search("computer science", 10).await?;
/// let records = store.fetch(&ids, ChunkField::RERANK).await?;
/// ```
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Register a source document and return its id.
    async fn create_document(&self, locator: &str) -> Result<DocumentId>;

    /// Look up a document.
    async fn document(&self, id: DocumentId) -> Result<Option<StoredDocument>>;

    /// Delete a document and every chunk it owns. Returns whether it existed.
    async fn delete_document(&self, id: DocumentId) -> Result<bool>;

    /// Insert one chunk and return its id.
    async fn insert(&self, chunk: &NewChunk) -> Result<ChunkId> {
        let ids = self.insert_batch(std::slice::from_ref(chunk)).await?;
        ids.into_iter().next().ok_or_else(|| RetrievalError::StorageError {
            backend: self.backend().to_string(),
            message: "insert returned no id".to_string(),
        })
    }

    /// Insert chunks, returning their ids in input order.
    ///
    /// Ids are assigned in increasing order.
    async fn insert_batch(&self, chunks: &[NewChunk]) -> Result<Vec<ChunkId>>;

    /// Rank chunks by full-text relevance of their text to `query`.
    ///
    /// Returns at most `limit` `(id, rank)` pairs with a positive rank,
    /// ordered by descending rank.
    async fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<(ChunkId, f64)>>;

    /// Fetch projections of the given chunks containing only `fields`.
    ///
    /// Unknown ids are skipped. Order of the returned records is unspecified.
    async fn fetch(&self, ids: &[ChunkId], fields: &[ChunkField]) -> Result<Vec<ChunkRecord>>;

    /// Ids of a document's chunks in page order.
    async fn document_chunks(&self, id: DocumentId) -> Result<Vec<ChunkId>>;

    /// Total number of stored chunks.
    async fn len(&self) -> Result<usize>;

    /// Whether the store holds no chunks.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Reject chunks whose embedding is empty, non-finite, or of the wrong dimension.
pub(crate) fn validate_chunk(
    backend: &str,
    dimensions: Option<usize>,
    chunk: &NewChunk,
) -> Result<()> {
    let reject =
        |message: String| RetrievalError::StorageError { backend: backend.to_string(), message };
    if chunk.embedding.is_empty() {
        return Err(reject("chunk embedding is empty".to_string()));
    }
    if chunk.embedding.iter().any(|x| !x.is_finite()) {
        return Err(reject("chunk embedding contains non-finite components".to_string()));
    }
    match dimensions {
        Some(expected) if chunk.embedding.len() != expected => Err(reject(format!(
            "chunk embedding has {} components, expected {expected}",
            chunk.embedding.len()
        ))),
        _ => Ok(()),
    }
}
