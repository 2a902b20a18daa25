//! # hybrid-rag
//!
//! Hybrid passage retrieval: lexical candidates reranked by embedding
//! similarity, with a fixed boost for passages that share a named entity
//! with the query.
//!
//! ## Overview
//!
//! A query runs through one linear pipeline:
//!
//! 1. **Extract** query features through an [`ExtractorHandle`]
//! 2. **Sparse** candidates from the [`ChunkStore`] full-text rank ([`SparseScorer`])
//! 3. **Rerank** by cosine similarity plus entity boost ([`DenseReranker`])
//! 4. **Project** the best passages as `(id, text)` pairs
//!
//! [`HybridRetriever`] wires these together; [`Ingestor`] fills the store.
//!
//! ## Features
//!
//! - `postgres`: PostgreSQL chunk store via sqlx ([`pgstore`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hybrid_rag::*;
//!
//! let extractor = ExtractorHandle::hashing(ExtractorConfig::default()).await?;
//! let store: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkStore::with_dimensions(384));
//!
//! let ingestor = Ingestor::new(extractor.clone(), store.clone());
//! ingestor.ingest_pages("s3://bucket/handbook.pdf", &pages).await?;
//!
//! let retriever = HybridRetriever::builder().extractor(extractor).store(store).build()?;
//! let passages = retriever.retrieve("Computer Science courses").await?;
//! ```

pub mod chunkstore;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod extractor;
pub mod hashing;
pub mod ingest;
pub mod inmemory;
pub mod reranker;
pub mod retriever;
pub mod similarity;
pub mod sparse;

#[cfg(feature = "postgres")]
pub mod pgstore;

pub use chunkstore::ChunkStore;
pub use codec::PayloadError;
pub use config::{ExtractorConfig, IngestConfig, RetrievalConfig, RetrievalConfigBuilder};
pub use document::{
    ChunkField, ChunkId, ChunkRecord, ChunkRef, Decoded, DocumentId, Embedding, Entity,
    FeatureRecord, NewChunk, PosTag, RetrievedPassage, ScoredChunk, StoredDocument,
};
pub use error::{Result, RetrievalError};
pub use extractor::{ExtractorHandle, FeatureExtractor};
pub use hashing::HashingExtractor;
pub use ingest::{IngestReport, Ingestor};
pub use inmemory::{InMemoryChunkStore, RawChunk};
pub use reranker::{DenseReranker, RerankOutcome};
pub use retriever::{HybridRetriever, HybridRetrieverBuilder, RetrievalOutcome};
pub use similarity::{EntityMatch, cosine_similarity};
pub use sparse::SparseScorer;
