//! Error types for the `hybrid-rag` crate.

use thiserror::Error;

use crate::document::{ChunkField, ChunkId};

/// Errors that can occur while ingesting or retrieving passages.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RetrievalError {
    /// Invalid retrieval or ingestion parameters.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The feature extractor failed or is no longer available.
    #[error("Extraction error ({extractor}): {message}")]
    ExtractionError {
        /// The extractor that produced the error.
        extractor: String,
        /// A description of the failure.
        message: String,
    },

    /// The chunk store backend failed.
    #[error("Storage error ({backend}): {message}")]
    StorageError {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A stored payload could not be decoded into its canonical type.
    #[error("Deserialization error for chunk {chunk_id} ({field}): {message}")]
    DeserializationError {
        /// The chunk whose payload is malformed.
        chunk_id: ChunkId,
        /// The payload field that failed to decode.
        field: ChunkField,
        /// A description of the failure.
        message: String,
    },

    /// Cosine similarity is undefined because a vector has zero magnitude.
    #[error("Undefined similarity for chunk {chunk_id}: zero-magnitude vector")]
    UndefinedSimilarity {
        /// The chunk that could not be scored.
        chunk_id: ChunkId,
    },

    /// A caller-supplied deadline elapsed.
    #[error("Timed out after {millis} ms during {stage}")]
    Timeout {
        /// The pipeline stage that was interrupted.
        stage: &'static str,
        /// The configured deadline in milliseconds.
        millis: u64,
    },
}

impl RetrievalError {
    /// The chunk this error is scoped to, if it is a per-chunk failure.
    pub fn chunk_id(&self) -> Option<ChunkId> {
        match self {
            Self::DeserializationError { chunk_id, .. }
            | Self::UndefinedSimilarity { chunk_id } => Some(*chunk_id),
            _ => None,
        }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
