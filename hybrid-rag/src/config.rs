//! Configuration for retrieval, ingestion, and the built-in extractor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RetrievalError, Result};
use crate::similarity::EntityMatch;

/// Parameters of one hybrid retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of lexical candidates passed to the dense reranker.
    pub sparse_k: usize,
    /// Maximum number of results returned after reranking.
    pub dense_k: usize,
    /// Score bonus for chunks sharing a named entity with the query.
    pub boost: f64,
    /// Lexical candidates ranked below this are dropped.
    pub min_rank: f64,
    /// How entity surface texts are compared.
    pub entity_match: EntityMatch,
    /// Deadline for the extraction call and for each store call, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            sparse_k: 10,
            dense_k: 3,
            boost: 0.1,
            min_rank: 0.0,
            entity_match: EntityMatch::Exact,
            timeout_ms: None,
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// The configured deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check that the parameters describe a valid retrieval.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if:
    /// - `sparse_k == 0` or `dense_k == 0`
    /// - `boost` is negative or not finite
    /// - `min_rank` is not finite
    /// - `timeout_ms == Some(0)`
    pub fn validate(&self) -> Result<()> {
        if self.sparse_k == 0 {
            return Err(RetrievalError::ConfigError(
                "sparse_k must be greater than zero".to_string(),
            ));
        }
        if self.dense_k == 0 {
            return Err(RetrievalError::ConfigError(
                "dense_k must be greater than zero".to_string(),
            ));
        }
        if !self.boost.is_finite() || self.boost < 0.0 {
            return Err(RetrievalError::ConfigError(format!(
                "boost ({}) must be a finite, non-negative number",
                self.boost
            )));
        }
        if !self.min_rank.is_finite() {
            return Err(RetrievalError::ConfigError(format!(
                "min_rank ({}) must be finite",
                self.min_rank
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(RetrievalError::ConfigError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the number of lexical candidates.
    pub fn sparse_k(mut self, k: usize) -> Self {
        self.config.sparse_k = k;
        self
    }

    /// Set the maximum number of reranked results.
    pub fn dense_k(mut self, k: usize) -> Self {
        self.config.dense_k = k;
        self
    }

    /// Set the entity-overlap boost.
    pub fn boost(mut self, boost: f64) -> Self {
        self.config.boost = boost;
        self
    }

    /// Set the minimum lexical rank.
    pub fn min_rank(mut self, min_rank: f64) -> Self {
        self.config.min_rank = min_rank;
        self
    }

    /// Set the entity matching policy.
    pub fn entity_match(mut self, policy: EntityMatch) -> Self {
        self.config.entity_match = policy;
        self
    }

    /// Set a deadline applied to extraction and to each store call.
    ///
    /// Sub-millisecond remainders round up to the next millisecond.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_micros().div_ceil(1000);
        self.config.timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    /// Build the [`RetrievalConfig`], validating the parameters.
    ///
    /// # Errors
    ///
    /// See [`RetrievalConfig::validate`].
    pub fn build(self) -> Result<RetrievalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parameters for page ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum number of pages whose features are extracted at once.
    pub concurrency: usize,
    /// Number of chunks written per store call.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { concurrency: 4, batch_size: 64 }
    }
}

impl IngestConfig {
    /// Check that both limits are positive.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if either limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RetrievalError::ConfigError(
                "concurrency must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RetrievalError::ConfigError(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for the built-in [`HashingExtractor`](crate::HashingExtractor).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Embedding dimension D.
    pub dimensions: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}
