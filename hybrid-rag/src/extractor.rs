//! Feature extractor seam and its process-wide handle.
//!
//! The linguistic model behind a [`FeatureExtractor`] is expensive to load, so
//! it is initialised once through [`ExtractorHandle::init`], shared by cloning
//! the handle, and released with [`ExtractorHandle::shutdown`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ExtractorConfig;
use crate::document::FeatureRecord;
use crate::error::{RetrievalError, Result};
use crate::hashing::HashingExtractor;

/// Turns raw text into a [`FeatureRecord`].
///
/// Implementations wrap a specific linguistic model behind a unified async
/// interface. Extraction must be deterministic for identical input and must
/// accept empty text, returning a degenerate but well-formed record. The
/// default [`extract_batch`](FeatureExtractor::extract_batch) implementation
/// calls [`extract`](FeatureExtractor::extract) sequentially; backends that
/// support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_rag::FeatureExtractor;
///
/// let record = extractor.extract("Computer Science at the University").await?;
/// assert_eq!(record.embedding.len(), extractor.dimensions());
/// ```
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Extract features from a single text.
    async fn extract(&self, text: &str) -> Result<FeatureRecord>;

    /// Extract features from a batch of texts, in input order.
    async fn extract_batch(&self, texts: &[&str]) -> Result<Vec<FeatureRecord>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.extract(text).await?);
        }
        Ok(results)
    }

    /// Return the embedding dimension D.
    fn dimensions(&self) -> usize;

    /// A short name used in logs and errors.
    fn name(&self) -> &str;

    /// Release model resources. Called once by [`ExtractorHandle::shutdown`].
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct HandleState {
    extractor: Arc<dyn FeatureExtractor>,
    closed: AtomicBool,
}

/// Shared handle to an initialised [`FeatureExtractor`].
///
/// Clones refer to the same extractor. Every extraction through the handle is
/// checked against the output contract: the embedding has exactly D finite
/// components. After [`shutdown`](Self::shutdown) every clone fails with
/// [`RetrievalError::ExtractionError`].
#[derive(Clone)]
pub struct ExtractorHandle {
    state: Arc<HandleState>,
}

impl std::fmt::Debug for ExtractorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorHandle")
            .field("extractor", &self.name())
            .field("dimensions", &self.dimensions())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

impl ExtractorHandle {
    /// Initialise a handle, running the extractor once to verify its contract.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ExtractionError`] if the extractor reports a
    /// zero dimension or its warm-up output does not match that dimension.
    pub async fn init(extractor: Arc<dyn FeatureExtractor>) -> Result<Self> {
        if extractor.dimensions() == 0 {
            return Err(RetrievalError::ExtractionError {
                extractor: extractor.name().to_string(),
                message: "extractor reports a zero embedding dimension".to_string(),
            });
        }

        let handle = Self {
            state: Arc::new(HandleState { extractor, closed: AtomicBool::new(false) }),
        };
        handle.extract("").await?;

        info!(
            extractor = handle.name(),
            dimensions = handle.dimensions(),
            "feature extractor initialised"
        );
        Ok(handle)
    }

    /// Initialise a handle around the built-in [`HashingExtractor`].
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if `config.dimensions == 0`.
    pub async fn hashing(config: ExtractorConfig) -> Result<Self> {
        Self::init(Arc::new(HashingExtractor::new(config)?)).await
    }

    /// Extract features, enforcing the output contract.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ExtractionError`] if the handle has been shut
    /// down, the extractor fails, or the embedding violates the contract.
    pub async fn extract(&self, text: &str) -> Result<FeatureRecord> {
        if self.is_shut_down() {
            return Err(self.error("extractor has been shut down"));
        }
        let record = self.state.extractor.extract(text).await?;
        self.check(&record)?;
        Ok(record)
    }

    /// Extract features for several texts, enforcing the output contract.
    ///
    /// # Errors
    ///
    /// As for [`extract`](Self::extract).
    pub async fn extract_batch(&self, texts: &[&str]) -> Result<Vec<FeatureRecord>> {
        if self.is_shut_down() {
            return Err(self.error("extractor has been shut down"));
        }
        let records = self.state.extractor.extract_batch(texts).await?;
        if records.len() != texts.len() {
            return Err(self.error(format!(
                "extractor returned {} records for {} texts",
                records.len(),
                texts.len()
            )));
        }
        for record in &records {
            self.check(record)?;
        }
        Ok(records)
    }

    fn check(&self, record: &FeatureRecord) -> Result<()> {
        let expected = self.dimensions();
        if record.embedding.len() != expected {
            return Err(self.error(format!(
                "embedding has {} components, expected {expected}",
                record.embedding.len()
            )));
        }
        if record.embedding.iter().any(|x| !x.is_finite()) {
            return Err(self.error("embedding contains non-finite components"));
        }
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> RetrievalError {
        RetrievalError::ExtractionError {
            extractor: self.name().to_string(),
            message: message.into(),
        }
    }

    /// Embedding dimension D of this deployment.
    pub fn dimensions(&self) -> usize {
        self.state.extractor.dimensions()
    }

    /// Name of the underlying extractor.
    pub fn name(&self) -> &str {
        self.state.extractor.name()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called on any clone.
    pub fn is_shut_down(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Release the extractor. Subsequent calls through any clone fail.
    ///
    /// Shutting down an already shut-down handle is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the extractor's own shutdown failure.
    pub async fn shutdown(self) -> Result<()> {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(extractor = self.name(), "shutting down feature extractor");
        self.state.extractor.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WrongDimension;

    #[async_trait]
    impl FeatureExtractor for WrongDimension {
        async fn extract(&self, _text: &str) -> Result<FeatureRecord> {
            Ok(FeatureRecord { embedding: vec![1.0; 3], ..Default::default() })
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "wrong-dimension"
        }
    }

    #[tokio::test]
    async fn init_rejects_contract_violation() {
        let err = ExtractorHandle::init(Arc::new(WrongDimension)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::ExtractionError { .. }));
        assert!(err.to_string().contains("expected 4"));
    }

    #[tokio::test]
    async fn shutdown_closes_every_clone() {
        let handle = ExtractorHandle::hashing(ExtractorConfig { dimensions: 16 }).await.unwrap();
        let clone = handle.clone();
        assert!(clone.extract("Manila").await.is_ok());

        handle.shutdown().await.unwrap();
        assert!(clone.is_shut_down());
        let err = clone.extract("Manila").await.unwrap_err();
        assert!(err.to_string().contains("shut down"));

        // A second shutdown is a no-op.
        clone.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn empty_text_yields_degenerate_record() {
        let handle = ExtractorHandle::hashing(ExtractorConfig { dimensions: 8 }).await.unwrap();
        let record = handle.extract("").await.unwrap();
        assert!(record.tokens.is_empty());
        assert_eq!(record.embedding, vec![0.0; 8]);
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let handle = ExtractorHandle::hashing(ExtractorConfig { dimensions: 32 }).await.unwrap();
        let batch = handle.extract_batch(&["alpha beta", "gamma"]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], handle.extract("gamma").await.unwrap());
    }
}
