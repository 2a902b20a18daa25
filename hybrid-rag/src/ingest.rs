//! Page-level ingestion into a [`ChunkStore`].
//!
//! [`Ingestor::ingest_pages`] registers a document, extracts features for each
//! page with bounded concurrency and writes one chunk per page in batches.
//! Pages are independent: a page that fails extraction or insertion is
//! reported in the [`IngestReport`] and every other page is kept.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::chunkstore::ChunkStore;
use crate::config::IngestConfig;
use crate::document::{ChunkId, DocumentId, NewChunk};
use crate::error::{RetrievalError, Result};
use crate::extractor::ExtractorHandle;

/// Outcome of ingesting one multi-page document.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// The document created for the pages.
    pub document_id: DocumentId,
    /// Ids of the stored chunks, in page order.
    pub chunk_ids: Vec<ChunkId>,
    /// Zero-based page index and error for every page that was not stored.
    pub failures: Vec<(usize, RetrievalError)>,
}

impl IngestReport {
    /// Whether every page was stored.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Turns pages of text into stored chunks.
pub struct Ingestor {
    extractor: ExtractorHandle,
    store: Arc<dyn ChunkStore>,
    config: IngestConfig,
}

impl Ingestor {
    /// Create an ingestor with the default [`IngestConfig`].
    pub fn new(extractor: ExtractorHandle, store: Arc<dyn ChunkStore>) -> Self {
        Self { extractor, store, config: IngestConfig::default() }
    }

    /// Create an ingestor with explicit limits.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if a limit is zero.
    pub fn with_config(
        extractor: ExtractorHandle,
        store: Arc<dyn ChunkStore>,
        config: IngestConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { extractor, store, config })
    }

    /// Return a reference to the ingestion limits.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Register `locator` as a document and store one chunk per page.
    ///
    /// Features are extracted for up to `concurrency` pages at once; chunks
    /// are inserted `batch_size` at a time. If a batch insert fails, its pages
    /// are retried one by one so that only the offending pages are lost.
    ///
    /// # Errors
    ///
    /// Returns an error only if the document itself cannot be created.
    /// Per-page failures are collected in [`IngestReport::failures`].
    pub async fn ingest_pages(&self, locator: &str, pages: &[String]) -> Result<IngestReport> {
        let document_id = self.store.create_document(locator).await.map_err(|e| {
            error!(locator, error = %e, "failed to create document");
            e
        })?;

        let extracted: Vec<(usize, Result<NewChunk>)> = stream::iter(pages.iter().enumerate())
            .map(|(index, page)| async move {
                let chunk = self
                    .extractor
                    .extract(page)
                    .await
                    .map(|features| NewChunk::from_features(document_id, page.as_str(), features));
                (index, chunk)
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let mut failures = Vec::new();
        let mut ready = Vec::with_capacity(extracted.len());
        for (index, chunk) in extracted {
            match chunk {
                Ok(chunk) => ready.push((index, chunk)),
                Err(e) => {
                    warn!(
                        document.id = %document_id,
                        page = index,
                        error = %e,
                        "page extraction failed"
                    );
                    failures.push((index, e));
                }
            }
        }

        let mut chunk_ids = Vec::with_capacity(ready.len());
        for batch in ready.chunks(self.config.batch_size) {
            let chunks: Vec<NewChunk> = batch.iter().map(|(_, chunk)| chunk.clone()).collect();
            match self.store.insert_batch(&chunks).await {
                Ok(ids) => chunk_ids.extend(ids),
                Err(e) => {
                    debug!(
                        document.id = %document_id,
                        error = %e,
                        "batch insert failed, retrying pages individually"
                    );
                    for (index, chunk) in batch {
                        match self.store.insert(chunk).await {
                            Ok(id) => chunk_ids.push(id),
                            Err(e) => {
                                warn!(
                                    document.id = %document_id,
                                    page = index,
                                    error = %e,
                                    "page insert failed"
                                );
                                failures.push((*index, e));
                            }
                        }
                    }
                }
            }
        }
        failures.sort_by_key(|(index, _)| *index);

        info!(
            document.id = %document_id,
            chunk_count = chunk_ids.len(),
            failure_count = failures.len(),
            "ingested document"
        );

        Ok(IngestReport { document_id, chunk_ids, failures })
    }
}
