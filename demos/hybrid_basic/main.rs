//! # Hybrid Retrieval Basic Example
//!
//! Ingests a three-page course catalog, then runs a few queries through the
//! hybrid pipeline: lexical candidates, dense rerank, entity boost.
//!
//! Uses `HashingExtractor` and `InMemoryChunkStore` so it runs with no model
//! files and no database.
//!
//! Run: `cargo run -p hybrid-rag-demos --bin hybrid_basic`
//! Set `RUST_LOG=hybrid_rag=debug` to see per-stage logs.

use std::sync::Arc;

use hybrid_rag::{
    ChunkStore, ExtractorConfig, ExtractorHandle, HybridRetriever, InMemoryChunkStore, Ingestor,
    RetrievalConfig,
};
use tracing_subscriber::EnvFilter;

const PAGES: [&str; 3] = [
    "The University of the Philippines offers Computer Science and Mathematics degrees. \
     Computer Science courses cover algorithms, compilers and operating systems.",
    "Admissions open in January. Applicants submit transcripts, a personal essay and \
     two recommendation letters to the Office of Admissions in Manila.",
    "The main library in Diliman opens at eight every morning. Engineering students \
     may reserve study rooms for up to three hours.",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // -- 1. Initialise the extractor once and share it --------------------
    let config = ExtractorConfig { dimensions: 384 };
    let extractor = ExtractorHandle::hashing(config.clone()).await?;
    let store: Arc<dyn ChunkStore> =
        Arc::new(InMemoryChunkStore::with_dimensions(config.dimensions));

    // -- 2. Ingest one chunk per page -------------------------------------
    let ingestor = Ingestor::new(extractor.clone(), Arc::clone(&store));
    let pages: Vec<String> = PAGES.iter().map(|p| p.to_string()).collect();
    let report = ingestor.ingest_pages("s3://catalog/up-2024.pdf", &pages).await?;
    println!("Ingested document {} as {} chunks", report.document_id, report.chunk_ids.len());
    for (page, error) in &report.failures {
        println!("  page {page} skipped: {error}");
    }

    // -- 3. Retrieve ------------------------------------------------------
    let retriever = HybridRetriever::builder()
        .extractor(extractor.clone())
        .store(Arc::clone(&store))
        .config(RetrievalConfig::builder().sparse_k(10).dense_k(3).boost(0.1).build()?)
        .build()?;

    let queries =
        ["Computer Science courses", "How do admissions work in Manila?", "library hours"];
    for query in queries {
        println!("\nQuery: {query}");
        let outcome = retriever.retrieve_detailed(query).await?;
        if outcome.passages.is_empty() {
            println!("  (no matching passages)");
        }
        for (i, passage) in outcome.passages.iter().enumerate() {
            let preview: String = passage.text.chars().take(72).collect();
            println!(
                "  {}. [chunk {} | score {:.4}] {preview}...",
                i + 1,
                passage.id,
                passage.score
            );
        }
        for diagnostic in &outcome.diagnostics {
            println!("  ! {diagnostic}");
        }
    }

    // -- 4. Release the extractor ----------------------------------------
    extractor.shutdown().await?;
    Ok(())
}
