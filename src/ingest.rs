//! Offline corpus ingestion: embed a product dump and write the index files.

use crate::{CorpusEntry, IndexStore, InferenceCapability, SimilarityIndex, Vector};
use anyhow::{bail, Context};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// JSON array of corpus records
    pub corpus: PathBuf,
    /// Keep at most this many records
    pub limit: usize,
    /// Embed the downloaded `image_url` instead of the entry text
    pub embed_images: bool,
    pub download_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub read: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub dim: usize,
}

/// Read and truncate the corpus file.
pub fn read_corpus(options: &IngestOptions) -> anyhow::Result<Vec<CorpusEntry>> {
    let raw = std::fs::read(&options.corpus)
        .with_context(|| format!("failed to read corpus {}", options.corpus.display()))?;
    let mut entries: Vec<CorpusEntry> = serde_json::from_slice(&raw)
        .with_context(|| format!("corpus {} is not a JSON array of products", options.corpus.display()))?;
    entries.truncate(options.limit);
    Ok(entries)
}

async fn download(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<u8>> {
    if url.is_empty() {
        bail!("entry has no image_url");
    }
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

async fn embed_entry(
    entry: &CorpusEntry,
    inference: &dyn InferenceCapability,
    client: Option<&reqwest::Client>,
) -> anyhow::Result<Vector> {
    match client {
        Some(client) => {
            let image = download(client, &entry.image_url).await?;
            Ok(inference.embed_image(&image).await?)
        }
        None => Ok(inference.embed_text(&entry.embedding_text()).await?),
    }
}

/// Embed every entry, skipping those that fail, and save the index atomically.
pub async fn ingest(
    options: &IngestOptions,
    inference: &dyn InferenceCapability,
    store: &IndexStore,
) -> anyhow::Result<IngestReport> {
    let entries = read_corpus(options)?;
    let read = entries.len();
    info!(
        corpus = %options.corpus.display(),
        entries = read,
        backend = inference.name(),
        embed_images = options.embed_images,
        "Ingesting corpus"
    );

    let client = if options.embed_images {
        Some(
            reqwest::Client::builder()
                .timeout(options.download_timeout)
                .build()
                .context("failed to build download client")?,
        )
    } else {
        None
    };

    let mut vectors = Vec::with_capacity(read);
    let mut kept = Vec::with_capacity(read);
    for (i, entry) in entries.into_iter().enumerate() {
        match embed_entry(&entry, inference, client.as_ref()).await {
            Ok(vector) => {
                vectors.push(vector);
                kept.push(entry);
            }
            Err(e) => warn!(id = %entry.id, error = %e, "Skipping entry"),
        }
        if (i + 1) % 100 == 0 {
            debug!(processed = i + 1, total = read, "Ingestion progress");
        }
    }

    if kept.is_empty() {
        bail!("none of the {read} corpus entries could be embedded");
    }

    let indexed = kept.len();
    let index = SimilarityIndex::build_with_dim(inference.dimension(), vectors, kept)?;
    store.save(&index)?;

    let report = IngestReport {
        read,
        indexed,
        skipped: read - indexed,
        dim: index.dim(),
    };
    info!(
        indexed = report.indexed,
        skipped = report.skipped,
        vectors = %store.vector_path().display(),
        metadata = %store.metadata_path().display(),
        "Index written"
    );
    Ok(report)
}
