// Knowledge store module
// Runs the chunk -> embed -> index pipeline and answers queries against the result


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::embeddings::chunking::{Chunk, ChunkingConfig, chunk_page};
use crate::embeddings::{Embedding, EmbeddingProvider, ensure_batch_len};
use crate::index::{FlatL2Index, IndexError, VectorIndex};
use crate::{RagError, Result};

const DEFAULT_EMBED_BATCH_SIZE: usize = 16;
const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(120);

/// One page of extracted document text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    pub text: String,
    /// Stable document identifier, usually the file name
    pub source: String,
    /// 1-based page number
    pub page: u32,
}

impl DocumentPage {
    #[inline]
    pub fn new(text: impl Into<String>, source: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            page,
        }
    }
}

/// What ingestion does when an embedding batch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestPolicy {
    /// Leave the batch's chunks out of the index and carry on
    #[default]
    SkipFailedBatches,
    /// Stop ingestion and keep the previously published state
    AbortOnError,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub chunking: ChunkingConfig,
    /// Number of chunk texts sent to the provider per `embed` call
    pub embed_batch_size: usize,
    /// Upper bound on a single `embed` call; exceeding it fails the batch
    pub embed_timeout: Duration,
    pub policy: IngestPolicy,
}

impl Default for StoreOptions {
    #[inline]
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            policy: IngestPolicy::default(),
        }
    }
}

impl StoreOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        let provider = &config.provider;
        // room for every retry of one request plus the backoff between them
        let attempts = u64::from(provider.retry_attempts);
        let timeout_secs = provider
            .timeout_seconds
            .saturating_mul(attempts)
            .saturating_add(1_u64 << provider.retry_attempts.min(16));

        Self {
            chunking: config.chunking.clone(),
            embed_batch_size: provider.batch_size as usize,
            embed_timeout: Duration::from_secs(timeout_secs),
            policy: if config.retrieval.strict {
                IngestPolicy::AbortOnError
            } else {
                IngestPolicy::SkipFailedBatches
            },
        }
    }
}

/// Shared flag a caller sets to abandon an ingestion in progress.
///
/// Checked between document pages and between embedding batches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new snapshot was published
    Indexed { chunks: usize, dimension: usize },
    /// No chunk survived filtering and embedding; nothing was published
    NothingToIndex,
}

/// Summary of one ingestion pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub outcome: IngestOutcome,
    pub pages: usize,
    /// Chunks produced by the chunker before embedding
    pub candidates: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// Chunks left out because their batch failed
    pub skipped_chunks: usize,
}

impl IngestReport {
    fn nothing(pages: usize) -> Self {
        Self {
            outcome: IngestOutcome::NothingToIndex,
            pages,
            candidates: 0,
            batches: 0,
            failed_batches: 0,
            skipped_chunks: 0,
        }
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        matches!(self.outcome, IngestOutcome::Indexed { .. })
    }
}

/// A ranked fragment returned by [`KnowledgeStore::query`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub text: String,
    pub source: String,
    pub page: u32,
    /// Squared L2 distance to the query, lower is more similar
    pub score: f32,
}

/// An immutable published index together with the chunks it describes.
///
/// Position `i` in the index is `chunks[i]`.
#[derive(Debug)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    index: Box<dyn VectorIndex>,
}

impl IndexSnapshot {
    fn new(chunks: Vec<Chunk>, index: Box<dyn VectorIndex>) -> Self {
        debug_assert_eq!(chunks.len(), index.len());
        Self { chunks, index }
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Nearest chunks to an already embedded query, closest first
    #[inline]
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> std::result::Result<Vec<SearchResult>, IndexError> {
        let neighbors = self.index.search(query, top_k)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|neighbor| {
                self.chunks.get(neighbor.position).map(|chunk| SearchResult {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    page: chunk.page,
                    score: neighbor.distance,
                })
            })
            .collect())
    }
}

/// Owns the chunk list and vector index and serves similarity queries.
///
/// The store starts not ready. A successful [`ingest`](Self::ingest) builds a
/// complete snapshot and publishes it with a single pointer swap, so queries
/// see either the previous snapshot or the new one, never a partial build.
pub struct KnowledgeStore {
    provider: Arc<dyn EmbeddingProvider>,
    options: StoreOptions,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    ingest_guard: Mutex<()>,
    next_id: AtomicU64,
}

impl KnowledgeStore {
    #[inline]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: StoreOptions) -> Self {
        Self {
            provider,
            options,
            snapshot: RwLock::new(None),
            ingest_guard: Mutex::new(()),
            next_id: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The currently published snapshot, if any
    #[inline]
    pub async fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().await.clone()
    }

    #[inline]
    pub async fn is_ready(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    /// Number of indexed chunks, zero when not ready
    #[inline]
    pub async fn len(&self) -> usize {
        self.snapshot().await.map_or(0, |s| s.len())
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Embedding dimension of the published index
    #[inline]
    pub async fn dimension(&self) -> Option<usize> {
        self.snapshot().await.map(|s| s.dimension())
    }

    /// Chunk, embed and index `pages`, then publish the result.
    ///
    /// Only one ingestion may run at a time; a concurrent call fails with
    /// [`RagError::IngestionInProgress`]. On error or cancellation the
    /// previously published snapshot stays in place.
    #[inline]
    pub async fn ingest<I>(&self, pages: I, cancel: &CancelFlag) -> Result<IngestReport>
    where
        I: IntoIterator<Item = DocumentPage>,
    {
        let _guard = self
            .ingest_guard
            .try_lock()
            .map_err(|_| RagError::IngestionInProgress)?;

        let first_id = self.next_id.load(Ordering::SeqCst);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut page_count = 0_usize;

        for page in pages {
            if cancel.is_cancelled() {
                info!("Ingestion cancelled after {} pages", page_count);
                return Err(RagError::Cancelled);
            }

            page_count += 1;
            let candidates =
                chunk_page(&page.text, &page.source, page.page, &self.options.chunking);
            for candidate in candidates {
                let id = first_id + chunks.len() as u64;
                chunks.push(candidate.into_chunk(id));
            }
        }

        if chunks.is_empty() {
            info!(
                "No chunks survived filtering across {} pages, nothing to index",
                page_count
            );
            return Ok(IngestReport::nothing(page_count));
        }

        let mut report = IngestReport {
            candidates: chunks.len(),
            ..IngestReport::nothing(page_count)
        };
        self.next_id
            .store(first_id + chunks.len() as u64, Ordering::SeqCst);

        info!(
            "Embedding {} chunks from {} pages with {}",
            chunks.len(),
            page_count,
            self.provider.model_name()
        );

        let (kept, vectors) = self.embed_chunks(&chunks, cancel, &mut report).await?;

        if kept.is_empty() {
            warn!(
                "All {} embedding batches failed, nothing to index",
                report.failed_batches
            );
            return Ok(report);
        }

        let index = FlatL2Index::build(&vectors).inspect_err(|e| {
            error!("Failed to build index: {}", e);
        })?;
        let dimension = index.dimension();
        let snapshot = Arc::new(IndexSnapshot::new(kept, Box::new(index)));
        let indexed = snapshot.len();

        *self.snapshot.write().await = Some(snapshot);

        info!(
            "Index built with {} chunks, dimension {} ({} chunks skipped)",
            indexed, dimension, report.skipped_chunks
        );

        report.outcome = IngestOutcome::Indexed {
            chunks: indexed,
            dimension,
        };
        Ok(report)
    }

    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        cancel: &CancelFlag,
        report: &mut IngestReport,
    ) -> Result<(Vec<Chunk>, Vec<Embedding>)> {
        let mut kept = Vec::with_capacity(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.options.embed_batch_size.max(1)) {
            if cancel.is_cancelled() {
                info!("Ingestion cancelled during embedding");
                return Err(RagError::Cancelled);
            }

            report.batches += 1;
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            match self.embed_with_timeout(&texts).await {
                Ok(embeddings) => {
                    kept.extend_from_slice(batch);
                    vectors.extend(embeddings);
                }
                Err(e) => match self.options.policy {
                    IngestPolicy::AbortOnError => {
                        error!(
                            "Embedding batch {} failed, aborting ingestion: {}",
                            report.batches, e
                        );
                        return Err(e);
                    }
                    IngestPolicy::SkipFailedBatches => {
                        warn!(
                            "Embedding batch {} failed, skipping {} chunks: {}",
                            report.batches,
                            batch.len(),
                            e
                        );
                        report.failed_batches += 1;
                        report.skipped_chunks += batch.len();
                    }
                },
            }
        }

        Ok((kept, vectors))
    }

    async fn embed_with_timeout(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let timeout = self.options.embed_timeout;
        let embeddings = tokio::time::timeout(timeout, self.provider.embed(texts))
            .await
            .map_err(|_| {
                RagError::Embedding(format!("Embedding request timed out after {:?}", timeout))
            })??;

        ensure_batch_len(texts.len(), &embeddings)?;
        Ok(embeddings)
    }

    /// Return up to `top_k` fragments closest to `text`, closest first.
    ///
    /// Never fails: a store that is not ready, a failed query embedding or a
    /// failed search all yield an empty result.
    #[inline]
    pub async fn query(&self, text: &str, top_k: usize) -> Vec<SearchResult> {
        let Some(snapshot) = self.snapshot().await else {
            debug!("Query before any index was published");
            return Vec::new();
        };

        if top_k == 0 {
            return Vec::new();
        }

        let embedding = match self.embed_with_timeout(&[text.to_string()]).await {
            Ok(embeddings) => embeddings.into_iter().next(),
            Err(e) => {
                warn!("Failed to embed query: {}", e);
                return Vec::new();
            }
        };
        let Some(embedding) = embedding else {
            return Vec::new();
        };

        match snapshot.search(&embedding, top_k) {
            Ok(results) => {
                debug!("Query matched {} fragments", results.len());
                results
            }
            Err(e) => {
                warn!("Search failed: {}", e);
                Vec::new()
            }
        }
    }
}
