//! End-to-end ingestion pipeline: fetch → extract → normalize → chunk → index.
//!
//! Documents run in parallel up to `ingest_concurrency`; within one document
//! the stages are strictly sequential. One document's failure never aborts
//! the batch: every target produces an [`IngestOutcome`].

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use certcorpus_chunk::chunk_document;
use certcorpus_embed::{EmbeddingProvider, index_document};
use certcorpus_fetch::Fetcher;
use certcorpus_shared::{AppConfig, ChunkStatus, CorpusError, Result};
use certcorpus_storage::{SeedMeta, Storage};

/// One URL to ingest, with optional seed-catalog provenance.
#[derive(Debug, Clone)]
pub struct IngestTarget {
    pub url: String,
    pub seed: Option<SeedMeta>,
}

impl IngestTarget {
    pub fn bare(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            seed: None,
        }
    }
}

/// Per-document result of an ingest run.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Document stored and indexed.
    Succeeded {
        url: String,
        chunks: usize,
        embedded: usize,
        reused: usize,
    },
    /// Nothing to do (e.g. content unchanged since the last run).
    Skipped { url: String, reason: String },
    /// A stage failed; `kind` is the error's stable tag.
    Failed {
        url: String,
        kind: &'static str,
        message: String,
    },
}

impl IngestOutcome {
    pub fn url(&self) -> &str {
        match self {
            IngestOutcome::Succeeded { url, .. }
            | IngestOutcome::Skipped { url, .. }
            | IngestOutcome::Failed { url, .. } => url,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, IngestOutcome::Failed { .. })
    }
}

/// Summary of a whole ingest run.
#[derive(Debug)]
pub struct IngestRunSummary {
    pub job_id: String,
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestRunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, IngestOutcome::Succeeded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, IngestOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn stats_json(&self) -> String {
        serde_json::json!({
            "total": self.outcomes.len(),
            "succeeded": self.succeeded(),
            "skipped": self.skipped(),
            "failed": self.failed(),
        })
        .to_string()
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a document's pipeline starts.
    fn document_started(&self, url: &str);
    /// Called when a document's pipeline finishes, whatever the outcome.
    fn document_finished(&self, outcome: &IngestOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn document_started(&self, _url: &str) {}
    fn document_finished(&self, _outcome: &IngestOutcome) {}
}

/// Run one document through every stage.
///
/// Never returns `Err` for per-document problems; those become
/// [`IngestOutcome::Failed`] so the batch can continue.
#[instrument(skip_all, fields(url = %target.url))]
pub async fn ingest_document<P: EmbeddingProvider>(
    storage: &Storage,
    fetcher: &Fetcher,
    provider: &P,
    config: &AppConfig,
    target: &IngestTarget,
) -> IngestOutcome {
    match run_stages(storage, fetcher, provider, config, target).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(url = %target.url, error = %err, "document ingest failed");
            IngestOutcome::Failed {
                url: target.url.clone(),
                kind: err.kind_tag(),
                message: err.to_string(),
            }
        }
    }
}

async fn run_stages<P: EmbeddingProvider>(
    storage: &Storage,
    fetcher: &Fetcher,
    provider: &P,
    config: &AppConfig,
    target: &IngestTarget,
) -> Result<IngestOutcome> {
    let url = &target.url;

    let html = fetcher.fetch(url).await?;

    let mut doc = certcorpus_extract::extract(&html, url)?;
    doc.sections = certcorpus_extract::normalize(doc.sections)?;
    let hash = certcorpus_extract::content_hash(&doc.sections);

    // Unchanged content: skip chunking and embedding entirely — unless a
    // prior run left chunks without embeddings, which the index pass below
    // must pick up.
    if let Some(stored) = storage.get_document(url).await?
        && stored.content_hash == hash
    {
        let awaiting = storage
            .list_chunks(url)
            .await?
            .iter()
            .filter(|r| r.status == ChunkStatus::IndexPending)
            .count();
        if awaiting == 0 {
            info!(url = %url, "content unchanged since last run");
            return Ok(IngestOutcome::Skipped {
                url: url.clone(),
                reason: "unchanged".into(),
            });
        }
        info!(url = %url, awaiting, "content unchanged but chunks await embeddings");
    }

    let chunks = chunk_document(&doc, &config.chunking);

    storage
        .upsert_document(&doc, &hash, target.seed.as_ref())
        .await?;

    let report = index_document(storage, provider, &chunks).await?;
    if !report.pending.is_empty() {
        let err = CorpusError::Index {
            document_url: url.clone(),
            failed_chunks: report.pending,
        };
        return Ok(IngestOutcome::Failed {
            url: url.clone(),
            kind: err.kind_tag(),
            message: err.to_string(),
        });
    }

    Ok(IngestOutcome::Succeeded {
        url: url.clone(),
        chunks: chunks.len(),
        embedded: report.embedded,
        reused: report.skipped,
    })
}

/// Ingest a batch of targets with bounded document-level parallelism.
///
/// Outcomes come back in input order. The run is recorded in `ingest_jobs`.
#[instrument(skip_all, fields(targets = targets.len()))]
pub async fn ingest_all<P: EmbeddingProvider + 'static>(
    storage: Arc<Storage>,
    provider: Arc<P>,
    config: Arc<AppConfig>,
    targets: Vec<IngestTarget>,
    progress: Arc<dyn ProgressReporter>,
) -> Result<IngestRunSummary> {
    let job_id = storage.insert_ingest_job().await?;
    let fetcher = Arc::new(Fetcher::new(config.fetch.clone())?);
    let semaphore = Arc::new(Semaphore::new(
        config.defaults.ingest_concurrency.max(1) as usize,
    ));

    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        let storage = Arc::clone(&storage);
        let fetcher = Arc::clone(&fetcher);
        let provider = Arc::clone(&provider);
        let config = Arc::clone(&config);
        let progress = Arc::clone(&progress);
        let semaphore = Arc::clone(&semaphore);

        handles.push(tokio::spawn(async move {
            // Closing the semaphore is not part of this pipeline, so acquire
            // can only fail if the runtime is shutting down.
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| CorpusError::validation(format!("semaphore closed: {e}")))?;
            progress.document_started(&target.url);
            let outcome =
                ingest_document(&storage, &fetcher, provider.as_ref(), &config, &target).await;
            progress.document_finished(&outcome);
            Ok::<_, CorpusError>(outcome)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| CorpusError::validation(format!("ingest task panicked: {e}")))??;
        outcomes.push(outcome);
    }

    let summary = IngestRunSummary { job_id, outcomes };
    storage
        .finish_ingest_job(&summary.job_id, &summary.stats_json())
        .await?;

    info!(
        succeeded = summary.succeeded(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "ingest run complete"
    );
    Ok(summary)
}
