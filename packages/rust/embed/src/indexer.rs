//! Chunk indexer: decides which chunks need fresh vectors, writes results,
//! and retires chunks that no longer exist in the current document version.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use certcorpus_shared::{Chunk, ChunkRecord, ChunkStatus, Result};
use certcorpus_storage::Storage;

use crate::provider::EmbeddingProvider;

/// Per-document result of an indexing pass.
#[derive(Debug, Default, Clone)]
pub struct IndexReport {
    pub document_url: String,
    /// Chunks embedded (or re-embedded) this pass.
    pub embedded: usize,
    /// Chunks whose text was unchanged; no provider call was made.
    pub skipped: usize,
    /// Prior chunks retired because they vanished from the document.
    pub superseded: usize,
    /// Chunk ids stored without a vector after provider failure.
    pub pending: Vec<String>,
}

/// Index one document's chunks.
///
/// A chunk whose `text_hash` matches the stored record and which already has
/// an embedding is skipped without calling the provider. Provider failures
/// never abort the pass: the chunk is stored with `index_pending` status and
/// picked up on the next run. Stored chunks absent from `chunks` are marked
/// superseded rather than deleted.
#[instrument(skip_all, fields(url = %chunks.first().map(|c| c.document_url.as_str()).unwrap_or("")))]
pub async fn index_document<P: EmbeddingProvider>(
    storage: &Storage,
    provider: &P,
    chunks: &[Chunk],
) -> Result<IndexReport> {
    let Some(first) = chunks.first() else {
        return Ok(IndexReport::default());
    };
    let document_url = first.document_url.clone();

    let prior: HashMap<String, ChunkRecord> = storage
        .list_chunks(&document_url)
        .await?
        .into_iter()
        .map(|r| (r.chunk.chunk_id.clone(), r))
        .collect();

    let mut report = IndexReport {
        document_url: document_url.clone(),
        ..Default::default()
    };

    for chunk in chunks {
        if let Some(record) = prior.get(&chunk.chunk_id)
            && record.chunk.text_hash == chunk.text_hash
            && record.embedding.is_some()
        {
            if record.status != ChunkStatus::Active {
                let mut revived = record.clone();
                revived.status = ChunkStatus::Active;
                storage.upsert_chunk(&revived).await?;
            }
            report.skipped += 1;
            continue;
        }

        match provider.embed(&chunk.text).await {
            Ok(vector) => {
                storage
                    .upsert_chunk(&ChunkRecord {
                        chunk: chunk.clone(),
                        embedding: Some(vector),
                        embedding_model: Some(provider.model_id().to_string()),
                        embedded_at: Some(Utc::now()),
                        status: ChunkStatus::Active,
                    })
                    .await?;
                report.embedded += 1;
            }
            Err(err) => {
                warn!(chunk_id = %chunk.chunk_id, error = %err, "embedding failed, storing as pending");
                storage
                    .upsert_chunk(&ChunkRecord {
                        chunk: chunk.clone(),
                        embedding: None,
                        embedding_model: None,
                        embedded_at: None,
                        status: ChunkStatus::IndexPending,
                    })
                    .await?;
                report.pending.push(chunk.chunk_id.clone());
            }
        }
    }

    // Retire stale chunks from earlier versions of the document.
    let current: std::collections::HashSet<&str> =
        chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    for (id, record) in &prior {
        if !current.contains(id.as_str()) && record.status != ChunkStatus::Superseded {
            storage.mark_superseded(id).await?;
            report.superseded += 1;
        }
    }

    debug!(
        embedded = report.embedded,
        skipped = report.skipped,
        superseded = report.superseded,
        pending = report.pending.len(),
        "indexing pass complete"
    );
    Ok(report)
}
