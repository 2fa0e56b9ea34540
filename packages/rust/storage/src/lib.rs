//! Turso Embedded / libSQL corpus store.
//!
//! The [`Storage`] struct wraps a libSQL database holding source documents,
//! retrieval chunks, and ingest job history.
//!
//! **Access rules:**
//! - The ingestion pipeline: read-write (sole writer) via [`Storage::open`]
//! - Downstream question/tutor agents: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};
use uuid::Uuid;

use certcorpus_shared::{
    Chunk, ChunkRecord, ChunkStatus, CorpusError, Result, SourceDocument,
};

/// A stored document together with its content hash, used by the pipeline
/// driver for change detection.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// The document as last scraped.
    pub document: SourceDocument,
    /// SHA-256 of the normalized section tree at store time.
    pub content_hash: String,
}

/// Seed-catalog metadata attached to a document row (never part of the
/// serialized document schema).
#[derive(Debug, Clone, Default)]
pub struct SeedMeta {
    pub exam_code: Option<String>,
    pub domain_id: Option<i64>,
    pub domain_name: Option<String>,
    pub seed_id: Option<String>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CorpusError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for collaborator agents).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    CorpusError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CorpusError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Insert or replace a document (identity: URL).
    pub async fn upsert_document(
        &self,
        doc: &SourceDocument,
        content_hash: &str,
        seed: Option<&SeedMeta>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let breadcrumbs = serde_json::to_string(&doc.breadcrumbs)
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        let sections = serde_json::to_string(&doc.sections)
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        let seed = seed.cloned().unwrap_or_default();

        self.conn
            .execute(
                "INSERT INTO documents
                   (url, doc_type, method_name, title, version, breadcrumbs_json,
                    sections_json, content_hash, fetched_at, updated_at,
                    exam_code, domain_id, domain_name, seed_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(url) DO UPDATE SET
                   doc_type = excluded.doc_type,
                   method_name = excluded.method_name,
                   title = excluded.title,
                   version = excluded.version,
                   breadcrumbs_json = excluded.breadcrumbs_json,
                   sections_json = excluded.sections_json,
                   content_hash = excluded.content_hash,
                   fetched_at = excluded.fetched_at,
                   updated_at = excluded.updated_at,
                   exam_code = COALESCE(excluded.exam_code, documents.exam_code),
                   domain_id = COALESCE(excluded.domain_id, documents.domain_id),
                   domain_name = COALESCE(excluded.domain_name, documents.domain_name),
                   seed_id = COALESCE(excluded.seed_id, documents.seed_id)",
                params![
                    doc.url.as_str(),
                    doc.doc_type.to_string(),
                    doc.method_name.clone(),
                    doc.title.as_str(),
                    doc.version.clone(),
                    breadcrumbs.as_str(),
                    sections.as_str(),
                    content_hash,
                    doc.fetched_at.to_rfc3339(),
                    now.as_str(),
                    seed.exam_code,
                    seed.domain_id,
                    seed.domain_name,
                    seed.seed_id,
                ],
            )
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Load a document by URL, with its stored content hash.
    pub async fn get_document(&self, url: &str) -> Result<Option<StoredDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, doc_type, method_name, title, version, breadcrumbs_json,
                        sections_json, content_hash, fetched_at
                 FROM documents WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(document_from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(CorpusError::Storage(e.to_string())),
        }
    }

    /// List all documents as `(url, title, doc_type, fetched_at)`.
    pub async fn list_documents(&self) -> Result<Vec<(String, String, String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, title, doc_type, fetched_at FROM documents ORDER BY url",
                params![],
            )
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                get_text(&row, 0)?,
                get_text(&row, 1)?,
                get_text(&row, 2)?,
                get_text(&row, 3)?,
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Chunk operations
    // -----------------------------------------------------------------------

    /// Insert or replace a chunk by id.
    ///
    /// Safe under concurrent writers targeting different documents; writers
    /// for the same document are serialized by the pipeline driver.
    pub async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let chunk = &record.chunk;
        let section_ids = serde_json::to_string(&chunk.section_ids)
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        let headings = serde_json::to_string(&chunk.headings)
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        let breadcrumbs = serde_json::to_string(&chunk.breadcrumbs)
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        let embedding = match &record.embedding {
            Some(vec) => {
                Some(serde_json::to_string(vec).map_err(|e| CorpusError::Storage(e.to_string()))?)
            }
            None => None,
        };

        self.conn
            .execute(
                "INSERT INTO chunks
                   (id, document_url, version, ordinal, section_ids_json, headings_json,
                    breadcrumbs_json, doc_type, text, char_len, oversized, text_hash,
                    embedding_json, embedding_model, embedded_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
                 ON CONFLICT(id) DO UPDATE SET
                   document_url = excluded.document_url,
                   version = excluded.version,
                   ordinal = excluded.ordinal,
                   section_ids_json = excluded.section_ids_json,
                   headings_json = excluded.headings_json,
                   breadcrumbs_json = excluded.breadcrumbs_json,
                   doc_type = excluded.doc_type,
                   text = excluded.text,
                   char_len = excluded.char_len,
                   oversized = excluded.oversized,
                   text_hash = excluded.text_hash,
                   embedding_json = excluded.embedding_json,
                   embedding_model = excluded.embedding_model,
                   embedded_at = excluded.embedded_at,
                   status = excluded.status,
                   updated_at = excluded.updated_at",
                params![
                    chunk.chunk_id.as_str(),
                    chunk.document_url.as_str(),
                    chunk.version.clone(),
                    chunk.ordinal as i64,
                    section_ids.as_str(),
                    headings.as_str(),
                    breadcrumbs.as_str(),
                    chunk.doc_type.to_string(),
                    chunk.text.as_str(),
                    chunk.char_len as i64,
                    chunk.oversized as i64,
                    chunk.text_hash.as_str(),
                    embedding,
                    record.embedding_model.clone(),
                    record.embedded_at.map(|t| t.to_rfc3339()),
                    record.status.to_string(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Load a single chunk by id.
    pub async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("{CHUNK_SELECT} WHERE id = ?1"),
                params![chunk_id],
            )
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(chunk_from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(CorpusError::Storage(e.to_string())),
        }
    }

    /// All chunks for a document (any status), in ordinal order.
    pub async fn list_chunks(&self, document_url: &str) -> Result<Vec<ChunkRecord>> {
        self.query_chunks(
            &format!("{CHUNK_SELECT} WHERE document_url = ?1 ORDER BY ordinal"),
            params![document_url],
        )
        .await
    }

    /// Active chunks for a document, in ordinal order.
    pub async fn list_active_chunks(&self, document_url: &str) -> Result<Vec<ChunkRecord>> {
        self.query_chunks(
            &format!(
                "{CHUNK_SELECT} WHERE document_url = ?1 AND status = 'active' ORDER BY ordinal"
            ),
            params![document_url],
        )
        .await
    }

    async fn query_chunks(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<ChunkRecord>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(chunk_from_row(&row)?);
        }
        Ok(results)
    }

    /// Soft-delete a chunk that no longer exists in the current document
    /// version. The row is kept for audit history.
    pub async fn mark_superseded(&self, chunk_id: &str) -> Result<()> {
        self.set_status(chunk_id, ChunkStatus::Superseded).await
    }

    /// Mark a chunk as awaiting an embedding after provider failure.
    pub async fn mark_pending(&self, chunk_id: &str) -> Result<()> {
        self.set_status(chunk_id, ChunkStatus::IndexPending).await
    }

    async fn set_status(&self, chunk_id: &str, status: ChunkStatus) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE chunks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.to_string(), now.as_str(), chunk_id],
            )
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ingest job operations
    // -----------------------------------------------------------------------

    /// Record the start of an ingest run. Returns the job id.
    pub async fn insert_ingest_job(&self) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO ingest_jobs (id, started_at) VALUES (?1, ?2)",
                params![id.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Record the end of an ingest run with its stats JSON.
    pub async fn finish_ingest_job(&self, job_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE ingest_jobs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, job_id],
            )
            .await
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const CHUNK_SELECT: &str = "SELECT id, document_url, version, ordinal, section_ids_json, \
     headings_json, breadcrumbs_json, doc_type, text, char_len, oversized, text_hash, \
     embedding_json, embedding_model, embedded_at, status FROM chunks";

fn get_text(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| CorpusError::Storage(e.to_string()))
}

fn get_opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    row.get::<Option<String>>(idx)
        .map_err(|e| CorpusError::Storage(e.to_string()))
}

fn get_i64(row: &Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx)
        .map_err(|e| CorpusError::Storage(e.to_string()))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CorpusError::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| CorpusError::Storage(format!("bad {what} column: {e}")))
}

fn document_from_row(row: &Row) -> Result<StoredDocument> {
    let doc_type = get_text(row, 1)?.parse().map_err(CorpusError::Storage)?;
    let document = SourceDocument {
        url: get_text(row, 0)?,
        doc_type,
        method_name: get_opt_text(row, 2)?,
        title: get_text(row, 3)?,
        version: get_opt_text(row, 4)?,
        breadcrumbs: parse_json(&get_text(row, 5)?, "breadcrumbs_json")?,
        sections: parse_json(&get_text(row, 6)?, "sections_json")?,
        fetched_at: parse_timestamp(&get_text(row, 8)?)?,
    };
    Ok(StoredDocument {
        document,
        content_hash: get_text(row, 7)?,
    })
}

fn chunk_from_row(row: &Row) -> Result<ChunkRecord> {
    let doc_type = get_text(row, 7)?.parse().map_err(CorpusError::Storage)?;
    let status: ChunkStatus = get_text(row, 15)?
        .parse()
        .map_err(CorpusError::Storage)?;
    let embedding = match get_opt_text(row, 12)? {
        Some(raw) => Some(parse_json(&raw, "embedding_json")?),
        None => None,
    };
    let embedded_at = match get_opt_text(row, 14)? {
        Some(raw) => Some(parse_timestamp(&raw)?),
        None => None,
    };

    Ok(ChunkRecord {
        chunk: Chunk {
            chunk_id: get_text(row, 0)?,
            document_url: get_text(row, 1)?,
            version: get_opt_text(row, 2)?,
            ordinal: get_i64(row, 3)? as u32,
            section_ids: parse_json(&get_text(row, 4)?, "section_ids_json")?,
            headings: parse_json(&get_text(row, 5)?, "headings_json")?,
            breadcrumbs: parse_json(&get_text(row, 6)?, "breadcrumbs_json")?,
            doc_type,
            text: get_text(row, 8)?,
            char_len: get_i64(row, 9)? as usize,
            oversized: get_i64(row, 10)? != 0,
            text_hash: get_text(row, 11)?,
        },
        embedding,
        embedding_model: get_opt_text(row, 13)?,
        embedded_at,
        status,
    })
}
