//! SQL migration definitions for the CertCorpus corpus database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: documents, chunks, ingest_jobs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Source documents; identity is the canonical URL.
CREATE TABLE IF NOT EXISTS documents (
    url              TEXT PRIMARY KEY,
    doc_type         TEXT NOT NULL,
    method_name      TEXT,
    title            TEXT NOT NULL,
    version          TEXT,
    breadcrumbs_json TEXT NOT NULL,
    sections_json    TEXT NOT NULL,
    content_hash     TEXT NOT NULL,
    fetched_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    -- Seed-catalog metadata (kept off the serialized document schema)
    exam_code        TEXT,
    domain_id        INTEGER,
    domain_name      TEXT,
    seed_id          TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash);
CREATE INDEX IF NOT EXISTS idx_documents_exam_code ON documents(exam_code);

-- Retrieval chunks; superseded rows are kept for audit history.
CREATE TABLE IF NOT EXISTS chunks (
    id               TEXT PRIMARY KEY,
    document_url     TEXT NOT NULL REFERENCES documents(url) ON DELETE CASCADE,
    version          TEXT,
    ordinal          INTEGER NOT NULL,
    section_ids_json TEXT NOT NULL,
    headings_json    TEXT NOT NULL,
    breadcrumbs_json TEXT NOT NULL,
    doc_type         TEXT NOT NULL,
    text             TEXT NOT NULL,
    char_len         INTEGER NOT NULL,
    oversized        INTEGER NOT NULL DEFAULT 0,
    text_hash        TEXT NOT NULL,
    embedding_json   TEXT,
    embedding_model  TEXT,
    embedded_at      TEXT,
    status           TEXT NOT NULL DEFAULT 'active',
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_url);
CREATE INDEX IF NOT EXISTS idx_chunks_status ON chunks(status);

-- Ingest run history
CREATE TABLE IF NOT EXISTS ingest_jobs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
