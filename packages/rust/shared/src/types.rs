//! Core domain types for the CertCorpus corpus pipeline.
//!
//! The serialized shape of [`SourceDocument`] is a compatibility boundary:
//! downstream question-generation and tutor agents depend on the exact field
//! names and nesting, so changes here require a schema version bump.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for serialized corpus records.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// DocType
// ---------------------------------------------------------------------------

/// Rule-based document classification, inferred from the URL path with
/// markup signals as a fallback. `Article` is the generic catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// A reference page for a single method/entity (carries `method_name`).
    ReferenceMethod,
    /// Language-driver documentation.
    DriverGuide,
    /// Hosted-service / platform documentation.
    ServiceGuide,
    /// Generic documentation article (fallback).
    Article,
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocType::ReferenceMethod => "reference_method",
            DocType::DriverGuide => "driver_guide",
            DocType::ServiceGuide => "service_guide",
            DocType::Article => "article",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Section tree
// ---------------------------------------------------------------------------

/// A fenced code block attached to a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Language tag if the markup carried one (`language-*` class).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Raw code text, never split across chunks.
    pub code: String,
}

impl CodeBlock {
    /// A code block with no known language.
    pub fn plain(code: impl Into<String>) -> Self {
        Self {
            language: None,
            code: code.into(),
        }
    }
}

/// One node in a document's structural section tree.
///
/// After normalization: `section_id` is a stable heading slug unique among
/// siblings, and every subsection's `heading_level` is exactly
/// `parent.heading_level + 1` or less.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Stable id: heading slug plus a `-N` suffix for duplicate siblings.
    pub section_id: String,
    /// Heading text as it appeared in the page.
    pub heading: String,
    /// Heading depth (h2 → 2). Raw until normalized.
    pub heading_level: u8,
    /// Cleaned body text (paragraphs separated by newlines).
    #[serde(default)]
    pub content: String,
    /// Code blocks in document order.
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
    /// Nested child sections in document order.
    #[serde(default)]
    pub subsections: Vec<Section>,
}

impl Section {
    /// A bare section with the given heading and raw level.
    pub fn new(heading: impl Into<String>, heading_level: u8) -> Self {
        Self {
            section_id: String::new(),
            heading: heading.into(),
            heading_level,
            content: String::new(),
            code_blocks: Vec::new(),
            subsections: Vec::new(),
        }
    }

    /// True when the section has no body text, no code blocks, and no
    /// non-empty descendants.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
            && self.code_blocks.is_empty()
            && self.subsections.iter().all(Section::is_empty)
    }
}

// ---------------------------------------------------------------------------
// SourceDocument
// ---------------------------------------------------------------------------

/// One scraped documentation page: identity is the URL, replaced on each
/// successful re-scrape. Field names and nesting are the stable output
/// schema consumed by downstream agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Canonical page URL.
    pub url: String,
    /// Rule-based classification.
    pub doc_type: DocType,
    /// Method/entity name for reference pages.
    pub method_name: Option<String>,
    /// Extracted page title.
    pub title: String,
    /// Product version string, if inferable from breadcrumbs.
    pub version: Option<String>,
    /// Ordered ancestor titles.
    pub breadcrumbs: Vec<String>,
    /// The section tree (raw from the extractor, repaired by the normalizer).
    pub sections: Vec<Section>,
    /// When the page was fetched.
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// Lifecycle status of a stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Indexed and current.
    Active,
    /// Text stored, embedding not yet obtained (provider failure).
    IndexPending,
    /// Belonged to a prior document version; kept for audit history.
    Superseded,
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChunkStatus::Active => "active",
            ChunkStatus::IndexPending => "index_pending",
            ChunkStatus::Superseded => "superseded",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "reference_method" => Ok(DocType::ReferenceMethod),
            "driver_guide" => Ok(DocType::DriverGuide),
            "service_guide" => Ok(DocType::ServiceGuide),
            "article" => Ok(DocType::Article),
            other => Err(format!("unknown doc type: {other}")),
        }
    }
}

impl std::str::FromStr for ChunkStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ChunkStatus::Active),
            "index_pending" => Ok(ChunkStatus::IndexPending),
            "superseded" => Ok(ChunkStatus::Superseded),
            other => Err(format!("unknown chunk status: {other}")),
        }
    }
}

/// A retrieval unit derived from one or more adjacent sections of a
/// document (or a split portion of one).
///
/// `chunk_id` is a deterministic function of the document identity and the
/// ordinal index, so an unchanged document reproduces the same id set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `hex(sha256(url ‖ version ‖ ordinal))[..16]`.
    pub chunk_id: String,
    /// Owning document URL.
    pub document_url: String,
    /// Document version at chunking time.
    pub version: Option<String>,
    /// Position within the document's chunk sequence.
    pub ordinal: u32,
    /// Every contributing section id, in document order.
    pub section_ids: Vec<String>,
    /// Section heading(s) covered by this chunk, for objective mapping.
    pub headings: Vec<String>,
    /// Document breadcrumbs, copied for retrieval-time provenance.
    pub breadcrumbs: Vec<String>,
    /// Owning document's classification.
    pub doc_type: DocType,
    /// The chunk text.
    pub text: String,
    /// Character length of `text`.
    pub char_len: usize,
    /// A single code block or leaf section that could not be split within
    /// the configured bounds.
    pub oversized: bool,
    /// SHA-256 of `text`, for skip-unchanged comparison at index time.
    pub text_hash: String,
}

/// A chunk as stored in the corpus, with its embedding state.
///
/// Exposed read-only to the question-generation and tutor agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// The chunk itself.
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Embedding vector, once indexed.
    pub embedding: Option<Vec<f32>>,
    /// Identifier of the model that produced the embedding.
    pub embedding_model: Option<String>,
    /// When the embedding was obtained.
    pub embedded_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: ChunkStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> SourceDocument {
        SourceDocument {
            url: "https://docs.example.com/reference/method/insertOne".into(),
            doc_type: DocType::ReferenceMethod,
            method_name: Some("insertOne".into()),
            title: "insertOne()".into(),
            version: Some("8.2".into()),
            breadcrumbs: vec!["Docs".into(), "Manual 8.2".into()],
            sections: vec![Section {
                section_id: "definition".into(),
                heading: "Definition".into(),
                heading_level: 2,
                content: "Inserts a document.".into(),
                code_blocks: vec![CodeBlock {
                    language: Some("js".into()),
                    code: "db.c.insertOne({})".into(),
                }],
                subsections: vec![],
            }],
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn document_schema_field_names() {
        let doc = sample_doc();
        let value = serde_json::to_value(&doc).expect("serialize");
        let obj = value.as_object().expect("object");

        for field in [
            "url",
            "doc_type",
            "method_name",
            "title",
            "version",
            "breadcrumbs",
            "sections",
            "fetched_at",
        ] {
            assert!(obj.contains_key(field), "missing stable field: {field}");
        }

        assert_eq!(value["doc_type"], "reference_method");
        let section = &value["sections"][0];
        for field in [
            "section_id",
            "heading",
            "heading_level",
            "content",
            "code_blocks",
            "subsections",
        ] {
            assert!(
                section.as_object().unwrap().contains_key(field),
                "missing section field: {field}"
            );
        }
    }

    #[test]
    fn document_roundtrip() {
        let doc = sample_doc();
        let json = serde_json::to_string(&doc).expect("serialize");
        let parsed: SourceDocument = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, doc);
    }

    #[test]
    fn section_is_empty_recurses() {
        let mut sec = Section::new("Empty", 2);
        sec.subsections.push(Section::new("Also empty", 3));
        assert!(sec.is_empty());

        sec.subsections[0].content = "text".into();
        assert!(!sec.is_empty());
    }

    #[test]
    fn chunk_status_roundtrip() {
        for status in [
            ChunkStatus::Active,
            ChunkStatus::IndexPending,
            ChunkStatus::Superseded,
        ] {
            let parsed: ChunkStatus = status.to_string().parse().expect("parse");
            assert_eq!(parsed, status);
        }
        assert!("deleted".parse::<ChunkStatus>().is_err());
    }
}
