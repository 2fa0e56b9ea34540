//! Error types for CertCorpus.
//!
//! Library crates use [`CorpusError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Whether a fetch failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Timeouts, connection resets, 408/429/5xx — retried with backoff.
    Transient,
    /// Malformed URLs and non-429 4xx — fail immediately, zero retries.
    Permanent,
}

impl std::fmt::Display for FetchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchKind::Transient => write!(f, "transient"),
            FetchKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Top-level error type for all CertCorpus operations.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTTP fetch failure, tagged with the offending URL and retryability.
    #[error("fetch error ({kind}) for {url}: {message}")]
    Fetch {
        url: String,
        kind: FetchKind,
        message: String,
    },

    /// Page did not match any recognized document shape.
    #[error("extraction error for {url}: {message}")]
    Extraction { url: String, message: String },

    /// Structurally unrepairable section tree.
    #[error("normalization error: {message}")]
    Normalization { message: String },

    /// Embedding provider failure (after retries).
    #[error("embedding provider error: {0}")]
    Embedding(String),

    /// Aggregate indexing failure: the run completed best-effort but these
    /// chunks are left `index_pending`.
    #[error("indexing incomplete for {document_url}: {} chunk(s) pending: {}", failed_chunks.len(), failed_chunks.join(", "))]
    Index {
        document_url: String,
        failed_chunks: Vec<String>,
    },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CorpusError>;

impl CorpusError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a transient (retryable) fetch error.
    pub fn fetch_transient(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            kind: FetchKind::Transient,
            message: msg.into(),
        }
    }

    /// Create a permanent (non-retryable) fetch error.
    pub fn fetch_permanent(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            kind: FetchKind::Permanent,
            message: msg.into(),
        }
    }

    /// Create an extraction error tagged with the source URL.
    pub fn extraction(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Extraction {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a normalization error from any displayable message.
    pub fn normalization(msg: impl Into<String>) -> Self {
        Self::Normalization {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The fetch kind, if this is a fetch error.
    pub fn fetch_kind(&self) -> Option<FetchKind> {
        match self {
            Self::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Short machine-readable kind tag, used in per-document run outcomes.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Fetch {
                kind: FetchKind::Transient,
                ..
            } => "fetch_transient",
            Self::Fetch {
                kind: FetchKind::Permanent,
                ..
            } => "fetch_permanent",
            Self::Extraction { .. } => "extraction",
            Self::Normalization { .. } => "normalization",
            Self::Embedding(_) => "embedding",
            Self::Index { .. } => "index",
            Self::Storage(_) => "storage",
            Self::Io { .. } => "io",
            Self::Validation { .. } => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CorpusError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = CorpusError::fetch_permanent("https://example.com/x", "HTTP 404");
        assert!(err.to_string().contains("permanent"));
        assert!(err.to_string().contains("https://example.com/x"));
    }

    #[test]
    fn fetch_kind_accessor() {
        let err = CorpusError::fetch_transient("https://example.com", "timeout");
        assert_eq!(err.fetch_kind(), Some(FetchKind::Transient));
        assert_eq!(err.kind_tag(), "fetch_transient");

        let err = CorpusError::extraction("https://example.com", "no body");
        assert_eq!(err.fetch_kind(), None);
        assert_eq!(err.kind_tag(), "extraction");
    }

    #[test]
    fn index_error_lists_chunk_ids() {
        let err = CorpusError::Index {
            document_url: "https://example.com/doc".into(),
            failed_chunks: vec!["abc123".into(), "def456".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 chunk(s) pending"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
