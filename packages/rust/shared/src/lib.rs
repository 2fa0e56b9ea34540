//! Shared types, error model, and configuration for CertCorpus.
//!
//! This crate is the foundation depended on by all other CertCorpus crates.
//! It provides:
//! - [`CorpusError`] — the unified error type
//! - Domain types ([`SourceDocument`], [`Section`], [`Chunk`], [`ChunkRecord`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChunkingConfig, DefaultsConfig, EmbeddingConfig, FetchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_data_dir,
    validate_api_key,
};
pub use error::{CorpusError, FetchKind, Result};
pub use types::{
    CURRENT_SCHEMA_VERSION, Chunk, ChunkRecord, ChunkStatus, CodeBlock, DocType, Section,
    SourceDocument,
};
