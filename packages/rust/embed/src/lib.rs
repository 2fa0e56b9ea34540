//! Embedding and indexing for CertCorpus chunks.

pub mod indexer;
pub mod provider;

pub use indexer::{IndexReport, index_document};
pub use provider::{EmbeddingProvider, OpenAiEmbedder};
