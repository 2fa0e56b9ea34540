//! Core pipeline orchestration for CertCorpus.
//!
//! This crate ties together fetching, extraction, normalization, chunking,
//! and embedding into the end-to-end ingest workflows (`ingest`, `sync`).

pub mod catalog;
pub mod pipeline;

pub use catalog::SeedCatalog;
pub use pipeline::{
    IngestOutcome, IngestRunSummary, IngestTarget, ProgressReporter, SilentProgress,
    ingest_all, ingest_document,
};
