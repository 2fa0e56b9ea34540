//! CertCorpus CLI — certification-exam documentation ingestion tool.
//!
//! Turns curated documentation URLs into a structured, embedded corpus
//! ready for retrieval-augmented coaching.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
