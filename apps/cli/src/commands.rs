//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use certcorpus_core::pipeline::{IngestOutcome, IngestTarget, ProgressReporter};
use certcorpus_core::{SeedCatalog, ingest_all};
use certcorpus_embed::OpenAiEmbedder;
use certcorpus_shared::{
    AppConfig, init_config, load_config, resolve_data_dir, validate_api_key,
};
use certcorpus_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CertCorpus — build an embedded corpus from certification-exam docs.
#[derive(Parser)]
#[command(
    name = "certcorpus",
    version,
    about = "Ingest curated documentation into an embedded, queryable corpus.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest one or more documentation URLs.
    Ingest {
        /// Documentation URL(s) to ingest.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Ingest every seed URL from an exam seed catalog.
    Sync {
        /// Path to the seed catalog JSON file.
        #[arg(long)]
        catalog: PathBuf,
    },

    /// List all documents in the corpus.
    List,

    /// Show one document and its chunk inventory.
    Show {
        /// Document URL.
        url: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "certcorpus=info",
        1 => "certcorpus=debug",
        _ => "certcorpus=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest { urls } => {
            let targets = urls.into_iter().map(IngestTarget::bare).collect();
            cmd_ingest(targets).await
        }
        Command::Sync { catalog } => cmd_sync(&catalog).await,
        Command::List => cmd_list().await,
        Command::Show { url } => cmd_show(&url).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Ingest commands
// ---------------------------------------------------------------------------

async fn cmd_ingest(targets: Vec<IngestTarget>) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;

    info!(targets = targets.len(), "starting ingest");
    run_ingest(config, targets).await
}

async fn cmd_sync(catalog_path: &std::path::Path) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;

    let catalog = SeedCatalog::load(catalog_path)?;
    let targets = catalog.targets();
    info!(
        exam_code = %catalog.exam_code,
        targets = targets.len(),
        "syncing seed catalog"
    );
    run_ingest(config, targets).await
}

async fn run_ingest(config: AppConfig, targets: Vec<IngestTarget>) -> Result<()> {
    let api_key = std::env::var(&config.embedding.api_key_env)
        .map_err(|_| eyre!("{} is not set", config.embedding.api_key_env))?;
    let provider = OpenAiEmbedder::new(&config.embedding, api_key)?;

    let storage = open_storage(&config).await?;
    let total = targets.len();
    let reporter = Arc::new(CliProgress::new(total as u64));

    let summary = ingest_all(
        Arc::new(storage),
        Arc::new(provider),
        Arc::new(config),
        targets,
        Arc::clone(&reporter) as Arc<dyn ProgressReporter>,
    )
    .await?;
    reporter.finish();

    println!();
    println!("  Ingest run {} complete", summary.job_id);
    println!("  Succeeded: {}", summary.succeeded());
    println!("  Skipped:   {}", summary.skipped());
    println!("  Failed:    {}", summary.failed());
    println!();

    for outcome in &summary.outcomes {
        if let IngestOutcome::Failed { url, kind, message } = outcome {
            println!("  FAILED [{kind}] {url}");
            println!("    {message}");
        }
    }

    if summary.failed() > 0 {
        return Err(eyre!("{} of {total} documents failed", summary.failed()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read-only commands
// ---------------------------------------------------------------------------

async fn cmd_list() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;

    let documents = storage.list_documents().await?;
    if documents.is_empty() {
        println!("No documents in the corpus yet. Run `certcorpus ingest <url>` first.");
        return Ok(());
    }

    println!("{} document(s):", documents.len());
    for (url, title, doc_type, fetched_at) in documents {
        println!("  [{doc_type}] {title}");
        println!("    {url}  (fetched {fetched_at})");
    }
    Ok(())
}

async fn cmd_show(url: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;

    let Some(stored) = storage.get_document(url).await? else {
        return Err(eyre!("no document stored for '{url}'"));
    };

    let doc = &stored.document;
    println!("Title:       {}", doc.title);
    println!("URL:         {}", doc.url);
    println!("Type:        {}", doc.doc_type);
    if let Some(method) = &doc.method_name {
        println!("Method:      {method}");
    }
    if let Some(version) = &doc.version {
        println!("Version:     {version}");
    }
    if !doc.breadcrumbs.is_empty() {
        println!("Breadcrumbs: {}", doc.breadcrumbs.join(" > "));
    }
    println!("Fetched:     {}", doc.fetched_at.to_rfc3339());
    println!("Hash:        {}", stored.content_hash);

    let chunks = storage.list_chunks(url).await?;
    println!();
    println!("{} chunk(s):", chunks.len());
    for record in chunks {
        let chunk = &record.chunk;
        let embedded = if record.embedding.is_some() { "embedded" } else { "no vector" };
        let oversized = if chunk.oversized { ", oversized" } else { "" };
        println!(
            "  #{} {} [{}, {}{}] {} chars — {}",
            chunk.ordinal,
            chunk.chunk_id,
            record.status,
            embedded,
            oversized,
            chunk.char_len,
            chunk.headings.join(" / "),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn corpus_db_path(config: &AppConfig) -> Result<PathBuf> {
    Ok(resolve_data_dir(config)?.join("corpus.db"))
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open(&corpus_db_path(config)?).await?)
}

async fn open_storage_readonly(config: &AppConfig) -> Result<Storage> {
    let path = corpus_db_path(config)?;
    if !path.exists() {
        return Err(eyre!(
            "no corpus database at {} — run `certcorpus ingest` first",
            path.display()
        ));
    }
    Ok(Storage::open_readonly(&path).await?)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Document-level progress bar using indicatif.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn document_started(&self, url: &str) {
        self.bar.set_message(url.to_string());
    }

    fn document_finished(&self, outcome: &IngestOutcome) {
        self.bar.inc(1);
        if let IngestOutcome::Failed { url, kind, .. } = outcome {
            self.bar.println(format!("  failed [{kind}] {url}"));
        }
    }
}
