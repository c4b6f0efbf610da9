use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use prospector_client::{HttpSource, SelectorExtractor};
use prospector_core::export::write_records;
use prospector_core::ingest::read_work_items;
use prospector_core::traits::ContentSource;
use prospector_core::{
    BroadcastSink, Orchestrator, OrchestratorConfig, ProgressEvent, TargetConfig, TokioClock,
    WorkItem,
};

#[derive(Parser)]
#[command(name = "prospector", version, about = "Enrich company lists with public contact details")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich every row of a CSV and write the results
    Run {
        /// Input CSV with Company, Country and optional City columns
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,

        /// Search endpoint the query is appended to
        #[arg(long, env = "PROSPECTOR_SEARCH_BASE")]
        search_base: Option<String>,

        /// Render pages in headless Chromium instead of plain HTTP
        #[arg(long, default_value_t = false)]
        browser: bool,
    },

    /// Validate an input CSV without running anything
    Check {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("prospector=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            search_base,
            browser,
        } => {
            let items = load_items(&input)?;
            let mut targets = TargetConfig::default();
            if let Some(base) = search_base.as_deref() {
                targets = targets.with_search_base(base)?;
            }
            let config = OrchestratorConfig::from_env()?;

            if browser {
                cmd_run_browser(&items, &output, targets, config).await?;
            } else {
                let source = HttpSource::new().context("Failed to create HTTP client")?;
                cmd_run(source, &items, &output, targets, config).await?;
            }
        }
        Commands::Check { input } => {
            let items = load_items(&input)?;
            println!("{} valid rows in {}", items.len(), input.display());
            for item in items.iter().take(5) {
                println!("  [{}] {}", item.id, item.query());
            }
        }
    }

    Ok(())
}

fn load_items(path: &Path) -> Result<Vec<WorkItem>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open input: {}", path.display()))?;
    let items = read_work_items(file)
        .with_context(|| format!("Failed to read input: {}", path.display()))?;
    tracing::info!(rows = items.len(), "Loaded input");
    Ok(items)
}

#[cfg(feature = "browser")]
async fn cmd_run_browser(
    items: &[WorkItem],
    output: &Path,
    targets: TargetConfig,
    config: OrchestratorConfig,
) -> Result<()> {
    let source = prospector_client::BrowserSource::new()
        .await
        .context("Failed to launch browser")?;
    cmd_run(source, items, output, targets, config).await
}

#[cfg(not(feature = "browser"))]
async fn cmd_run_browser(
    _items: &[WorkItem],
    _output: &Path,
    _targets: TargetConfig,
    _config: OrchestratorConfig,
) -> Result<()> {
    anyhow::bail!("--browser requires building with the `browser` feature")
}

async fn cmd_run<S: ContentSource>(
    source: S,
    items: &[WorkItem],
    output: &Path,
    targets: TargetConfig,
    config: OrchestratorConfig,
) -> Result<()> {
    if items.is_empty() {
        tracing::warn!("No rows to process");
    }

    let extractor = SelectorExtractor::new(targets.clone())?;
    let sink = BroadcastSink::new();
    let mut progress = sink.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match progress.recv().await {
                Ok(event) => print_progress(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(%missed, "Progress display fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let orchestrator = Orchestrator::new(source, extractor, sink, TokioClock::new(), config)
        .with_targets(targets);
    let summary = orchestrator.start(items)?.wait().await?;
    // Closes the channel so the printer exits.
    drop(orchestrator);
    let _ = printer.await;

    let file = File::create(output)
        .with_context(|| format!("Failed to create output: {}", output.display()))?;
    write_records(BufWriter::new(file), &summary.records)?;

    println!(
        "\nDone: {} found, {} not enriched. Results written to {}",
        summary.succeeded,
        summary.failed,
        output.display()
    );
    Ok(())
}

fn print_progress(event: &ProgressEvent) {
    let label = if event.record.name.is_empty() {
        event.record.company.as_str()
    } else {
        event.record.name.as_str()
    };
    match &event.error_detail {
        Some(detail) if !event.success => println!(
            "[{}/{}] {} - {} ({})",
            event.processed_count, event.total, event.record.company, event.status, detail
        ),
        _ => println!(
            "[{}/{}] {} - {}",
            event.processed_count, event.total, label, event.status
        ),
    }
}
