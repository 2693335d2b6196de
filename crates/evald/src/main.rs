//! evald - evaluation question answering over the command line.
//!
//! Loads the cleaned dataset, runs one question through the pipeline and
//! prints the rendered answer (or the failure notice) to stdout.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use eval_common::{FailureKind, PipelineConfig, Query, TimeWindow};
use evald::{Dataset, Engine, OllamaClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evald")]
#[command(about = "Ask questions about clinical evaluation performance", long_about = None)]
#[command(version)]
struct Cli {
    /// The question to ask, e.g. "what are my top three strengths?"
    query: String,

    /// Path to the cleaned evaluation dataset (JSON array of records)
    #[arg(long)]
    dataset: PathBuf,

    /// Optional pipeline configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only consider evaluations on or after this date (YYYY-MM-DD)
    #[arg(long)]
    since: Option<NaiveDate>,

    /// Only consider evaluations on or before this date (YYYY-MM-DD)
    #[arg(long)]
    until: Option<NaiveDate>,

    /// Probe the language model service and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            PipelineConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    let llm = OllamaClient::new(config.llm.clone());

    if cli.check {
        if llm.is_available().await {
            println!("ok: {} reachable, model {}", config.llm.endpoint, llm.model());
            return Ok(());
        }
        anyhow::bail!("language model service unreachable at {}", config.llm.endpoint);
    }

    let json = std::fs::read_to_string(&cli.dataset)
        .with_context(|| format!("reading dataset {}", cli.dataset.display()))?;
    let dataset = Dataset::from_json_str(&json)
        .with_context(|| format!("parsing dataset {}", cli.dataset.display()))?;
    info!(records = dataset.len(), "dataset loaded");

    let mut query = Query::new(&cli.query);
    if cli.since.is_some() || cli.until.is_some() {
        query = query.with_time_window(TimeWindow {
            start: cli.since,
            end: cli.until,
        });
    }

    let engine = Engine::new(dataset, config, Arc::new(llm));
    match engine.run_query(query).await {
        Ok(response) => {
            println!("{}", response.text);
            Ok(())
        }
        Err(failure) => {
            println!("{}", failure.message);
            match failure.kind {
                // asking for clarification is a normal outcome
                FailureKind::ClarificationNeeded => Ok(()),
                _ => std::process::exit(1),
            }
        }
    }
}
