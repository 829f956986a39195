//! CLI entry point for the archiver tool.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use archiver_core::pipeline::{ArchiveUnit, AvatarOutcome, Orchestrator, UnitReport};
use archiver_core::{JsonRecordRenderer, ManifestStore, PipelineConfig};
use clap::Parser;
use serde::Deserialize;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command, RunArgs, StatusArgs};

/// Exit code when any unit ended partial or failed.
const EXIT_INCOMPLETE: u8 = 2;

#[derive(Debug, Deserialize)]
struct AvatarEntry {
    name: String,
    url: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Run(run_args) => run(run_args).await,
        Command::Status(status_args) => status(&status_args),
    }
}

fn load_config(path: Option<&Path>, output: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load_optional(path)?;
    if let Some(output) = output {
        config.output_dir = output.to_path_buf();
    }
    Ok(config)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {what} file {}", path.display()))
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let mut config = load_config(args.config.as_deref(), args.output.as_deref())?;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = usize::from(concurrency);
    }
    if let Some(max_attempts) = args.max_attempts {
        config.retry.max_attempts = max_attempts;
    }
    config.validate()?;

    let units: Vec<ArchiveUnit> = read_json(&args.units, "units")?;
    let avatars: Vec<AvatarEntry> = match &args.avatars {
        Some(path) => read_json(path, "avatars")?,
        None => Vec::new(),
    };
    info!(
        collection = %args.collection,
        units = units.len(),
        avatars = avatars.len(),
        "Archiver starting"
    );

    let renderer = JsonRecordRenderer::new(&config.output_dir);
    let mut orchestrator = Orchestrator::open(config, &args.collection)?;

    // No browser binding in the binary: session strategies report a failed
    // result and the direct fallback takes over.
    let mut incomplete = 0usize;
    for unit in &units {
        let report = orchestrator.process_unit(unit, None, &renderer).await?;
        match &report {
            UnitReport::Skipped { unit_id, .. } => println!("{unit_id}\tskipped"),
            UnitReport::Processed(outcome) => println!(
                "{}\t{}\tfetched={}\tfailed={}\tlinks={}",
                outcome.unit_id,
                outcome.status,
                outcome.success_count(),
                outcome.failures.len(),
                outcome.unfetchable.len()
            ),
        }
        if !report.is_done() {
            incomplete += 1;
        }
    }

    for avatar in &avatars {
        match orchestrator.fetch_avatar(&avatar.name, &avatar.url).await? {
            AvatarOutcome::Failed(result) => warn!(
                name = %avatar.name,
                error = result.error.as_deref().unwrap_or_default(),
                "avatar download failed"
            ),
            outcome => debug!(name = %avatar.name, ?outcome, "avatar handled"),
        }
    }

    let summary = orchestrator.manifest().summary();
    println!("{summary}");
    info!(incomplete, "Archiver finished");

    Ok(if incomplete == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_INCOMPLETE)
    })
}

fn status(args: &StatusArgs) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref(), args.output.as_deref())?;
    let store = ManifestStore::new(config.state_dir());
    let manifest = store.load(&args.collection)?;
    println!("{}", manifest.summary());
    Ok(ExitCode::SUCCESS)
}
