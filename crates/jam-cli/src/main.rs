//! Command-line front end for the sandbox and the anti-cheat engine
//!
//! Probes which execution backend is usable, runs a source file through the
//! sandbox (optionally against a test-case file), and replays recorded
//! telemetry into a session to show how its trust score evolves.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jam_core::anti_cheat::Details;
use jam_core::executors::TestCase;
use jam_core::{
    BackendSelection, ConfigLoader, EventType, ExecutionRequest, JamConfig, Language,
    MetricsAggregator, SandboxRunner,
};
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Jam - sandboxed code execution and anti-cheat telemetry")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = "jam.yaml", help = "Path to the YAML configuration file")]
    config: PathBuf,

    #[clap(long, short, help = "Log level, overrides logging.level from the configuration")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report which execution backend would be used
    Probe,
    /// Execute a source file in the sandbox
    Run {
        #[clap(long, short)]
        language: Language,

        /// Source file to execute
        file: PathBuf,

        #[clap(long, help = "YAML or JSON list of {input, output} test cases")]
        tests: Option<PathBuf>,

        #[clap(long, help = "File piped to the program's stdin (ignored with --tests)")]
        stdin: Option<PathBuf>,
    },
    /// Replay recorded telemetry events into a session
    Replay {
        #[clap(long, short)]
        session: String,

        /// JSON lines file, one {"event_type", "details"} object per line
        events: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    event_type: EventType,
    #[serde(default)]
    details: Option<Details>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::from_file_or_default(&cli.config).await?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    match cli.command {
        Commands::Probe => probe(&config).await,
        Commands::Run {
            language,
            file,
            tests,
            stdin,
        } => run(&config, language, &file, tests.as_deref(), stdin.as_deref()).await,
        Commands::Replay { session, events } => replay(&config, &session, &events).await,
    }
}

async fn probe(config: &JamConfig) -> Result<()> {
    let selection = BackendSelection::probe(&config.sandbox).await;
    let report = serde_json::json!({
        "strategy": selection.strategy(),
        "available": selection.is_available(),
        "reason": selection.reason(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(
    config: &JamConfig,
    language: Language,
    file: &Path,
    tests: Option<&Path>,
    stdin: Option<&Path>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read source file {}", file.display()))?;

    let mut request = ExecutionRequest::new(code, language);
    if let Some(path) = tests {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read test cases {}", path.display()))?;
        let cases: Vec<TestCase> = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid test case file {}", path.display()))?;
        log::info!("Loaded {} test cases from {}", cases.len(), path.display());
        request = request.with_test_cases(cases);
    } else if let Some(path) = stdin {
        let input = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read stdin file {}", path.display()))?;
        request = request.with_stdin(input);
    }

    let runner = SandboxRunner::from_config(&config.sandbox).await;
    log::info!(
        "Executing {} with the {} backend",
        file.display(),
        runner.selection().strategy()
    );

    let result = runner.execute(request).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn replay(config: &JamConfig, session: &str, events: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("Failed to read events file {}", events.display()))?;

    let aggregator = MetricsAggregator::from_config(&config.anti_cheat);
    aggregator.store().start_session(session);

    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: ReplayLine = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Skipping line {}: {}", number + 1, e);
                continue;
            }
        };
        let assessment = aggregator.record_event(session, event.event_type, event.details);
        println!("{}", serde_json::to_string(&assessment)?);
    }

    let summary = aggregator.get_interview_summary(session);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
