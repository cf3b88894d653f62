mod config;
mod matcher;
mod orchestrator;
mod report;
mod selector;


use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::SuiteConfigManager;
use orchestrator::SmokeOrchestrator;
use smoke_common::client::CompilerExplorerClient;
use smoke_common::config::Config;
use smoke_common::types::SmokeReport;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "smoke-runner")]
#[command(about = "Smoke-test a compilation service across its compiler matrix", long_about = None)]
struct Cli {
    /// Suite definitions (JSON)
    #[arg(short, long, global = true, default_value = config::DEFAULT_SUITES_PATH)]
    config: PathBuf,

    /// Compilation service base URL (overrides SMOKE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Maximum concurrent evaluations (overrides SMOKE_MAX_CONCURRENCY)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Deadline per run in seconds (overrides SMOKE_RUN_TIMEOUT_SECS)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: Option<u64>,

    /// Print reports as JSON instead of text
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run matrix suites against every eligible compiler
    Run {
        /// Suite name (repeatable; all matrix suites when omitted)
        #[arg(short, long)]
        suite: Vec<String>,
    },

    /// Run two-phase checks against named compilers
    Named {
        /// Suite name (repeatable; all named suites when omitted)
        #[arg(short, long)]
        suite: Vec<String>,
    },

    /// Run every named check, then every matrix suite
    All,

    /// List configured suites
    List,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("SMOKE_LOG_JSON")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every run passed
async fn run(cli: Cli) -> Result<bool> {
    let suites = SuiteConfigManager::load(&cli.config)?;

    if let Commands::List = cli.command {
        for suite in suites.list_named() {
            println!(
                "named   {} ({} {} {})",
                suite.name, suite.check.language, suite.check.compiler.name, suite.check.compiler.version
            );
        }
        for suite in suites.list_matrix() {
            println!("matrix  {} ({})", suite.name, suite.language);
        }
        return Ok(true);
    }

    let mut settings = Config::from_env().context("Invalid environment configuration")?;
    if let Some(url) = cli.api_url {
        settings.api_url = url;
    }
    if let Some(n) = cli.concurrency {
        settings.max_concurrency = n.max(1);
    }
    if let Some(secs) = cli.timeout_secs {
        settings.run_timeout_seconds = Some(secs);
    }

    info!(
        api_url = %settings.api_url,
        max_concurrency = settings.max_concurrency,
        run_timeout_secs = ?settings.run_timeout_seconds,
        "Smoke runner configured"
    );

    let client = CompilerExplorerClient::new(&settings).context("Failed to create compilation service client")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Received interrupt, cancelling run");
                cancel.cancel();
            }
        }
    });

    let orchestrator = SmokeOrchestrator::new(Arc::new(client))
        .with_max_concurrency(settings.max_concurrency)
        .with_run_timeout(settings.run_timeout())
        .with_cancellation(cancel.clone());

    let (named, matrix) = match &cli.command {
        Commands::Run { suite } => (Vec::new(), suites.matrix_suites(suite)?),
        Commands::Named { suite } => (suites.named_suites(suite)?, Vec::new()),
        Commands::All => (suites.named_suites(&[])?, suites.matrix_suites(&[])?),
        Commands::List => (Vec::new(), Vec::new()),
    };

    let session = orchestrator
        .run_suites(&named, &matrix, |report| emit(report, cli.json))
        .await;
    let reports = session.reports;

    // Finished reports are printed even when a later suite hit a fatal error
    if cli.json {
        println!("{}", report::render_json(&reports).context("Failed to serialize reports")?);
    }

    if let Some(e) = session.fatal {
        return Err(e.into());
    }

    let total_failures: usize = reports.iter().map(|r| r.failure_count).sum();
    let passed = !cancel.is_cancelled() && reports.iter().all(SmokeReport::is_pass);

    info!(runs = reports.len(), failures = total_failures, passed, "Smoke run finished");

    Ok(passed)
}

fn emit(report: &SmokeReport, json: bool) {
    if !json {
        print!("{}", report::render(report));
    }
}
