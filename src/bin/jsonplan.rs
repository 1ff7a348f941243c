//! jsonplan CLI - run or validate a transformation plan
//!
//! Reads a plan YAML, sends every input message through its pipeline, writes
//! audit reports and publishes the results.

use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use jsonplan::{NdjsonWriter, Plan, RunOptions, RunSummary};

#[derive(Parser)]
#[command(name = "jsonplan")]
#[command(version, about = "Configuration-driven JSON transformation with audit reports", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan
    Run {
        /// Path to the plan YAML
        #[arg(short, long)]
        plan: PathBuf,

        /// Process and report without publishing to HTTP output
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        dry_run: bool,

        /// Parent directory for audit reports
        #[arg(long, default_value = "reports")]
        reports_dir: PathBuf,

        /// Skip writing audit reports
        #[arg(long)]
        no_reports: bool,

        /// Also write processed messages to stdout as NDJSON
        #[arg(long)]
        stdout: bool,
    },

    /// Parse a plan and compile its templates without running it
    Validate {
        /// Path to the plan YAML
        #[arg(short, long)]
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load environment variables before the plan expands references to them
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            plan,
            dry_run,
            reports_dir,
            no_reports,
            stdout,
        } => {
            let options = RunOptions {
                dry_run,
                report_root: (!no_reports).then_some(reports_dir),
            };
            run_plan(plan, options, stdout).await
        }
        Commands::Validate { plan } => validate_plan(plan),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run_plan(path: PathBuf, options: RunOptions, stdout: bool) -> Result<(), String> {
    let plan = Plan::load(&path).map_err(|e| e.to_string())?;
    if options.dry_run {
        tracing::info!("dry run: HTTP output is disabled");
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current message");
            let _ = cancel_tx.send(true);
        }
    });

    let summary = if stdout {
        let mut writer = NdjsonWriter::new(io::stdout().lock());
        plan.run_with_writer(&options, cancel_rx, Some(&mut writer))
            .await
            .map_err(|e| e.to_string())?
    } else {
        plan.run(&options, cancel_rx).await.map_err(|e| e.to_string())?
    };

    print_summary(&summary);
    Ok(())
}

fn validate_plan(path: PathBuf) -> Result<(), String> {
    let plan = Plan::load(&path).map_err(|e| e.to_string())?;
    plan.validate().map_err(|e| e.to_string())?;
    eprintln!(
        "✓ {} is valid ({} processor(s))",
        path.display(),
        plan.pipeline.processors.len()
    );
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    eprintln!(
        "Processed {} message(s): {} published, {} dropped",
        summary.processed, summary.published, summary.dropped
    );
    if let Some(report) = &summary.report {
        eprintln!(
            "Reports in {}: {} filtered, {} changed, {} no-op",
            report.directory.display(),
            report.filtered,
            report.changed,
            report.noop
        );
    }
}
