//! Limitflow CLI
//!
//! Runs the scheduled import engine, or drives one-off operations:
//! - Run on the configured schedule until interrupted
//! - Force a single immediate import
//! - Print the engine status block
//! - Emit a starter config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use limitflow::{LimitEngine, Settings};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "limitflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scheduled CSV limit import into a time-series point catalog")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (default: probe standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run on the configured schedule until interrupted
    Run,

    /// Force one immediate import and print the run report
    Once,

    /// Print the engine status block
    Status,

    /// Print a starter config file to stdout
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "limitflow=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Commands::InitConfig = cli.command {
        print!("{}", limitflow::generate_default_config());
        return Ok(());
    }

    let settings = load_settings(&cli)?;
    let engine = LimitEngine::new(settings).context("engine initialization failed")?;

    match cli.command {
        Commands::Run => {
            engine.start();
            tracing::info!("Running until ctrl-c");
            tokio::signal::ctrl_c().await?;

            engine.stop();
            println!("{}", engine.status());
        }
        Commands::Once => {
            match engine.trigger_now().await {
                Some(report) => {
                    println!(
                        "Run {}: {:?}, {} rows imported, {} skipped, {} samples, {} new points, {} NaN cells",
                        report.run_id,
                        report.outcome,
                        report.rows_imported,
                        report.rows_skipped,
                        report.samples_delivered,
                        report.records_created,
                        report.nan_cells,
                    );
                    for problem in &report.cell_errors {
                        println!("  {}", problem);
                    }
                    if let Some(error) = &report.error {
                        anyhow::bail!("import failed: {}", error);
                    }
                }
                None => anyhow::bail!("an import is already in flight"),
            }
        }
        Commands::Status => {
            println!("{}", engine.status());
        }
        Commands::InitConfig => unreachable!(),
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    match &cli.config {
        Some(path) => Settings::load_with_env(path)
            .with_context(|| format!("failed to load config from {:?}", path)),
        None => Settings::load_default().context(
            "no config found; create one with `limitflow init-config > config.toml`",
        ),
    }
}
