//! # Lexigraph Batch Runner
//!
//! Entry point for `lexigraph-batch`.

use anyhow::Context;
use clap::Parser;
use lexigraph_batch::{read_prompts, run_batch, BatchOptions, Cli};
use lexigraph_config::{AppConfig, ConfigLoader};
use lexigraph_core::init_telemetry;
use lexigraph_jobs::register_metrics;
use std::fs::File;
use std::io::{self, BufReader};
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lexigraph-batch: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(e) = init_telemetry(&config.telemetry) {
        eprintln!("lexigraph-batch: {e}");
        std::process::exit(2);
    }

    info!("Starting Lexigraph batch runner...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli, config).await {
        error!("Batch run failed: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let loader = ConfigLoader::new(cli.config_dir.clone())
        .with_context(|| format!("loading configuration from '{}'", cli.config_dir))?;
    let mut config = loader.get().clone();

    if let Some(concurrency) = cli.concurrency {
        config.batch.max_concurrent = concurrency;
    }
    Ok(config)
}

async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    info!("Environment: {}", config.app.environment);

    let prompts = match cli.input_path() {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening prompt file '{}'", path.display()))?;
            read_prompts(BufReader::new(file), cli.priority)?
        }
        None => read_prompts(io::stdin().lock(), cli.priority)?,
    };

    if prompts.is_empty() {
        warn!("No prompts to run");
        return Ok(());
    }

    register_metrics();

    let options = BatchOptions {
        step_delay: Duration::from_millis(cli.step_delay_ms),
        fail_every: cli.fail_every,
        style: cli.style,
    };

    let mut report = run_batch(&config, &prompts, &options, shutdown_signal()).await?;
    if !cli.jobs {
        report.jobs.clear();
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl-C");
}
