//! Flowscope - Institutional order-flow detection engine
//!
//! Consumes an order-level event stream for an options chain and emits
//! confidence-scored directional signals for probable institutional flow.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use tracing_subscriber::{fmt, EnvFilter};

use flowscope::adapters::cli::{BaselineCmd, CheckCmd, CliApp, Command, RunCmd};
use flowscope::adapters::{FileBaselineStore, JsonlSink, LogSink, ReplayFeed, WebhookSink};
use flowscope::application::FlowEngine;
use flowscope::baseline::{compute_stats, percentile};
use flowscope::config::{load_config, Config};
use flowscope::domain::{Instrument, OptionType};
use flowscope::ports::baseline_store::BaselineStore;
use flowscope::ports::market_data::MarketDataPort;
use flowscope::ports::signal_sink::SignalSink;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in the TOML config)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug);

    match app.command {
        Command::Run(cmd) => run_command(cmd).await,
        Command::Check(cmd) => check_command(cmd),
        Command::Baseline(cmd) => baseline_command(cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };

    fmt().with_env_filter(filter).init();
}

async fn run_command(cmd: RunCmd) -> Result<()> {
    tracing::info!("Starting flowscope...");

    let mut config = load_config(&cmd.config).context("Failed to load configuration")?;
    if let Some(underlying) = cmd.underlying {
        config.stream.underlying = underlying;
    }

    let port: Arc<dyn MarketDataPort> = match &cmd.replay {
        Some(path) => {
            tracing::warn!("REPLAY MODE - serving capture {}", path.display());
            Arc::new(ReplayFeed::from_path(path).context("Failed to load replay capture")?)
        }
        None => bail!(
            "no market-data connector configured.\n\n\
             Live vendor connectors are wired by the deployment; to exercise the \
             engine locally, supply a capture:\n  \
             flowscope run --replay capture.jsonl"
        ),
    };

    let store = Arc::new(FileBaselineStore::new(config.store.get_data_dir()));
    let sinks = build_sinks(&config);

    let engine = Arc::new(FlowEngine::new(config, port, store, sinks));

    // Ctrl+C requests cooperative shutdown; in-flight windows flush first
    let handle = Arc::clone(&engine);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        handle.stop();
    });

    engine.run().await?;
    tracing::info!("Flowscope stopped");
    Ok(())
}

fn build_sinks(config: &Config) -> Vec<Arc<dyn SignalSink>> {
    let mut sinks: Vec<Arc<dyn SignalSink>> = vec![Arc::new(LogSink::new())];

    if !config.sinks.jsonl_path.is_empty() {
        sinks.push(Arc::new(JsonlSink::new(&config.sinks.jsonl_path)));
    }
    if config.sinks.webhook_enabled {
        sinks.push(Arc::new(WebhookSink::new(config.sinks.get_webhook_url())));
    }

    sinks
}

fn check_command(cmd: CheckCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Configuration rejected")?;

    println!("configuration OK: {}", cmd.config.display());
    println!(
        "  underlying {} | {}s windows | {}-session baseline",
        config.stream.underlying, config.pressure.window_secs, config.baseline.lookback_days
    );
    println!(
        "  weights: pressure {} baseline {} market-making {} coordination {}",
        config.weights.pressure,
        config.weights.baseline,
        config.weights.market_making,
        config.weights.coordination
    );
    println!(
        "  budget: ${}/day (backfills stop at {:.0}%)",
        config.budget.daily_usd,
        config.budget.soft_threshold * 100.0
    );
    Ok(())
}

async fn baseline_command(cmd: BaselineCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;

    let strike: Decimal = cmd
        .strike
        .parse()
        .with_context(|| format!("invalid strike '{}'", cmd.strike))?;
    let option_type: OptionType = cmd
        .option_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let instrument = Instrument::new(cmd.underlying, strike, option_type);

    let store = FileBaselineStore::new(config.store.get_data_dir());
    let lookback = config.baseline.lookback_days;

    let stats = match store.load_stats(&instrument, lookback).await? {
        Some(stats) => stats,
        None => {
            let samples = store.recent_samples(&instrument, lookback).await?;
            if samples.is_empty() {
                bail!("no baseline history for {}", instrument);
            }
            compute_stats(&samples, lookback, chrono::Utc::now())
        }
    };

    println!("baseline for {} (lookback {} sessions)", instrument, lookback);
    println!("  samples:   {} (quality {:.2})", stats.sample_count, stats.quality);
    println!("  mean:      {:.4}", stats.mean);
    println!("  std dev:   {:.4}", stats.std_dev);
    println!("  p50:       {:.4}", percentile(&stats.sorted_ratios, 50.0));
    println!("  p90:       {:.4}", percentile(&stats.sorted_ratios, 90.0));
    println!("  p99:       {:.4}", percentile(&stats.sorted_ratios, 99.0));
    println!("  computed:  {}", stats.computed_at);
    Ok(())
}
