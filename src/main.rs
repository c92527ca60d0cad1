//! # netgauge - Terminal Network Speed Widget
//!
//! A small always-visible widget showing live download/upload throughput,
//! a ten-sample graph with ping loss highlighted, and periodic speed tests
//! through a fallback chain of measurement backends.

mod app;
mod config;
pub mod constants;
mod logging;
mod models;
mod monitor;
mod speedtest;
mod store;
mod ui;
mod utils;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;

use config::Config;
use constants::{log_file_path, state_file_path, MIN_SAMPLE_INTERVAL_MS};
use models::SpeedTestResult;
use monitor::SysinfoCounters;
use speedtest::{ChainError, ProviderChain};
use store::StateStore;
use utils::KeepRunning;

/// netgauge - live network throughput widget with scheduled speed tests
#[derive(Parser, Debug)]
#[command(name = "netgauge", version, about = "A tiny terminal network speed widget")]
struct Cli {
    /// Sampling interval in milliseconds
    #[arg(long, short = 'i', value_name = "MS")]
    interval: Option<u64>,

    /// Host pinged once per sample
    #[arg(long, value_name = "HOST")]
    ping_host: Option<String>,

    /// Disable automatic speed tests
    #[arg(long)]
    no_speedtest: bool,

    /// Run one speed test, print and save the result, then exit
    #[arg(long, conflicts_with = "no_speedtest")]
    speedtest: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&log_file_path()) {
        eprintln!("netgauge: file logging unavailable: {}", e);
    }

    // Load and apply CLI overrides to config
    let mut config = Config::load();
    if let Some(ms) = cli.interval {
        config.sample_interval_ms = ms.max(MIN_SAMPLE_INTERVAL_MS);
    }
    if let Some(host) = cli.ping_host {
        config.ping_host = host;
    }
    if cli.no_speedtest {
        config.speedtest.enabled = false;
    }

    let store = StateStore::open(state_file_path());

    if cli.speedtest {
        return speedtest_once(&config, &store).await;
    }

    logging::section("App start");
    let mut app = app::App::new(config, store);
    app.run().await
}

/// Headless single run of the provider chain.
async fn speedtest_once(config: &Config, store: &StateStore) -> Result<()> {
    logging::section("Speedtest run (cli)");
    let chain = ProviderChain::standard(
        &config.speedtest,
        Box::new(SysinfoCounters::new()),
        KeepRunning::new(),
    );

    match chain.run().await {
        Ok(outcome) => {
            let result = SpeedTestResult::new(outcome.throughput, Utc::now());
            store.set_speedtest(&result);
            println!("{} (via {})", result.summary(), outcome.provider);
            Ok(())
        }
        Err(ChainError::AllFailed { attempts }) => {
            for attempt in &attempts {
                eprintln!("  {}", attempt);
            }
            bail!("speed test failed: every backend was unavailable")
        }
    }
}
