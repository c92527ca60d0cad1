//! Speed test measurement: an ordered chain of providers plus the
//! single-flight scheduler that runs it.
//!
//! Providers are tried in declared order. The first one that produces a
//! measurement wins; an [`Unavailable`] provider is logged and skipped.

mod fast_cli;
mod http;
mod passive;
mod scheduler;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SpeedTestConfig;
use crate::models::Throughput;
use crate::monitor::CounterSource;
use crate::utils::KeepRunning;

pub use fast_cli::FastCliProvider;
pub use http::HttpSpeedProvider;
pub use passive::PassiveEstimateProvider;
pub use scheduler::{initial_due, SpeedTestScheduler, TriggerKind};

/// A provider could not produce a measurement. Never fatal.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{provider} unavailable: {reason}")]
pub struct Unavailable {
    pub provider: String,
    pub reason: String,
}

impl Unavailable {
    pub fn new(provider: &str, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }
}

/// Every provider in the chain was unavailable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChainError {
    #[error("all {} speed test providers failed", attempts.len())]
    AllFailed { attempts: Vec<Unavailable> },
}

/// One way of producing a download/upload measurement.
#[async_trait]
pub trait MeasurementProvider: Send + Sync {
    /// Stable name used in logs and results.
    fn name(&self) -> &str;

    async fn measure(&self) -> Result<Throughput, Unavailable>;
}

/// Successful chain run: the measurement and which provider produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub provider: String,
    pub throughput: Throughput,
}

/// Ordered fallback list of providers.
pub struct ProviderChain {
    providers: Vec<Box<dyn MeasurementProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn MeasurementProvider>>) -> Self {
        Self { providers }
    }

    /// The default chain: external tool, HTTP library, passive estimate.
    pub fn standard(
        config: &SpeedTestConfig,
        counters: Box<dyn CounterSource>,
        keep_running: KeepRunning,
    ) -> Self {
        Self::new(vec![
            Box::new(FastCliProvider::new(
                config.resource_dir.clone(),
                std::time::Duration::from_secs(config.external_timeout_secs),
            )),
            Box::new(HttpSpeedProvider::new(config.servers.clone())),
            Box::new(PassiveEstimateProvider::new(
                counters,
                std::time::Duration::from_secs(config.passive_window_secs),
                keep_running,
            )),
        ])
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Try each provider in order and return the first measurement unmodified.
    pub async fn run(&self) -> Result<ChainOutcome, ChainError> {
        let mut attempts = Vec::new();
        for provider in &self.providers {
            log::info!("[SPEEDTEST] Trying backend: {}", provider.name());
            match provider.measure().await {
                Ok(throughput) => {
                    log::info!(
                        "[SPEEDTEST] {} -> {:.2} down / {:.2} up Mb/s",
                        provider.name(),
                        throughput.down_mbps,
                        throughput.up_mbps
                    );
                    return Ok(ChainOutcome {
                        provider: provider.name().to_string(),
                        throughput,
                    });
                }
                Err(e) => {
                    log::warn!("[SPEEDTEST] {}", e);
                    attempts.push(e);
                }
            }
        }
        Err(ChainError::AllFailed { attempts })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Provider returning a fixed outcome and counting invocations.
    pub struct FixedProvider {
        pub name: &'static str,
        pub outcome: Option<Throughput>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FixedProvider {
        pub fn ok(name: &'static str, down: f64, up: f64) -> Self {
            Self {
                name,
                outcome: Some(Throughput {
                    down_mbps: down,
                    up_mbps: up,
                }),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing(name: &'static str) -> Self {
            Self {
                name,
                outcome: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl MeasurementProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn measure(&self) -> Result<Throughput, Unavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .ok_or_else(|| Unavailable::new(self.name, "forced failure"))
        }
    }
}
