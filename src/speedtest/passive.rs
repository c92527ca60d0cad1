//! Last-resort estimate from the interface counters.
//!
//! Measures whatever traffic happens to flow during a short observation
//! window. It does not generate load, so on an idle link it reports close
//! to zero.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{MeasurementProvider, Unavailable};
use crate::constants::PASSIVE_SLICE_MS;
use crate::models::{ByteCounters, Throughput};
use crate::monitor::CounterSource;
use crate::utils::KeepRunning;

const NAME: &str = "passive";

pub struct PassiveEstimateProvider {
    counters: Mutex<Box<dyn CounterSource>>,
    window: Duration,
    keep_running: KeepRunning,
}

impl PassiveEstimateProvider {
    pub fn new(counters: Box<dyn CounterSource>, window: Duration, keep_running: KeepRunning) -> Self {
        Self {
            counters: Mutex::new(counters),
            window,
            keep_running,
        }
    }

    fn read(&self) -> Result<ByteCounters, Unavailable> {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .read()
            .map_err(|e| Unavailable::new(NAME, format!("counter read failed: {}", e)))
    }

    /// Sleep out the window in short slices, stopping early on shutdown.
    async fn wait_window(&self) {
        let deadline = Instant::now() + self.window;
        let slice = Duration::from_millis(PASSIVE_SLICE_MS);
        while self.keep_running.is_set() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(remaining.min(slice)).await;
        }
    }
}

#[async_trait]
impl MeasurementProvider for PassiveEstimateProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn measure(&self) -> Result<Throughput, Unavailable> {
        let before = self.read()?;
        let started = Instant::now();
        self.wait_window().await;
        let after = self.read()?;
        let elapsed = started.elapsed().as_secs_f64().max(1e-6);
        Ok(Throughput::from_delta(after.delta_since(&before), elapsed))
    }
}
