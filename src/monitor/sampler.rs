//! The 1 Hz sampling loop.
//!
//! Each tick reads the cumulative counters, turns the delta against the
//! previous tick into Mb/s, pings once, pushes a [`SampleTick`] into the
//! shared window and posts the result to the presentation bridge. Ticks are
//! paced by sleeping for whatever is left of the cadence; missed ticks are
//! never caught up.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::counters::CounterSource;
use super::probe::ConnectivityProbe;
use super::window::SharedWindow;
use crate::models::{ByteCounters, Direction, PingTransition, SampleTick, Throughput};
use crate::ui::{PresentationBridge, UiMutation};
use crate::utils::KeepRunning;

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sample: SampleTick,
    /// Set only when the ping outcome flipped relative to the previous tick.
    pub transition: Option<PingTransition>,
    /// New per-direction maxima above the noise floor.
    pub peaks: Vec<(Direction, f64)>,
}

/// Pure per-tick bookkeeping: baseline counters, ping edge and peak tracking.
#[derive(Debug, Clone)]
pub struct Sampler {
    baseline: Option<ByteCounters>,
    last_ping_ok: bool,
    max_up: f64,
    max_down: f64,
    noise_floor: f64,
    cadence_secs: f64,
}

impl Sampler {
    pub fn new(baseline: Option<ByteCounters>, cadence: Duration, noise_floor: f64) -> Self {
        Self {
            baseline,
            last_ping_ok: true,
            max_up: 0.0,
            max_down: 0.0,
            noise_floor,
            cadence_secs: cadence.as_secs_f64(),
        }
    }

    /// Fold one observation into a sample.
    ///
    /// `counters` is `None` when the counter read failed; the sample then
    /// reports zero throughput and the baseline is left untouched.
    pub fn observe(
        &mut self,
        counters: Option<ByteCounters>,
        ping_ok: bool,
        now: DateTime<Utc>,
    ) -> TickReport {
        let throughput = match (counters, self.baseline) {
            (Some(current), Some(previous)) => {
                self.baseline = Some(current);
                Throughput::from_delta(current.delta_since(&previous), self.cadence_secs)
            }
            (Some(current), None) => {
                self.baseline = Some(current);
                Throughput::default()
            }
            (None, _) => Throughput::default(),
        };

        let sample = SampleTick::new(now, throughput, ping_ok);

        let mut peaks = Vec::new();
        if sample.upload_mbps >= self.noise_floor && sample.upload_mbps > self.max_up {
            self.max_up = sample.upload_mbps;
            peaks.push((Direction::Upstream, sample.upload_mbps));
        }
        if sample.download_mbps >= self.noise_floor && sample.download_mbps > self.max_down {
            self.max_down = sample.download_mbps;
            peaks.push((Direction::Downstream, sample.download_mbps));
        }

        let transition = PingTransition::between(self.last_ping_ok, ping_ok);
        self.last_ping_ok = ping_ok;

        TickReport {
            sample,
            transition,
            peaks,
        }
    }
}

/// Owns the counter source and probe and drives the sampler on a cadence.
pub struct SamplingLoop {
    counters: Box<dyn CounterSource>,
    probe: Arc<dyn ConnectivityProbe>,
    window: SharedWindow,
    bridge: PresentationBridge,
    sampler: Sampler,
    cadence: Duration,
    keep_running: KeepRunning,
}

impl SamplingLoop {
    /// Build the loop, taking the initial counter baseline immediately.
    pub fn new(
        mut counters: Box<dyn CounterSource>,
        probe: Arc<dyn ConnectivityProbe>,
        window: SharedWindow,
        bridge: PresentationBridge,
        cadence: Duration,
        noise_floor: f64,
        keep_running: KeepRunning,
    ) -> Self {
        let baseline = counters.read().ok();
        Self {
            counters,
            probe,
            window,
            bridge,
            sampler: Sampler::new(baseline, cadence, noise_floor),
            cadence,
            keep_running,
        }
    }

    /// Run one tick of work (no pacing sleep).
    pub async fn tick(&mut self) -> TickReport {
        let counters = match self.counters.read() {
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("[NET] Counter read failed: {}", e);
                None
            }
        };
        let ping_ok = self.probe.probe().await;
        let report = self.sampler.observe(counters, ping_ok, Utc::now());

        for (direction, value) in &report.peaks {
            log::info!("[NET] New {} peak {:.2} Mb/s", direction, value);
            self.bridge.post(UiMutation::Peak {
                direction: *direction,
                mbps: *value,
            });
        }
        if let Some(transition) = report.transition {
            log::info!("[NET] {}", transition.label());
            self.bridge.post(UiMutation::PingTransition(transition));
        }

        let (window, scale) = {
            let mut w = self.window.lock().unwrap_or_else(|e| e.into_inner());
            w.push(report.sample);
            (w.snapshot(), w.max_value())
        };

        self.bridge.post(UiMutation::Tick {
            sample: report.sample,
            window,
            scale,
        });

        report
    }

    /// Tick until the keep-running flag is cleared.
    pub async fn run(mut self) {
        while self.keep_running.is_set() {
            let started = Instant::now();
            self.tick().await;
            let remaining = self.cadence.saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                tokio::time::sleep(remaining).await;
            }
        }
        log::debug!("sampling loop stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
