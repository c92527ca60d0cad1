//! Hand-off from background tasks to the presentation loop.
//!
//! Producers never touch widget state. They post a [`UiMutation`] and the
//! presentation loop applies it on its own task, in post order.

use tokio::sync::mpsc;

use crate::models::{Direction, PingTransition, SampleTick, SpeedTestResult};

/// A state change to apply on the presentation context.
#[derive(Debug, Clone, PartialEq)]
pub enum UiMutation {
    /// A new sample plus a consistent copy of the window it landed in.
    Tick {
        sample: SampleTick,
        window: Vec<SampleTick>,
        scale: f64,
    },
    /// Ping outcome flipped since the previous tick.
    PingTransition(PingTransition),
    /// New per-direction throughput maximum (informational).
    Peak { direction: Direction, mbps: f64 },
    /// A speed test run started (busy indicator on).
    SpeedTestStarted,
    /// Manual run: reset the small readouts to placeholders.
    SpeedTestLabelsReset,
    /// Fresh result for the small readouts.
    SpeedTestResultReady(SpeedTestResult),
    /// Summary text, or the failure marker.
    SpeedTestSummary(String),
    /// The run finished (busy indicator off).
    SpeedTestFinished,
}

/// Cloneable, non-blocking sender half of the presentation queue.
#[derive(Debug, Clone)]
pub struct PresentationBridge {
    tx: mpsc::UnboundedSender<UiMutation>,
}

impl PresentationBridge {
    /// Create a bridge and the receiver the presentation loop drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiMutation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a mutation. Dropped silently once the presentation loop is gone.
    pub fn post(&self, mutation: UiMutation) {
        let _ = self.tx.send(mutation);
    }
}
