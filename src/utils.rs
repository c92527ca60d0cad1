//! Shared utility functions used across modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::TimeDelta;

use crate::constants::{MAX_SCHEDULE_SECS, SPINNER_CHARS};

/// Process-wide "keep running" flag, checked at the top of every loop
/// iteration and inside the passive estimate's wait slices.
#[derive(Debug, Clone)]
pub struct KeepRunning(Arc<AtomicBool>);

impl KeepRunning {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag. Every clone observes it.
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for KeepRunning {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the spinner character for the current tick.
pub fn spinner_char(tick: u64) -> &'static str {
    SPINNER_CHARS[(tick % SPINNER_CHARS.len() as u64) as usize]
}

/// Format a rate with two decimals, the way the live labels show it.
pub fn format_mbps(value: f64) -> String {
    format!("{:.2}", value)
}

/// Whole seconds as a calendar delta, capped so date arithmetic cannot overflow.
pub fn schedule_delta(secs: u64) -> TimeDelta {
    TimeDelta::try_seconds(secs.min(MAX_SCHEDULE_SECS) as i64).unwrap_or_else(TimeDelta::zero)
}
