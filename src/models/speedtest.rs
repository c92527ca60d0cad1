use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::Throughput;

/// A successful speed test measurement. Superseded, never merged, by the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedTestResult {
    pub down_mbps: f64,
    pub up_mbps: f64,
    pub timestamp: DateTime<Utc>,
}

/// On-disk shape of the `speedtest` key: `{down_mbps, up_mbps, ts}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSpeedTest {
    pub down_mbps: f64,
    pub up_mbps: f64,
    /// Epoch seconds.
    pub ts: f64,
}

impl SpeedTestResult {
    pub fn new(throughput: Throughput, timestamp: DateTime<Utc>) -> Self {
        let t = throughput.sanitized();
        Self {
            down_mbps: t.down_mbps,
            up_mbps: t.up_mbps,
            timestamp,
        }
    }

    /// One-line summary shown in the status bar.
    pub fn summary(&self) -> String {
        format!(
            "Speedtest: {:.1}↓ | {:.1}↑ Mb/s",
            self.down_mbps, self.up_mbps
        )
    }

    pub fn to_persisted(&self) -> PersistedSpeedTest {
        PersistedSpeedTest {
            down_mbps: self.down_mbps,
            up_mbps: self.up_mbps,
            ts: self.timestamp.timestamp_millis() as f64 / 1000.0,
        }
    }

    pub fn from_persisted(p: &PersistedSpeedTest) -> Option<Self> {
        if !p.ts.is_finite() {
            return None;
        }
        let millis = (p.ts * 1000.0).round() as i64;
        let timestamp = Utc.timestamp_millis_opt(millis).single()?;
        Some(Self::new(
            Throughput {
                down_mbps: p.down_mbps,
                up_mbps: p.up_mbps,
            },
            timestamp,
        ))
    }
}

/// Summary shown before any result exists.
pub const SUMMARY_PLACEHOLDER: &str = "Speedtest: --";
/// Summary shown when every provider failed.
pub const SUMMARY_FAILED: &str = "Speedtest: failed";
