use chrono::{DateTime, Utc};

/// Bits in one megabit (decimal: 1 Mb/s = 1,000,000 bit/s).
pub const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Cumulative byte counters summed across interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteCounters {
    pub sent: u64,
    pub received: u64,
}

impl ByteCounters {
    /// Byte deltas since `earlier`, clamped to zero if a counter went backwards.
    pub fn delta_since(&self, earlier: &ByteCounters) -> ByteCounters {
        ByteCounters {
            sent: self.sent.saturating_sub(earlier.sent),
            received: self.received.saturating_sub(earlier.received),
        }
    }
}

/// Megabits per second moved by `bytes` over `secs` seconds.
pub fn mbps(bytes: u64, secs: f64) -> f64 {
    (bytes as f64 * 8.0) / (secs * BITS_PER_MEGABIT)
}

/// A download/upload pair in Mb/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Throughput {
    pub down_mbps: f64,
    pub up_mbps: f64,
}

impl Throughput {
    /// Throughput from counter deltas over an elapsed time. Negative or
    /// non-finite inputs collapse to zero.
    pub fn from_delta(delta: ByteCounters, secs: f64) -> Self {
        let secs = if secs.is_finite() && secs > 0.0 { secs } else { 1e-6 };
        Self {
            down_mbps: mbps(delta.received, secs),
            up_mbps: mbps(delta.sent, secs),
        }
    }

    /// Clamp both directions to finite, non-negative values.
    pub fn sanitized(self) -> Self {
        let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            down_mbps: clean(self.down_mbps),
            up_mbps: clean(self.up_mbps),
        }
    }
}

/// One sampling-cadence observation. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTick {
    pub timestamp: DateTime<Utc>,
    pub upload_mbps: f64,
    pub download_mbps: f64,
    pub ping_ok: bool,
}

impl SampleTick {
    pub fn new(timestamp: DateTime<Utc>, throughput: Throughput, ping_ok: bool) -> Self {
        let t = throughput.sanitized();
        Self {
            timestamp,
            upload_mbps: t.up_mbps,
            download_mbps: t.down_mbps,
            ping_ok,
        }
    }

    /// The larger of the two directions.
    pub fn peak(&self) -> f64 {
        self.upload_mbps.max(self.download_mbps)
    }
}

/// Edge in the ping outcome between two consecutive ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingTransition {
    /// ok → fail
    Dropped,
    /// fail → ok
    Restored,
}

impl PingTransition {
    /// The transition between two outcomes, if they differ.
    pub fn between(previous_ok: bool, current_ok: bool) -> Option<Self> {
        match (previous_ok, current_ok) {
            (true, false) => Some(PingTransition::Dropped),
            (false, true) => Some(PingTransition::Restored),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PingTransition::Dropped => "Ping dropped",
            PingTransition::Restored => "Ping restored",
        }
    }
}

/// Traffic direction, used for peak reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upstream,
    Downstream,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upstream => write!(f, "upstream"),
            Direction::Downstream => write!(f, "downstream"),
        }
    }
}
