//! Application-wide constants.
//!
//! Centralizes the cadences, timeouts, thresholds and default paths used by
//! the sampler, the speed-test scheduler and the widget.

use std::path::PathBuf;

// ── Sampling ──────────────────────────────────────────────────────
/// Default sampling cadence (ms).
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;
/// Minimum allowed sampling cadence (ms).
pub const MIN_SAMPLE_INTERVAL_MS: u64 = 250;
/// Samples kept in the rolling window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 10;
/// Smallest usable window.
pub const MIN_WINDOW_CAPACITY: usize = 2;
/// Graph scale floor (Mb/s), avoids dividing by zero on an idle link.
pub const GRAPH_SCALE_FLOOR_MBPS: f64 = 1.0;
/// Throughput below this is never reported as a new peak (Mb/s).
pub const DEFAULT_PEAK_NOISE_FLOOR_MBPS: f64 = 1.0;

// ── Connectivity probe ────────────────────────────────────────────
/// Host pinged once per tick.
pub const DEFAULT_PING_HOST: &str = "fast.com";
/// Ping wait bound (ms).
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 1200;
/// Minimum ping wait bound (ms).
pub const MIN_PING_TIMEOUT_MS: u64 = 100;

// ── Speed test scheduling ─────────────────────────────────────────
/// Interval between automatic speed tests (seconds).
pub const DEFAULT_SPEEDTEST_INTERVAL_SECS: u64 = 4 * 60 * 60;
/// Minimum interval between automatic speed tests (seconds).
pub const MIN_SPEEDTEST_INTERVAL_SECS: u64 = 60;
/// Upper bound for any scheduling interval (one year).
pub const MAX_SCHEDULE_SECS: u64 = 365 * 24 * 60 * 60;
/// Delay before the first automatic run after launch (seconds).
pub const DEFAULT_STARTUP_GRACE_SECS: u64 = 20;
/// How often the scheduler checks the due time (seconds).
pub const DEFAULT_SCHEDULER_POLL_SECS: u64 = 5;

// ── Measurement providers ─────────────────────────────────────────
/// Timeout for the external fast-cli tool (seconds).
pub const DEFAULT_EXTERNAL_TIMEOUT_SECS: u64 = 180;
/// Passive estimate observation window (seconds).
pub const DEFAULT_PASSIVE_WINDOW_SECS: u64 = 10;
/// Passive estimate wait slice, bounds shutdown latency (ms).
pub const PASSIVE_SLICE_MS: u64 = 500;
/// Parallel streams tried first by the HTTP provider.
pub const HTTP_PARALLEL_STREAMS: usize = 8;
/// Time budget for each HTTP transfer phase (seconds).
pub const HTTP_PHASE_BUDGET_SECS: u64 = 10;
/// Timeout for the server latency probe (seconds).
pub const HTTP_LATENCY_TIMEOUT_SECS: u64 = 3;
/// Timeout for a single HTTP transfer request (seconds).
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Download sizes requested per stream, in order (bytes).
pub const HTTP_DOWNLOAD_SIZES: &[usize] = &[
    1_000_000,
    5_000_000,
    10_000_000,
    25_000_000,
    50_000_000,
];
/// Upload payload table, biased toward large chunks (bytes).
pub const HTTP_UPLOAD_SIZES: &[usize] = &[
    256 * 1024,
    512 * 1024,
    1024 * 1024,
    2 * 1024 * 1024,
    5 * 1024 * 1024,
    10 * 1024 * 1024,
    20 * 1024 * 1024,
    30 * 1024 * 1024,
];
/// Default speed test server (Cloudflare speed endpoints).
pub const DEFAULT_SPEED_SERVER_NAME: &str = "cloudflare";
pub const DEFAULT_SPEED_SERVER_URL: &str = "https://speed.cloudflare.com";

// ── Opacity ───────────────────────────────────────────────────────
pub const OPACITY_DEFAULT: f64 = 0.72;
pub const OPACITY_MIN: f64 = 0.40;
pub const OPACITY_MAX: f64 = 1.00;
pub const OPACITY_STEP: f64 = 0.05;

// ── Presentation ──────────────────────────────────────────────────
/// Event poll timeout (ms) -- how often the UI checks for input.
pub const EVENT_POLL_MS: u64 = 50;
/// HoverGuard pointer poll interval (ms).
pub const HOVER_POLL_MS: u64 = 120;
/// Status message display duration (seconds).
pub const STATUS_MESSAGE_TIMEOUT_SECS: u64 = 5;
/// Widget width in cells (text column + graph).
pub const WIDGET_WIDTH: u16 = 44;
/// Widget height in cells.
pub const WIDGET_HEIGHT: u16 = 7;
/// Width of the text column inside the widget.
pub const WIDGET_TEXT_WIDTH: u16 = 16;

// ── Spinner Animation ─────────────────────────────────────────────
/// Spinner character sequence for the busy indicator.
pub const SPINNER_CHARS: &[&str] = &["◐", "◓", "◑", "◒"];
/// Time per spinner frame (ms).
pub const SPINNER_FRAME_MS: u64 = 200;

// ── Paths ─────────────────────────────────────────────────────────

/// Returns the user's home directory, falling back to /tmp.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Returns `~/.config/netgauge/`.
pub fn config_dir() -> PathBuf {
    home_dir().join(".config").join("netgauge")
}

/// Returns `~/.config/netgauge/config.toml`.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Returns `~/.local/share/netgauge/`.
pub fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("netgauge")
}

/// Returns `~/.local/share/netgauge/state.json` (opacity + last speed test).
pub fn state_file_path() -> PathBuf {
    data_dir().join("state.json")
}

/// Returns `~/.local/share/netgauge/netgauge.log`.
pub fn log_file_path() -> PathBuf {
    data_dir().join("netgauge.log")
}
