use std::path::PathBuf;

use serde::Deserialize;

use crate::constants::*;

/// Application configuration with sensible defaults.
///
/// Can be overridden via ~/.config/netgauge/config.toml
#[derive(Debug, Clone)]
pub struct Config {
    /// Sampling cadence in milliseconds
    pub sample_interval_ms: u64,
    /// Samples kept in the rolling window
    pub window_capacity: usize,
    /// Throughput below this never counts as a new peak (Mb/s)
    pub peak_noise_floor_mbps: f64,
    /// Host pinged once per tick
    pub ping_host: String,
    /// Ping wait bound in milliseconds
    pub ping_timeout_ms: u64,
    /// Speed test scheduling and provider settings
    pub speedtest: SpeedTestConfig,
}

/// A speed test server exposing `__down?bytes=N` and `__up` endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub base_url: String,
}

/// Speed test settings.
#[derive(Debug, Clone)]
pub struct SpeedTestConfig {
    /// Whether automatic runs are scheduled at all.
    pub enabled: bool,
    /// Seconds between automatic runs, anchored to completion time.
    pub interval_secs: u64,
    /// Delay before the first automatic run after launch.
    pub startup_grace_secs: u64,
    /// How often the scheduler checks the due time.
    pub poll_interval_secs: u64,
    /// Passive estimate observation window.
    pub passive_window_secs: u64,
    /// Timeout for the external fast-cli tool.
    pub external_timeout_secs: u64,
    /// Directory holding the bundled `third_party/` tree, if any.
    pub resource_dir: PathBuf,
    /// HTTP provider servers, best latency wins.
    pub servers: Vec<ServerConfig>,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_SPEEDTEST_INTERVAL_SECS,
            startup_grace_secs: DEFAULT_STARTUP_GRACE_SECS,
            poll_interval_secs: DEFAULT_SCHEDULER_POLL_SECS,
            passive_window_secs: DEFAULT_PASSIVE_WINDOW_SECS,
            external_timeout_secs: DEFAULT_EXTERNAL_TIMEOUT_SECS,
            resource_dir: default_resource_dir(),
            servers: vec![ServerConfig {
                name: DEFAULT_SPEED_SERVER_NAME.to_string(),
                base_url: DEFAULT_SPEED_SERVER_URL.to_string(),
            }],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            peak_noise_floor_mbps: DEFAULT_PEAK_NOISE_FLOOR_MBPS,
            ping_host: DEFAULT_PING_HOST.to_string(),
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
            speedtest: SpeedTestConfig::default(),
        }
    }
}

/// The directory next to the executable, where a bundled `third_party/`
/// tree would live. Falls back to the working directory.
fn default_resource_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// TOML-deserializable config file format.
/// All fields are optional; missing fields use defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    sample_interval_ms: Option<u64>,
    window_capacity: Option<usize>,
    peak_noise_floor_mbps: Option<f64>,
    ping_host: Option<String>,
    ping_timeout_ms: Option<u64>,
    speedtest: Option<FileSpeedTestConfig>,
}

/// TOML-deserializable speedtest config section.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileSpeedTestConfig {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    startup_grace_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    passive_window_secs: Option<u64>,
    external_timeout_secs: Option<u64>,
    resource_dir: Option<PathBuf>,
    servers: Option<Vec<ServerConfig>>,
}

impl Config {
    /// Load config from ~/.config/netgauge/config.toml, falling back to defaults
    /// for any missing fields. If the file doesn't exist, returns pure defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        let content = match std::fs::read_to_string(&config_path) {
            Ok(c) => c,
            Err(_) => return Config::default(), // No config file, use defaults
        };

        match Self::from_toml_str(&content) {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "Failed to parse {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                Config::default()
            }
        }
    }

    /// Parse a TOML document and merge it over the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file_config: FileConfig = toml::from_str(content)?;
        let mut config = Config::default();

        if let Some(v) = file_config.sample_interval_ms {
            config.sample_interval_ms = v.max(MIN_SAMPLE_INTERVAL_MS);
        }
        if let Some(v) = file_config.window_capacity {
            config.window_capacity = v.max(MIN_WINDOW_CAPACITY);
        }
        if let Some(v) = file_config.peak_noise_floor_mbps {
            if v.is_finite() {
                config.peak_noise_floor_mbps = v.max(0.0);
            }
        }
        if let Some(v) = file_config.ping_host {
            if !v.trim().is_empty() {
                config.ping_host = v.trim().to_string();
            }
        }
        if let Some(v) = file_config.ping_timeout_ms {
            config.ping_timeout_ms = v.max(MIN_PING_TIMEOUT_MS);
        }

        // Merge speedtest config
        if let Some(s) = file_config.speedtest {
            if let Some(v) = s.enabled {
                config.speedtest.enabled = v;
            }
            if let Some(v) = s.interval_secs {
                config.speedtest.interval_secs = v.max(MIN_SPEEDTEST_INTERVAL_SECS);
            }
            if let Some(v) = s.startup_grace_secs {
                config.speedtest.startup_grace_secs = v;
            }
            if let Some(v) = s.poll_interval_secs {
                config.speedtest.poll_interval_secs = v.max(1);
            }
            if let Some(v) = s.passive_window_secs {
                config.speedtest.passive_window_secs = v.max(1);
            }
            if let Some(v) = s.external_timeout_secs {
                config.speedtest.external_timeout_secs = v.max(1);
            }
            if let Some(v) = s.resource_dir {
                config.speedtest.resource_dir = v;
            }
            if let Some(v) = s.servers {
                // An explicitly empty list disables the HTTP provider
                config.speedtest.servers = v;
            }
        }

        Ok(config)
    }
}
