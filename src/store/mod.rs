//! Persisted widget state backed by a small JSON document.
//!
//! The document holds `opacity` and the last successful `speedtest`.
//! Unknown keys are preserved when rewriting.
//!
//! Design:
//! - Every read-modify-write goes through one writer lock, so an opacity
//!   change and a speed test result landing together cannot lose an update
//! - Writes go to a sibling temp file and are renamed into place
//! - Failures are logged and dropped; callers never see a hard error

use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{OPACITY_DEFAULT, OPACITY_MAX, OPACITY_MIN};
use crate::models::{PersistedSpeedTest, SpeedTestResult};

const KEY_OPACITY: &str = "opacity";
const KEY_SPEEDTEST: &str = "speedtest";

/// Why a write did not land.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state document could not be encoded: {0}")]
    Json(#[from] serde_json::Error),
}

/// File-backed key/value document.
pub struct StateStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read the whole document. Missing or unreadable files yield an empty map.
    pub fn load(&self) -> Map<String, Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Map::new(),
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                log::warn!(
                    "[STORE] {} is not a JSON object, starting fresh",
                    self.path.display()
                );
                Map::new()
            }
        }
    }

    /// Read-modify-write the document under the writer lock.
    pub fn update<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load();
        mutate(&mut doc);
        self.write(&doc)
    }

    fn write(&self, doc: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Saved opacity, clamped, or the default.
    pub fn opacity(&self) -> f64 {
        self.load()
            .get(KEY_OPACITY)
            .and_then(Value::as_f64)
            .map(clamp_opacity)
            .unwrap_or(OPACITY_DEFAULT)
    }

    /// Clamp and persist the opacity. Returns the value actually stored.
    pub fn set_opacity(&self, value: f64) -> f64 {
        let clamped = clamp_opacity(value);
        if let Err(e) = self.update(|doc| {
            doc.insert(KEY_OPACITY.to_string(), Value::from(clamped));
        }) {
            log::warn!("[STORE] Failed to save opacity: {}", e);
        }
        clamped
    }

    /// The last persisted speed test result, if any.
    pub fn speedtest(&self) -> Option<SpeedTestResult> {
        let value = self.load().remove(KEY_SPEEDTEST)?;
        let persisted: PersistedSpeedTest = serde_json::from_value(value).ok()?;
        SpeedTestResult::from_persisted(&persisted)
    }

    /// Replace the persisted speed test result.
    pub fn set_speedtest(&self, result: &SpeedTestResult) {
        let value = match serde_json::to_value(result.to_persisted()) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[STORE] Failed to encode speed test: {}", e);
                return;
            }
        };
        if let Err(e) = self.update(|doc| {
            doc.insert(KEY_SPEEDTEST.to_string(), value);
        }) {
            log::warn!("[STORE] Failed to save speed test: {}", e);
        }
    }
}

/// Clamp an opacity into [0.40, 1.00]; NaN becomes the default.
pub fn clamp_opacity(value: f64) -> f64 {
    if value.is_nan() {
        return OPACITY_DEFAULT;
    }
    value.clamp(OPACITY_MIN, OPACITY_MAX)
}
