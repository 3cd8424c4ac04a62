//! Persistent configuration for uiscope.
//!
//! Stores user settings in `~/.uiscope/config.json`. Every field is optional
//! in the file; missing fields take their defaults.
//!
//! # Example
//!
//! ```no_run
//! use uiscope_core::config::InspectorConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = InspectorConfig::load();
//! println!("adb: {}", config.adb_path.display());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hierarchy::FetchConfig;

const CONFIG_FILENAME: &str = "config.json";

/// Returns `~/.uiscope`, falling back to the temp dir when there is no home.
pub fn uiscope_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".uiscope")
}

/// Persistent uiscope configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// The `adb` executable.
    pub adb_path: PathBuf,
    /// Serial of the device to address; `None` lets adb pick the only one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_serial: Option<String>,
    /// Where screenshots are written.
    pub screenshot_dir: PathBuf,
    /// URL prefix under which `screenshot_dir` is served.
    pub screenshot_url_prefix: String,
    /// Timeout for ordinary bridge commands (capture, tap, reads).
    pub command_timeout_ms: u64,
    /// Timeout for `uiautomator dump` to a file.
    pub dump_timeout_ms: u64,
    /// Timeout for `uiautomator dump` streamed to stdout.
    pub stream_timeout_ms: u64,
    pub primary_dump_path: String,
    pub alternate_dump_path: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        let fetch = FetchConfig::default();
        Self {
            adb_path: PathBuf::from("adb"),
            device_serial: None,
            screenshot_dir: PathBuf::from("public").join("screenshots"),
            screenshot_url_prefix: "/screenshots".to_string(),
            command_timeout_ms: fetch.read_timeout.as_millis() as u64,
            dump_timeout_ms: fetch.dump_timeout.as_millis() as u64,
            stream_timeout_ms: fetch.stream_timeout.as_millis() as u64,
            primary_dump_path: fetch.primary_dump_path,
            alternate_dump_path: fetch.alternate_dump_path,
        }
    }
}

impl InspectorConfig {
    /// Load config from `~/.uiscope/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&uiscope_dir().join(CONFIG_FILENAME))
    }

    /// Load config from an explicit path, with the same fallback as [`load`](Self::load).
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to `~/.uiscope/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&uiscope_dir().join(CONFIG_FILENAME))
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Strategy paths and timeouts for the hierarchy fetcher.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            primary_dump_path: self.primary_dump_path.clone(),
            alternate_dump_path: self.alternate_dump_path.clone(),
            dump_timeout: Duration::from_millis(self.dump_timeout_ms),
            stream_timeout: Duration::from_millis(self.stream_timeout_ms),
            read_timeout: self.command_timeout(),
        }
    }
}
