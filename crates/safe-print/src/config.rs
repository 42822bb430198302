//! Configuration for safe-print
//!
//! Read from `~/.config/safe-print/config.json` when present. Every field is
//! optional; command line flags override whatever the file says.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Match key used when nothing else is configured. Set
/// `SAFE_PRINT_DEFAULT_TAG` at build time to change it.
pub const DEFAULT_TAG: &str = match option_env!("SAFE_PRINT_DEFAULT_TAG") {
    Some(tag) => tag,
    None => "safe-print",
};

/// Largest accepted barcode module size in pixels
pub const MAX_BARCODE_SCALE: u32 = 32;

/// Longest accepted deadline, one day
pub const MAX_DEADLINE_SECS: u64 = 24 * 60 * 60;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Title / tag that selects entries for printing
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Seconds from start until the server shuts down on its own
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Milliseconds to wait before opening the browser
    #[serde(default = "default_browser_delay")]
    pub browser_delay_ms: u64,

    /// Pixels per barcode module
    #[serde(default = "default_barcode_scale")]
    pub barcode_scale: u32,

    /// Launch the default browser on the document URL
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,

    /// Seconds in-flight requests get after the listener is released
    #[serde(default = "default_drain")]
    pub drain_secs: u64,
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}
fn default_deadline() -> u64 {
    120
}
fn default_browser_delay() -> u64 {
    10
}
fn default_barcode_scale() -> u32 {
    4
}
fn default_open_browser() -> bool {
    true
}
fn default_drain() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tag: default_tag(),
            deadline_secs: default_deadline(),
            browser_delay_ms: default_browser_delay(),
            barcode_scale: default_barcode_scale(),
            open_browser: default_open_browser(),
            drain_secs: default_drain(),
        }
    }
}

impl Config {
    /// Load from the default path, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("safe-print")
            .join("config.json")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tag.trim().is_empty() || self.tag.split_whitespace().count() != 1 {
            return Err(ConfigError::Invalid(format!(
                "tag must be a single non-empty word, got '{}'",
                self.tag
            )));
        }
        if self.deadline_secs == 0 || self.deadline_secs > MAX_DEADLINE_SECS {
            return Err(ConfigError::Invalid(format!(
                "deadline must be between 1 and {} seconds",
                MAX_DEADLINE_SECS
            )));
        }
        if self.barcode_scale == 0 || self.barcode_scale > MAX_BARCODE_SCALE {
            return Err(ConfigError::Invalid(format!(
                "barcode scale must be between 1 and {}",
                MAX_BARCODE_SCALE
            )));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn browser_delay(&self) -> Duration {
        Duration::from_millis(self.browser_delay_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}
