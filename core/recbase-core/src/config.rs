//! Application configuration, read from a TOML file.
//!
//! ```toml
//! [hooks]
//! timeout_ms = 30000
//!
//! [realtime]
//! channel_capacity = 64
//!
//! [storage]
//! path = "data/recbase.db"
//!
//! [[collection]]
//! name = "posts"
//! list_rule = "public = true"
//! fields = [{ name = "title", type = "text", required = true }]
//! ```

use recbase_model::{Catalog, Collection, ModelResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Hook chain settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSettings {
    /// Deadline for a top-level mutation, in milliseconds. `0` disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl HookSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Realtime fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeSettings {
    /// Messages buffered per subscriber before new ones are dropped.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file. Records are kept in memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub hooks: HookSettings,
    #[serde(default)]
    pub realtime: RealtimeSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default, rename = "collection")]
    pub collections: Vec<Collection>,
}

impl AppConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults. A file that cannot be read or
    /// parsed also yields the defaults, with a warning.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!(
                        "Loaded config from {:?} ({} collections)",
                        path,
                        config.collections.len()
                    );
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?}: {}. Falling back to defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Builds the schema catalog from the configured collections.
    pub fn catalog(&self) -> ModelResult<Catalog> {
        Catalog::from_collections(self.collections.iter().cloned())
    }
}
