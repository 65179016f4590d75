//! Session configuration.
//!
//! Loaded from a TOML file and handed to [`crate::session::Session`] at
//! construction. Changes are applied through
//! [`crate::session::Session::update_config`]; nothing reads settings from
//! ambient global state.
//!
//! ```toml
//! save_root = "savestates"
//! prune_delay_ms = 500
//!
//! [save_states]
//! auto_save = true
//! auto_load = false
//!
//! [rewind]
//! enabled = true
//! interval_secs = 3
//! max_states = 4
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the slot store.
    pub save_root: PathBuf,
    /// Delay before rewind slots are pruned after a load.
    pub prune_delay_ms: u64,
    pub save_states: SaveStateConfig,
    pub rewind: RewindConfig,
    pub toasts: ToastConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveStateConfig {
    /// Refresh the auto slots on backgrounding, leaving a game, and game saves.
    pub auto_save: bool,
    /// Resume from the newest auto slot when a game is deep-linked.
    pub auto_load: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    pub enabled: bool,
    /// Seconds between rewind snapshots.
    pub interval_secs: u64,
    /// Rewind slots kept per game and core.
    pub max_states: usize,
    /// Keep rewind slots across loads and game switches.
    pub keep_states: bool,
}

/// Which operations produce a user-facing notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToastConfig {
    pub state_save: bool,
    pub state_load: bool,
    pub restart: bool,
    pub game_save: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            save_root: PathBuf::from("savestates"),
            prune_delay_ms: 500,
            save_states: SaveStateConfig::default(),
            rewind: RewindConfig::default(),
            toasts: ToastConfig::default(),
        }
    }
}

impl Default for SaveStateConfig {
    fn default() -> Self {
        SaveStateConfig { auto_save: true, auto_load: false }
    }
}

impl Default for RewindConfig {
    fn default() -> Self {
        RewindConfig { enabled: false, interval_secs: 3, max_states: 4, keep_states: false }
    }
}

impl Default for ToastConfig {
    fn default() -> Self {
        ToastConfig { state_save: true, state_load: true, restart: true, game_save: true }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn prune_delay(&self) -> Duration {
        Duration::from_millis(self.prune_delay_ms)
    }
}

impl RewindConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
