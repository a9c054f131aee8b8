//! Process-wide configuration: a TOML file merged with CLI overrides, held
//! behind an `ArcSwap` for cheap concurrent reads — the same shape the
//! teacher's pooler config uses, pared down to this crate's much smaller
//! settings surface (no TLS, no HBA, no pool-mode routing).

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server-wide settings: where to listen, how to reach the account
/// database, and the timers that govern session lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "Settings::default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "Settings::default_database_url")]
    pub database_url: String,

    #[serde(default = "Settings::default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "Settings::default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    #[serde(default = "Settings::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Settings {
    pub fn default_listen_addr() -> String {
        "0.0.0.0:6112".to_string()
    }

    pub fn default_database_url() -> String {
        "host=localhost user=bncs dbname=bncs".to_string()
    }

    /// Defaults to one connection per CPU, matching the teacher's own
    /// cpu-count-scaled pool sizing.
    pub fn default_pool_size() -> usize {
        num_cpus::get()
    }

    pub fn default_ping_timeout_secs() -> u64 {
        60
    }

    pub fn default_connect_timeout_secs() -> u64 {
        8
    }

    /// Parses a TOML config file, falling back to defaults for any field the
    /// file omits (every field has a `#[serde(default = ...)]`).
    pub fn load(path: &Path) -> Result<Settings, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            listen_addr: Self::default_listen_addr(),
            database_url: Self::default_database_url(),
            pool_size: Self::default_pool_size(),
            ping_timeout_secs: Self::default_ping_timeout_secs(),
            connect_timeout_secs: Self::default_connect_timeout_secs(),
        }
    }
}

static SETTINGS: Lazy<ArcSwap<Settings>> = Lazy::new(|| ArcSwap::from_pointee(Settings::default()));

/// Installs a freshly loaded settings value as the process-wide config.
pub fn set_settings(settings: Settings) {
    SETTINGS.store(Arc::new(settings));
}

/// Returns a cheap clone of the currently installed settings handle.
pub fn get_settings() -> Arc<Settings> {
    SETTINGS.load_full()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(settings, parsed);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let parsed: Settings = toml::from_str("listen_addr = \"127.0.0.1:6200\"\n").unwrap();
        assert_eq!(parsed.listen_addr, "127.0.0.1:6200");
        assert_eq!(parsed.pool_size, Settings::default_pool_size());
    }
}
