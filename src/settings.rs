//! Local application settings.
//!
//! These live on the frontend side (they are not backend state) and feed
//! the derived system-proxy address and the default probe timeout.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PROXY_HOST: &str = "127.0.0.1";
pub const DEFAULT_MIXED_PORT: u16 = 7897;
pub const DEFAULT_LATENCY_TIMEOUT_MS: u64 = 10_000;

/// User-facing settings of the proxy manager.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VergeSettings {
    /// Manual PAC-style mode: the derived address always comes from
    /// `proxy_host`/`verge_mixed_port`, ignoring the OS-reported server.
    pub proxy_auto_config: bool,

    /// Host part of the manually constructed proxy address.
    pub proxy_host: Option<String>,

    /// Port part of the manually constructed proxy address. Falls back to
    /// the backend's mixed port when unset.
    pub verge_mixed_port: Option<u16>,

    /// Timeout handed to latency probes, in milliseconds.
    pub default_latency_timeout: u64,

    /// Test URL override for latency probes.
    pub latency_test_url: Option<String>,
}

impl Default for VergeSettings {
    fn default() -> Self {
        Self {
            proxy_auto_config: false,
            proxy_host: None,
            verge_mixed_port: None,
            default_latency_timeout: DEFAULT_LATENCY_TIMEOUT_MS,
            latency_test_url: None,
        }
    }
}

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<VergeSettings, SettingsError> {
    let content = fs::read_to_string(path)?;
    let settings: VergeSettings = toml::from_str(&content)?;
    Ok(settings)
}
