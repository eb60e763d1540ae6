//! TOML configuration.
//!
//! Every field has a default, so an empty or partial file is valid. CLI flags
//! are applied on top by `main`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::convert::PackageSettings;
use crate::error::Result;
use crate::session::TickPolicy;

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "livepad.toml";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LivepadConfig {
    pub server: ServerConfig,
    pub preview: PreviewConfig,
    pub simulation: SimulationConfig,
    pub package: PackageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub open_browser: bool,
    /// Sessions no view attached to are dropped after this long; 0 keeps
    /// them until the process exits.
    pub idle_session_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8890,
            open_browser: true,
            idle_session_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_session_secs > 0).then(|| Duration::from_secs(self.idle_session_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Initial live-mode flag for new sessions.
    pub live_mode: bool,
    /// Fallback tick period; 0 disables the tick.
    pub tick_ms: u64,
    pub tick_policy: TickPolicy,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            live_mode: true,
            tick_ms: 1000,
            tick_policy: TickPolicy::Always,
        }
    }
}

impl PreviewConfig {
    pub fn tick_period(&self) -> Option<Duration> {
        (self.tick_ms > 0).then(|| Duration::from_millis(self.tick_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub convert_delay_ms: u64,
    pub upload_delay_ms: u64,
    pub deploy_delay_ms: u64,
    pub chat_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            convert_delay_ms: 3000,
            upload_delay_ms: 2000,
            deploy_delay_ms: 3000,
            chat_delay_ms: 1000,
        }
    }
}

impl SimulationConfig {
    pub fn convert_delay(&self) -> Duration {
        Duration::from_millis(self.convert_delay_ms)
    }

    pub fn upload_delay(&self) -> Duration {
        Duration::from_millis(self.upload_delay_ms)
    }

    pub fn deploy_delay(&self) -> Duration {
        Duration::from_millis(self.deploy_delay_ms)
    }

    pub fn chat_delay(&self) -> Duration {
        Duration::from_millis(self.chat_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    pub author: String,
    pub bundle_prefix: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        let settings = PackageSettings::default();
        Self {
            author: settings.author,
            bundle_prefix: settings.bundle_prefix,
        }
    }
}

impl PackageConfig {
    pub fn settings(&self) -> PackageSettings {
        PackageSettings {
            author: self.author.clone(),
            bundle_prefix: self.bundle_prefix.clone(),
        }
    }
}

impl LivepadConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load `path` if given, else `livepad.toml` when present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }
        tracing::debug!("no config file, using defaults");
        Ok(Self::default())
    }
}
