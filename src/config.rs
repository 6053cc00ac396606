// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving bridge settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::LoopbackOptions;

/// Bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transport limits.
    pub transport: TransportConfig,

    /// Simulated sensor settings.
    pub sensors: SensorsConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Demo loop settings.
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest best-effort envelope in bytes.
    pub max_message_bytes: usize,

    /// Largest guaranteed transfer in bytes.
    pub max_transfer_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 64 * 1024,
            max_transfer_bytes: 1024 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn loopback_options(&self) -> LoopbackOptions {
        LoopbackOptions {
            max_message_bytes: self.max_message_bytes,
            max_transfer_bytes: self.max_transfer_bytes,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub heart_rate_interval_ms: u64,
    pub pedometer_interval_ms: u64,
    pub resting_bpm: f64,
    /// Pretend the device has pedometer hardware.
    pub pedometer_available: bool,
    /// Grant authorization requests.
    pub authorized: bool,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            heart_rate_interval_ms: 1000,
            pedometer_interval_ms: 2000,
            resting_bpm: 64.0,
            pedometer_available: true,
            authorized: true,
        }
    }
}

impl SensorsConfig {
    pub fn heart_rate_interval(&self) -> Duration {
        Duration::from_millis(self.heart_rate_interval_ms.max(1))
    }

    pub fn pedometer_interval(&self) -> Duration {
        Duration::from_millis(self.pedometer_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "watch_bridge=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// How often the host polls the shared state.
    pub poll_interval_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
        }
    }
}

impl Config {
    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("watch-bridge")
            .join("config.toml")
    }

    /// Load configuration from the default location or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let again = Config::load_from(&path).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[sensors]\npedometer_available = false\n\n[transport]\nmax_message_bytes = 512\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.sensors.pedometer_available);
        assert_eq!(config.sensors.heart_rate_interval_ms, 1000);
        assert_eq!(config.transport.max_message_bytes, 512);
        assert_eq!(config.transport.loopback_options().max_message_bytes, 512);
        assert_eq!(config.logging.filter, "watch_bridge=info");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "transport = 3").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
