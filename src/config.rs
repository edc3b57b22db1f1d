//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - GatewayConfig: where the device REST server lives.
//!     - ServerConfig: where the dashboard itself is served.
//!     - LoggingConfig: default log filter and sensor data echo.
//!     - rules: extra / replacement entries for the rule table.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// base url of the REST server, `devices/list` is resolved against it
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuleConfig {
    pub type_id: String,
    pub value_suffix: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub kind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8888/".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:3000".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

/// where the active configuration came from, reported once logging is up
#[derive(Debug, Clone)]
pub enum ConfigOrigin {
    File(PathBuf),
    Defaults { rejected: Vec<String> },
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: DashboardConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> (Self, ConfigOrigin) {
        let paths = [
            PathBuf::from("config").join("dashboard.toml"),
            PathBuf::from("..").join("config").join("dashboard.toml"),
        ];
        Self::load_first(&paths)
    }

    fn load_first(paths: &[PathBuf]) -> (Self, ConfigOrigin) {
        let mut rejected = Vec::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            match Self::load(path) {
                Ok(config) => return (config, ConfigOrigin::File(path.clone())),
                Err(e) => rejected.push(format!("{}: {}", path.display(), e)),
            }
        }
        (Self::default(), ConfigOrigin::Defaults { rejected })
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│        DASHBOARD CONFIGURATION          │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Gateway: {}", self.gateway.base_url);
        println!("│ Timeout: {}s", self.gateway.timeout_seconds);
        println!("│ Listen: {}", self.server.bind_address);
        println!("│ Log Level: {}", self.logging.level);
        println!("│ Extra Rules: {}", self.rules.len());
        println!("└─────────────────────────────────────────┘");
    }
}
