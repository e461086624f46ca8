//! Configuration types and loading logic.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use tap_tracing::TracingConfig;

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tap: TapConfig,
    #[serde(default)]
    pub predict: PredictConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Directory holding the pre-built single-page app.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

/// TAP catalog upstream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TapConfig {
    #[serde(default = "default_tap_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// External prediction-service upstream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictConfig {
    #[serde(default = "default_predict_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Statistics persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_file")]
    pub file_path: String,
}

fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_static_dir() -> String {
    "web".to_string()
}

fn default_tap_base_url() -> String {
    "https://exoplanetarchive.ipac.caltech.edu/TAP/sync".to_string()
}

fn default_predict_url() -> String {
    "https://exoplanetapi.onrender.com/api/predict".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_stats_file() -> String {
    "model_stats.json".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            base_url: default_tap_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            url: default_predict_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            file_path: default_stats_file(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (TAP_RELAY_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut config: RelayConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("TAP_RELAY_").split("__"))
            .extract()?;

        // Platform-style PORT override: keep the configured host, swap the port.
        if let Ok(port) = std::env::var("PORT") {
            let host = config
                .server
                .listen_address
                .rsplit_once(':')
                .map_or_else(|| "0.0.0.0".to_string(), |(host, _)| host.to_string());
            config.server.listen_address = format!("{host}:{port}");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.server.listen_address, "127.0.0.1:8080");
        assert_eq!(
            config.tap.base_url,
            "https://exoplanetarchive.ipac.caltech.edu/TAP/sync"
        );
        assert_eq!(config.stats.file_path, "model_stats.json");
        assert_eq!(config.tap.timeout_secs, 30);
    }

    #[test]
    fn test_extract_from_empty_figment_uses_defaults() {
        let config: RelayConfig = Figment::new().extract().unwrap();
        assert_eq!(config.server.static_dir, "web");
        assert_eq!(config.predict.timeout_secs, 30);
    }
}
