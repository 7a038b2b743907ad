use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use conclave_relay::RelayConfig;
use conclave_sfu::SfuConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable prefix, e.g. `CONCLAVE_SERVER__PORT`
const ENV_PREFIX: &str = "CONCLAVE";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub sfu: SfuConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. `PORT` (highest priority, for the HTTP port only)
    /// 2. Environment variables (`CONCLAVE_SFU__ENGINE_TIMEOUT_MS`, etc.)
    /// 3. Config file (if provided)
    /// 4. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_from(config_file, None)
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// `vars` replaces the process environment when given
    fn load_from(
        config_file: Option<&str>,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let port = match &vars {
            Some(vars) => vars.get("PORT").cloned(),
            None => std::env::var("PORT").ok(),
        };

        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(vars),
        );

        if let Some(port) = port {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::Message(format!("Invalid PORT {port:?}: {e}")))?;
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        builder.build()?.try_deserialize()
    }

    /// Check every section, collecting all problems
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level {:?} is not a log level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            ));
        }

        if let Err(sfu_errors) = self.sfu.validate() {
            errors.extend(sfu_errors);
        }
        if let Err(relay_errors) = self.relay.validate() {
            errors.extend(relay_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::load_from(None, vars(&[])).unwrap();

        assert_eq!(config.http_address(), "0.0.0.0:3000");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.sfu.engine_timeout_ms, 10_000);
        assert_eq!(config.relay.outbound_buffer, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_then_env_then_port() {
        let file = yaml_file(
            "server:\n  host: 127.0.0.1\n  port: 4000\nlogging:\n  format: json\nsfu:\n  listen_ips:\n    - ip: 10.0.0.5\n      announced_ip: 203.0.113.7\n  empty_room_sweep_secs: 60\n",
        );
        let path = file.path().to_str().unwrap();

        let config = Config::load_from(Some(path), vars(&[])).unwrap();
        assert_eq!(config.http_address(), "127.0.0.1:4000");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.sfu.listen_ips[0].ip, "10.0.0.5");
        assert_eq!(
            config.sfu.listen_ips[0].announced_ip.as_deref(),
            Some("203.0.113.7")
        );
        assert_eq!(config.sfu.empty_room_sweep_secs, 60);

        let config = Config::load_from(
            Some(path),
            vars(&[
                ("CONCLAVE_SERVER__PORT", "5000"),
                ("CONCLAVE_SFU__ENGINE_TIMEOUT_MS", "250"),
            ]),
        )
        .unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.sfu.engine_timeout_ms, 250);

        let config = Config::load_from(
            Some(path),
            vars(&[("CONCLAVE_SERVER__PORT", "5000"), ("PORT", "8081")]),
        )
        .unwrap();
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Config::load_from(None, vars(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_from(Some("/nonexistent/conclave.yaml"), vars(&[])).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        config.logging.format = "xml".to_string();
        config.sfu.listen_ips.clear();
        config.relay.outbound_buffer = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }
}
