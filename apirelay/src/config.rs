//! Configuration file parsing and structure definitions

use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid address format `{0}`")]
    InvalidAddress(String),
}

/// Top-level configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub upload: UploadSettings,
    pub modules: Option<GlobalModulesConfig>,
    pub log_level: Option<String>, // Global log level (trace, debug, info, warn, error)
    pub worker_threads: Option<usize>,
}

/// Listener configuration (IP and port)
#[derive(Debug, Deserialize, Clone)]
pub struct ListenConfig {
    pub ip: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// SQLite settings for the config table
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseSettings {
    /// Full sqlx URL (`sqlite:...`); takes precedence over `path`
    pub url: Option<String>,
    /// Database file path
    pub path: Option<String>,
    pub max_pool_size: Option<u32>,
}

/// Outbound relay settings
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Multipart field name the forwarded file is sent under
    #[serde(default = "default_file_field")]
    pub file_field: String,
    /// Reject configs whose `headers` text is not a JSON string map
    #[serde(default)]
    pub strict_headers: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            file_field: default_file_field(),
            strict_headers: false,
        }
    }
}

impl RelaySettings {
    /// Outbound request timeout; 0 falls back to the default
    pub fn timeout(&self) -> Duration {
        match self.timeout_secs {
            0 => Duration::from_secs(default_timeout_secs()),
            secs => Duration::from_secs(secs),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_file_field() -> String {
    "file".to_string()
}

/// Inbound body limits
#[derive(Debug, Deserialize, Clone)]
pub struct UploadSettings {
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_max_body_size() -> usize {
    32 * 1024 * 1024
}

/// Global modules configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GlobalModulesConfig {
    pub tracing: Option<TracingConfig>,
    pub metrics: Option<MetricsConfig>,
}

/// Tracing module configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TracingConfig {
    pub enabled: Option<bool>,         // Enable tracing (OpenTelemetry)
    pub otlp_endpoint: Option<String>, // OpenTelemetry collector endpoint
}

/// Metrics module configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub enabled: Option<bool>, // Serve Prometheus metrics on /metrics
}

impl Config {
    /// Read and parse configuration from file, then apply environment overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// `APIRELAY_DB_URL` and `APIRELAY_THREADS` win over the file (useful in tests)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("APIRELAY_DB_URL") {
            self.database.url = Some(url);
        }
        if let Some(threads) = std::env::var("APIRELAY_THREADS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            self.worker_threads = Some(threads);
        }
    }

    pub fn metrics_enabled(&self) -> bool {
        self.modules
            .as_ref()
            .and_then(|m| m.metrics.as_ref())
            .and_then(|m| m.enabled)
            .unwrap_or(true)
    }
}

impl ListenConfig {
    /// Convert to SocketAddr
    pub fn to_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.ip.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl DatabaseSettings {
    /// Resolve to an sqlx SQLite URL; defaults to `api_config.db` in the working directory
    pub fn resolve_url(&self) -> String {
        if let Some(url) = &self.url {
            if url.starts_with("sqlite:") {
                return url.clone();
            }
            return format!("sqlite:{}", url);
        }
        let path = self.path.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .map(|d| d.join("api_config.db").to_string_lossy().to_string())
                .unwrap_or_else(|_| "./api_config.db".to_string())
        });
        format!("sqlite:{}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = Config::from_yaml("").unwrap();
        assert_eq!(cfg.listen.port, 8080);
        assert_eq!(cfg.relay.timeout_secs, 30);
        assert_eq!(cfg.relay.file_field, "file");
        assert!(!cfg.relay.strict_headers);
        assert!(cfg.metrics_enabled());
    }

    #[test]
    fn parses_sections() {
        let yaml = r#"
listen: { ip: 127.0.0.1, port: 9001 }
database: { path: /tmp/x.db, max_pool_size: 4 }
relay: { timeout_secs: 5, strict_headers: true }
log_level: debug
modules:
  metrics: { enabled: false }
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.listen.to_socket_addr().unwrap().port(), 9001);
        assert_eq!(cfg.database.resolve_url(), "sqlite:/tmp/x.db");
        assert_eq!(cfg.relay.timeout_secs, 5);
        assert_eq!(cfg.relay.file_field, "file");
        assert!(cfg.relay.strict_headers);
        assert!(!cfg.metrics_enabled());
    }

    #[test]
    fn bad_listen_ip_and_bad_yaml_are_errors() {
        let listen = ListenConfig {
            ip: "not-an-ip".into(),
            port: 1,
        };
        assert!(matches!(
            listen.to_socket_addr(),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            Config::from_yaml("listen: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_file("/nonexistent/apirelay.yaml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn zero_relay_timeout_uses_default() {
        let cfg = Config::from_yaml("relay: { timeout_secs: 0 }").unwrap();
        assert_eq!(cfg.relay.timeout(), Duration::from_secs(30));
        let cfg = Config::from_yaml("relay: { timeout_secs: 7 }").unwrap();
        assert_eq!(cfg.relay.timeout(), Duration::from_secs(7));
    }

    #[test]
    fn url_gets_sqlite_scheme() {
        let settings = DatabaseSettings {
            url: Some("/data/cfg.db".into()),
            ..Default::default()
        };
        assert_eq!(settings.resolve_url(), "sqlite:/data/cfg.db");

        let settings = DatabaseSettings {
            url: Some("sqlite::memory:".into()),
            ..Default::default()
        };
        assert_eq!(settings.resolve_url(), "sqlite::memory:");
    }
}
