//! Configuration management for the feedgate server.
//!
//! Sources are layered: hardcoded defaults, then a YAML file, then
//! `FEEDGATE_`-prefixed environment variables with `__` as the nesting
//! separator (`FEEDGATE_SERVER__PORT=9090` overrides `server.port`).

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FeedgateConfig {
    #[serde(default)]
    pub server: ServerSettings,

    /// Relation-engine tuple storage.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Domain entity database.
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub authn: AuthnSettings,

    #[serde(default)]
    pub authz: AuthzSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_body_limit() -> usize {
    1024 * 1024
}

/// Tuple storage settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineSettings {
    /// Storage backend type: "memory" or "postgres".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database connection URL (required if backend is "postgres").
    pub database_url: Option<String>,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: None,
            pool_size: default_pool_size(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

/// Domain database settings. An empty URL selects the in-memory entity DB
/// (development only).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DatabaseSettings {
    pub url: Option<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Identity resolution settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AuthnSettings {
    /// Authentication mode: "jwt", "header", or "admin".
    #[serde(default = "default_authn_mode")]
    pub mode: String,

    /// HS256 secret for bearer-token validation (jwt mode).
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,

    /// URL of the external identity endpoint; empty disables enrichment.
    pub identity_endpoint: Option<String>,

    /// Per-call identity deadline.
    #[serde(default = "default_identity_timeout_ms")]
    pub identity_timeout_ms: u64,

    /// Soft cache horizon: entries older than this refresh in the
    /// background.
    #[serde(default = "default_recheck_ttl")]
    pub recheck_ttl_secs: u64,

    /// Hard cache horizon: entries older than this are never served.
    #[serde(default = "default_expire_ttl")]
    pub expire_ttl_secs: u64,

    /// Whether unresolved users become anonymous instead of 401.
    #[serde(default)]
    pub fail_open: bool,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_refresh_workers")]
    pub refresh_workers: usize,
}

impl Default for AuthnSettings {
    fn default() -> Self {
        Self {
            mode: default_authn_mode(),
            jwt_secret: None,
            jwt_issuer: None,
            jwt_audience: None,
            identity_endpoint: None,
            identity_timeout_ms: default_identity_timeout_ms(),
            recheck_ttl_secs: default_recheck_ttl(),
            expire_ttl_secs: default_expire_ttl(),
            fail_open: false,
            sweep_interval_secs: default_sweep_interval(),
            refresh_workers: default_refresh_workers(),
        }
    }
}

fn default_authn_mode() -> String {
    "jwt".to_string()
}

fn default_identity_timeout_ms() -> u64 {
    1000
}

fn default_recheck_ttl() -> u64 {
    60
}

fn default_expire_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_refresh_workers() -> usize {
    4
}

/// Authorization overlay settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AuthzSettings {
    /// User names granted every action on every object.
    #[serde(default)]
    pub global_admins: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development).
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl FeedgateConfig {
    /// Load configuration from a YAML file with environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&FeedgateConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("FEEDGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let loaded: FeedgateConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&FeedgateConfig::default())?)
            .add_source(
                Environment::with_prefix("FEEDGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let loaded: FeedgateConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        let valid_backends = ["memory", "postgres"];
        if !valid_backends.contains(&self.engine.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "engine.backend must be one of: {:?}, got: {}",
                    valid_backends, self.engine.backend
                ),
            });
        }
        if self.engine.backend == "postgres"
            && self
                .engine
                .database_url
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(ConfigLoadError::Invalid {
                message: "engine.database_url is required when backend is 'postgres'".to_string(),
            });
        }

        let valid_modes = ["jwt", "header", "admin"];
        if !valid_modes.contains(&self.authn.mode.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "authn.mode must be one of: {:?}, got: {}",
                    valid_modes, self.authn.mode
                ),
            });
        }
        if self.authn.mode == "jwt"
            && self
                .authn
                .jwt_secret
                .as_deref()
                .map_or(true, |s| s.is_empty())
        {
            return Err(ConfigLoadError::Invalid {
                message: "authn.jwt_secret is required when mode is 'jwt'".to_string(),
            });
        }
        if self.authn.recheck_ttl_secs > self.authn.expire_ttl_secs {
            return Err(ConfigLoadError::Invalid {
                message: "authn.recheck_ttl_secs must not exceed authn.expire_ttl_secs"
                    .to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9090

engine:
  backend: memory

authn:
  mode: header
  identity_timeout_ms: 500
  fail_open: true

authz:
  global_admins:
    - root

logging:
  level: debug
  json: true
"#
        )
        .unwrap();

        let config = FeedgateConfig::load(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.engine.backend, "memory");
        assert_eq!(config.authn.mode, "header");
        assert_eq!(config.authn.identity_timeout_ms, 500);
        assert!(config.authn.fail_open);
        assert_eq!(config.authz.global_admins, vec!["root".to_string()]);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    #[serial]
    fn test_env_vars_override_file_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  port: 8086
authn:
  mode: admin
"#
        )
        .unwrap();

        std::env::set_var("FEEDGATE_SERVER__PORT", "9999");
        std::env::set_var("FEEDGATE_LOGGING__LEVEL", "warn");

        let config = FeedgateConfig::load(file.path());

        std::env::remove_var("FEEDGATE_SERVER__PORT");
        std::env::remove_var("FEEDGATE_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.authn.mode, "admin");
    }

    #[test]
    fn test_validation_catches_errors() {
        // jwt mode without a secret
        let config = FeedgateConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jwt_secret"));

        // unknown engine backend
        let mut config = FeedgateConfig::default();
        config.authn.mode = "admin".to_string();
        config.engine.backend = "etcd".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("engine.backend"));

        // postgres without url
        let mut config = FeedgateConfig::default();
        config.authn.mode = "admin".to_string();
        config.engine.backend = "postgres".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("database_url"));

        // inverted cache horizons
        let mut config = FeedgateConfig::default();
        config.authn.mode = "admin".to_string();
        config.authn.recheck_ttl_secs = 7200;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("recheck_ttl"));

        // bad log level
        let mut config = FeedgateConfig::default();
        config.authn.mode = "admin".to_string();
        config.logging.level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_file_not_found_is_distinct() {
        let result = FeedgateConfig::load("/nonexistent/feedgate.yaml");
        assert!(matches!(result, Err(ConfigLoadError::FileNotFound { .. })));
    }

    #[test]
    fn test_defaults() {
        let config = FeedgateConfig::default();
        assert_eq!(config.server.port, 8086);
        assert_eq!(config.engine.backend, "memory");
        assert_eq!(config.authn.mode, "jwt");
        assert_eq!(config.authn.identity_timeout_ms, 1000);
        assert!(!config.authn.fail_open);
        assert_eq!(config.logging.level, "info");
    }
}
