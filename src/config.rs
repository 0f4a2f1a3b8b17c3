//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use ::config::{Environment, File, FileFormat};
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{LimitConfig, DEFAULT_LIMIT, DEFAULT_WINDOW};

/// Prefix for environment overrides, e.g. `TURNSTILE__RATE_LIMITING__LIMIT`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Client address key derivation
    #[serde(default)]
    pub client_key: ClientKeyConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Actions admitted per window
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// How often expired windows are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Cap on tracked keys
    #[serde(default)]
    pub max_keys: Option<usize>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
            sweep_interval_secs: default_sweep_interval(),
            max_keys: None,
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW.as_millis() as u64
}

fn default_sweep_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Limiter settings described by this section.
    pub fn limit_config(&self) -> LimitConfig {
        LimitConfig {
            limit: self.limit,
            window: Duration::from_millis(self.window_ms),
            max_keys: self.max_keys,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Set the window length from whole seconds.
    pub fn set_window_secs(&mut self, secs: u64) -> Result<()> {
        self.window_ms = secs.checked_mul(1000).ok_or_else(|| {
            TurnstileError::Config(format!("window of {} seconds is too large", secs))
        })?;
        Ok(())
    }
}

/// Settings for deriving keys from client addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientKeyConfig {
    /// Salt mixed into hashed client addresses
    #[serde(default = "default_salt")]
    pub salt: String,
}

impl Default for ClientKeyConfig {
    fn default() -> Self {
        Self {
            salt: default_salt(),
        }
    }
}

fn default_salt() -> String {
    "turnstile-salt".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `TURNSTILE__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config: TurnstileConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration describes a usable service.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.limit_config().validate()?;
        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "sweep_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Held by every test that reads the process environment through `load`.
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.http_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.rate_limiting.limit, 5);
        assert_eq!(config.rate_limiting.window_ms, 180_000);
        assert_eq!(config.rate_limiting.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.rate_limiting.max_keys, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
rate_limiting:
  limit: 10
  window_ms: 60000
  max_keys: 5000
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        let limits = config.rate_limiting.limit_config();

        assert_eq!(limits.limit, 10);
        assert_eq!(limits.window, Duration::from_secs(60));
        assert_eq!(limits.max_keys, Some(5000));
        assert_eq!(config.rate_limiting.sweep_interval_secs, 60);
        assert_eq!(config.client_key.salt, "turnstile-salt");
    }

    #[test]
    fn test_parse_server_section() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:8080"
client_key:
  salt: "pepper"
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.client_key.salt, "pepper");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = r#"
rate_limiting:
  limit: 0
"#;
        let result = TurnstileConfig::from_yaml(yaml);
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let yaml = r#"
rate_limiting:
  sweep_interval_secs: 0
"#;
        assert!(TurnstileConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_set_window_secs() {
        let mut rate_limiting = RateLimitingConfig::default();

        rate_limiting.set_window_secs(90).unwrap();
        assert_eq!(rate_limiting.window_ms, 90_000);

        let result = rate_limiting.set_window_secs(u64::MAX);
        assert!(matches!(result, Err(TurnstileError::Config(_))));
        assert_eq!(rate_limiting.window_ms, 90_000);
    }

    #[test]
    fn test_env_overrides_defaults() {
        let _guard = ENV_LOCK.lock();
        let vars = [
            ("TURNSTILE__RATE_LIMITING__LIMIT", "9"),
            ("TURNSTILE__RATE_LIMITING__MAX_KEYS", "77"),
            ("TURNSTILE__SERVER__HTTP_ADDR", "0.0.0.0:9999"),
        ];
        for (name, value) in vars {
            std::env::set_var(name, value);
        }

        let result = TurnstileConfig::load(None);
        for (name, _) in vars {
            std::env::remove_var(name);
        }

        let config = result.unwrap();
        assert_eq!(config.rate_limiting.limit, 9);
        assert_eq!(config.rate_limiting.max_keys, Some(77));
        assert_eq!(config.server.http_addr, "0.0.0.0:9999".parse().unwrap());
        assert_eq!(config.rate_limiting.window_ms, 180_000);
    }

    #[test]
    fn test_load_from_file() {
        let _guard = ENV_LOCK.lock();
        let path = std::env::temp_dir().join(format!("turnstile-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "rate_limiting:\n  limit: 3\n  window_ms: 1000\n",
        )
        .unwrap();

        let config = TurnstileConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rate_limiting.limit, 3);
        assert_eq!(config.rate_limiting.window_ms, 1000);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let _guard = ENV_LOCK.lock();
        let path = Path::new("/nonexistent/turnstile.yaml");
        assert!(TurnstileConfig::load(Some(path)).is_err());
    }
}
