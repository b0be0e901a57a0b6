//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Upper bound on a batch ingest request
pub const MAX_BATCH_SIZE: usize = 25;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Ingest and replay tuning
    pub ingest: IngestConfig,

    /// Log output format
    pub log_format: LogFormat,

    /// Environment (test, development, production)
    pub environment: Environment,

    /// PostgreSQL connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind both listeners to
    pub host: String,
    /// Public API port
    pub port: u16,
    /// Admin API port
    pub admin_port: u16,
}

/// Ingest and replay tuning.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Largest accepted batch ingest request
    pub max_batch_size: usize,
    /// Replay page size when a request leaves it unset
    pub replay_page_size: i32,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = lookup("STRATA_ENV")
            .unwrap_or_else(|| "development".to_string())
            .parse()?;
        let log_format: LogFormat = lookup("STRATA_LOG_FORMAT")
            .unwrap_or_else(|| "pretty".to_string())
            .parse()?;

        let api = ApiConfig {
            host: lookup("STRATA_API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "STRATA_API_PORT", 8080)?,
            admin_port: parse_or(&lookup, "STRATA_ADMIN_PORT", 9090)?,
        };

        let ingest = IngestConfig {
            max_batch_size: parse_or(&lookup, "STRATA_MAX_BATCH_SIZE", MAX_BATCH_SIZE)?,
            replay_page_size: parse_or(&lookup, "STRATA_REPLAY_PAGE_SIZE", 100)?,
        };
        if ingest.max_batch_size == 0 || ingest.max_batch_size > MAX_BATCH_SIZE {
            return Err(DaemonError::Config(format!(
                "STRATA_MAX_BATCH_SIZE must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        if ingest.replay_page_size <= 0 {
            return Err(DaemonError::Config(
                "STRATA_REPLAY_PAGE_SIZE must be greater than zero".to_string(),
            ));
        }

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());

        Ok(Self {
            api,
            ingest,
            log_format,
            environment,
            database_url,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                admin_port: 0,
            },
            environment: Environment::Test,
            ..Self::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> DaemonResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DaemonError::Config(format!("Invalid {}: {}", key, raw))),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                admin_port: 9090,
            },
            ingest: IngestConfig {
                max_batch_size: MAX_BATCH_SIZE,
                replay_page_size: 100,
            },
            log_format: LogFormat::Pretty,
            environment: Environment::Development,
            database_url: None,
        }
    }
}

impl FromStr for Environment {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid STRATA_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(DaemonError::Config(format!(
                "Invalid STRATA_LOG_FORMAT: {}. Expected: pretty, json",
                other
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.admin_port, 9090);
        assert_eq!(config.ingest.max_batch_size, 25);
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.api.admin_port, 0);
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.ingest.replay_page_size, 100);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("STRATA_ENV", "prod"),
            ("STRATA_API_PORT", "8181"),
            ("STRATA_ADMIN_PORT", "9191"),
            ("STRATA_LOG_FORMAT", "json"),
            ("STRATA_MAX_BATCH_SIZE", "10"),
            ("STRATA_REPLAY_PAGE_SIZE", "250"),
            ("DATABASE_URL", "postgres://localhost/strata"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.api.port, 8181);
        assert_eq!(config.api.admin_port, 9191);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.ingest.max_batch_size, 10);
        assert_eq!(config.ingest.replay_page_size, 250);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/strata"));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for (key, value) in [
            ("STRATA_ENV", "staging"),
            ("STRATA_API_PORT", "http"),
            ("STRATA_ADMIN_PORT", "70000"),
            ("STRATA_LOG_FORMAT", "xml"),
            ("STRATA_MAX_BATCH_SIZE", "0"),
            ("STRATA_MAX_BATCH_SIZE", "26"),
            ("STRATA_REPLAY_PAGE_SIZE", "-1"),
        ] {
            let err = Config::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, DaemonError::Config(_)), "{key}={value}");
        }
    }

    #[test]
    fn test_batch_size_accepts_full_range() {
        for value in ["1", "25"] {
            let config =
                Config::from_lookup(lookup(&[("STRATA_MAX_BATCH_SIZE", value)])).unwrap();
            assert_eq!(config.ingest.max_batch_size.to_string(), value);
        }
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
