use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Inputs
    pub suite_path: PathBuf,
    pub schema_dir: PathBuf,

    // Execution
    pub timeout_seconds: u64,
    pub workers: usize,
    pub token_skew_seconds: u64,

    // Output
    pub report_path: Option<PathBuf>,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            suite_path: PathBuf::from("suites/default.json"),
            schema_dir: PathBuf::from("schemas"),
            timeout_seconds: 30,
            workers: 10,
            token_skew_seconds: 30,
            report_path: None,
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if exists

        let defaults = Self::default();

        let config = Self {
            // Inputs
            suite_path: env::var("APICHECK_SUITE")
                .map(PathBuf::from)
                .unwrap_or(defaults.suite_path),
            schema_dir: env::var("APICHECK_SCHEMA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.schema_dir),

            // Execution
            timeout_seconds: parse_var("APICHECK_TIMEOUT_SECONDS", defaults.timeout_seconds)?,
            workers: parse_var("APICHECK_WORKERS", defaults.workers)?,
            token_skew_seconds: parse_var(
                "APICHECK_TOKEN_SKEW_SECONDS",
                defaults.token_skew_seconds,
            )?,

            // Output
            report_path: env::var("APICHECK_REPORT_PATH").ok().map(PathBuf::from),
            log_json: parse_flag("APICHECK_LOG_JSON", defaults.log_json),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run hang or do nothing
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("APICHECK_TIMEOUT_SECONDS"));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("APICHECK_WORKERS"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn token_skew(&self) -> Duration {
        Duration::from_secs(self.token_skew_seconds)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Boolean switch read the way clap reads `env` flags: a false literal
/// (`0`, `f`, `false`, `n`, `no`, `off`) turns it off, any other value on
fn parse_flag(name: &'static str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => flag_value(&raw),
        _ => default,
    }
}

fn flag_value(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "f" | "false" | "n" | "no" | "off"
    )
}

/// Read a secret from the environment, for credential references in suite files
pub fn require_secret(name: &str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingSecret(name.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable: {0}")]
    Invalid(&'static str),

    #[error("Missing secret environment variable: {0}")]
    MissingSecret(String),

    #[error("Invalid API target '{api}': {reason}")]
    InvalidApi { api: String, reason: String },

    #[error("Unknown API target '{api}' referenced by scenario '{scenario}'")]
    UnknownApi { scenario: String, api: String },

    #[error("Failed to read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.workers, 10);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config {
            timeout_seconds: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("APICHECK_TIMEOUT_SECONDS"))
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flag_values_match_cli_parsing() {
        for on in ["1", "true", "TRUE", "yes", "on", " y "] {
            assert!(flag_value(on), "{} should enable", on);
        }
        for off in ["0", "false", "False", "no", "off", "n", "f"] {
            assert!(!flag_value(off), "{} should disable", off);
        }
    }

    #[test]
    fn test_missing_secret() {
        let err = require_secret("APICHECK_TEST_SECRET_THAT_IS_NEVER_SET").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing secret environment variable: APICHECK_TEST_SECRET_THAT_IS_NEVER_SET"
        );
    }
}
