use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const BASE_URL_ENV: &str = "RESULT_SERVICE_URL";
pub const DEFAULT_BASE_URL: &str = "http://software.diu.edu.bd:8006";

/// Runtime settings for talking to the result service.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout, in seconds
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Consecutive empty semesters that end a discovery run
    #[serde(default = "default_empty_run_limit")]
    pub empty_run_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default(),
            empty_run_limit: default_empty_run_limit(),
        }
    }
}

/// Backoff policy for transient fetch failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Cap on the delay between retries (default: 8 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl Config {
    /// Defaults, overlaid with the JSON file at `path` when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => Config::default(),
        };
        Ok(config)
    }

    /// Environment first, then the command line flag; the flag wins.
    pub fn apply_overrides(&mut self, env_url: Option<String>, cli_url: Option<String>) {
        if let Some(url) = cli_url.or(env_url).filter(|url| !url.trim().is_empty()) {
            self.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::config("base URL must not be empty", "base_url"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::config(
                format!("base URL must be http(s), got '{}'", self.base_url),
                "base_url",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be positive", "request_timeout"));
        }
        if self.empty_run_limit == 0 {
            return Err(Error::config("empty run limit must be at least 1", "empty_run_limit"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff multiplier must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_empty_run_limit() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(8)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.empty_run_limit, 4);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "base_url": "http://localhost:9000", "retry": {{ "max_retries": 1 }} }}"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.max_delay, Duration::from_secs(8));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn cli_flag_beats_environment() {
        let mut config = Config::default();
        config.apply_overrides(
            Some("http://env.example".to_string()),
            Some("http://cli.example".to_string()),
        );
        assert_eq!(config.base_url, "http://cli.example");

        let mut config = Config::default();
        config.apply_overrides(Some("http://env.example".to_string()), None);
        assert_eq!(config.base_url, "http://env.example");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.empty_run_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.base_url = "ftp://example".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let mut config = Config::default();
        config.base_url = "http://localhost:8006/".to_string();
        assert_eq!(config.base_url(), "http://localhost:8006");
    }
}
