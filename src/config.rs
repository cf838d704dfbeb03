//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Placeholder value shipped in sample `.env` files; treated as "no key".
const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

/// Default remote model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";

/// File names inside the data directory.
pub mod files {
    pub const RAW_INBOX: &str = "mock_inbox.json";
    pub const ANNOTATIONS: &str = "processed_emails.json";
    pub const PROMPTS: &str = "default_prompts.json";
}

/// Top-level application configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the raw inbox, annotations and prompts.
    pub data_dir: PathBuf,
    /// Remote model credential. `None` activates mock mode.
    pub api_key: Option<SecretString>,
    /// Remote model name.
    pub model: String,
    /// HTTP port for the API server.
    pub port: u16,
    /// Wait applied after every newly processed email.
    pub pacing: Duration,
    /// First backoff wait under rate limiting; doubles on each retry.
    pub retry_base_delay: Duration,
    /// Maximum remote attempts under rate limiting.
    pub max_attempts: u32,
    /// Directory for rolling log files, if file logging is enabled.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            port: 8000,
            pacing: Duration::from_millis(2500), // ~24 requests per minute
            retry_base_delay: Duration::from_secs(2),
            max_attempts: 5,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Build configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_key = lookup("GEMINI_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_API_KEY)
            .map(SecretString::from);

        Ok(Self {
            data_dir: lookup("INBOX_AGENT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            api_key,
            model: lookup("INBOX_AGENT_MODEL").unwrap_or(defaults.model),
            port: parse_var(&lookup, "INBOX_AGENT_PORT")?.unwrap_or(defaults.port),
            pacing: parse_var::<u64, _>(&lookup, "INBOX_AGENT_PACING_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.pacing),
            retry_base_delay: parse_var::<u64, _>(&lookup, "INBOX_AGENT_RETRY_BASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            max_attempts: match parse_var::<u32, _>(&lookup, "INBOX_AGENT_MAX_ATTEMPTS")? {
                Some(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "INBOX_AGENT_MAX_ATTEMPTS".into(),
                        message: "must be at least 1".into(),
                    });
                }
                Some(n) => n,
                None => defaults.max_attempts,
            },
            log_dir: lookup("INBOX_AGENT_LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn raw_inbox_path(&self) -> PathBuf {
        self.data_dir.join(files::RAW_INBOX)
    }

    pub fn annotations_path(&self) -> PathBuf {
        self.data_dir.join(files::ANNOTATIONS)
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.data_dir.join(files::PROMPTS)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.port, 8000);
        assert_eq!(config.pacing, Duration::from_millis(2500));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.annotations_path(), PathBuf::from("./data/processed_emails.json"));
    }

    #[test]
    fn placeholder_key_means_mock_mode() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "YOUR_API_KEY_HERE")])).unwrap();
        assert!(config.api_key.is_none());

        let config = AppConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn real_key_is_kept() {
        let config = AppConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "abc123")])).unwrap();
        assert!(config.api_key.is_some());
    }

    #[test]
    fn numeric_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("INBOX_AGENT_PORT", "9001"),
            ("INBOX_AGENT_PACING_MS", "0"),
            ("INBOX_AGENT_RETRY_BASE_MS", "50"),
            ("INBOX_AGENT_MAX_ATTEMPTS", "3"),
            ("INBOX_AGENT_DATA_DIR", "/tmp/inbox"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.pacing, Duration::ZERO);
        assert_eq!(config.retry_base_delay, Duration::from_millis(50));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.prompts_path(), PathBuf::from("/tmp/inbox/default_prompts.json"));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("INBOX_AGENT_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("INBOX_AGENT_PORT"));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[("INBOX_AGENT_MAX_ATTEMPTS", "0")])).is_err());
    }
}
