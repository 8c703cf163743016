//! Deployment configuration.
//!
//! Values come from an optional JSON file and are then overridden by
//! environment variables:
//!
//! | Variable               | Field              |
//! |------------------------|--------------------|
//! | `CACHE_TTL`            | `cache_ttl_secs`   |
//! | `REDIS_URL`            | `redis_url`        |
//! | `OPENAI_BASE_URL`      | `openai_base_url`  |
//! | `PARLEY_DEFAULT_MODEL` | `default_model`    |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Default model when a request names none.
pub const DEFAULT_MODEL: &str = "gpt-4-0613";

/// Models that accept the JSON response-format directive.
pub const DEFAULT_JSON_MODE_MODELS: &[&str] = &["gpt-4-1106-preview", "gpt-4-vision-preview"];

/// Default namespace for cached conversations and stream topics.
pub const DEFAULT_NAMESPACE: &str = "chatgpt";

/// Default history time-to-live.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Longest accepted history time-to-live (one year).
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 3600;

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Models that support JSON-mode output.
    pub json_mode_models: Vec<String>,
    /// Namespace of cached conversation lists.
    pub cache_namespace: String,
    /// Namespace of stream topics.
    pub topic_namespace: String,
    /// Time-to-live of a conversation entry, refreshed on every write.
    pub cache_ttl_secs: u64,
    /// Redis connection string for the cache and topic backends.
    pub redis_url: Option<String>,
    /// Override for the completion service base URL.
    pub openai_base_url: Option<String>,
    /// HTTP timeout for completion calls. No timeout when absent.
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            json_mode_models: DEFAULT_JSON_MODE_MODELS
                .iter()
                .map(ToString::to_string)
                .collect(),
            cache_namespace: DEFAULT_NAMESPACE.to_string(),
            topic_namespace: DEFAULT_NAMESPACE.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            redis_url: None,
            openai_base_url: None,
            request_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Override fields using `lookup` as the variable source.
    pub fn apply_vars<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ttl) = lookup("CACHE_TTL") {
            self.cache_ttl_secs = ttl
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(format!("CACHE_TTL is not a number: {ttl}")))?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis_url = Some(url);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.openai_base_url = Some(url);
        }
        if let Some(model) = lookup("PARLEY_DEFAULT_MODEL") {
            self.default_model = model;
        }
        Ok(())
    }

    /// Check the configuration for values the orchestrator cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::invalid("cache_ttl_secs must be positive"));
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::invalid(format!(
                "cache_ttl_secs must not exceed {MAX_CACHE_TTL_SECS}"
            )));
        }
        if self.cache_namespace.is_empty() {
            return Err(ConfigError::invalid("cache_namespace must not be empty"));
        }
        if self.topic_namespace.is_empty() {
            return Err(ConfigError::invalid("topic_namespace must not be empty"));
        }
        if self.default_model.is_empty() {
            return Err(ConfigError::missing("default_model"));
        }
        Ok(())
    }

    /// History time-to-live.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_model, "gpt-4-0613");
        assert_eq!(config.cache_namespace, "chatgpt");
        assert!(config.json_mode_models.iter().any(|m| m == "gpt-4-1106-preview"));
        assert!(!config.json_mode_models.iter().any(|m| m == "gpt-4-0613"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_vars(vars(&[
                ("CACHE_TTL", "86400"),
                ("REDIS_URL", "redis://cache:6379"),
                ("PARLEY_DEFAULT_MODEL", "gpt-4o"),
            ]))
            .unwrap();

        assert_eq!(config.cache_ttl(), Duration::from_secs(86400));
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.default_model, "gpt-4o");
        assert!(config.openai_base_url.is_none());
    }

    #[test]
    fn test_invalid_ttl() {
        let mut config = Config::default();
        let err = config.apply_vars(vars(&[("CACHE_TTL", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = Config {
            cache_ttl_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_ttl() {
        let mut config = Config::default();
        config
            .apply_vars(|name| (name == "CACHE_TTL").then(|| u64::MAX.to_string()))
            .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.cache_ttl_secs = MAX_CACHE_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"cache_ttl_secs": 60, "json_mode_models": ["gpt-4o"]}"#)
                .unwrap();
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.json_mode_models, vec!["gpt-4o".to_string()]);
        assert_eq!(config.topic_namespace, "chatgpt");
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("parley.json");
        std::fs::write(&path, r#"{"default_model": "gpt-4o-mini"}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.default_model, "gpt-4o-mini");
    }

    #[test]
    fn test_from_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(Config::from_file(temp.path().join("absent.json")).is_err());
    }
}
