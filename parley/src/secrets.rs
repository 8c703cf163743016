//! Credential lookup.

use async_trait::async_trait;

use crate::error::{ConfigError, ConfigResult};

/// Source of named secrets such as API keys.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Look up the secret called `name`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] when the secret is not available.
    async fn get_secret(&self, name: &str) -> ConfigResult<String>;
}

/// Reads secrets from environment variables.
///
/// A name maps to `{NAME}_API_KEY` in upper case, so `openai` reads
/// `OPENAI_API_KEY`. Empty values count as missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    /// Environment variable holding the secret `name`.
    #[must_use]
    pub fn variable(name: &str) -> String {
        format!("{}_API_KEY", name.to_ascii_uppercase().replace('-', "_"))
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, name: &str) -> ConfigResult<String> {
        let variable = Self::variable(name);
        std::env::var(&variable)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::missing(variable))
    }
}
