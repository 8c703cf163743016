//! Construction of the orchestrator and its backends.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use parley::error::PublishError;
use parley::prelude::*;
use tracing::info;

/// Where histories and stream fragments go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Redis at the configured URL.
    #[default]
    Redis,
    /// Process-local; nothing outlives the process.
    Memory,
}

/// Publishes to a remote backend and to the local broadcast channel.
///
/// The local copy is delivered even when the remote publish fails.
struct TeePublisher {
    remote: Arc<dyn TopicPublisher>,
    local: BroadcastTopicPublisher,
}

#[async_trait]
impl TopicPublisher for TeePublisher {
    async fn publish(&self, namespace: &str, topic: &str, text: &str) -> Result<(), PublishError> {
        let remote = self.remote.publish(namespace, topic, text).await;
        self.local.publish(namespace, topic, text).await?;
        remote
    }
}

/// A wired orchestrator plus a local view of its stream fragments.
#[derive(Debug, Clone)]
pub struct Runtime {
    /// The orchestrator.
    pub orchestrator: Orchestrator,
    /// Receives every fragment the orchestrator publishes.
    pub topics: BroadcastTopicPublisher,
    /// Effective configuration.
    pub config: Config,
}

impl Runtime {
    /// Connect the backends and wire the orchestrator.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid, the `openai` secret is
    /// missing, or Redis is selected but unset or unreachable.
    pub async fn connect(
        config: Config,
        backend: Backend,
        secrets: &dyn SecretProvider,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let mut client = OpenAIClient::builder().api_key(secrets.get_secret("openai").await?);
        if let Some(url) = &config.openai_base_url {
            client = client.base_url(url);
        }
        if let Some(timeout) = config.request_timeout_secs {
            client = client.timeout_secs(timeout);
        }
        let service: Arc<dyn CompletionService> = Arc::new(client.build()?);

        let topics = BroadcastTopicPublisher::new();
        let (cache, publisher): (Arc<dyn ListCache>, Arc<dyn TopicPublisher>) = match backend {
            Backend::Memory => (Arc::new(MemoryCache::new()), Arc::new(topics.clone())),
            Backend::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .context("REDIS_URL is not set; pass --memory to run without Redis")?;
                let cache = RedisCache::connect(url)
                    .await
                    .with_context(|| format!("connecting cache at {url}"))?;
                let remote = RedisTopicPublisher::connect(url)
                    .await
                    .with_context(|| format!("connecting publisher at {url}"))?;
                let tee = TeePublisher {
                    remote: Arc::new(remote),
                    local: topics.clone(),
                };
                (Arc::new(cache), Arc::new(tee))
            }
        };
        info!(?backend, model = %config.default_model, "backends ready");

        let orchestrator = Orchestrator::new(
            service,
            ConversationStore::new(cache, config.cache_namespace.clone(), config.cache_ttl()),
            StreamPublisher::new(publisher, config.topic_namespace.clone()),
            &config,
        );

        Ok(Self {
            orchestrator,
            topics,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley::error::{ConfigError, ConfigResult};

    struct FixedSecret(Option<&'static str>);

    #[async_trait]
    impl SecretProvider for FixedSecret {
        async fn get_secret(&self, name: &str) -> ConfigResult<String> {
            self.0
                .map(ToString::to_string)
                .ok_or_else(|| ConfigError::missing(name))
        }
    }

    struct DownPublisher;

    #[async_trait]
    impl TopicPublisher for DownPublisher {
        async fn publish(&self, _: &str, _: &str, _: &str) -> Result<(), PublishError> {
            Err(PublishError::backend("test", "down"))
        }
    }

    #[tokio::test]
    async fn test_memory_runtime() {
        let runtime = Runtime::connect(Config::default(), Backend::Memory, &FixedSecret(Some("k")))
            .await
            .unwrap();
        assert_eq!(runtime.config.cache_namespace, "chatgpt");
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let err = Runtime::connect(Config::default(), Backend::Memory, &FixedSecret(None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("openai"));
    }

    #[tokio::test]
    async fn test_redis_requires_url() {
        let err = Runtime::connect(Config::default(), Backend::Redis, &FixedSecret(Some("k")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("REDIS_URL"));
    }

    #[tokio::test]
    async fn test_tee_delivers_locally_when_remote_fails() {
        let local = BroadcastTopicPublisher::new();
        let mut rx = local.subscribe();
        let tee = TeePublisher {
            remote: Arc::new(DownPublisher),
            local,
        };

        assert!(tee.publish("chatgpt", "c1", "x").await.is_err());
        assert_eq!(rx.recv().await.unwrap().text, "x");
    }
}
