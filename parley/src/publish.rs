//! Streaming fragment delivery.
//!
//! Fragments of a streamed completion are pushed to a topic named after the
//! conversation key. Delivery is best effort: a failed publish is logged and
//! the completion carries on.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::error::PublishError;

/// Default capacity of the in-process broadcast channel.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// A topic-based message channel.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Publish `text` to `topic` within `namespace`.
    async fn publish(&self, namespace: &str, topic: &str, text: &str) -> Result<(), PublishError>;
}

// ============================================================================
// In-process backend
// ============================================================================

/// A fragment delivered by [`BroadcastTopicPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicEvent {
    /// Namespace the fragment was published in.
    pub namespace: String,
    /// Topic the fragment was published to.
    pub topic: String,
    /// Fragment text.
    pub text: String,
}

/// In-process [`TopicPublisher`] backed by a tokio broadcast channel.
///
/// Publishing with no subscriber is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastTopicPublisher {
    sender: broadcast::Sender<TopicEvent>,
}

impl Default for BroadcastTopicPublisher {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl BroadcastTopicPublisher {
    /// Create a publisher with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher whose subscribers may lag by up to `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TopicEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl TopicPublisher for BroadcastTopicPublisher {
    async fn publish(&self, namespace: &str, topic: &str, text: &str) -> Result<(), PublishError> {
        let event = TopicEvent {
            namespace: namespace.to_string(),
            topic: topic.to_string(),
            text: text.to_string(),
        };
        // Err only means nobody is listening.
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(receivers, "broadcast fragment");
        Ok(())
    }
}

// ============================================================================
// Redis backend
// ============================================================================

#[cfg(feature = "redis")]
pub use self::redis_backend::RedisTopicPublisher;

#[cfg(feature = "redis")]
mod redis_backend {
    use super::{PublishError, TopicPublisher, async_trait};
    use redis::AsyncCommands;

    /// Redis pub/sub [`TopicPublisher`].
    ///
    /// Publishes to the channel `"{namespace}:{topic}"`.
    #[derive(Clone)]
    pub struct RedisTopicPublisher {
        connection: redis::aio::ConnectionManager,
    }

    impl std::fmt::Debug for RedisTopicPublisher {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisTopicPublisher").finish_non_exhaustive()
        }
    }

    impl RedisTopicPublisher {
        /// Connect to the server at `url`.
        pub async fn connect(url: &str) -> Result<Self, PublishError> {
            let client = redis::Client::open(url)?;
            let connection = client.get_connection_manager().await?;
            Ok(Self { connection })
        }

        /// Wrap an existing connection manager.
        #[must_use]
        pub const fn from_connection(connection: redis::aio::ConnectionManager) -> Self {
            Self { connection }
        }
    }

    #[async_trait]
    impl TopicPublisher for RedisTopicPublisher {
        async fn publish(
            &self,
            namespace: &str,
            topic: &str,
            text: &str,
        ) -> Result<(), PublishError> {
            let mut conn = self.connection.clone();
            let _receivers: i64 = conn.publish(format!("{namespace}:{topic}"), text).await?;
            Ok(())
        }
    }
}

// ============================================================================
// Stream publisher
// ============================================================================

/// Publishes completion fragments within a fixed namespace.
#[derive(Clone)]
pub struct StreamPublisher {
    publisher: Arc<dyn TopicPublisher>,
    namespace: String,
}

impl std::fmt::Debug for StreamPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPublisher")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl StreamPublisher {
    /// Create a stream publisher over `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn TopicPublisher>, namespace: impl Into<String>) -> Self {
        Self {
            publisher,
            namespace: namespace.into(),
        }
    }

    /// Topic namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Publish one fragment. Returns whether it was delivered.
    pub async fn publish(&self, topic: &str, fragment: &str) -> bool {
        match self.publisher.publish(&self.namespace, topic, fragment).await {
            Ok(()) => true,
            Err(e) => {
                warn!(topic, error = %e, "failed to publish stream fragment");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPublisher;

    #[async_trait]
    impl TopicPublisher for FailingPublisher {
        async fn publish(&self, _: &str, _: &str, _: &str) -> Result<(), PublishError> {
            Err(PublishError::backend("test", "unavailable"))
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_in_order() {
        let backend = BroadcastTopicPublisher::new();
        let mut rx = backend.subscribe();
        let publisher = StreamPublisher::new(Arc::new(backend), "chatgpt");

        assert!(publisher.publish("c1", "Hel").await);
        assert!(publisher.publish("c1", "lo").await);

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            TopicEvent {
                namespace: "chatgpt".into(),
                topic: "c1".into(),
                text: "Hel".into(),
            }
        );
        assert_eq!(rx.recv().await.unwrap().text, "lo");
    }

    #[tokio::test]
    async fn test_no_subscriber_is_not_an_error() {
        let publisher = StreamPublisher::new(Arc::new(BroadcastTopicPublisher::new()), "chatgpt");
        assert!(publisher.publish("c1", "x").await);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let publisher = StreamPublisher::new(Arc::new(FailingPublisher), "chatgpt");
        assert!(!publisher.publish("c1", "x").await);
    }
}
