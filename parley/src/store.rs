//! Conversation history persistence.
//!
//! [`ConversationStore`] keeps one list-valued cache entry per conversation
//! key. Each element is one JSON-encoded [`ChatMessage`]; the list is only
//! ever appended to, and every append refreshes the entry's time-to-live.
//!
//! The backing store is abstracted by [`ListCache`]:
//!
//! - [`MemoryCache`] - process-local, for tests and single-process use
//! - [`RedisCache`] - `LRANGE` / `RPUSH` + `EXPIRE` (feature `redis`)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::message::ChatMessage;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A list-valued cache with per-entry expiry.
#[async_trait]
pub trait ListCache: Send + Sync {
    /// Fetch the whole list. `Ok(None)` on a miss or an expired entry.
    async fn fetch_list(&self, namespace: &str, key: &str) -> StoreResult<Option<Vec<String>>>;

    /// Append `values` to the tail of the list, creating it if needed, and
    /// reset its time-to-live to `ttl`.
    async fn append_list(
        &self,
        namespace: &str,
        key: &str,
        values: Vec<String>,
        ttl: Duration,
    ) -> StoreResult<()>;
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug)]
struct CacheEntry {
    values: Vec<String>,
    expires_at: Instant,
}

/// In-memory [`ListCache`].
///
/// Fast but not shared across processes. Expired entries are dropped lazily on
/// the next access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListCache for MemoryCache {
    async fn fetch_list(&self, namespace: &str, key: &str) -> StoreResult<Option<Vec<String>>> {
        let cache_key = (namespace.to_string(), key.to_string());
        let mut entries = self.entries.write().await;
        match entries.get(&cache_key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.values.clone()));
            }
            Some(_) => {}
        }
        entries.remove(&cache_key);
        Ok(None)
    }

    async fn append_list(
        &self,
        namespace: &str,
        key: &str,
        values: Vec<String>,
        ttl: Duration,
    ) -> StoreResult<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| StoreError::backend("memory", format!("ttl out of range: {ttl:?}")))?;
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry((namespace.to_string(), key.to_string()))
            .or_insert_with(|| CacheEntry {
                values: Vec::new(),
                expires_at: now,
            });
        if entry.expires_at <= now {
            entry.values.clear();
        }
        entry.values.extend(values);
        entry.expires_at = expires_at;
        Ok(())
    }
}

// ============================================================================
// Redis backend
// ============================================================================

#[cfg(feature = "redis")]
pub use self::redis_backend::RedisCache;

#[cfg(feature = "redis")]
mod redis_backend {
    use super::{Duration, ListCache, StoreError, StoreResult, async_trait};
    use redis::AsyncCommands;

    /// Redis-backed [`ListCache`].
    ///
    /// The list for `(namespace, key)` lives at `"{namespace}:{key}"`.
    #[derive(Clone)]
    pub struct RedisCache {
        connection: redis::aio::ConnectionManager,
    }

    impl std::fmt::Debug for RedisCache {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisCache").finish_non_exhaustive()
        }
    }

    impl RedisCache {
        /// Connect to the server at `url`.
        pub async fn connect(url: &str) -> StoreResult<Self> {
            let client = redis::Client::open(url)?;
            let connection = client.get_connection_manager().await?;
            Ok(Self { connection })
        }

        /// Wrap an existing connection manager.
        #[must_use]
        pub const fn from_connection(connection: redis::aio::ConnectionManager) -> Self {
            Self { connection }
        }

        fn list_key(namespace: &str, key: &str) -> String {
            format!("{namespace}:{key}")
        }
    }

    #[async_trait]
    impl ListCache for RedisCache {
        async fn fetch_list(
            &self,
            namespace: &str,
            key: &str,
        ) -> StoreResult<Option<Vec<String>>> {
            let mut conn = self.connection.clone();
            let values: Vec<String> = conn.lrange(Self::list_key(namespace, key), 0, -1).await?;
            Ok(if values.is_empty() { None } else { Some(values) })
        }

        async fn append_list(
            &self,
            namespace: &str,
            key: &str,
            values: Vec<String>,
            ttl: Duration,
        ) -> StoreResult<()> {
            let list_key = Self::list_key(namespace, key);
            let ttl_secs = i64::try_from(ttl.as_secs())
                .map_err(|_| StoreError::backend("redis", format!("ttl out of range: {ttl:?}")))?;
            let mut conn = self.connection.clone();
            redis::pipe()
                .atomic()
                .rpush(&list_key, values)
                .ignore()
                .expire(&list_key, ttl_secs)
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;
            Ok(())
        }
    }
}

// ============================================================================
// Conversation store
// ============================================================================

/// Reads and appends conversation histories.
#[derive(Clone)]
pub struct ConversationStore {
    cache: Arc<dyn ListCache>,
    namespace: String,
    ttl: Duration,
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ConversationStore {
    /// Create a store over `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn ListCache>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            ttl,
        }
    }

    /// Namespace of the cached lists.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fetch the ordered history for `key`.
    ///
    /// Returns an empty history when `key` is absent or nothing is stored.
    /// A malformed element aborts with [`StoreError::Deserialization`].
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn fetch_history(&self, key: Option<&str>) -> StoreResult<Vec<ChatMessage>> {
        let Some(key) = key else {
            return Ok(Vec::new());
        };
        let Some(raw) = self.cache.fetch_list(&self.namespace, key).await? else {
            debug!("history miss");
            return Ok(Vec::new());
        };

        let messages = raw
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                serde_json::from_str(entry)
                    .map_err(|source| StoreError::Deserialization { index, source })
            })
            .collect::<StoreResult<Vec<ChatMessage>>>()?;
        debug!(messages = messages.len(), "history hit");
        Ok(messages)
    }

    /// Append a user turn and its answer, in that order.
    ///
    /// Does nothing unless `key` is present and `remember` is set. Returns
    /// whether anything was written.
    #[instrument(skip(self, user, assistant), fields(namespace = %self.namespace))]
    pub async fn append_turn(
        &self,
        key: Option<&str>,
        remember: bool,
        user: &ChatMessage,
        assistant: &ChatMessage,
    ) -> StoreResult<bool> {
        let Some(key) = key.filter(|_| remember) else {
            return Ok(false);
        };
        let values = vec![serde_json::to_string(user)?, serde_json::to_string(assistant)?];
        self.cache
            .append_list(&self.namespace, key, values, self.ttl)
            .await?;
        debug!(ttl_secs = self.ttl.as_secs(), "appended turn");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FunctionCall;

    fn store_with(cache: Arc<MemoryCache>) -> ConversationStore {
        ConversationStore::new(cache, "chatgpt", Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_absent_key_is_empty() {
        let store = store_with(Arc::new(MemoryCache::new()));
        assert!(store.fetch_history(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_miss_is_empty() {
        let store = store_with(Arc::new(MemoryCache::new()));
        assert!(store.fetch_history(Some("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_then_fetch_preserves_order() {
        let store = store_with(Arc::new(MemoryCache::new()));
        let key = Some("c1");

        let first = (ChatMessage::user("u1"), ChatMessage::assistant("a1"));
        let second = (
            ChatMessage::user("u2"),
            ChatMessage::assistant_call(FunctionCall::new("user-schema", "{}")),
        );

        assert!(store.append_turn(key, true, &first.0, &first.1).await.unwrap());
        let history = store.fetch_history(key).await.unwrap();
        assert!(store.append_turn(key, true, &second.0, &second.1).await.unwrap());

        let mut expected = history;
        expected.extend([second.0, second.1]);
        assert_eq!(store.fetch_history(key).await.unwrap(), expected);
        assert_eq!(expected.len(), 4);
        assert_eq!(expected[0], first.0);
    }

    #[tokio::test]
    async fn test_append_requires_key_and_remember() {
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(Arc::clone(&cache));
        let (u, a) = (ChatMessage::user("u"), ChatMessage::assistant("a"));

        assert!(!store.append_turn(None, true, &u, &a).await.unwrap());
        assert!(!store.append_turn(Some("k"), false, &u, &a).await.unwrap());
        assert!(store.fetch_history(Some("k")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entry_is_fatal() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .append_list(
                "chatgpt",
                "bad",
                vec![
                    r#"{"role":"user","content":"ok"}"#.to_string(),
                    "not json".to_string(),
                ],
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let store = store_with(cache);
        let err = store.fetch_history(Some("bad")).await.unwrap_err();
        assert!(matches!(err, StoreError::Deserialization { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let cache = Arc::new(MemoryCache::new());
        let ttl = Duration::from_secs(60);
        let a = ConversationStore::new(Arc::<MemoryCache>::clone(&cache), "a", ttl);
        let b = ConversationStore::new(cache, "b", ttl);

        let (u, x) = (ChatMessage::user("u"), ChatMessage::assistant("x"));
        a.append_turn(Some("k"), true, &u, &x).await.unwrap();
        assert!(b.fetch_history(Some("k")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_an_error() {
        let cache = Arc::new(MemoryCache::new());
        let store = ConversationStore::new(
            Arc::<MemoryCache>::clone(&cache),
            "chatgpt",
            Duration::from_secs(u64::MAX),
        );
        let (u, a) = (ChatMessage::user("u"), ChatMessage::assistant("a"));

        let err = store.append_turn(Some("k"), true, &u, &a).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { backend: "memory", .. }));
        assert_eq!(cache.fetch_list("chatgpt", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry_and_refresh() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_millis(80);

        cache
            .append_list("ns", "k", vec!["1".into()], ttl)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache
            .append_list("ns", "k", vec!["2".into()], ttl)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The second write refreshed the TTL, so both values survive.
        assert_eq!(
            cache.fetch_list("ns", "k").await.unwrap(),
            Some(vec!["1".to_string(), "2".to_string()])
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.fetch_list("ns", "k").await.unwrap(), None);
    }
}
