//! Common imports for wiring an orchestrator.

pub use crate::config::Config;
pub use crate::error::{Error, ErrorKind};
pub use crate::message::{ChatMessage, FunctionCall, MessageRole};
pub use crate::orchestrator::Orchestrator;
pub use crate::postprocess::{OutputValue, Response};
pub use crate::provider::{CompletionService, MockReply, MockService, OpenAIClient};
pub use crate::publish::{BroadcastTopicPublisher, StreamPublisher, TopicEvent, TopicPublisher};
pub use crate::request::{OutputFormat, RequestSpec, TrimMode};
pub use crate::secrets::{EnvSecretProvider, SecretProvider};
pub use crate::store::{ConversationStore, ListCache, MemoryCache};

#[cfg(feature = "redis")]
pub use crate::publish::RedisTopicPublisher;
#[cfg(feature = "redis")]
pub use crate::store::RedisCache;
