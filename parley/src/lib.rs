#![cfg_attr(docsrs, feature(doc_cfg))]
//! Parley turns stateless completion requests into multi-turn conversations.
//!
//! An [`Orchestrator`] takes a [`RequestSpec`], prepends the cached history of
//! its conversation, calls an LLM completion service (buffered, or streamed
//! with every token forwarded to a pub/sub topic), optionally appends the new
//! exchange to the history, and shapes the answer as text, a number, JSON or
//! schema-bound structured data.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parley::prelude::*;
//!
//! let config = Config::from_env()?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(OpenAIClient::new(EnvSecretProvider.get_secret("openai").await?)?),
//!     ConversationStore::new(Arc::new(MemoryCache::new()), "chatgpt", config.cache_ttl()),
//!     StreamPublisher::new(Arc::new(BroadcastTopicPublisher::new()), "chatgpt"),
//!     &config,
//! );
//! let reply = orchestrator
//!     .handle(RequestSpec::new("Name three colors").with_output_format("json"))
//!     .await?;
//! ```

pub mod builder;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod postprocess;
pub mod prelude;
pub mod provider;
pub mod publish;
pub mod request;
pub mod secrets;
pub mod store;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use message::{ChatMessage, FunctionCall, MessageRole};
pub use orchestrator::Orchestrator;
pub use postprocess::{OutputValue, Response};
pub use request::RequestSpec;
