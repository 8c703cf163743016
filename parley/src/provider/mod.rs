//! Completion service abstraction.
//!
//! A [`CompletionService`] answers a [`CompletionParams`] either in one piece
//! ([`complete`](CompletionService::complete)) or as a lazy, finite stream of
//! [`ChunkDelta`]s ([`complete_stream`](CompletionService::complete_stream)).
//! [`MessageAccumulator`] reduces a delta stream back into the message the
//! buffered call would have returned.
//!
//! # Implementations
//!
//! - [`OpenAIClient`] - Chat Completions over HTTP with SSE streaming
//! - [`MockService`] - scripted replies for tests and offline runs

mod mock;
mod openai;
mod streaming;

pub use mock::{MockReply, MockService};
pub use openai::{OPENAI_API_BASE_URL, OpenAIClient, OpenAIClientBuilder};
pub use streaming::SseStreamParser;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::builder::CompletionParams;
use crate::error::ServiceError;
use crate::message::{ChatMessage, FunctionCall, MessageRole};

/// Stream of incremental completion deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ChunkDelta, ServiceError>> + Send>>;

/// Partial function call carried by a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    /// Name fragment, usually sent once in the first delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role, present on the first delta only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Text fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Function call fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDelta>,
}

impl ChunkDelta {
    /// A delta carrying only text.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A delta carrying only a function call fragment.
    #[must_use]
    pub fn call(name: Option<String>, arguments: Option<String>) -> Self {
        Self {
            function_call: Some(FunctionCallDelta { name, arguments }),
            ..Self::default()
        }
    }

    /// Non-empty text fragment, if any.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}

/// Folds streamed deltas into a final assistant message.
#[derive(Debug, Clone, Default)]
pub struct MessageAccumulator {
    content: String,
    call_name: Option<String>,
    call_arguments: String,
    deltas: usize,
}

impl MessageAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta.
    pub fn push(&mut self, delta: &ChunkDelta) {
        self.deltas += 1;
        if let Some(text) = &delta.content {
            self.content.push_str(text);
        }
        if let Some(call) = &delta.function_call {
            if let Some(name) = &call.name {
                self.call_name.get_or_insert_with(String::new).push_str(name);
            }
            if let Some(arguments) = &call.arguments {
                self.call_name.get_or_insert_with(String::new);
                self.call_arguments.push_str(arguments);
            }
        }
    }

    /// Number of deltas folded so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.deltas
    }

    /// Whether no delta has been folded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.deltas == 0
    }

    /// The reduced message.
    #[must_use]
    pub fn finish(self) -> ChatMessage {
        match self.call_name {
            Some(name) => ChatMessage {
                role: MessageRole::Assistant,
                content: (!self.content.is_empty()).then_some(self.content),
                function_call: Some(FunctionCall {
                    name,
                    arguments: self.call_arguments,
                }),
            },
            None => ChatMessage::assistant(self.content),
        }
    }
}

/// An upstream LLM completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Provider name used in logs (e.g., `"openai"`).
    fn provider(&self) -> &'static str;

    /// Send the request and return the first choice's message.
    async fn complete(&self, params: &CompletionParams) -> Result<ChatMessage, ServiceError>;

    /// Open an incremental completion.
    ///
    /// Deltas arrive in generation order; the stream ends after the last one.
    async fn complete_stream(&self, params: &CompletionParams) -> Result<DeltaStream, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_text() {
        let mut acc = MessageAccumulator::new();
        acc.push(&ChunkDelta {
            role: Some(MessageRole::Assistant),
            ..ChunkDelta::default()
        });
        acc.push(&ChunkDelta::text("Hel"));
        acc.push(&ChunkDelta::text("lo"));
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.finish(), ChatMessage::assistant("Hello"));
    }

    #[test]
    fn test_empty_stream_yields_empty_text() {
        let acc = MessageAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.finish(), ChatMessage::assistant(""));
    }

    #[test]
    fn test_accumulates_function_call() {
        let mut acc = MessageAccumulator::new();
        acc.push(&ChunkDelta::call(Some("user-schema".into()), Some(String::new())));
        acc.push(&ChunkDelta::call(None, Some(r#"{"n":"#.into())));
        acc.push(&ChunkDelta::call(None, Some("4}".into())));

        assert_eq!(
            acc.finish(),
            ChatMessage::assistant_call(FunctionCall::new("user-schema", r#"{"n":4}"#))
        );
    }

    #[test]
    fn test_text_content_skips_empty() {
        assert_eq!(ChunkDelta::text("").text_content(), None);
        assert_eq!(ChunkDelta::text("a").text_content(), Some("a"));
        assert_eq!(ChunkDelta::default().text_content(), None);
    }
}
