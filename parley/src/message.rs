//! Chat message types shared by the store, the request builder and the
//! completion service.
//!
//! Messages use the Chat Completions wire shape so that a cached history entry
//! can be sent back to the service verbatim:
//!
//! ```json
//! {"role":"user","content":"Hello"}
//! {"role":"assistant","content":null,"function_call":{"name":"user-schema","arguments":"{}"}}
//! ```

use serde::{Deserialize, Serialize};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions that frame the conversation.
    System,
    /// A turn written by the caller.
    User,
    /// A turn produced by the completion service.
    Assistant,
}

impl MessageRole {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured call returned in place of free text when a schema is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function descriptor the model chose.
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

impl FunctionCall {
    /// Create a new function call.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: MessageRole,
    /// Text content. `None` when the assistant answered with a structured call.
    #[serde(default)]
    pub content: Option<String>,
    /// Structured call, present only on assistant messages answering a schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ChatMessage {
    /// Create a text message with the given role.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            function_call: None,
        }
    }

    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant text message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create an assistant message carrying a structured call.
    #[must_use]
    pub const fn assistant_call(call: FunctionCall) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            function_call: Some(call),
        }
    }

    /// Text content, or the empty string when absent.
    #[must_use]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Whether this message carries a structured call.
    #[must_use]
    pub const fn is_function_call(&self) -> bool {
        self.function_call.is_some()
    }
}
