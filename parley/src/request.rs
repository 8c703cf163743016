//! The caller-facing request object.
//!
//! A [`RequestSpec`] is the single structured input of the orchestrator. It
//! deserializes from the camelCase JSON payload callers send:
//!
//! ```json
//! {
//!   "query": "List three colors",
//!   "systemContext": "You are terse.",
//!   "outputFormat": "json",
//!   "conversationKey": "user-42",
//!   "rememberResponse": true,
//!   "streamResponse": false,
//!   "model": "gpt-4-1106-preview"
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied intent for a single turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    /// The new user turn.
    pub query: String,
    /// Optional system context appended after the history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_context: Option<String>,
    /// Optional JSON schema; when present the model answers with a structured call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Output format tag: `json`, `number`, anything else is text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Stream tokens to the conversation topic as they arrive.
    #[serde(default)]
    pub stream_response: bool,
    /// Drop the first paragraph and the last two.
    #[serde(default)]
    pub trim: bool,
    /// Drop only the first paragraph.
    #[serde(default)]
    pub trim_front: bool,
    /// Persist this turn into the conversation history.
    #[serde(default)]
    pub remember_response: bool,
    /// Model identifier; the configured default is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Conversation scope; absence means single-turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_key: Option<String>,
}

impl RequestSpec {
    /// Create a request for the given query with every option unset.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Set the system context.
    #[must_use]
    pub fn with_system_context(mut self, context: impl Into<String>) -> Self {
        self.system_context = Some(context.into());
        self
    }

    /// Set the output schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the output format tag.
    #[must_use]
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the conversation key.
    #[must_use]
    pub fn with_conversation_key(mut self, key: impl Into<String>) -> Self {
        self.conversation_key = Some(key.into());
        self
    }

    /// Enable or disable streaming.
    #[must_use]
    pub const fn with_stream(mut self, stream: bool) -> Self {
        self.stream_response = stream;
        self
    }

    /// Enable or disable persistence of this turn.
    #[must_use]
    pub const fn with_remember(mut self, remember: bool) -> Self {
        self.remember_response = remember;
        self
    }

    /// Select a trimming mode.
    #[must_use]
    pub const fn with_trim_mode(mut self, mode: TrimMode) -> Self {
        self.trim = matches!(mode, TrimMode::Trim);
        self.trim_front = matches!(mode, TrimMode::TrimFront);
        self
    }

    /// Parsed output format.
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
            .as_deref()
            .map_or(OutputFormat::Text, OutputFormat::parse)
    }

    /// Effective trimming mode; `trim` wins when both flags are set.
    #[must_use]
    pub const fn trim_mode(&self) -> TrimMode {
        if self.trim {
            TrimMode::Trim
        } else if self.trim_front {
            TrimMode::TrimFront
        } else {
            TrimMode::None
        }
    }

    /// Lower-cased model identifier, falling back to `default_model`.
    #[must_use]
    pub fn resolved_model(&self, default_model: &str) -> String {
        self.model
            .as_deref()
            .unwrap_or(default_model)
            .to_lowercase()
    }

    /// Conversation key, treating the empty string as absent.
    #[must_use]
    pub fn conversation_key(&self) -> Option<&str> {
        self.conversation_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Whether both a key and the remember flag are present.
    #[must_use]
    pub fn should_remember(&self) -> bool {
        self.remember_response && self.conversation_key().is_some()
    }
}

/// How the final text is coerced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Text, unchanged.
    #[default]
    Text,
    /// Parsed as a JSON value.
    Json,
    /// Numeric coercion.
    Number,
}

impl OutputFormat {
    /// Parse a format tag case-insensitively; unknown tags mean text.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "number" => Self::Number,
            _ => Self::Text,
        }
    }
}

/// Paragraph trimming heuristic applied to free-text output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrimMode {
    /// No trimming.
    #[default]
    None,
    /// Drop the first paragraph and the last two.
    Trim,
    /// Drop the first paragraph.
    TrimFront,
}
