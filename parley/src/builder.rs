//! Assembly of the outbound completion request.
//!
//! [`RequestBuilder`] merges the fetched history, the optional system context
//! and the new user turn, then decides between a schema-bound function
//! descriptor and the JSON response-format directive.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::message::ChatMessage;
use crate::request::{OutputFormat, RequestSpec};

/// Sampling temperature sent with every request.
pub const TEMPERATURE: f64 = 0.7;

/// Name of the function descriptor wrapping a caller schema.
pub const SCHEMA_FUNCTION_NAME: &str = "user-schema";

/// Suffix appended to queries sent to JSON-mode models.
pub const JSON_INSTRUCTION_SUFFIX: &str = " Structure your answer in JSON format.";

/// A function the model may answer with instead of free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Function name.
    pub name: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
}

/// Response-format directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// The model must answer with a JSON object.
    JsonObject,
}

/// The fully assembled request sent to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Ordered message list.
    pub messages: Vec<ChatMessage>,
    /// Schema-bound function descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionDescriptor>>,
    /// Response-format directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Incremental delivery; set by the dispatcher.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl CompletionParams {
    /// Whether a schema descriptor is attached.
    #[must_use]
    pub fn has_schema(&self) -> bool {
        self.functions.as_ref().is_some_and(|f| !f.is_empty())
    }
}

/// Output of [`RequestBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    /// Parameters for the completion service.
    pub params: CompletionParams,
    /// The user turn exactly as sent, which is also the turn that gets stored.
    pub user_turn: ChatMessage,
}

/// Builds [`CompletionParams`] from a request and its history.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    default_model: String,
    json_mode_models: Vec<String>,
}

impl RequestBuilder {
    /// Create a builder from the deployment configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            default_model: config.default_model.clone(),
            json_mode_models: config.json_mode_models.clone(),
        }
    }

    fn is_json_mode_model(&self, model: &str) -> bool {
        self.json_mode_models.iter().any(|m| m == model)
    }

    /// Assemble the request.
    ///
    /// The system context lands after the history, not necessarily first.
    #[must_use]
    pub fn build(&self, spec: &RequestSpec, history: Vec<ChatMessage>) -> BuiltRequest {
        let model = spec.resolved_model(&self.default_model);
        let json_capable = self.is_json_mode_model(&model);

        let mut messages = history;
        if let Some(context) = &spec.system_context {
            messages.push(ChatMessage::system(context.clone()));
        }

        let mut query = spec.query.clone();
        if json_capable && !query.to_lowercase().contains("json") {
            query.push_str(JSON_INSTRUCTION_SUFFIX);
        }
        let user_turn = ChatMessage::user(query);
        messages.push(user_turn.clone());

        let functions = spec.schema.as_ref().map(|schema| {
            vec![FunctionDescriptor {
                name: SCHEMA_FUNCTION_NAME.to_string(),
                parameters: schema.clone(),
            }]
        });

        let response_format = (spec.output_format() == OutputFormat::Json
            && functions.is_none()
            && json_capable)
            .then_some(ResponseFormat::JsonObject);

        debug!(
            model = %model,
            messages = messages.len(),
            schema = functions.is_some(),
            json_mode = response_format.is_some(),
            "built completion request"
        );

        BuiltRequest {
            params: CompletionParams {
                model,
                temperature: TEMPERATURE,
                messages,
                functions,
                response_format,
                stream: false,
            },
            user_turn,
        }
    }
}
