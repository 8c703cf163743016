//! The request handler.
//!
//! [`Orchestrator::handle`] runs one request through the pipeline:
//!
//! 1. fetch the conversation history
//! 2. build the completion request
//! 3. dispatch it, buffered or streamed
//! 4. append the turn when asked to remember it
//! 5. shape the output
//!
//! Stages run strictly in sequence. Two concurrent requests on the same key
//! may both read the same history before either appends.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::builder::RequestBuilder;
use crate::config::Config;
use crate::dispatch::CompletionDispatcher;
use crate::error::{Error, Result};
use crate::postprocess::{self, Response};
use crate::provider::CompletionService;
use crate::publish::StreamPublisher;
use crate::request::RequestSpec;
use crate::store::ConversationStore;

/// Conversation-augmented completion orchestrator.
///
/// Collaborators are created once and injected; the orchestrator itself is
/// cheap to clone and can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    store: ConversationStore,
    builder: RequestBuilder,
    dispatcher: CompletionDispatcher,
}

impl Orchestrator {
    /// Wire an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        service: Arc<dyn CompletionService>,
        store: ConversationStore,
        publisher: StreamPublisher,
        config: &Config,
    ) -> Self {
        Self {
            store,
            builder: RequestBuilder::new(config),
            dispatcher: CompletionDispatcher::new(service, publisher),
        }
    }

    /// Serve one request.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] when streaming is asked for without a
    ///   conversation key; nothing is fetched or sent in that case
    /// - [`Error::Store`] when the history cannot be read or appended
    /// - [`Error::Completion`] for classified completion failures; a failed
    ///   exchange is never stored
    /// - [`Error::Output`] when the output cannot be shaped as requested
    #[instrument(
        skip_all,
        fields(
            key = spec.conversation_key().unwrap_or(""),
            stream = spec.stream_response,
            remember = spec.remember_response,
        )
    )]
    pub async fn handle(&self, spec: RequestSpec) -> Result<Response> {
        let key = spec.conversation_key();
        if spec.stream_response && key.is_none() {
            return Err(Error::invalid_request(
                "streamResponse requires a conversationKey to publish to",
            ));
        }

        let history = self.store.fetch_history(key).await?;
        debug!(history = history.len(), "fetched history");

        let built = self.builder.build(&spec, history);
        let topic = key.filter(|_| spec.stream_response);
        let dispatched = self.dispatcher.dispatch(&built.params, topic).await?;

        let stored = self
            .store
            .append_turn(key, spec.remember_response, &built.user_turn, &dispatched.message)
            .await?;

        let response = postprocess::process(&dispatched.message, &spec)?;
        info!(
            model = %built.params.model,
            stored,
            published = dispatched.stream.map_or(0, |s| s.published),
            dropped = dispatched.stream.map_or(0, |s| s.dropped_chunks),
            "request served"
        );
        Ok(Response { response })
    }
}
