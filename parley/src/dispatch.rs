//! Buffered and streamed invocation of the completion service.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, instrument};

use crate::builder::CompletionParams;
use crate::classify::classify;
use crate::error::CompletionError;
use crate::message::ChatMessage;
use crate::provider::{CompletionService, MessageAccumulator};
use crate::publish::StreamPublisher;

/// Delivery statistics of one streamed completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Fragments delivered to the topic.
    pub published: usize,
    /// Fragments whose publish failed.
    pub dropped_chunks: usize,
}

/// Result of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    /// The final assistant message.
    pub message: ChatMessage,
    /// Present for streamed dispatches only.
    pub stream: Option<StreamOutcome>,
}

/// Invokes a [`CompletionService`] and classifies its failures.
#[derive(Clone)]
pub struct CompletionDispatcher {
    service: Arc<dyn CompletionService>,
    publisher: StreamPublisher,
}

impl std::fmt::Debug for CompletionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionDispatcher")
            .field("provider", &self.service.provider())
            .field("publisher", &self.publisher)
            .finish()
    }
}

impl CompletionDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(service: Arc<dyn CompletionService>, publisher: StreamPublisher) -> Self {
        Self { service, publisher }
    }

    /// Buffered completion.
    #[instrument(skip_all, fields(provider = self.service.provider(), model = %params.model))]
    pub async fn complete(&self, params: &CompletionParams) -> Result<ChatMessage, CompletionError> {
        let message = self.service.complete(params).await.map_err(classify)?;
        debug!(function_call = message.is_function_call(), "buffered completion done");
        Ok(message)
    }

    /// Streamed completion.
    ///
    /// Every delta with non-empty text is published to `topic` before the
    /// next one is read. Fragments already published stay published when the
    /// stream fails.
    #[instrument(skip_all, fields(provider = self.service.provider(), model = %params.model, topic = %topic))]
    pub async fn complete_streamed(
        &self,
        params: &CompletionParams,
        topic: &str,
    ) -> Result<(ChatMessage, StreamOutcome), CompletionError> {
        let mut params = params.clone();
        params.stream = true;

        let mut stream = self
            .service
            .complete_stream(&params)
            .await
            .map_err(classify)?;

        let mut acc = MessageAccumulator::new();
        let mut outcome = StreamOutcome::default();
        while let Some(delta) = stream.next().await {
            let delta = delta.map_err(classify)?;
            if let Some(text) = delta.text_content() {
                if self.publisher.publish(topic, text).await {
                    outcome.published += 1;
                } else {
                    outcome.dropped_chunks += 1;
                }
            }
            acc.push(&delta);
        }

        debug!(
            deltas = acc.len(),
            published = outcome.published,
            dropped = outcome.dropped_chunks,
            "stream finished"
        );
        Ok((acc.finish(), outcome))
    }

    /// Buffered or streamed, depending on whether a topic is given.
    pub async fn dispatch(
        &self,
        params: &CompletionParams,
        topic: Option<&str>,
    ) -> Result<Dispatched, CompletionError> {
        match topic {
            Some(topic) => {
                let (message, outcome) = self.complete_streamed(params, topic).await?;
                Ok(Dispatched {
                    message,
                    stream: Some(outcome),
                })
            }
            None => Ok(Dispatched {
                message: self.complete(params).await?,
                stream: None,
            }),
        }
    }
}
