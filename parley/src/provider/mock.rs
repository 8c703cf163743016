//! Scripted completion service.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{ChunkDelta, CompletionService, DeltaStream, MessageAccumulator};
use crate::builder::CompletionParams;
use crate::error::ServiceError;
use crate::message::ChatMessage;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Plain text, streamed one token per delta.
    Tokens(Vec<String>),
    /// A function call whose arguments are streamed in chunks.
    Call {
        /// Function name.
        name: String,
        /// Argument fragments, concatenated for buffered calls.
        argument_chunks: Vec<String>,
    },
    /// Fail before anything is produced.
    Fail(ServiceError),
    /// Stream `tokens`, then fail. Buffered calls fail outright.
    FailMidStream {
        /// Tokens delivered before the failure.
        tokens: Vec<String>,
        /// The failure.
        error: ServiceError,
    },
}

impl MockReply {
    /// A text reply delivered as a single token.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Tokens(vec![text.into()])
    }

    /// A text reply split into the given tokens.
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }

    /// A function call reply with arguments delivered in one chunk.
    #[must_use]
    pub fn call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::Call {
            name: name.into(),
            argument_chunks: vec![arguments.into()],
        }
    }

    fn deltas(self) -> Vec<Result<ChunkDelta, ServiceError>> {
        match self {
            Self::Tokens(tokens) => tokens.into_iter().map(|t| Ok(ChunkDelta::text(t))).collect(),
            Self::Call {
                name,
                argument_chunks,
            } => std::iter::once(Ok(ChunkDelta::call(Some(name), Some(String::new()))))
                .chain(
                    argument_chunks
                        .into_iter()
                        .map(|chunk| Ok(ChunkDelta::call(None, Some(chunk)))),
                )
                .collect(),
            Self::Fail(error) => vec![Err(error)],
            Self::FailMidStream { tokens, error } => tokens
                .into_iter()
                .map(|t| Ok(ChunkDelta::text(t)))
                .chain(std::iter::once(Err(error)))
                .collect(),
        }
    }
}

/// A [`CompletionService`] answering from a queue of [`MockReply`]s.
///
/// Each call, buffered or streamed, consumes the next reply and records the
/// parameters it was given. An empty queue fails with a transport error.
#[derive(Debug, Default)]
pub struct MockService {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<CompletionParams>>,
}

impl MockService {
    /// Create a service with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply, builder style.
    #[must_use]
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push(reply);
        self
    }

    /// Queue a reply.
    pub fn push(&self, reply: MockReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Parameters of every call so far, oldest first.
    pub fn calls(&self) -> Vec<CompletionParams> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_reply(&self, params: &CompletionParams) -> Result<MockReply, ServiceError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.clone());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ServiceError::transport("no scripted reply left"))
    }
}

#[async_trait]
impl CompletionService for MockService {
    fn provider(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, params: &CompletionParams) -> Result<ChatMessage, ServiceError> {
        let mut acc = MessageAccumulator::new();
        for delta in self.next_reply(params)?.deltas() {
            acc.push(&delta?);
        }
        Ok(acc.finish())
    }

    async fn complete_stream(&self, params: &CompletionParams) -> Result<DeltaStream, ServiceError> {
        let reply = self.next_reply(params)?;
        if let MockReply::Fail(error) = reply {
            return Err(error);
        }
        Ok(Box::pin(futures::stream::iter(reply.deltas())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FunctionCall;
    use futures::StreamExt;

    fn params() -> CompletionParams {
        CompletionParams {
            model: "gpt-4-0613".into(),
            temperature: 0.7,
            messages: vec![ChatMessage::user("hi")],
            functions: None,
            response_format: None,
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_buffered_concatenates_tokens() {
        let service = MockService::new().with_reply(MockReply::tokens(["Hel", "lo"]));
        let message = service.complete(&params()).await.unwrap();
        assert_eq!(message, ChatMessage::assistant("Hello"));
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_streamed_call_chunks() {
        let service = MockService::new().with_reply(MockReply::Call {
            name: "user-schema".into(),
            argument_chunks: vec!["{\"n\":".into(), "4}".into()],
        });
        let deltas: Vec<ChunkDelta> = service
            .complete_stream(&params())
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(deltas.len(), 3);

        let mut acc = MessageAccumulator::new();
        deltas.iter().for_each(|d| acc.push(d));
        assert_eq!(
            acc.finish(),
            ChatMessage::assistant_call(FunctionCall::new("user-schema", "{\"n\":4}"))
        );
    }

    #[tokio::test]
    async fn test_fail_and_exhaustion() {
        let service = MockService::new().with_reply(MockReply::Fail(ServiceError::transport("boom")));
        assert_eq!(
            service.complete(&params()).await.unwrap_err().message,
            "boom"
        );
        assert_eq!(
            service.complete(&params()).await.unwrap_err().message,
            "no scripted reply left"
        );
    }
}
