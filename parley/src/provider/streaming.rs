//! Server-Sent Events parsing for streamed completions.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::error::ServiceError;

/// Splits an SSE byte stream into `data:` payloads.
///
/// Lines are buffered as bytes so that multi-byte characters split across
/// network chunks survive. Comments and other fields are skipped; the
/// `[DONE]` marker ends the stream.
#[derive(Debug)]
pub struct SseStreamParser<S> {
    inner: S,
    buffer: Vec<u8>,
    finished: bool,
}

impl<S> SseStreamParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    /// Create a new SSE stream parser.
    pub const fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Take the next complete line out of the buffer.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Parse an SSE data line, stripping the `data:` prefix.
#[must_use]
pub(crate) fn parse_sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    trimmed.strip_prefix("data:").map(str::trim_start)
}

/// Check if the data indicates stream completion.
#[must_use]
pub(crate) fn is_done_marker(data: &str) -> bool {
    data.trim() == "[DONE]"
}

impl<S> Stream for SseStreamParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, ServiceError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(line) = self.next_line() {
                if let Some(data) = parse_sse_data(&line) {
                    if is_done_marker(data) {
                        self.finished = true;
                        self.buffer.clear();
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Ok(data.to_string())));
                }
                continue;
            }

            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(ServiceError::from(e))));
                }
                Poll::Ready(None) => {
                    // Flush a trailing line without a newline.
                    self.finished = true;
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn parser(
        chunks: Vec<&'static [u8]>,
    ) -> SseStreamParser<impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin> {
        SseStreamParser::new(futures::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[test]
    fn test_parse_sse_data() {
        assert_eq!(parse_sse_data("data: hello"), Some("hello"));
        assert_eq!(parse_sse_data("data:hello"), Some("hello"));
        assert_eq!(parse_sse_data("data: [DONE]"), Some("[DONE]"));
        assert_eq!(parse_sse_data(""), None);
        assert_eq!(parse_sse_data(": keep-alive"), None);
        assert_eq!(parse_sse_data("event: message"), None);
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(is_done_marker("  [DONE]  "));
        assert!(!is_done_marker("done"));
        assert!(!is_done_marker("{}"));
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let chunks: Vec<&[u8]> = vec![&b"data: {\"a\""[..], &b":1}\n\nda"[..], &b"ta: {\"b\":2}\n\n"[..]];
        let items: Vec<String> = parser(chunks).map(Result::unwrap).collect().await;
        assert_eq!(items, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        // "é" is 0xC3 0xA9.
        let chunks: Vec<&[u8]> = vec![&b"data: caf\xC3"[..], &b"\xA9\n\n"[..]];
        let items: Vec<String> = parser(chunks).map(Result::unwrap).collect().await;
        assert_eq!(items, vec!["café"]);
    }

    #[tokio::test]
    async fn test_done_marker_ends_stream() {
        let chunks: Vec<&[u8]> = vec![&b": ping\n"[..], &b"data: x\n\ndata: [DONE]\n\n"[..], &b"data: y\n\n"[..]];
        let mut stream = parser(chunks);
        assert_eq!(stream.next().await.unwrap().unwrap(), "x");
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let chunks: Vec<&[u8]> = vec![&b"data: x\n\n"[..], &b"data: y"[..]];
        let items: Vec<String> = parser(chunks).map(Result::unwrap).collect().await;
        assert_eq!(items, vec!["x", "y"]);
    }
}
