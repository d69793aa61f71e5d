//! # SSE line parser
//!
//! Turns a chunked byte stream into the `data:` payloads of a Server-Sent
//! Events response. Comments (keep-alives) and blank separator lines are
//! skipped. A read error is yielded once and ends the stream.

use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::errors::ClientError;

/// Parse SSE `data:` payloads from a byte stream.
pub fn parse_sse_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        warn!("skipping non UTF-8 SSE line");
                        continue;
                    };
                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!("SSE stream read error: {e}");
                        let err = ClientError::Transport(e.to_string());
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    None => return None,
                }
            }
        },
    )
}

/// Extract the payload of a `data:` line; `None` for anything else.
fn extract_sse_data(line: &str) -> Option<String> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?;
    if data.trim().is_empty() {
        return None;
    }
    Some(data.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    /// Owned chunk stream; borrows nothing from `parts`.
    fn chunks(
        parts: &[&'static str],
    ) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + Unpin + use<> {
        let owned: Vec<Result<Bytes, Infallible>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        futures::stream::iter(owned)
    }

    async fn collect(parts: &[&'static str]) -> Vec<String> {
        parse_sse_lines(chunks(parts))
            .map(Result::unwrap)
            .collect()
            .await
    }

    // ── extract_sse_data ────────────────────────────────────────────

    #[test]
    fn extract_data_line() {
        assert_eq!(extract_sse_data(r#"data: {"a":1}"#), Some(r#"{"a":1}"#.into()));
        assert_eq!(extract_sse_data(r#"data:{"a":1}"#), Some(r#"{"a":1}"#.into()));
    }

    #[test]
    fn extract_skips_comments_and_blanks() {
        assert_eq!(extract_sse_data(":keep-alive"), None);
        assert_eq!(extract_sse_data(""), None);
        assert_eq!(extract_sse_data("data: "), None);
        assert_eq!(extract_sse_data("event: message"), None);
    }

    // ── parse_sse_lines ─────────────────────────────────────────────

    #[tokio::test]
    async fn frames_split_across_chunks() {
        let out = collect(&["data: {\"x\"", ":1}\n\n:\n\ndata: 2\n", "\n"]).await;
        assert_eq!(out, vec![r#"{"x":1}"#, "2"]);
    }

    #[tokio::test]
    async fn crlf_line_endings() {
        let out = collect(&["data: a\r\n\r\ndata: b\r\n\r\n"]).await;
        assert_eq!(out, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn trailing_partial_line_is_dropped() {
        let out = collect(&["data: a\n\ndata: incomplete"]).await;
        assert_eq!(out, vec!["a"]);
    }

    #[tokio::test]
    async fn read_error_is_yielded_once() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err("connection reset"),
            Ok(Bytes::from_static(b"data: b\n\n")),
        ]);
        let out: Vec<Result<String, ClientError>> = parse_sse_lines(stream).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref().unwrap(), "a");
        assert!(matches!(&out[1], Err(ClientError::Transport(m)) if m == "connection reset"));
    }
}
