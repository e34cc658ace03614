//! Server-sent events decoding for streamed chat completions.
//!
//! Only `data:` lines matter. `data: [DONE]` ends the reply; every other
//! payload is a JSON chunk `{"choices":[{"delta":{"content": "..."}}]}`.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use super::DeltaStream;
use crate::{Result, TcmRagError};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data(String),
    Done,
}

/// Incremental line splitter. Bytes may arrive cut anywhere, including
/// inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

fn frame_from_line(line: &[u8]) -> Option<SseFrame> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_MARKER {
        return Some(SseFrame::Done);
    }
    Some(SseFrame::Data(payload.to_string()))
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns the frames of every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = frame_from_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Frame of a trailing line that never got its newline.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        frame_from_line(&rest)
    }
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Text carried by one data payload, if any.
pub fn parse_delta(payload: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload).map_err(|e| {
        TcmRagError::MalformedStream(format!("{} in payload {:?}", e, payload))
    })?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(TcmRagError::RemoteCall(format!("model reported: {}", message)));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|s| !s.is_empty()))
}

struct DeltaState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
    body_ended: bool,
    finished: bool,
}

/// Turn a streamed response body into text deltas.
///
/// The stream ends after `[DONE]`. A body that ends without it, or breaks,
/// yields one `RemoteCall` error; a payload that is not valid JSON yields
/// one `MalformedStream` error. Nothing follows an error.
pub fn delta_stream<S, B, E>(body: S) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DeltaState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        body_ended: false,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(frame) = state.pending.pop_front() {
                match frame {
                    SseFrame::Done => {
                        state.finished = true;
                        return None;
                    }
                    SseFrame::Data(payload) => match parse_delta(&payload) {
                        Ok(Some(text)) => return Some((Ok(text), state)),
                        Ok(None) => continue,
                        Err(e) => {
                            state.finished = true;
                            return Some((Err(e), state));
                        }
                    },
                }
            }

            if state.body_ended {
                state.finished = true;
                return Some((
                    Err(TcmRagError::RemoteCall(
                        "stream ended before [DONE]".to_string(),
                    )),
                    state,
                ));
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let frames = state.decoder.push(bytes.as_ref());
                    state.pending.extend(frames);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(TcmRagError::RemoteCall(format!("stream interrupted: {}", e))),
                        state,
                    ));
                }
                None => {
                    state.body_ended = true;
                    if let Some(frame) = state.decoder.finish() {
                        state.pending.push_back(frame);
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::collect_deltas;

    fn body(parts: Vec<&'static str>) -> impl Stream<Item = std::result::Result<Vec<u8>, String>> {
        futures_util::stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes().to_vec())))
    }

    const FIXTURE: &str = ": keep-alive\n\
        data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
        data: {\"choices\":[{\"delta\":{\"content\":\"四君子汤\"}}]}\n\n\
        data: {\"choices\":[{\"delta\":{\"content\":\"出自《太平惠民和剂局方》。\"}}]}\r\n\r\n\
        data: [DONE]\n\n";

    #[test]
    fn test_decoder_frames() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(FIXTURE.as_bytes());
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3], SseFrame::Done);
        assert!(matches!(&frames[1], SseFrame::Data(p) if p.contains("四君子汤")));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_handles_split_characters() {
        let bytes = "data: {\"choices\":[{\"delta\":{\"content\":\"人参\"}}]}\n".as_bytes();
        let mut decoder = SseDecoder::new();
        // cut inside the first multi-byte character
        let cut = bytes.iter().position(|&b| b >= 0x80).unwrap() + 1;
        assert!(decoder.push(&bytes[..cut]).is_empty());
        let frames = decoder.push(&bytes[cut..]);
        assert_eq!(
            parse_delta(match &frames[0] {
                SseFrame::Data(p) => p,
                SseFrame::Done => panic!("unexpected done"),
            })
            .unwrap()
            .as_deref(),
            Some("人参")
        );
    }

    #[test]
    fn test_parse_delta_variants() {
        assert_eq!(
            parse_delta(r#"{"choices":[{"delta":{"content":"甘草"}}]}"#).unwrap(),
            Some("甘草".to_string())
        );
        assert_eq!(parse_delta(r#"{"choices":[{"delta":{}}]}"#).unwrap(), None);
        assert_eq!(parse_delta(r#"{"choices":[]}"#).unwrap(), None);
        assert!(matches!(
            parse_delta("{not json"),
            Err(TcmRagError::MalformedStream(_))
        ));
        assert!(matches!(
            parse_delta(r#"{"error":{"message":"rate limited"}}"#),
            Err(TcmRagError::RemoteCall(m)) if m.contains("rate limited")
        ));
    }

    #[tokio::test]
    async fn test_delta_stream_fixture() {
        let (a, b) = FIXTURE.split_at(40);
        let text = collect_deltas(delta_stream(body(vec![a, b]))).await.unwrap();
        assert_eq!(text, "四君子汤出自《太平惠民和剂局方》。");
    }

    #[tokio::test]
    async fn test_missing_done_is_remote_error() {
        let stream = delta_stream(body(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"半\"}}]}\n",
        ]));
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "半");
        assert!(matches!(items[1], Err(TcmRagError::RemoteCall(_))));
    }

    #[tokio::test]
    async fn test_malformed_payload_ends_stream() {
        let stream = delta_stream(body(vec!["data: {oops\n", "data: [DONE]\n"]));
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(TcmRagError::MalformedStream(_))));
    }

    #[tokio::test]
    async fn test_transport_error_is_remote_error() {
        let parts: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        let items: Vec<_> = delta_stream(futures_util::stream::iter(parts)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(TcmRagError::RemoteCall(m)) if m.contains("reset")));
    }

    #[tokio::test]
    async fn test_done_without_trailing_newline() {
        let stream = delta_stream(body(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"完\"}}]}\n",
            "data: [DONE]",
        ]));
        assert_eq!(collect_deltas(stream).await.unwrap(), "完");
    }
}
