//! Remote chat model access: turn types, the `ChatModel` seam, SSE decoding
//! and the OpenAI-compatible HTTP client.

mod client;
mod sse;

pub use client::ChatClient;
pub use sse::{delta_stream, parse_delta, SseDecoder, SseFrame};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn, serialized as `{"role", "content"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Length in characters, the unit all context budgets use.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Text deltas of one streamed completion, in arrival order.
pub type DeltaStream = BoxStream<'static, Result<String>>;

/// A chat completion endpoint that streams its reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `turns` and return the reply as a stream of deltas. An error in
    /// the middle of the stream arrives as an `Err` item.
    async fn stream_chat(&self, turns: &[Turn]) -> Result<DeltaStream>;
}

/// Drain a delta stream into one string; the first error wins.
pub async fn collect_deltas(mut stream: DeltaStream) -> Result<String> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        text.push_str(&delta?);
    }
    Ok(text)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted `ChatModel` for orchestration tests.

    use super::*;
    use crate::TcmRagError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// What the scripted model does with one request.
    pub enum Reply {
        /// Stream these deltas, then end cleanly.
        Text(Vec<String>),
        /// Refuse the request outright.
        Fail(String),
        /// Stream these deltas, then break mid-stream.
        Broken(Vec<String>),
    }

    impl Reply {
        pub fn text(s: &str) -> Self {
            Reply::Text(vec![s.to_string()])
        }
    }

    type Script = dyn Fn(&[Turn]) -> Reply + Send + Sync;
    type Delay = dyn Fn(&[Turn]) -> Duration + Send + Sync;

    pub struct ScriptedModel {
        script: Box<Script>,
        delay: Option<Box<Delay>>,
        calls: Mutex<Vec<Vec<Turn>>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedModel {
        pub fn new(script: impl Fn(&[Turn]) -> Reply + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                delay: None,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        /// Sleep before answering, per request.
        pub fn with_delay(
            mut self,
            delay: impl Fn(&[Turn]) -> Duration + Send + Sync + 'static,
        ) -> Self {
            self.delay = Some(Box::new(delay));
            self
        }

        /// Every request received, in arrival order.
        pub fn calls(&self) -> Vec<Vec<Turn>> {
            self.calls.lock().unwrap().clone()
        }

        /// Highest number of requests in flight at once.
        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    /// Content of the last turn of a request.
    pub fn last_content(turns: &[Turn]) -> &str {
        turns.last().map(|t| t.content.as_str()).unwrap_or("")
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn stream_chat(&self, turns: &[Turn]) -> Result<DeltaStream> {
            self.calls.lock().unwrap().push(turns.to_vec());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = &self.delay {
                tokio::time::sleep(delay(turns)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match (self.script)(turns) {
                Reply::Text(deltas) => {
                    Ok(futures_util::stream::iter(deltas.into_iter().map(Ok)).boxed())
                }
                Reply::Fail(message) => Err(TcmRagError::RemoteCall(message)),
                Reply::Broken(deltas) => {
                    let items = deltas
                        .into_iter()
                        .map(Ok)
                        .chain(std::iter::once(Err(TcmRagError::RemoteCall(
                            "connection reset mid-stream".to_string(),
                        ))));
                    Ok(futures_util::stream::iter(items).boxed())
                }
            }
        }
    }
}
