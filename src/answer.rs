//! Final answer assembly and the streaming consumer interface.

use tokio::sync::mpsc;

/// What a streaming consumer receives: ordered deltas, then exactly one
/// `Finished` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    Delta(String),
    Finished,
    Error(String),
}

/// Concatenates answer deltas, optionally forwarding each one to a channel
/// as it arrives.
#[derive(Debug, Default)]
pub struct AnswerAssembler {
    text: String,
    sink: Option<mpsc::Sender<AnswerEvent>>,
}

impl AnswerAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streaming(sink: mpsc::Sender<AnswerEvent>) -> Self {
        Self {
            text: String::new(),
            sink: Some(sink),
        }
    }

    pub async fn push(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.text.push_str(delta);
        if let Some(sink) = &self.sink {
            if sink.send(AnswerEvent::Delta(delta.to_string())).await.is_err() {
                // keep assembling for the blocking result
                log::debug!("Answer consumer went away, no longer forwarding deltas");
                self.sink = None;
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
