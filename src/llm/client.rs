use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{delta_stream, ChatModel, DeltaStream, Turn};
use crate::config::LlmConfig;
use crate::{Result, TcmRagError};

/// Request body for an OpenAI-compatible `/chat/completions` call
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    temperature: f32,
    stream: bool,
}

/// Streaming chat client for OpenAI-compatible endpoints (DeepSeek and the like).
pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TcmRagError::Config(format!("build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn stream_chat(&self, turns: &[Turn]) -> Result<DeltaStream> {
        let request = ChatRequest {
            model: &self.model,
            messages: turns,
            temperature: self.temperature,
            stream: true,
        };

        log::debug!(
            "POST {} ({} turns, {} chars)",
            self.endpoint,
            turns.len(),
            turns.iter().map(Turn::char_len).sum::<usize>()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TcmRagError::RemoteCall(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TcmRagError::RemoteCall(format!(
                "API returned status {}: {}",
                status, body
            )));
        }

        Ok(delta_stream(response.bytes_stream()))
    }
}
