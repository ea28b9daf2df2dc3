// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption backend for Ollama and vLLM via the OpenAI-compatible chat API

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::frame::Frame;
use super::image_utils::png_data_url;
use crate::caption::{BackendError, CaptionBackend, GenerationParams};
use crate::config::{BackendKind, EndpointConfig};

// --- OpenAI-compatible serde structs ---

#[derive(serde::Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(serde::Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(serde::Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(serde::Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Option<String> {
        self.choices.into_iter().next()?.message.content
    }
}

/// Client for an OpenAI-compatible vision server
pub struct VlmClient {
    client: Client,
    config: EndpointConfig,
}

impl VlmClient {
    /// Create a new client for `config`
    pub fn new(config: &EndpointConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        let mut config = config.clone();
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        info!(
            "VLM client configured: backend={}, base_url={}, model={}",
            config.kind, config.base_url, config.model
        );

        Ok(Self { client, config })
    }

    pub fn kind(&self) -> BackendKind {
        self.config.kind
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Check that the server answers `/models`
    pub async fn health_check(&self) -> bool {
        let request = self.authorize(self.client.get(format!("{}/models", self.config.base_url)));
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("VLM health check failed: {}", e);
                false
            }
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn build_request(
        &self,
        prompt: &str,
        frames: &[Frame],
        params: &GenerationParams,
    ) -> Result<ChatRequest, BackendError> {
        let mut content = Vec::with_capacity(frames.len() + 1);
        content.push(ContentPart::Text {
            text: prompt.to_string(),
        });
        for frame in frames {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: png_data_url(frame.image(), self.config.max_image_side)?,
                },
            });
        }

        Ok(ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        })
    }
}

#[async_trait]
impl CaptionBackend for VlmClient {
    async fn complete(
        &self,
        prompt: &str,
        frames: &[Frame],
        params: &GenerationParams,
    ) -> Result<String, BackendError> {
        let start = std::time::Instant::now();
        let request = self.build_request(prompt, frames, params)?;

        let response = self
            .authorize(
                self.client
                    .post(format!("{}/chat/completions", self.config.base_url)),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        let tokens_used = chat_response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0);
        let text = chat_response.into_text().ok_or(BackendError::EmptyResponse)?;

        debug!(
            "{} completion: {} frames, {} tokens, {} ms",
            self.config.kind,
            frames.len(),
            tokens_used,
            start.elapsed().as_millis()
        );
        Ok(text)
    }

    fn name(&self) -> &'static str {
        self.config.kind.as_str()
    }

    fn min_frames(&self) -> usize {
        self.config.min_frames
    }
}
