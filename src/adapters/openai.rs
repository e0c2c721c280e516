use crate::domain::error::ProviderError;
use crate::domain::models::*;
use crate::domain::ports::{FragmentStream, ModelAdapter};
use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: ProviderKind = ProviderKind::OpenAi;

/// Any endpoint that speaks the OpenAI chat completions protocol.
pub struct OpenAIAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIAdapter {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, req: ChatRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let request_body = OpenAIRequest {
            model: req.model_id,
            messages: req
                .messages
                .into_iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str(),
                    content: m.content,
                })
                .collect(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            stream,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status,
                body,
            });
        }

        Ok(response)
    }
}

// --- Request Structs ---

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

// --- Response Structs ---

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

// --- Stream Response Structs ---

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
}

#[derive(Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[async_trait]
impl ModelAdapter for OpenAIAdapter {
    async fn chat(&self, req: ChatRequest) -> Result<String, ProviderError> {
        let response = self.send(req, false).await?;
        let body: OpenAIResponse = response.json().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ProviderError::Decode {
                provider: PROVIDER,
                message: "no choice in response".to_string(),
            })
    }

    async fn stream(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError> {
        let response = self.send(req, true).await?;
        let mut events = response.bytes_stream().eventsource();

        let fragments = try_stream! {
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| ProviderError::Stream {
                    provider: PROVIDER,
                    message: e.to_string(),
                })?;
                if event.data == "[DONE]" {
                    break;
                }

                let chunk: OpenAIStreamResponse =
                    serde_json::from_str(&event.data).map_err(|e| ProviderError::Decode {
                        provider: PROVIDER,
                        message: format!("{}: {}", e, event.data),
                    })?;
                if let Some(content) = chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
                    yield content;
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}
