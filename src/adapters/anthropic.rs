use crate::domain::error::ProviderError;
use crate::domain::models::*;
use crate::domain::ports::{FragmentStream, ModelAdapter};
use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

const PROVIDER: ProviderKind = ProviderKind::Anthropic;

pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
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
        format!("{}/v1/messages", self.base_url)
    }

    async fn send(&self, req: ChatRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let (system, messages) = split_system(req.messages);
        let request_body = AnthropicRequest {
            model: req.model_id,
            messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            system,
            stream,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
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

/// Moves the leading system message into the separate `system` field.
/// Anthropic has no system role inside the conversation, so later system
/// messages are dropped.
fn split_system(messages: Vec<Message>) -> (String, Vec<AnthropicMessage>) {
    let mut system = String::new();
    let mut conversation = Vec::with_capacity(messages.len());

    for (i, m) in messages.into_iter().enumerate() {
        match m.role {
            Role::System if i == 0 => system = m.content,
            Role::System => warn!("dropping system message that is not first in the conversation"),
            Role::User | Role::Assistant => conversation.push(AnthropicMessage {
                role: m.role.as_str(),
                content: m.content,
            }),
        }
    }

    (system, conversation)
}

// --- Anthropic Request Structs ---

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    system: String,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

// --- Anthropic Response Structs ---

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum AnthropicResponseContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

// --- Stream Event Structs ---

#[derive(Deserialize)]
#[serde(tag = "type")]
enum AnthropicStreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: AnthropicDelta },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: AnthropicStreamError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicStreamError {
    message: String,
}

#[async_trait]
impl ModelAdapter for AnthropicAdapter {
    async fn chat(&self, req: ChatRequest) -> Result<String, ProviderError> {
        let response = self.send(req, false).await?;
        let body: AnthropicResponse = response.json().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        let mut final_text = String::new();
        for item in body.content {
            if let AnthropicResponseContent::Text { text } = item {
                final_text.push_str(&text);
            }
        }
        Ok(final_text)
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
                if event.data.is_empty() {
                    continue;
                }

                let parsed: AnthropicStreamEvent =
                    serde_json::from_str(&event.data).map_err(|e| ProviderError::Decode {
                        provider: PROVIDER,
                        message: format!("{}: {}", e, event.data),
                    })?;
                match parsed {
                    AnthropicStreamEvent::ContentBlockDelta {
                        delta: AnthropicDelta::Text { text },
                    } => {
                        yield text;
                    }
                    AnthropicStreamEvent::MessageStop => break,
                    AnthropicStreamEvent::Error { error } => {
                        Err::<(), _>(ProviderError::Stream {
                            provider: PROVIDER,
                            message: error.message,
                        })?;
                    }
                    _ => {}
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}
