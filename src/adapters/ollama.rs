use crate::domain::error::ProviderError;
use crate::domain::models::*;
use crate::domain::ports::{FragmentStream, ModelAdapter};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const PROVIDER: ProviderKind = ProviderKind::Ollama;

/// Local Ollama daemon. No API key.
pub struct OllamaAdapter {
    client: Client,
    base_url: String,
}

impl OllamaAdapter {
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    async fn send(&self, req: ChatRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let model_id = req.model_id.clone();
        let request_body = OllamaRequest {
            model: req.model_id,
            messages: req
                .messages
                .into_iter()
                .map(|m| OllamaMessage {
                    role: m.role.as_str(),
                    content: m.content,
                })
                .collect(),
            stream,
            options: OllamaOptions {
                temperature: req.temperature,
                num_predict: req.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request_body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err = response.text().await.unwrap_or_default();
            let body = if status == 404 && err.contains("model") {
                format!("{} (pull it first: ollama pull {})", err, model_id)
            } else {
                err
            };
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
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

// --- Response Structs ---

/// Shape of both the single non-streaming reply and every NDJSON stream line.
#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

fn parse_line(line: &[u8]) -> Result<OllamaResponse, ProviderError> {
    let parsed: OllamaResponse = serde_json::from_slice(line).map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        message: format!("{}: {}", e, String::from_utf8_lossy(line)),
    })?;
    if let Some(error) = parsed.error {
        return Err(ProviderError::Stream {
            provider: PROVIDER,
            message: error,
        });
    }
    Ok(parsed)
}

/// Turns an NDJSON byte stream into content fragments. Bytes are buffered
/// until a full line arrives, so characters split across chunks survive.
fn ndjson_fragments<S, B, E>(mut bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let fragments = try_stream! {
        let mut buffer: Vec<u8> = Vec::new();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Stream {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }

                let parsed = parse_line(line)?;
                if let Some(message) = parsed.message {
                    if !message.content.is_empty() {
                        yield message.content;
                    }
                }
                if parsed.done {
                    break 'read;
                }
            }
        }

        // Last line without a trailing newline.
        let rest = buffer.trim_ascii();
        if !rest.is_empty() {
            let parsed = parse_line(rest)?;
            if let Some(message) = parsed.message {
                if !message.content.is_empty() {
                    yield message.content;
                }
            }
        }
    };

    Box::pin(fragments)
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    async fn chat(&self, req: ChatRequest) -> Result<String, ProviderError> {
        let response = self.send(req, false).await?;
        let body = response.bytes().await.map_err(|source| ProviderError::Transport {
            provider: PROVIDER,
            source,
        })?;
        let body = parse_line(body.trim_ascii())?;
        Ok(body.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError> {
        let response = self.send(req, true).await?;
        Ok(ndjson_fragments(response.bytes_stream()))
    }
}
