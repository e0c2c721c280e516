use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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
}

/// Configured provider tag. Volcengine Ark speaks the OpenAI wire format, so
/// the gateway still has three protocol families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Volcengine,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Volcengine => "volcengine",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default)]
    pub model_id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_enabled() -> bool {
    true
}

/// One tool provider the caller can enable for a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolNamespace {
    pub label: String,
    #[serde(rename = "value")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "mcp_url", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-Schema-like object: `properties` plus an optional `required` list.
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: String,
    pub description: String,
    pub required: bool,
}

impl ToolDescriptor {
    /// Flattens the parameter schema into one entry per property.
    pub fn parameter_specs(&self) -> Vec<ParameterSpec> {
        let Some(properties) = self.parameters.get("properties").and_then(Value::as_object) else {
            return Vec::new();
        };
        let required: Vec<&str> = self
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        properties
            .iter()
            .map(|(name, info)| ParameterSpec {
                name: name.clone(),
                kind: info
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("string")
                    .to_string(),
                description: info
                    .get("description")
                    .or_else(|| info.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                required: required.contains(&name.as_str()),
            })
            .collect()
    }
}

/// A call request parsed out of provider text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub function_name: String,
    pub parameters: Map<String, Value>,
    pub result: Value,
}

/// Provider-neutral request handed to a `ModelAdapter`.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(config: &ModelConfig, messages: Vec<Message>) -> Self {
        Self {
            messages,
            model_id: config.model_id.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// One caller request: the conversation, an optional model name and the enabled namespaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub selected_mcp: Vec<String>,
}

/// Caller-visible output of a streamed turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Text produced by a provider stream.
    Delta(String),
    /// Progress text written by the gateway itself.
    Narration(String),
    /// A tool call that resolved and executed.
    ToolResult(ToolCallResult),
    Warning(String),
}

impl TurnEvent {
    /// Plain-text rendering for callers that consume a single text channel.
    pub fn as_text(&self) -> String {
        match self {
            TurnEvent::Delta(text) | TurnEvent::Narration(text) => text.clone(),
            TurnEvent::ToolResult(record) => {
                let pretty = serde_json::to_string_pretty(&record.result)
                    .unwrap_or_else(|_| record.result.to_string());
                format!("```json\n{}\n```\n\n", pretty)
            }
            TurnEvent::Warning(text) => format!("⚠️ {}\n", text),
        }
    }
}

/// What a streamed turn did, returned once the turn ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnSummary {
    pub model: String,
    /// Full text of the first provider stream.
    pub response: String,
    pub tool_results: Vec<ToolCallResult>,
    pub summarized: bool,
    /// Set when the caller went away before the turn finished.
    pub cancelled: bool,
}
