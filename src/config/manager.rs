use crate::domain::models::{ModelConfig, ProviderKind, ToolNamespace};
use crate::domain::orchestrator::OrchestratorSettings;
use crate::domain::ports::ConfigSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Model used when the configuration names none.
pub const DEFAULT_MODEL: &str = "doubao";

/// Timeouts and pacing for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewaySettings {
    /// Bound on each namespace's tool list fetch while building the tool context.
    pub tool_list_timeout_secs: u64,
    /// Whole-request timeout for provider HTTP calls, streaming included.
    pub request_timeout_secs: u64,
    /// Per-request timeout for MCP calls.
    pub tool_call_timeout_secs: u64,
    /// Pause after each forwarded fragment. 0 disables pacing.
    pub fragment_delay_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            tool_list_timeout_secs: 5,
            request_timeout_secs: 120,
            tool_call_timeout_secs: 30,
            fragment_delay_ms: 0,
        }
    }
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_call_timeout_secs)
    }

    pub fn orchestrator(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            tool_list_timeout: Duration::from_secs(self.tool_list_timeout_secs),
            fragment_delay: Duration::from_millis(self.fragment_delay_ms),
        }
    }
}

/// Full gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    pub ai_models: Vec<ModelConfig>,
    pub default_model: String,
    pub mcp_options: Vec<ToolNamespace>,
    pub gateway: GatewaySettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ai_models: vec![ModelConfig {
                name: DEFAULT_MODEL.to_string(),
                provider: ProviderKind::Volcengine,
                api_key: None,
                api_base: Some("https://ark.cn-beijing.volces.com/api/v3".to_string()),
                model_id: "doubao-pro-32k".to_string(),
                max_tokens: 2048,
                temperature: 0.7,
            }],
            default_model: DEFAULT_MODEL.to_string(),
            mcp_options: Vec::new(),
            gateway: GatewaySettings::default(),
        }
    }
}

/// Configuration file as written. Top-level keys that are left out keep
/// their built-in defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    ai_models: Option<Vec<ModelConfig>>,
    default_model: Option<String>,
    mcp_options: Option<Vec<ToolNamespace>>,
    gateway: Option<GatewaySettings>,
}

impl ConfigFile {
    fn merge_onto(self, base: GatewayConfig) -> GatewayConfig {
        GatewayConfig {
            ai_models: self.ai_models.unwrap_or(base.ai_models),
            default_model: self.default_model.unwrap_or(base.default_model),
            mcp_options: self.mcp_options.unwrap_or(base.mcp_options),
            gateway: self.gateway.unwrap_or(base.gateway),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One row of the model listing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelAvailability {
    pub name: String,
    pub provider: ProviderKind,
    pub model_id: String,
    /// A key is configured, or the provider needs none.
    pub available: bool,
}

/// Owns the loaded configuration and answers the orchestrator's lookups.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: Option<PathBuf>,
    config: GatewayConfig,
}

impl ConfigManager {
    /// Wraps an in-memory configuration after validating it.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        validate(&config)?;
        Ok(Self { path: None, config })
    }

    /// Loads `path`, or the default path when none is given. A missing file
    /// yields the built-in configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_config_path(),
        };

        let config = match &path {
            Some(path) if path.exists() => {
                let file = Self::read_file(path)?;
                info!(path = %path.display(), "loaded configuration");
                file.merge_onto(GatewayConfig::default())
            }
            Some(path) => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                GatewayConfig::default()
            }
            None => GatewayConfig::default(),
        };

        validate(&config)?;
        Ok(Self { path, config })
    }

    /// `<config dir>/chat-gateway/config.yaml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chat-gateway").join("config.yaml"))
    }

    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let parsed = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.config.gateway
    }

    pub fn available_models(&self) -> Vec<ModelAvailability> {
        self.config
            .ai_models
            .iter()
            .map(|model| ModelAvailability {
                name: model.name.clone(),
                provider: model.provider,
                model_id: model.model_id.clone(),
                available: model.provider == ProviderKind::Ollama
                    || resolve_api_key(model).is_some(),
            })
            .collect()
    }

    pub fn enabled_namespaces(&self) -> Vec<&ToolNamespace> {
        self.config.mcp_options.iter().filter(|n| n.enabled).collect()
    }

    /// At least one model can be used.
    pub fn is_healthy(&self) -> bool {
        self.available_models().iter().any(|m| m.available)
    }

    /// Every enabled namespace has an endpoint.
    pub fn namespaces_healthy(&self) -> bool {
        self.enabled_namespaces()
            .iter()
            .all(|n| n.endpoint.as_deref().map(|u| !u.is_empty()).unwrap_or(false))
    }
}

impl ConfigSource for ConfigManager {
    fn model_config(&self, name: &str) -> Option<ModelConfig> {
        let model = self.config.ai_models.iter().find(|m| m.name == name)?;
        let mut resolved = model.clone();
        resolved.api_key = resolve_api_key(model);
        Some(resolved)
    }

    fn default_model(&self) -> String {
        self.config.default_model.clone()
    }

    fn namespace_config(&self, id: &str) -> Option<ToolNamespace> {
        self.config.mcp_options.iter().find(|n| n.id == id).cloned()
    }
}

fn validate(config: &GatewayConfig) -> Result<(), ConfigError> {
    if !config.ai_models.iter().any(|m| m.name == config.default_model) {
        return Err(ConfigError::Invalid(format!(
            "default_model `{}` is not one of ai_models",
            config.default_model
        )));
    }

    for namespace in &config.mcp_options {
        if let Some(endpoint) = namespace.endpoint.as_deref().filter(|u| !u.is_empty()) {
            url::Url::parse(endpoint).map_err(|e| {
                ConfigError::Invalid(format!(
                    "mcp_url `{}` of namespace {} is not a valid URL: {}",
                    endpoint, namespace.id, e
                ))
            })?;
        }
    }

    Ok(())
}

/// Resolve placeholders like {env:VAR_NAME}. Unset variables resolve to nothing.
fn resolve_env_var(value: &str) -> Option<String> {
    match value.strip_prefix("{env:").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).ok(),
        None => Some(value.to_string()),
    }
}

fn provider_env_key(provider: ProviderKind) -> String {
    match provider {
        ProviderKind::OpenAi => "OPENAI_API_KEY".to_string(),
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY".to_string(),
        other => format!("{}_API_KEY", other.as_str().to_uppercase()),
    }
}

/// The configured key, or the provider's conventional environment variable.
fn resolve_api_key(model: &ModelConfig) -> Option<String> {
    model
        .api_key
        .as_deref()
        .and_then(resolve_env_var)
        .or_else(|| std::env::var(provider_env_key(model.provider)).ok())
        .filter(|key| !key.is_empty())
}
