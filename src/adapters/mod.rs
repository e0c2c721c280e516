//! Provider adapters and the per-model adapter cache.

pub mod anthropic;
pub mod ollama;
pub mod openai;

use crate::domain::models::{ModelConfig, ProviderKind};
use crate::domain::ports::{AdapterProvider, ModelAdapter};
use anthropic::AnthropicAdapter;
use ollama::OllamaAdapter;
use openai::OpenAIAdapter;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Builds the adapter for one model. The HTTP client is shared so every
/// adapter reuses the same connection pool.
pub fn build_adapter(client: Client, config: &ModelConfig) -> Arc<dyn ModelAdapter> {
    let api_key = config.api_key.clone().unwrap_or_default();
    if api_key.is_empty() && config.provider != ProviderKind::Ollama {
        warn!(model = %config.name, provider = %config.provider, "no API key configured");
    }

    match config.provider {
        ProviderKind::OpenAi | ProviderKind::Volcengine => {
            Arc::new(OpenAIAdapter::new(client, api_key, config.api_base.clone()))
        }
        ProviderKind::Anthropic => {
            Arc::new(AnthropicAdapter::new(client, api_key, config.api_base.clone()))
        }
        ProviderKind::Ollama => Arc::new(OllamaAdapter::new(client, config.api_base.clone())),
    }
}

/// Adapters keyed by (provider, model name), created on first use and kept
/// for the lifetime of the cache.
pub struct AdapterCache {
    client: Client,
    adapters: RwLock<HashMap<(ProviderKind, String), Arc<dyn ModelAdapter>>>,
}

impl AdapterCache {
    pub fn new(request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default HTTP client");
                Client::new()
            });
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            adapters: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AdapterProvider for AdapterCache {
    fn adapter_for(&self, config: &ModelConfig) -> Arc<dyn ModelAdapter> {
        let key = (config.provider, config.name.clone());
        if let Some(adapter) = self.adapters.read().ok().and_then(|m| m.get(&key).cloned()) {
            return adapter;
        }

        let created = build_adapter(self.client.clone(), config);
        match self.adapters.write() {
            // Another caller may have won the race; keep whichever got in first.
            Ok(mut adapters) => adapters.entry(key).or_insert_with(|| {
                debug!(model = %config.name, provider = %config.provider, "created provider adapter");
                created
            }).clone(),
            Err(_) => created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, provider: ProviderKind) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            provider,
            api_key: Some("key".to_string()),
            api_base: None,
            model_id: format!("{}-id", name),
            max_tokens: 16,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_adapter_reused_per_provider_and_name() {
        let cache = AdapterCache::with_client(Client::new());
        let a = cache.adapter_for(&config("main", ProviderKind::OpenAi));
        let b = cache.adapter_for(&config("main", ProviderKind::OpenAi));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let c = cache.adapter_for(&config("main", ProviderKind::Ollama));
        assert!(!Arc::ptr_eq(&a, &c));
        cache.adapter_for(&config("other", ProviderKind::Anthropic));
        assert_eq!(cache.len(), 3);
    }
}
