use crate::domain::error::ProviderError;
use crate::domain::models::*;
use crate::mcp::McpError;
use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};
use std::pin::Pin;
use std::sync::Arc;

/// Finite, non-restartable sequence of text fragments from one provider stream.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<String, ProviderError>;
    async fn stream(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError>;
}

/// Hands out the adapter for a model, reusing one per (provider, model name).
pub trait AdapterProvider: Send + Sync {
    fn adapter_for(&self, config: &ModelConfig) -> Arc<dyn ModelAdapter>;
}

/// Read-only view of gateway configuration.
pub trait ConfigSource: Send + Sync {
    fn model_config(&self, name: &str) -> Option<ModelConfig>;
    fn default_model(&self) -> String;
    fn namespace_config(&self, id: &str) -> Option<ToolNamespace>;
}

/// Tool provider reached per namespace identifier.
#[async_trait]
pub trait ToolService: Send + Sync {
    async fn list_tools(&self, namespace: &str) -> Result<Vec<ToolDescriptor>, McpError>;
    async fn call_tool(
        &self,
        namespace: &str,
        name: &str,
        parameters: Map<String, Value>,
    ) -> Result<Value, McpError>;
}
