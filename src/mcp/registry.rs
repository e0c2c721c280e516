use crate::domain::models::ToolDescriptor;
use crate::domain::ports::{ConfigSource, ToolService};
use crate::mcp::client::McpClient;
use crate::mcp::error::{McpError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tool service backed by one MCP client per namespace.
///
/// Clients and tool lists are cached by namespace identifier and live until
/// [`McpRegistry::refresh`] removes them.
pub struct McpRegistry {
    config: Arc<dyn ConfigSource>,
    http: reqwest::Client,
    call_timeout: Duration,
    clients: RwLock<HashMap<String, Arc<McpClient>>>,
    tools: RwLock<HashMap<String, Vec<ToolDescriptor>>>,
}

impl McpRegistry {
    pub fn new(config: Arc<dyn ConfigSource>, call_timeout: Duration) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            call_timeout,
            clients: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
        }
    }

    async fn client_for(&self, namespace: &str) -> Result<Arc<McpClient>> {
        if let Some(client) = self.clients.read().await.get(namespace) {
            return Ok(client.clone());
        }

        let option = self
            .config
            .namespace_config(namespace)
            .ok_or_else(|| McpError::Config(format!("Unknown MCP namespace: {}", namespace)))?;
        if !option.enabled {
            return Err(McpError::Config(format!("MCP namespace {} is disabled", namespace)));
        }
        let url = option
            .endpoint
            .filter(|url| !url.is_empty())
            .ok_or_else(|| McpError::Config(format!("MCP namespace {} has no mcp_url", namespace)))?;

        let mut clients = self.clients.write().await;
        let client = clients
            .entry(namespace.to_string())
            .or_insert_with(|| {
                debug!(namespace = %namespace, url = %url, "created MCP client");
                Arc::new(McpClient::new(
                    namespace.to_string(),
                    url,
                    self.http.clone(),
                    self.call_timeout,
                ))
            })
            .clone();
        Ok(client)
    }

    /// Forgets the cached tool list and client for `namespace`.
    pub async fn refresh(&self, namespace: &str) {
        let had_tools = self.tools.write().await.remove(namespace).is_some();
        let had_client = self.clients.write().await.remove(namespace).is_some();
        info!(namespace = %namespace, had_tools, had_client, "refreshed MCP namespace");
    }

    pub async fn disconnect_all(&self) {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        clients.clear();
        info!(count, "disconnected MCP clients");
    }

    pub async fn cached_namespaces(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ToolService for McpRegistry {
    async fn list_tools(&self, namespace: &str) -> Result<Vec<ToolDescriptor>> {
        if let Some(tools) = self.tools.read().await.get(namespace) {
            return Ok(tools.clone());
        }

        let client = self.client_for(namespace).await?;
        let fetched = client.list_tools().await?;
        info!(namespace = %namespace, count = fetched.len(), "fetched MCP tools");

        let mut tools = self.tools.write().await;
        Ok(tools
            .entry(namespace.to_string())
            .or_insert(fetched)
            .clone())
    }

    async fn call_tool(
        &self,
        namespace: &str,
        name: &str,
        parameters: Map<String, Value>,
    ) -> Result<Value> {
        let client = self.client_for(namespace).await?;
        client.call_tool(name, parameters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ModelConfig, ToolNamespace};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Namespaces(Vec<ToolNamespace>);

    impl ConfigSource for Namespaces {
        fn model_config(&self, _name: &str) -> Option<ModelConfig> {
            None
        }
        fn default_model(&self) -> String {
            String::new()
        }
        fn namespace_config(&self, id: &str) -> Option<ToolNamespace> {
            self.0.iter().find(|n| n.id == id).cloned()
        }
    }

    fn namespace(id: &str, endpoint: Option<String>, enabled: bool) -> ToolNamespace {
        ToolNamespace {
            label: id.to_string(),
            id: id.to_string(),
            description: None,
            enabled,
            endpoint,
        }
    }

    async fn rest_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"tools": [{"name": "lookup"}]})),
            )
            .mount(&server)
            .await;
        server
    }

    fn registry(namespaces: Vec<ToolNamespace>) -> McpRegistry {
        McpRegistry::new(Arc::new(Namespaces(namespaces)), Duration::from_secs(5))
    }

    async fn tool_list_fetches(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == "GET" && r.url.path() == "/tools")
            .count()
    }

    #[tokio::test]
    async fn test_tool_list_is_cached_until_refresh() {
        let server = rest_server().await;
        let registry = registry(vec![namespace("ns1", Some(server.uri()), true)]);

        let first = registry.list_tools("ns1").await.unwrap();
        let second = registry.list_tools("ns1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].name, "lookup");
        assert_eq!(tool_list_fetches(&server).await, 1);
        assert_eq!(registry.cached_namespaces().await, vec!["ns1"]);

        registry.refresh("ns1").await;
        assert!(registry.cached_namespaces().await.is_empty());
        registry.list_tools("ns1").await.unwrap();
        assert_eq!(tool_list_fetches(&server).await, 2);
    }

    #[tokio::test]
    async fn test_unusable_namespaces_are_config_errors() {
        let registry = registry(vec![
            namespace("off", Some("http://localhost:1".to_string()), false),
            namespace("nourl", None, true),
        ]);

        for id in ["off", "nourl", "missing"] {
            let err = registry.list_tools(id).await.unwrap_err();
            assert!(matches!(err, McpError::Config(_)), "{}: {:?}", id, err);
        }
    }
}
