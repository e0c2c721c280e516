use crate::domain::models::ToolDescriptor;
use crate::mcp::error::{McpError, Result};
use crate::mcp::transport::HttpTransport;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2025-03-26";

/// MCP client for one tool namespace endpoint.
///
/// Speaks streamable-HTTP JSON-RPC and falls back to the older REST interface
/// (`GET /tools`, `POST /call`) when the endpoint does not answer JSON-RPC.
pub struct McpClient {
    namespace: String,
    transport: HttpTransport,
    initialized: RwLock<bool>,
}

impl McpClient {
    pub fn new(namespace: String, url: String, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            namespace,
            transport: HttpTransport::new(client, url, timeout),
            initialized: RwLock::new(false),
        }
    }

    /// Runs the initialize handshake once per client.
    pub async fn initialize(&self) -> Result<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        let result = self
            .transport
            .send_request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await?;

        if let Some(server) = result.get("serverInfo").and_then(|v| v.get("name")).and_then(|v| v.as_str()) {
            info!(namespace = %self.namespace, server = %server, "MCP server initialized");
        }

        if let Err(e) = self.transport.send_notification("notifications/initialized").await {
            warn!(namespace = %self.namespace, error = %e, "initialized notification was not accepted");
        }

        *initialized = true;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        match self.list_tools_rpc().await {
            Ok(tools) => Ok(tools),
            Err(e) if e.allows_fallback() => {
                debug!(namespace = %self.namespace, error = %e, "tools/list failed, trying REST endpoint");
                let response = self.transport.legacy_get("tools").await?;
                let tools = response
                    .get("tools")
                    .and_then(|v| v.as_array())
                    .map(|items| items.iter().filter_map(normalize_descriptor).collect())
                    .unwrap_or_default();
                Ok(tools)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_tools_rpc(&self) -> Result<Vec<ToolDescriptor>> {
        self.initialize().await?;
        let result = self.transport.send_request("tools/list", None).await?;
        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .ok_or_else(|| McpError::Protocol("tools/list result has no tools array".to_string()))?;
        Ok(tools.iter().filter_map(normalize_descriptor).collect())
    }

    /// Calls `name` and returns its normalized result.
    pub async fn call_tool(&self, name: &str, parameters: Map<String, Value>) -> Result<Value> {
        let rpc = self.call_tool_rpc(name, parameters.clone()).await;
        match rpc {
            Ok(result) => normalize_call_result(result),
            Err(e) if e.allows_fallback() => {
                debug!(namespace = %self.namespace, tool = %name, error = %e, "tools/call failed, trying REST endpoint");
                self.transport
                    .legacy_post(
                        "call",
                        &json!({
                            "function": name,
                            "parameters": parameters,
                        }),
                    )
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn call_tool_rpc(&self, name: &str, parameters: Map<String, Value>) -> Result<Value> {
        self.initialize().await?;
        self.transport
            .send_request(
                "tools/call",
                Some(json!({
                    "name": name,
                    "arguments": parameters,
                })),
            )
            .await
    }
}

/// Accepts `inputSchema`, `input_schema` or `parameters` for the schema.
pub fn normalize_descriptor(tool: &Value) -> Option<ToolDescriptor> {
    let name = tool.get("name").and_then(|v| v.as_str())?;
    let description = tool
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let parameters = ["inputSchema", "input_schema", "parameters"]
        .iter()
        .find_map(|key| tool.get(*key).filter(|v| !v.is_null()))
        .cloned()
        .unwrap_or_else(|| json!({}));

    Some(ToolDescriptor {
        name: name.to_string(),
        description,
        parameters,
    })
}

/// Unwraps a `tools/call` result: the first content item's text, parsed as
/// JSON when it is JSON. Results without content are returned as-is.
pub fn normalize_call_result(result: Value) -> Result<Value> {
    let is_error = result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);

    let first = result
        .get("content")
        .and_then(|v| v.as_array())
        .and_then(|items| items.first());
    let Some(first) = first else {
        if is_error {
            return Err(McpError::Protocol("tool reported an error".to_string()));
        }
        return Ok(result);
    };

    let text = match first.get("text").and_then(|v| v.as_str()) {
        Some(text) => text.to_string(),
        None => first.to_string(),
    };
    if is_error {
        return Err(McpError::Protocol(text));
    }

    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}
