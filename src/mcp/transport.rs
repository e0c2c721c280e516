use crate::mcp::error::{McpError, Result};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const SESSION_HEADER: &str = "mcp-session-id";

/// Streamable HTTP transport for one remote MCP server.
///
/// Every JSON-RPC message is POSTed to the same endpoint. The server answers
/// with either a JSON body or a short SSE stream carrying the reply.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    request_id_counter: AtomicU64,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client,
            session_id: RwLock::new(None),
            request_id_counter: AtomicU64::new(0),
            timeout,
        }
    }

    fn get_next_request_id(&self) -> u64 {
        self.request_id_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn post(&self, message: &Value) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .timeout(self.timeout)
            .json(message);
        if let Some(session) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Timeout(format!("{} did not answer in {:?}", self.url, self.timeout))
            } else {
                McpError::Transport(format!("HTTP request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!("HTTP error {}: {}", status, text)));
        }

        self.remember_session(response.headers()).await;
        Ok(response)
    }

    async fn remember_session(&self, headers: &HeaderMap) {
        if let Some(session) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            let mut guard = self.session_id.write().await;
            if guard.as_deref() != Some(session) {
                debug!(url = %self.url, "MCP session established");
                *guard = Some(session.to_string());
            }
        }
    }

    /// Sends a JSON-RPC request and returns its `result`.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let request_id = self.get_next_request_id();
        let mut request = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
        });
        if let Some(params) = params {
            request["params"] = params;
        }

        let response = self.post(&request).await?;
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);

        let reply = if is_sse {
            read_sse_reply(response, request_id).await?
        } else {
            response
                .json::<Value>()
                .await
                .map_err(|e| McpError::Protocol(format!("Invalid JSON-RPC response: {}", e)))?
        };

        into_result(reply)
    }

    /// Sends a JSON-RPC notification. No reply is expected.
    pub async fn send_notification(&self, method: &str) -> Result<()> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        self.post(&notification).await.map(|_| ())
    }

    /// `GET {url}/{path}` on the pre-MCP REST interface.
    pub async fn legacy_get(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/{}", self.url, path))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("HTTP request failed: {}", e)))?;
        read_legacy(response).await
    }

    /// `POST {url}/{path}` on the pre-MCP REST interface.
    pub async fn legacy_post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/{}", self.url, path))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("HTTP request failed: {}", e)))?;
        read_legacy(response).await
    }
}

async fn read_legacy(response: reqwest::Response) -> Result<Value> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(McpError::Transport(format!("HTTP error {}: {}", status, text)));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| McpError::Protocol(format!("Invalid JSON response: {}", e)))
}

/// Reads SSE `message` events until the reply for `request_id` shows up.
async fn read_sse_reply(response: reqwest::Response, request_id: u64) -> Result<Value> {
    let mut stream = response.bytes_stream().eventsource();
    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| McpError::Transport(format!("SSE stream error: {}", e)))?;
        if !event.event.is_empty() && event.event != "message" {
            continue;
        }
        if let Ok(message) = serde_json::from_str::<Value>(&event.data) {
            if message.get("id").and_then(|v| v.as_u64()) == Some(request_id) {
                return Ok(message);
            }
        }
    }
    Err(McpError::Protocol(
        "SSE stream ended without a response".to_string(),
    ))
}

fn into_result(response: Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        let code = error
            .get("code")
            .and_then(|v| v.as_i64())
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error");
        return Err(McpError::JsonRpc {
            code,
            message: message.to_string(),
        });
    }

    response
        .get("result")
        .cloned()
        .ok_or_else(|| McpError::Protocol("Response has neither result nor error".to_string()))
}
