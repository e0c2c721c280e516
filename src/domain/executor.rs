use crate::domain::models::ToolCallRequest;
use crate::domain::ports::ToolService;
use crate::mcp::McpError;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of resolving one call against the enabled namespaces.
#[derive(Debug)]
pub enum CallOutcome {
    Executed { namespace: String, result: Value },
    /// No enabled namespace exposes the tool.
    NotFound,
    /// Every namespace that was tried failed; carries the last error.
    Failed(McpError),
}

pub struct ToolExecutor {
    service: Arc<dyn ToolService>,
}

impl ToolExecutor {
    pub fn new(service: Arc<dyn ToolService>) -> Self {
        Self { service }
    }

    /// Tries `namespaces` in order and calls the tool on the first one that lists it.
    ///
    /// A namespace whose descriptor fetch or call fails is skipped. `Failed` is
    /// returned only when no namespace succeeded and at least one raised.
    pub async fn resolve_and_call(
        &self,
        call: &ToolCallRequest,
        namespaces: &[String],
    ) -> CallOutcome {
        let mut last_error = None;

        for namespace in namespaces {
            let tools = match self.service.list_tools(namespace).await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(namespace = %namespace, tool = %call.name, error = %e, "tool list failed");
                    last_error = Some(e);
                    continue;
                }
            };

            if !tools.iter().any(|tool| tool.name == call.name) {
                continue;
            }

            debug!(namespace = %namespace, tool = %call.name, "calling tool");
            match self
                .service
                .call_tool(namespace, &call.name, call.parameters.clone())
                .await
            {
                Ok(result) => {
                    return CallOutcome::Executed {
                        namespace: namespace.clone(),
                        result: normalize_result(result),
                    }
                }
                Err(e) => {
                    warn!(namespace = %namespace, tool = %call.name, error = %e, "tool call failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => CallOutcome::Failed(e),
            None => CallOutcome::NotFound,
        }
    }
}

/// Replaces a string result that holds JSON with its parsed form.
pub fn normalize_result(result: Value) -> Value {
    match result {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
