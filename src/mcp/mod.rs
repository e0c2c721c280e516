//! MCP (Model Context Protocol) tool namespaces over HTTP.
//!
//! Each namespace is one remote server reached through its `mcp_url`.
//! [`McpRegistry`] is the tool service the orchestrator talks to.
//!
//! # Example
//! ```no_run
//! # async fn demo(config: std::sync::Arc<dyn chat_gateway::domain::ports::ConfigSource>) {
//! use chat_gateway::domain::ports::ToolService;
//! use chat_gateway::mcp::McpRegistry;
//!
//! let registry = McpRegistry::new(config, std::time::Duration::from_secs(30));
//! for tool in registry.list_tools("company").await.unwrap_or_default() {
//!     println!("Tool: {} - {}", tool.name, tool.description);
//! }
//! # }
//! ```

pub mod client;
pub mod error;
pub mod registry;
pub mod transport;

pub use client::McpClient;
pub use error::{McpError, Result};
pub use registry::McpRegistry;
pub use transport::HttpTransport;
