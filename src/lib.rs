pub mod adapters;
pub mod config;
pub mod domain;
pub mod mcp;

pub use adapters::AdapterCache;
pub use config::ConfigManager;
pub use domain::models::{Message, Role, TurnEvent, TurnRequest, TurnSummary};
pub use domain::orchestrator::ResponseOrchestrator;
pub use mcp::McpRegistry;
