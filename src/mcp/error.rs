use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON-RPC error: {code} - {message}")]
    JsonRpc { code: i32, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl McpError {
    /// Whether the legacy REST endpoints are worth trying after this error.
    /// A JSON-RPC error means the server answered, so there is nothing to fall back to.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            McpError::Transport(_) | McpError::Protocol(_) | McpError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, McpError>;
