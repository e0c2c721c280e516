use crate::domain::models::ProviderKind;
use thiserror::Error;

/// Failure talking to an AI provider. Never retried at this layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: ProviderKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} response could not be decoded: {message}")]
    Decode {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} stream failed: {message}")]
    Stream {
        provider: ProviderKind,
        message: String,
    },
}

/// Malformed JSON inside one in-band call block.
#[derive(Debug, Error)]
#[error("invalid tool call JSON: {0}")]
pub struct CallParseError(#[from] pub serde_json::Error);

/// Errors that end a turn.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
