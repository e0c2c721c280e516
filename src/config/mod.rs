pub mod manager;

pub use manager::{
    ConfigError, ConfigManager, GatewayConfig, GatewaySettings, ModelAvailability, DEFAULT_MODEL,
};
