pub mod detector;
pub mod error;
pub mod executor;
pub mod models;
pub mod orchestrator;
pub mod ports;
pub mod prompt;
