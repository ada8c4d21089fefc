//! Error types for peer-compose

use thiserror::Error;

/// Result type for peer-compose operations
pub type Result<T> = std::result::Result<T, PeerError>;

/// peer-compose error types
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Compose file parse error: {0}")]
    ComposeParse(String),

    #[error("Compose file has no services")]
    MissingServices,

    #[error("Invalid command for service '{service}': {reason}")]
    InvalidCommand { service: String, reason: String },

    #[error("Invalid field '{field}' for service '{service}': {reason}")]
    InvalidField {
        service: String,
        field: String,
        reason: String,
    },

    #[error("Cannot quote command argument: {0}")]
    Quote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PeerError {
    /// Shorthand for a field shape error on one service
    pub fn invalid_field(service: &str, field: &str, reason: impl Into<String>) -> Self {
        PeerError::InvalidField {
            service: service.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
