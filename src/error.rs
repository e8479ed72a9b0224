//! LeadPulse error types

use thiserror::Error;

/// LeadPulse error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source record provider error
    #[error("Source error: {0}")]
    Source(String),

    /// Product-interest rule error
    #[error("Rule error: {0}")]
    Rule(String),

    /// Summary generator error
    #[error("Generator error: {0}")]
    Generator(String),

    /// Rendering error
    #[error("Render error: {0}")]
    Render(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for LeadPulse operations
pub type Result<T> = std::result::Result<T, Error>;
