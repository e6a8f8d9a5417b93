//! Error types for the Colloquy engine

use thiserror::Error;

/// Result type alias for Colloquy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Colloquy engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persona not found
    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    /// Scenario not found or invalid
    #[error("scenario error: {0}")]
    Scenario(String),

    /// Speech capture error that could not be recovered
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech synthesis error (other than a deliberate interruption)
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Text generation error
    #[error("generation error: {0}")]
    Generation(String),

    /// Session persistence error
    #[error("session error: {0}")]
    Session(String),

    /// Engine is no longer running
    #[error("engine stopped")]
    EngineStopped,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
