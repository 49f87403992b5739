//! Error types for the Turnstile admission controller.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Invalid limit or policy parameters, rejected before any network call
    #[error("Policy error: {0}")]
    Policy(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared store unreachable or transport failure. Callers must fail
    /// closed for security-sensitive actions: a limiter error means the
    /// request was not admitted.
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The atomic evaluation returned a reply with an unexpected shape
    #[error("Malformed store reply: {0}")]
    Decode(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
