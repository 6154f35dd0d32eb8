//! ============================================================================
//! Platform Errors - Shared error taxonomy
//! ============================================================================
//! Every fallible operation in the core returns `Result<T, PlatformError>`.
//! The server maps variants to HTTP codes; the CLI prints them directly.
//! ============================================================================

use thiserror::Error;

/// Error taxonomy for the platform core
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Task, user, payment, or package does not exist
    #[error("{0}")]
    NotFound(String),

    /// Missing or malformed input (amount, address, identifiers)
    #[error("{0}")]
    Validation(String),

    /// Withdrawal or spend exceeds the user's star balance
    #[error("insufficient star balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    /// The chain explorer (or another upstream service) is unreachable
    #[error("external service failure: {0}")]
    ExternalService(String),

    /// Embedded store failure (transaction, serialization, I/O)
    #[error("storage failure: {0}")]
    Storage(String),
}

impl PlatformError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        PlatformError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PlatformError::Validation(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        PlatformError::ExternalService(msg.into())
    }

    pub fn storage(msg: impl std::fmt::Display) -> Self {
        PlatformError::Storage(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
