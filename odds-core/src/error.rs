//! Error types for the odds engine

use thiserror::Error;

/// Engine-wide error type
///
/// `Clone` so a single vendor failure can be handed to every caller
/// awaiting the same coalesced request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OddsError {
    #[error("Vendor API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OddsError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        OddsError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        OddsError::Network(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        OddsError::Timeout(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        OddsError::Parse(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        OddsError::InvalidRequest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        OddsError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        OddsError::Internal(msg.into())
    }

    /// Whether the error came from talking to the vendor (and so only
    /// affects the unit of work that made the call)
    pub fn is_vendor_failure(&self) -> bool {
        matches!(
            self,
            OddsError::Api { .. } | OddsError::Network(_) | OddsError::Timeout(_) | OddsError::Parse(_)
        )
    }
}

/// Result type alias for engine operations
pub type OddsResult<T> = Result<T, OddsError>;
