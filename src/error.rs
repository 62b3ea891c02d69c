//! Error types for the capability gateway

use std::io;

use thiserror::Error;

use crate::labels::LabelExpressionError;

/// Result type alias for the capability gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Capability gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote endpoint could not be reached (forward listing/reading)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Logical lookup miss
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Malformed label expression
    #[error(transparent)]
    LabelExpression(#[from] LabelExpressionError),

    /// Transient registration failure
    #[error("Registration failed: {0}")]
    Registration(String),

    /// Transient health probe failure
    #[error("Health probe failed: {0}")]
    Probe(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outbound call exceeded its deadline
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON-RPC error returned by a remote endpoint
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        /// Error code
        code: i32,
        /// Error message
        message: String,
        /// Optional data
        data: Option<serde_json::Value>,
    },

    /// Persistence backend error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a JSON-RPC error
    pub fn json_rpc(code: i32, message: impl Into<String>) -> Self {
        Self::JsonRpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Whether this error is a connectivity failure (transport, timeout, HTTP)
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Http(_) | Self::Io(_) | Self::ServiceUnavailable(_)
        )
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::JsonRpc { code, .. } => *code,
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) => rpc_codes::INVALID_REQUEST,
            Self::LabelExpression(_) => rpc_codes::INVALID_PARAMS,
            Self::EntityNotFound(_) => -32001,
            Self::ServiceUnavailable(_) | Self::Timeout(_) | Self::Transport(_) => -32000,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes() {
        assert_eq!(Error::Protocol("x".into()).to_rpc_code(), -32600);
        assert_eq!(Error::EntityNotFound("x".into()).to_rpc_code(), -32001);
        assert_eq!(Error::json_rpc(-32601, "nope").to_rpc_code(), -32601);
        assert_eq!(Error::Internal("x".into()).to_rpc_code(), -32603);
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(Error::Transport("refused".into()).is_connectivity());
        assert!(Error::Timeout(std::time::Duration::from_secs(1)).is_connectivity());
        assert!(!Error::Protocol("bad".into()).is_connectivity());
    }
}
