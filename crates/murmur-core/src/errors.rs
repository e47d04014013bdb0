//! Unified error system for Murmur
//!
//! One error type for handler and runtime failures, plus the protocol error
//! codes that the messaging substrate understands. Handler failures are
//! converted into `error` replies by the runtime via [`MurmurError::code`].

use serde::{Deserialize, Serialize};

/// Protocol-level error codes carried in `error` reply bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ErrorCode {
    /// The requested operation timed out
    Timeout,
    /// The destination node does not exist
    NodeNotFound,
    /// The message type is not handled by this node
    NotSupported,
    /// The node cannot serve the request right now; retrying may succeed
    TemporarilyUnavailable,
    /// The request body could not be interpreted
    MalformedRequest,
    /// The handler failed in an indefinite way
    Crash,
    /// The operation definitely did not take place
    Abort,
}

impl ErrorCode {
    /// Numeric code as it appears on the wire
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::Timeout => 0,
            ErrorCode::NodeNotFound => 1,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.as_u16()
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(code: u16) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(ErrorCode::Timeout),
            1 => Ok(ErrorCode::NodeNotFound),
            10 => Ok(ErrorCode::NotSupported),
            11 => Ok(ErrorCode::TemporarilyUnavailable),
            12 => Ok(ErrorCode::MalformedRequest),
            13 => Ok(ErrorCode::Crash),
            14 => Ok(ErrorCode::Abort),
            other => Err(format!("unknown error code {other}")),
        }
    }
}

/// Unified error type for all Murmur operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum MurmurError {
    /// Inbound payload could not be decoded into the expected request
    #[error("Malformed request: {message}")]
    Malformed {
        /// What was wrong with the payload
        message: String,
    },

    /// No handler is registered for the message type
    #[error("Not supported: {message}")]
    NotSupported {
        /// Message type or operation that is unsupported
        message: String,
    },

    /// Invalid input or configuration value
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration failure
        message: String,
    },

    /// Network or transport error
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl MurmurError {
    /// Create a malformed request error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a not supported error
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Protocol error code used when this error is returned to a requester
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed { .. } | Self::Serialization { .. } => ErrorCode::MalformedRequest,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::Invalid { .. } => ErrorCode::Abort,
            Self::Config { .. } | Self::Network { .. } | Self::Internal { .. } => ErrorCode::Crash,
        }
    }
}

/// Standard Result type for Murmur operations
pub type Result<T> = std::result::Result<T, MurmurError>;

impl From<serde_json::Error> for MurmurError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for MurmurError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<crate::effects::NetworkError> for MurmurError {
    fn from(err: crate::effects::NetworkError) -> Self {
        Self::network(err.to_string())
    }
}
