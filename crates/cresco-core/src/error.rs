//! Error types for the Cresco client.
//!
//! Errors fall into two families. Transport failures (timeouts, broken
//! connections, a stopped event loop) are expected outcomes on a long-lived
//! link: the messaging facade converts them into empty replies and trips its
//! failure latch. Caller errors (malformed destinations, bad envelopes, bad
//! configuration) are programming mistakes and are always returned to the caller.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the Cresco client.
#[derive(Debug, Error)]
pub enum CrescoError {
    // Transport errors
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Not connected")]
    NotConnected,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Event loop {name} is not running")]
    LoopUnavailable { name: String },

    #[error("TLS error: {message}")]
    Tls { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Side-channel errors
    #[error("Stream {channel} is closed")]
    ChannelClosed { channel: String },

    // Caller errors
    #[error("Invalid destination {field}: {message}")]
    InvalidDestination { field: String, message: String },

    #[error("Invalid envelope: {message}")]
    InvalidEnvelope { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Event loop {name} cannot block on itself")]
    Reentrant { name: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Decode error: {message}")]
    Decode { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Cresco operations.
pub type Result<T> = std::result::Result<T, CrescoError>;

// Conversion implementations for common error types

impl From<std::io::Error> for CrescoError {
    fn from(err: std::io::Error) -> Self {
        CrescoError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CrescoError {
    fn from(err: serde_json::Error) -> Self {
        CrescoError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CrescoError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Io(e) => CrescoError::from(e),
            WsError::Tls(e) => CrescoError::Tls {
                message: e.to_string(),
            },
            WsError::Url(e) => CrescoError::Config {
                message: format!("Invalid endpoint URL: {}", e),
            },
            WsError::ConnectionClosed | WsError::AlreadyClosed => CrescoError::Connection {
                message: "Connection closed".to_string(),
                cause: None,
            },
            other => CrescoError::Connection {
                message: other.to_string(),
                cause: Some(format!("{:?}", other)),
            },
        }
    }
}

impl CrescoError {
    /// Build a connection error from a message.
    pub fn connection(message: impl Into<String>) -> Self {
        CrescoError::Connection {
            message: message.into(),
            cause: None,
        }
    }

    /// Build a caller error for a bad destination field.
    pub fn invalid_destination(field: impl Into<String>, message: impl Into<String>) -> Self {
        CrescoError::InvalidDestination {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the link is unusable.
    ///
    /// These are the conditions that trip the messaging failure latch.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            CrescoError::Connection { .. }
                | CrescoError::NotConnected
                | CrescoError::Timeout(_)
                | CrescoError::LoopUnavailable { .. }
                | CrescoError::Tls { .. }
                | CrescoError::Io { .. }
        )
    }

    /// Check if this error is a programming mistake on the caller's side.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CrescoError::InvalidDestination { .. }
                | CrescoError::InvalidEnvelope { .. }
                | CrescoError::Config { .. }
                | CrescoError::Reentrant { .. }
        )
    }
}
