//! Error types for the streaming client.
//!
//! Every recoverable failure is handled at the component boundary where it
//! occurs and converted into a log line and/or a state-channel value; the
//! variants here exist so those boundaries can classify what happened.
//!
//! ## Error Categories
//!
//! - **Transport errors**: connection refused, dropped, or closed mid-stream
//! - **Connect timeouts**: the guard window elapsed before the socket opened
//! - **Capture errors**: the camera source failed (fatal to the video path only)
//! - **Encode errors**: a frame could not be downscaled or compressed
//! - **Protocol errors**: malformed inbound payloads (tolerated, never fatal)

use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Main error type for the streaming client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Connection attempt exceeded guard window of {duration:?}")]
    ConnectTimeout { duration: Duration },

    #[error("Camera source failure: {reason}")]
    Capture {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Frame encode failed: {context}")]
    Encode { context: String },

    #[error("Protocol error: {details}")]
    Protocol { details: String },

    #[error("Session is closed")]
    Closed,
}

impl ClientError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Transport and timeout failures resolve themselves on the next
    /// reconnect cycle; capture failures end the video path for good.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { .. } => true,
            ClientError::ConnectTimeout { .. } => true,
            ClientError::Encode { .. } => true,
            ClientError::Capture { .. } => false,
            ClientError::Protocol { .. } => false,
            ClientError::Closed => false,
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        ClientError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with an underlying source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ClientError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for camera source errors.
    pub fn capture_failed(reason: impl Into<String>) -> Self {
        ClientError::Capture { reason: reason.into(), source: None }
    }

    /// Helper constructor for encode errors.
    pub fn encode_failed(context: impl Into<String>) -> Self {
        ClientError::Encode { context: context.into() }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol_error(details: impl Into<String>) -> Self {
        ClientError::Protocol { details: details.into() }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Protocol { details: err.to_string() }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
