//! Common error types for Streamview.

use thiserror::Error;

/// Result type alias using Streamview's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// An inbound frame could not be turned into a signaling message.
///
/// Callers drop the frame and keep the session alive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed signaling frame: {0}")]
    Malformed(String),
}

impl DecodeError {
    pub fn malformed(msg: impl std::fmt::Display) -> Self {
        Self::Malformed(msg.to_string())
    }
}

/// Failure reported by the peer-connection engine for a single operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The operation is not valid in the current negotiation state.
    #[error("invalid negotiation state: {0}")]
    InvalidState(String),

    /// The session description could not be parsed or applied.
    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    /// The ICE candidate could not be parsed or applied.
    #[error("invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    /// A remote candidate arrived before any remote description was set.
    #[error("no remote description has been applied")]
    NoRemoteDescription,

    /// Anything else the engine raised.
    #[error("engine error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn invalid_state(msg: impl std::fmt::Display) -> Self {
        Self::InvalidState(msg.to_string())
    }

    pub fn invalid_description(msg: impl std::fmt::Display) -> Self {
        Self::InvalidDescription(msg.to_string())
    }

    pub fn invalid_candidate(msg: impl std::fmt::Display) -> Self {
        Self::InvalidCandidate(msg.to_string())
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }
}

/// Errors of the signaling channel. These end the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid signaling url: {0}")]
    InvalidUrl(String),

    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Top-level error type for Streamview operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(fail: bool) -> Result<()> {
        if fail {
            Err(EngineError::NoRemoteDescription)?;
        }
        Ok(())
    }

    #[test]
    fn test_engine_error_converts_transparently() {
        let err = apply(true).unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::NoRemoteDescription)));
        assert_eq!(err.to_string(), "no remote description has been applied");
        assert!(apply(false).is_ok());
    }

    #[test]
    fn test_transport_error_message() {
        let err: Error = TransportError::Connect {
            url: "ws://localhost:8443/ws".into(),
            reason: "connection refused".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "failed to connect to ws://localhost:8443/ws: connection refused"
        );
    }
}
