//! Shared pieces for Streamview: signaling protocol, logging, error types.
//!
//! This crate is used by every Streamview component that speaks the
//! signaling protocol.

#![forbid(unsafe_code)]

pub mod error;
pub mod protocol;

pub use error::{DecodeError, EngineError, Error, Result, TransportError};
pub use protocol::*;

/// Initialize tracing with sensible defaults.
///
/// Log level is controlled by the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Initialize tracing with a specific default level.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
