//! Streamview client: answers WebRTC offers arriving over a websocket
//! signaling channel and hands the negotiated streams to a media sink.

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod engine;
pub mod mock;
pub mod peer;
pub mod session;
pub mod sink;
pub mod transport;

pub use config::{Endpoint, IceConfig, IcePolicy, IceServer, SessionConfig};
pub use controller::{noop_reporter, ErrorReporter, NegotiationController, NegotiationSession};
pub use engine::{WebRtcConnector, WebRtcHandle};
pub use peer::{
    ConnectionPhase, EngineEvent, NegotiationState, PeerConnection, PeerConnector, PeerHandle,
    RemoteStream,
};
pub use session::run_session;
pub use sink::{MediaSink, NullSink, RtpStatsSink};
