//! Peer connection facade.
//!
//! [`PeerConnector`] and [`PeerHandle`] are the small operation set the
//! negotiation controller drives; the engine behind them is a black box.
//! [`PeerConnection`] wraps one handle and tracks how far its offer/answer
//! exchange has progressed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use streamview_common::{EngineError, IceCandidate, SdpType, SessionDescription};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;
use webrtc::track::track_remote::TrackRemote;

use crate::config::IceConfig;

/// Where engine callbacks deliver their events.
pub type EngineEvents = mpsc::UnboundedSender<EngineEvent>;

/// Connection-level state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// An inbound media stream (one remote track of it).
#[derive(Clone)]
pub struct RemoteStream {
    pub stream_id: String,
    pub track_id: String,
    pub kind: String,
    /// The engine track, when the engine is webrtc-rs.
    pub track: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("stream_id", &self.stream_id)
            .field("track_id", &self.track_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum EngineEvent {
    /// A locally gathered candidate; `None` marks the end of gathering.
    LocalCandidate(Option<IceCandidate>),
    RemoteStream(RemoteStream),
    ConnectionState(ConnectionPhase),
}

#[async_trait]
pub trait PeerConnector: Send + Sync + 'static {
    type Handle: PeerHandle;

    /// Instantiate the engine and register the standing callbacks, which
    /// report through `events` for the lifetime of the handle.
    async fn create(
        &self,
        config: &IceConfig,
        events: EngineEvents,
    ) -> Result<Self::Handle, EngineError>;
}

#[async_trait]
pub trait PeerHandle: Send + Sync + 'static {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    /// The local description as committed by the engine.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    async fn close(&self) -> Result<(), EngineError>;
}

/// Negotiation progress of a single handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Unstarted,
    HasRemoteOffer,
    AnswerCreated,
    LocalDescriptionSet,
    Negotiating,
    Connected,
    Closed,
}

/// One engine handle plus its negotiation state.
///
/// Each operation advances the state only when the engine reports success.
pub struct PeerConnection<H> {
    id: Uuid,
    handle: H,
    state: NegotiationState,
    has_remote_description: bool,
}

impl<H: PeerHandle> PeerConnection<H> {
    pub fn new(handle: H) -> Self {
        Self {
            id: Uuid::new_v4(),
            handle,
            state: NegotiationState::Unstarted,
            has_remote_description: false,
        }
    }

    /// Identity of the underlying handle; stable for the session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn has_remote_description(&self) -> bool {
        self.has_remote_description
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub async fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), EngineError> {
        let sdp_type = desc.sdp_type;
        self.handle.set_remote_description(desc).await?;
        self.has_remote_description = true;
        if sdp_type == SdpType::Offer {
            self.transition(NegotiationState::HasRemoteOffer);
        }
        Ok(())
    }

    pub async fn create_answer(&mut self) -> Result<SessionDescription, EngineError> {
        let answer = self.handle.create_answer().await?;
        self.transition(NegotiationState::AnswerCreated);
        Ok(answer)
    }

    pub async fn set_local_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), EngineError> {
        self.handle.set_local_description(desc).await?;
        self.transition(NegotiationState::LocalDescriptionSet);
        Ok(())
    }

    pub async fn local_description(&self) -> Option<SessionDescription> {
        self.handle.local_description().await
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.handle.add_ice_candidate(candidate).await
    }

    /// Fold an engine connection-state event into the negotiation state.
    pub fn on_connection_phase(&mut self, phase: ConnectionPhase) {
        match phase {
            ConnectionPhase::Connecting => self.transition(NegotiationState::Negotiating),
            ConnectionPhase::Connected => self.transition(NegotiationState::Connected),
            ConnectionPhase::Closed => self.transition(NegotiationState::Closed),
            ConnectionPhase::Disconnected | ConnectionPhase::Failed => {}
        }
    }

    pub async fn close(&mut self) -> Result<(), EngineError> {
        if self.state == NegotiationState::Closed {
            return Ok(());
        }
        let result = self.handle.close().await;
        self.transition(NegotiationState::Closed);
        result
    }

    fn transition(&mut self, next: NegotiationState) {
        if self.state == NegotiationState::Closed || self.state == next {
            return;
        }
        debug!(peer = %self.id, from = ?self.state, to = ?next, "negotiation state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHandle;

    #[tokio::test]
    async fn test_successful_answer_walks_the_states() {
        let mut pc = PeerConnection::new(MockHandle::default());
        assert_eq!(pc.state(), NegotiationState::Unstarted);

        pc.set_remote_description(SessionDescription::offer("v=0"))
            .await
            .unwrap();
        assert_eq!(pc.state(), NegotiationState::HasRemoteOffer);
        assert!(pc.has_remote_description());

        let answer = pc.create_answer().await.unwrap();
        assert_eq!(pc.state(), NegotiationState::AnswerCreated);

        pc.set_local_description(answer).await.unwrap();
        assert_eq!(pc.state(), NegotiationState::LocalDescriptionSet);

        pc.on_connection_phase(ConnectionPhase::Connecting);
        assert_eq!(pc.state(), NegotiationState::Negotiating);
        pc.on_connection_phase(ConnectionPhase::Connected);
        assert_eq!(pc.state(), NegotiationState::Connected);
    }

    #[tokio::test]
    async fn test_failure_keeps_prior_state() {
        let mut pc = PeerConnection::new(MockHandle::default());
        let err = pc.create_answer().await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert_eq!(pc.state(), NegotiationState::Unstarted);

        pc.handle().fail_remote_description(EngineError::invalid_description("bad sdp"));
        assert!(pc
            .set_remote_description(SessionDescription::offer("garbage"))
            .await
            .is_err());
        assert_eq!(pc.state(), NegotiationState::Unstarted);
        assert!(!pc.has_remote_description());
    }

    #[tokio::test]
    async fn test_closed_is_terminal() {
        let mut pc = PeerConnection::new(MockHandle::default());
        pc.close().await.unwrap();
        pc.on_connection_phase(ConnectionPhase::Connected);
        assert_eq!(pc.state(), NegotiationState::Closed);
        pc.close().await.unwrap();
        assert_eq!(pc.handle().calls().close, 1);
    }
}
