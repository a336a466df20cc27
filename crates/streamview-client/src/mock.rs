//! In-memory engine for exercising the negotiation logic without webrtc.
//!
//! The mock follows the ordering rules a real engine enforces: an answer
//! needs a remote offer, candidates need a remote description, and the
//! committed local description is not byte-identical to the one passed in.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use streamview_common::{EngineError, IceCandidate, SdpType, SessionDescription};
use tokio::sync::Notify;

use crate::config::IceConfig;
use crate::peer::{EngineEvent, EngineEvents, PeerConnector, PeerHandle};

/// Line the mock engine appends when committing a local description.
pub const COMMITTED_MARKER: &str = "a=ice-options:trickle\r\n";
pub const MOCK_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock\r\n";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Calls {
    pub set_remote: usize,
    pub create_answer: usize,
    pub set_local: usize,
    pub add_candidate: usize,
    pub close: usize,
}

#[derive(Default)]
struct HandleState {
    calls: Calls,
    remote: Option<SessionDescription>,
    local: Option<SessionDescription>,
    candidates: Vec<IceCandidate>,
    remote_failure: Option<EngineError>,
    remote_gate: Option<Arc<Notify>>,
}

#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<HandleState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls.clone()
    }

    /// Candidates the engine accepted, in order.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.lock().candidates.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.lock().remote.clone()
    }

    /// Make every following `set_remote_description` fail with `err`.
    pub fn fail_remote_description(&self, err: EngineError) {
        self.lock().remote_failure = Some(err);
    }

    /// Hold `set_remote_description` until the returned gate is notified.
    pub fn gate_remote_description(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().remote_gate = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl PeerHandle for MockHandle {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let gate = {
            let mut state = self.lock();
            state.calls.set_remote += 1;
            state.remote_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.lock();
        if let Some(err) = state.remote_failure.clone() {
            return Err(err);
        }
        if desc.sdp_type == SdpType::Answer && state.local.is_none() {
            return Err(EngineError::invalid_state("remote answer without a local offer"));
        }
        state.remote = Some(desc);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let mut state = self.lock();
        state.calls.create_answer += 1;
        match &state.remote {
            Some(remote) if remote.sdp_type == SdpType::Offer => {
                Ok(SessionDescription::answer(MOCK_ANSWER_SDP))
            }
            _ => Err(EngineError::invalid_state("no remote offer to answer")),
        }
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.calls.set_local += 1;
        if state.remote.is_none() && desc.sdp_type == SdpType::Answer {
            return Err(EngineError::invalid_state("local answer without remote offer"));
        }
        state.local = Some(SessionDescription {
            sdp_type: desc.sdp_type,
            sdp: format!("{}{}", desc.sdp, COMMITTED_MARKER),
        });
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.lock().local.clone()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.calls.add_candidate += 1;
        if state.remote.is_none() {
            return Err(EngineError::NoRemoteDescription);
        }
        if !candidate.candidate.is_empty() && !candidate.candidate.starts_with("candidate:") {
            return Err(EngineError::invalid_candidate(&candidate.candidate));
        }
        state.candidates.push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.lock().calls.close += 1;
        Ok(())
    }
}

#[derive(Default)]
struct ConnectorState {
    handles: Vec<MockHandle>,
    events: Option<EngineEvents>,
    configs: Vec<IceConfig>,
    create_failure: Option<EngineError>,
    remote_gate: Option<Arc<Notify>>,
}

/// Hands out [`MockHandle`]s and keeps them around for inspection.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of handles created so far.
    pub fn created(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn last_handle(&self) -> Option<MockHandle> {
        self.lock().handles.last().cloned()
    }

    pub fn last_config(&self) -> Option<IceConfig> {
        self.lock().configs.last().cloned()
    }

    /// Fail the next `create` call with `err`.
    pub fn fail_next_create(&self, err: EngineError) {
        self.lock().create_failure = Some(err);
    }

    /// Gate `set_remote_description` on the next created handle.
    pub fn gate_remote_description(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().remote_gate = Some(gate.clone());
        gate
    }

    /// Fire an engine callback as the most recent handle would.
    pub fn emit(&self, event: EngineEvent) -> bool {
        match &self.lock().events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    type Handle = MockHandle;

    async fn create(
        &self,
        config: &IceConfig,
        events: EngineEvents,
    ) -> Result<MockHandle, EngineError> {
        let mut state = self.lock();
        if let Some(err) = state.create_failure.take() {
            return Err(err);
        }
        let handle = MockHandle::default();
        if let Some(gate) = state.remote_gate.take() {
            handle.lock().remote_gate = Some(gate);
        }
        state.handles.push(handle.clone());
        state.configs.push(config.clone());
        state.events = Some(events);
        Ok(handle)
    }
}
