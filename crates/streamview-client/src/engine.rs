//! webrtc-rs backed implementation of the peer connection facade.

use std::sync::Arc;

use async_trait::async_trait;
use streamview_common::{EngineError, IceCandidate, SdpType, SessionDescription};
use tracing::{debug, info, warn};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::config::{IceConfig, IcePolicy};
use crate::peer::{
    ConnectionPhase, EngineEvent, EngineEvents, PeerConnector, PeerHandle, RemoteStream,
};

pub struct WebRtcConnector {
    api: API,
}

impl WebRtcConnector {
    pub fn new() -> Result<Self, EngineError> {
        let mut media = MediaEngine::default();
        media
            .register_default_codecs()
            .map_err(|e| EngineError::internal(format!("codec registration: {e}")))?;
        let api = APIBuilder::new().with_media_engine(media).build();
        Ok(Self { api })
    }
}

fn rtc_configuration(config: &IceConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: config
            .servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect(),
        ice_transport_policy: match config.policy {
            IcePolicy::All => RTCIceTransportPolicy::All,
            IcePolicy::Relay => RTCIceTransportPolicy::Relay,
        },
        ..Default::default()
    }
}

fn local_candidate(candidate: Option<RTCIceCandidate>) -> Option<Option<IceCandidate>> {
    let Some(candidate) = candidate else {
        return Some(None);
    };
    match candidate.to_json() {
        Ok(init) => Some(Some(IceCandidate {
            candidate: init.candidate,
            sdp_mline_index: init.sdp_mline_index,
            sdp_mid: init.sdp_mid,
            username_fragment: init.username_fragment,
        })),
        Err(e) => {
            warn!(error = %e, "failed to serialize local ICE candidate");
            None
        }
    }
}

fn connection_phase(state: RTCPeerConnectionState) -> Option<ConnectionPhase> {
    match state {
        RTCPeerConnectionState::Connecting => Some(ConnectionPhase::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionPhase::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionPhase::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionPhase::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionPhase::Closed),
        _ => None,
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    type Handle = WebRtcHandle;

    async fn create(
        &self,
        config: &IceConfig,
        events: EngineEvents,
    ) -> Result<WebRtcHandle, EngineError> {
        let pc = self
            .api
            .new_peer_connection(rtc_configuration(config))
            .await
            .map_err(|e| EngineError::internal(format!("create peer connection: {e}")))?;

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |c| {
            let tx = tx.clone();
            Box::pin(async move {
                if let Some(candidate) = local_candidate(c) {
                    let _ = tx.send(EngineEvent::LocalCandidate(candidate));
                }
            })
        }));

        let tx = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let stream = RemoteStream {
                stream_id: track.stream_id(),
                track_id: track.id(),
                kind: track.kind().to_string(),
                track: Some(track),
            };
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(EngineEvent::RemoteStream(stream));
            })
        }));

        let tx = events;
        pc.on_peer_connection_state_change(Box::new(move |state| {
            debug!(?state, "peer connection state changed");
            if let Some(phase) = connection_phase(state) {
                let _ = tx.send(EngineEvent::ConnectionState(phase));
            }
            Box::pin(async {})
        }));

        info!(
            ice_servers = config.servers.len(),
            policy = %config.policy,
            "peer connection created"
        );
        Ok(WebRtcHandle { pc: Arc::new(pc) })
    }
}

pub struct WebRtcHandle {
    pc: Arc<RTCPeerConnection>,
}

#[derive(Clone, Copy)]
enum Op {
    Remote,
    Answer,
    Local,
    Candidate,
}

fn engine_error(op: Op, err: webrtc::Error) -> EngineError {
    match (&err, op) {
        (webrtc::Error::ErrNoRemoteDescription, Op::Candidate) => EngineError::NoRemoteDescription,
        (webrtc::Error::ErrNoRemoteDescription, _)
        | (webrtc::Error::ErrConnectionClosed, _)
        | (webrtc::Error::ErrIncorrectSignalingState, _) => EngineError::invalid_state(&err),
        (_, Op::Remote) => EngineError::invalid_description(&err),
        (_, Op::Answer | Op::Local) => EngineError::invalid_state(&err),
        (_, Op::Candidate) => EngineError::invalid_candidate(&err),
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    let parsed = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    parsed.map_err(EngineError::invalid_description)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription, EngineError> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        other => {
            return Err(EngineError::invalid_state(format!(
                "unsupported description type {other:?}"
            )))
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

#[async_trait]
impl PeerHandle for WebRtcHandle {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| engine_error(Op::Remote, e))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| engine_error(Op::Answer, e))?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| engine_error(Op::Local, e))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        from_rtc(desc).ok()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| engine_error(Op::Candidate, e))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.pc
            .close()
            .await
            .map_err(|e| EngineError::internal(format!("close: {e}")))
    }
}
