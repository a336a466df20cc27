//! Negotiation controller: the single owner of a session's peer connection.
//!
//! Inbound frames and engine events are processed one at a time, each in
//! arrival order, by [`NegotiationController::run`]. When both are waiting
//! the frame goes first. Engine operations for the handle are awaited in
//! sequence; nothing runs against it in parallel.

use std::collections::HashSet;
use std::sync::Arc;

use streamview_common::{
    decode, encode, EngineError, IceCandidate, SessionDescription, SignalingMessage,
    TransportError,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::IceConfig;
use crate::peer::{EngineEvent, PeerConnection, PeerConnector};
use crate::sink::MediaSink;
use crate::transport::{Inbound, Outbound};

/// Application hook for engine failures. Called in addition to logging.
pub type ErrorReporter = Arc<dyn Fn(&EngineError) + Send + Sync>;

pub fn noop_reporter() -> ErrorReporter {
    Arc::new(|_| {})
}

/// Per-connection negotiation state.
pub struct NegotiationSession<H> {
    id: Uuid,
    ice: IceConfig,
    peer: Option<PeerConnection<H>>,
    attached_tracks: HashSet<(String, String)>,
    early_candidates: Vec<IceCandidate>,
}

impl<H> NegotiationSession<H> {
    pub fn new(ice: IceConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            ice,
            peer: None,
            attached_tracks: HashSet::new(),
            early_candidates: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> Option<&PeerConnection<H>> {
        self.peer.as_ref()
    }

    /// `(stream_id, track_id)` pairs already handed to the sink.
    pub fn attached_tracks(&self) -> &HashSet<(String, String)> {
        &self.attached_tracks
    }

    /// Remote candidates held back until a remote description exists.
    pub fn early_candidates(&self) -> &[IceCandidate] {
        &self.early_candidates
    }
}

pub struct NegotiationController<C: PeerConnector> {
    connector: C,
    session: NegotiationSession<C::Handle>,
    outbound: Outbound,
    sink: Arc<dyn MediaSink>,
    report: ErrorReporter,
    buffer_early_candidates: bool,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
}

fn report_engine_error(report: &ErrorReporter, session: Uuid, op: &str, err: EngineError) {
    warn!(session = %session, op, error = %err, "negotiation step failed");
    report(&err);
}

impl<C: PeerConnector> NegotiationController<C> {
    pub fn new(
        connector: C,
        ice: IceConfig,
        outbound: Outbound,
        sink: Arc<dyn MediaSink>,
        report: ErrorReporter,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            session: NegotiationSession::new(ice),
            outbound,
            sink,
            report,
            buffer_early_candidates: false,
            events_tx,
            events_rx,
        }
    }

    pub fn with_early_candidate_buffering(mut self, enabled: bool) -> Self {
        self.buffer_early_candidates = enabled;
        self
    }

    pub fn session(&self) -> &NegotiationSession<C::Handle> {
        &self.session
    }

    /// Process frames and engine events until the transport goes away, then
    /// close the peer connection.
    pub async fn run(mut self, mut inbound: Inbound) -> Result<(), TransportError> {
        info!(session = %self.session.id, "negotiation session started");
        let outcome = loop {
            tokio::select! {
                biased;

                frame = inbound.recv() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text).await,
                    Some(Err(err)) => break Err(err),
                    None => break Ok(()),
                },
                Some(event) = self.events_rx.recv() => self.handle_engine_event(event),
            }
        };
        self.shutdown().await;
        outcome
    }

    /// Decode and apply one inbound frame. Malformed frames are dropped.
    pub async fn handle_frame(&mut self, raw: &str) {
        match decode(raw) {
            Ok(message) => self.handle_message(message).await,
            Err(err) => debug!(session = %self.session.id, error = %err, "dropping frame"),
        }
    }

    pub async fn handle_message(&mut self, message: SignalingMessage) {
        if !self.ensure_peer().await {
            return;
        }
        match message {
            SignalingMessage::Sdp(desc) => self.on_remote_description(desc).await,
            SignalingMessage::Ice(candidate) => self.on_remote_candidate(candidate).await,
            SignalingMessage::Unknown { kind, .. } => {
                info!(session = %self.session.id, kind = %kind, "message not supported");
            }
        }
    }

    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        let session = self.session.id;
        match event {
            EngineEvent::LocalCandidate(Some(candidate)) => {
                debug!(session = %session, candidate = %candidate.candidate, "sending ICE candidate");
                self.outbound.send(encode(&SignalingMessage::Ice(candidate)));
            }
            EngineEvent::LocalCandidate(None) => {
                debug!(session = %session, "local candidate gathering complete");
            }
            EngineEvent::RemoteStream(stream) => {
                let key = (stream.stream_id.clone(), stream.track_id.clone());
                if self.session.attached_tracks.insert(key) {
                    info!(
                        session = %session,
                        stream_id = %stream.stream_id,
                        track_id = %stream.track_id,
                        "attaching remote track"
                    );
                    self.sink.attach(stream);
                } else {
                    debug!(session = %session, track_id = %stream.track_id, "track already attached");
                }
            }
            EngineEvent::ConnectionState(phase) => {
                info!(session = %session, ?phase, "peer connection state");
                if let Some(peer) = self.session.peer.as_mut() {
                    peer.on_connection_phase(phase);
                }
            }
        }
    }

    async fn ensure_peer(&mut self) -> bool {
        if self.session.peer.is_some() {
            return true;
        }
        match self
            .connector
            .create(&self.session.ice, self.events_tx.clone())
            .await
        {
            Ok(handle) => {
                let peer = PeerConnection::new(handle);
                info!(session = %self.session.id, peer = %peer.id(), "peer connection ready");
                self.session.peer = Some(peer);
                true
            }
            Err(err) => {
                report_engine_error(&self.report, self.session.id, "create", err);
                false
            }
        }
    }

    /// Apply a remote description, then run the answer pipeline.
    ///
    /// The two branches fail independently: a rejected remote description
    /// is reported, and the answer pipeline is still attempted.
    async fn on_remote_description(&mut self, desc: SessionDescription) {
        let session = self.session.id;
        let Some(peer) = self.session.peer.as_mut() else {
            return;
        };
        info!(session = %session, sdp_type = %desc.sdp_type, "incoming SDP");

        match peer.set_remote_description(desc).await {
            Ok(()) => {
                let pending = std::mem::take(&mut self.session.early_candidates);
                if !pending.is_empty() {
                    debug!(session = %session, count = pending.len(), "applying buffered candidates");
                }
                for candidate in pending {
                    if let Err(err) = peer.add_ice_candidate(candidate).await {
                        report_engine_error(&self.report, session, "add_ice_candidate", err);
                    }
                }
            }
            Err(err) => report_engine_error(&self.report, session, "set_remote_description", err),
        }

        let answer = match peer.create_answer().await {
            Ok(answer) => answer,
            Err(err) => {
                report_engine_error(&self.report, session, "create_answer", err);
                return;
            }
        };
        debug!(session = %session, "local description created");

        if let Err(err) = peer.set_local_description(answer).await {
            report_engine_error(&self.report, session, "set_local_description", err);
            return;
        }

        match peer.local_description().await {
            Some(committed) => {
                info!(session = %session, sdp_type = %committed.sdp_type, "sending local description");
                self.outbound.send(encode(&SignalingMessage::Sdp(committed)));
            }
            None => report_engine_error(
                &self.report,
                session,
                "local_description",
                EngineError::invalid_state("no local description after commit"),
            ),
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        let session = self.session.id;
        let Some(peer) = self.session.peer.as_ref() else {
            return;
        };
        debug!(session = %session, candidate = %candidate.candidate, "incoming ICE candidate");

        if self.buffer_early_candidates && !peer.has_remote_description() {
            debug!(session = %session, "buffering candidate until a remote description is set");
            self.session.early_candidates.push(candidate);
            return;
        }
        if let Err(err) = peer.add_ice_candidate(candidate).await {
            report_engine_error(&self.report, session, "add_ice_candidate", err);
        }
    }

    async fn shutdown(&mut self) {
        if let Some(peer) = self.session.peer.as_mut() {
            if let Err(err) = peer.close().await {
                debug!(session = %self.session.id, error = %err, "peer close failed");
            }
        }
        info!(session = %self.session.id, "negotiation session ended");
    }
}
