//! Signaling wire protocol.
//!
//! Every frame on the signaling channel is a JSON object of the form
//! `{"type": <tag>, "data": <payload>}`:
//!
//! ```json
//! {"type":"sdp","data":{"type":"offer","sdp":"v=0..."}}
//! {"type":"ice","data":{"candidate":"candidate:1 1 udp ...","sdpMLineIndex":0,"sdpMid":"0"}}
//! ```
//!
//! Frames with any other tag decode to [`SignalingMessage::Unknown`] and are
//! ignored by the negotiation controller.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::DecodeError;

pub const TAG_SDP: &str = "sdp";
pub const TAG_ICE: &str = "ice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SDP offer or answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    fn to_value(&self) -> Value {
        json!({ "type": self.sdp_type.as_str(), "sdp": self.sdp })
    }
}

/// A trickled ICE candidate, in the browser's `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    fn to_value(&self) -> Value {
        let mut data = Map::new();
        data.insert("candidate".into(), Value::from(self.candidate.as_str()));
        if let Some(index) = self.sdp_mline_index {
            data.insert("sdpMLineIndex".into(), Value::from(index));
        }
        if let Some(mid) = &self.sdp_mid {
            data.insert("sdpMid".into(), Value::from(mid.as_str()));
        }
        if let Some(ufrag) = &self.username_fragment {
            data.insert("usernameFragment".into(), Value::from(ufrag.as_str()));
        }
        Value::Object(data)
    }
}

/// A decoded signaling frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingMessage {
    Sdp(SessionDescription),
    Ice(IceCandidate),
    /// A well-formed frame with a tag this client does not handle.
    Unknown { kind: String, data: Value },
}

impl SignalingMessage {
    /// The wire tag of this message.
    pub fn kind(&self) -> &str {
        match self {
            SignalingMessage::Sdp(_) => TAG_SDP,
            SignalingMessage::Ice(_) => TAG_ICE,
            SignalingMessage::Unknown { kind, .. } => kind,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Parse one inbound text frame.
pub fn decode(raw: &str) -> Result<SignalingMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(DecodeError::malformed)?;
    match envelope.kind.as_str() {
        TAG_SDP => serde_json::from_value(envelope.data)
            .map(SignalingMessage::Sdp)
            .map_err(|e| DecodeError::malformed(format!("sdp payload: {e}"))),
        TAG_ICE => serde_json::from_value(envelope.data)
            .map(SignalingMessage::Ice)
            .map_err(|e| DecodeError::malformed(format!("ice payload: {e}"))),
        _ => Ok(SignalingMessage::Unknown {
            kind: envelope.kind,
            data: envelope.data,
        }),
    }
}

/// Serialize a message into its outbound envelope.
pub fn encode(message: &SignalingMessage) -> String {
    let (kind, data) = match message {
        SignalingMessage::Sdp(desc) => (TAG_SDP, desc.to_value()),
        SignalingMessage::Ice(candidate) => (TAG_ICE, candidate.to_value()),
        SignalingMessage::Unknown { kind, data } => (kind.as_str(), data.clone()),
    };
    json!({ "type": kind, "data": data }).to_string()
}
