//! Wire types for the homecall signaling relay
//!
//! Every frame is a UTF-8 JSON object with a `type` and a `payload`:
//!
//! ```json
//! {"type": "join",      "payload": {"role": "home"}}
//! {"type": "offer",     "payload": {"sdp": {...}, "sessionId": "optional"}}
//! {"type": "answer",    "payload": {"sdp": {...}, "sessionId": "optional"}}
//! {"type": "candidate", "payload": {"candidate": {...}, "sessionId": "optional"}}
//! {"type": "status",    "payload": {"homeOnline": true}}
//! {"type": "error",     "payload": {"message": "home offline"}}
//! ```
//!
//! `status` and `error` only ever travel server → client. The `sdp` and
//! `candidate` values are opaque to the relay.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Role a connection claims with its `join` message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The fixed camera/display station
    Home,
    /// A viewer/caller
    Remote,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Home => f.write_str("home"),
            Role::Remote => f.write_str("remote"),
        }
    }
}

/// Client-chosen identifier tying an answer or candidate to one call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors decoding a text frame
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame carried no content
    #[error("empty frame")]
    Empty,

    /// Invalid JSON, unknown message type or malformed payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A signaling message, in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum SignalMessage {
    /// Binds the connection to a role
    Join { role: Role },
    /// Session description from a remote, for home
    Offer {
        sdp: Value,
        #[serde(default, rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    /// Session description from home, for the caller
    Answer {
        sdp: Value,
        #[serde(default, rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    /// ICE candidate from either side
    Candidate {
        candidate: Value,
        #[serde(default, rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    /// Home presence, server → client
    Status {
        #[serde(rename = "homeOnline")]
        home_online: bool,
    },
    /// Routing or validation failure, server → client
    Error { message: String },
}

impl SignalMessage {
    /// Presence notification
    pub fn status(home_online: bool) -> Self {
        SignalMessage::Status { home_online }
    }

    /// Error notification carrying a human readable reason
    pub fn error(message: impl Into<String>) -> Self {
        SignalMessage::Error {
            message: message.into(),
        }
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Join { .. } => "join",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::Candidate { .. } => "candidate",
            SignalMessage::Status { .. } => "status",
            SignalMessage::Error { .. } => "error",
        }
    }

    /// Session the message belongs to, if the client tagged one
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            SignalMessage::Offer { session_id, .. }
            | SignalMessage::Answer { session_id, .. }
            | SignalMessage::Candidate { session_id, .. } => session_id.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&json)
    }
}

impl std::str::FromStr for SignalMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }
        Ok(serde_json::from_str(s)?)
    }
}
