//! Error types for the signaling relay

use homecall_protocol::{Role, SessionId};
use thiserror::Error;

/// Errors that can occur delivering frames to a peer
#[derive(Error, Debug)]
pub enum SignalingError {
    /// The peer's outbound queue is full
    #[error("Send queue full")]
    SendQueueFull,

    /// The peer's connection task has gone away
    #[error("Peer disconnected")]
    PeerGone,

    /// Listener or socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from client frames
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// Connection was closed
    #[error("Connection closed")]
    Close,

    /// Unsupported frame type
    #[error("Unsupported message type")]
    UnsupportedType,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// Reasons a decoded message could not be routed
///
/// The display text is what the sender receives in its `error` frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// Non-join message on an unbound connection
    #[error("join before sending {0}")]
    NotJoined(&'static str),

    /// Second join on a bound connection
    #[error("connection already joined as {0}")]
    AlreadyJoined(Role),

    /// Message sent by the wrong role
    #[error("{kind} is only accepted from {role} peers")]
    WrongRole { kind: &'static str, role: Role },

    /// Client sent a status or error frame
    #[error("{0} messages are server-to-client only")]
    ServerOnly(&'static str),

    /// No live home to forward to
    #[error("home offline")]
    HomeOffline,

    /// No live remote to forward to
    #[error("no remote connected")]
    NoRemotes,

    /// Tagged session has no live caller
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// Tagged session belongs to another live remote
    #[error("session {0} is already in use")]
    SessionInUse(SessionId),

    /// Sender lost the home slot to a newer home
    #[error("home role taken over by another connection")]
    Superseded,
}

/// Invalid server configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Pings would never be sent
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,

    /// Connections would time out between pings
    #[error("heartbeat timeout ({timeout}s) must not be shorter than the interval ({interval}s)")]
    HeartbeatTimeoutTooShort { interval: u64, timeout: u64 },

    /// Outbound queue cannot hold a frame
    #[error("send queue must hold at least one frame")]
    ZeroSendQueue,
}
