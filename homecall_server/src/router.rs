//! Per-connection signaling state machine
//!
//! A [`PeerSession`] starts unbound, binds to a role on `join`, and from then
//! on forwards offers, answers and candidates to the right counterpart.
//! Forwarded frames are the exact text the sender sent.

use crate::error::RoutingError;
use crate::state::{PeerHandle, PeerId, ServerState};
use homecall_protocol::{Role, SessionId, SignalMessage};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, waiting for `join`
    Unbound,
    /// Joined as the home station
    Home,
    /// Joined as a remote caller
    Remote,
    /// Transport gone; the connection has been unregistered
    Closed,
}

/// Signaling state for one connection
pub struct PeerSession {
    registry: ServerState,
    peer: PeerHandle,
    state: ConnectionState,
}

impl PeerSession {
    /// Start an unbound session around the connection's outbound queue
    pub fn new(registry: ServerState, peer: PeerHandle) -> Self {
        Self {
            registry,
            peer,
            state: ConnectionState::Unbound,
        }
    }

    /// Identity of the underlying connection
    pub fn id(&self) -> PeerId {
        self.peer.id()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handle one inbound text frame
    ///
    /// Undecodable frames are logged and dropped. Frames that decode but
    /// cannot be routed are answered with an `error` frame.
    pub fn handle_text(&mut self, text: &str) {
        let message = match SignalMessage::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %self.id(), "dropping malformed frame: {e}");
                return;
            }
        };

        debug!(peer = %self.id(), state = ?self.state, kind = message.kind(), "received");

        if let Err(e) = self.route(&message, text) {
            debug!(peer = %self.id(), kind = message.kind(), "routing failed: {e}");
            self.peer.notify(&SignalMessage::error(e.to_string()));
        }
    }

    fn route(&mut self, message: &SignalMessage, raw: &str) -> Result<(), RoutingError> {
        match (message, self.state) {
            (SignalMessage::Status { .. } | SignalMessage::Error { .. }, _) => {
                Err(RoutingError::ServerOnly(message.kind()))
            }
            (SignalMessage::Join { role }, ConnectionState::Unbound) => {
                self.join(*role);
                Ok(())
            }
            (SignalMessage::Join { .. }, ConnectionState::Home) => {
                Err(RoutingError::AlreadyJoined(Role::Home))
            }
            (SignalMessage::Join { .. }, ConnectionState::Remote) => {
                Err(RoutingError::AlreadyJoined(Role::Remote))
            }
            (_, ConnectionState::Unbound | ConnectionState::Closed) => {
                Err(RoutingError::NotJoined(message.kind()))
            }
            (SignalMessage::Offer { session_id, .. }, ConnectionState::Remote) => {
                let home = self.registry.home().ok_or(RoutingError::HomeOffline)?;
                if let Some(session) = session_id {
                    self.registry.open_session(session.clone(), self.id())?;
                }
                forward_to_home(&home, raw)
            }
            (SignalMessage::Candidate { .. }, ConnectionState::Remote) => {
                let home = self.registry.home().ok_or(RoutingError::HomeOffline)?;
                forward_to_home(&home, raw)
            }
            (SignalMessage::Answer { .. }, ConnectionState::Home)
            | (SignalMessage::Candidate { .. }, ConnectionState::Home) => {
                self.to_remotes(message.session_id(), raw)
            }
            (SignalMessage::Offer { .. }, ConnectionState::Home) => Err(RoutingError::WrongRole {
                kind: message.kind(),
                role: Role::Remote,
            }),
            (SignalMessage::Answer { .. }, ConnectionState::Remote) => Err(RoutingError::WrongRole {
                kind: message.kind(),
                role: Role::Home,
            }),
        }
    }

    fn join(&mut self, role: Role) {
        match role {
            Role::Home => {
                self.state = ConnectionState::Home;
                if let Some(displaced) = self.registry.register_home(self.peer.clone()) {
                    info!(peer = %displaced.id(), by = %self.id(), "home displaced");
                    displaced.notify(&SignalMessage::error(RoutingError::Superseded.to_string()));
                }
            }
            Role::Remote => {
                self.state = ConnectionState::Remote;
                self.registry.register_remote(self.peer.clone());
            }
        }
    }

    fn to_remotes(&self, session: Option<&SessionId>, raw: &str) -> Result<(), RoutingError> {
        if !self.registry.is_current_home(self.id()) {
            return Err(RoutingError::Superseded);
        }

        let targets = match session {
            Some(session) => {
                let remote = self
                    .registry
                    .session_remote(session)
                    .ok_or_else(|| RoutingError::UnknownSession(session.clone()))?;
                vec![remote]
            }
            None => self.registry.remotes(),
        };
        if targets.is_empty() {
            return Err(RoutingError::NoRemotes);
        }

        for remote in targets {
            if let Err(e) = remote.send(raw) {
                warn!(peer = %remote.id(), "forward to remote failed: {e}");
            }
        }
        Ok(())
    }

    /// Tear down the session, unregistering the connection if it was bound
    ///
    /// Later calls are no-ops.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Home | ConnectionState::Remote => {
                let role = self.registry.unregister(self.id());
                info!(peer = %self.id(), ?role, "connection closed");
            }
            ConnectionState::Unbound => debug!(peer = %self.id(), "unbound connection closed"),
            ConnectionState::Closed => return,
        }
        self.state = ConnectionState::Closed;
    }
}

fn forward_to_home(home: &PeerHandle, raw: &str) -> Result<(), RoutingError> {
    home.send(raw).map_err(|e| {
        warn!(peer = %home.id(), "forward to home failed: {e}");
        RoutingError::HomeOffline
    })
}
