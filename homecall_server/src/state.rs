//! Connection registry for the signaling relay
//!
//! Tracks which connection currently holds the home slot, the set of
//! connected remotes, and which remote opened each tagged call session.
//! One lock guards all three, so presence changes and the status frames
//! they produce are observed in a single order by every remote.

use crate::error::{RoutingError, SignalingError};
use homecall_protocol::{Role, SessionId, SignalMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Fresh random identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sending side of a connection's outbound frame queue
///
/// Frames pushed here are written to the socket by the connection's own
/// task, so enqueueing never waits on the network.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: PeerId,
    tx: mpsc::Sender<String>,
}

impl PeerHandle {
    /// Wrap a connection's outbound queue under a new identity
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            id: PeerId::new(),
            tx,
        }
    }

    /// Identity of the connection behind this handle
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// False once the connection's writer has gone away
    pub fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a text frame for this peer
    pub fn send(&self, frame: impl Into<String>) -> Result<(), SignalingError> {
        self.tx.try_send(frame.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SignalingError::SendQueueFull,
            mpsc::error::TrySendError::Closed(_) => SignalingError::PeerGone,
        })
    }

    /// Queue a server-originated message, logging failures
    pub(crate) fn notify(&self, message: &SignalMessage) {
        if let Err(e) = self.send(message.to_string()) {
            warn!(peer = %self.id, kind = message.kind(), "dropping notification: {e}");
        }
    }
}

#[derive(Debug, Default)]
struct InnerState {
    home: Option<PeerHandle>,
    remotes: HashMap<PeerId, PeerHandle>,
    /// Session -> remote that sent the tagged offer
    sessions: HashMap<SessionId, PeerId>,
}

impl InnerState {
    fn home_online(&self) -> bool {
        self.home.as_ref().is_some_and(PeerHandle::is_live)
    }

    fn broadcast_status(&self, home_online: bool) {
        let status = SignalMessage::status(home_online);
        for remote in self.remotes.values().filter(|r| r.is_live()) {
            remote.notify(&status);
        }
    }
}

/// Handle to the process-wide registry
///
/// Cloning is cheap; every clone refers to the same registry.
#[derive(Debug, Default, Clone)]
pub struct ServerState {
    inner: Arc<Mutex<InnerState>>,
}

impl ServerState {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `peer` as home, replacing any previous home
    ///
    /// Every remote is told home is online. Returns the displaced home,
    /// whose socket is left open.
    pub fn register_home(&self, peer: PeerHandle) -> Option<PeerHandle> {
        let mut state = self.inner.lock();
        let displaced = state
            .home
            .replace(peer.clone())
            .filter(|old| old.id() != peer.id());
        state.sessions.clear();
        state.broadcast_status(true);

        info!(
            peer = %peer.id(),
            remotes = state.remotes.len(),
            replaced = displaced.is_some(),
            "home registered"
        );
        displaced
    }

    /// Add `peer` to the remote set and tell it whether home is online
    pub fn register_remote(&self, peer: PeerHandle) {
        let mut state = self.inner.lock();
        let home_online = state.home_online();
        state.remotes.insert(peer.id(), peer.clone());
        peer.notify(&SignalMessage::status(home_online));

        info!(peer = %peer.id(), home_online, "remote registered");
    }

    /// Remove a connection from whichever slot it holds
    ///
    /// A home that was already superseded leaves the current home alone.
    pub fn unregister(&self, id: PeerId) -> Option<Role> {
        let mut state = self.inner.lock();

        if state.home.as_ref().is_some_and(|home| home.id() == id) {
            state.home = None;
            state.sessions.clear();
            state.broadcast_status(false);
            info!(peer = %id, remotes = state.remotes.len(), "home unregistered");
            return Some(Role::Home);
        }

        if state.remotes.remove(&id).is_some() {
            state.sessions.retain(|_, remote| *remote != id);
            debug!(peer = %id, "remote unregistered");
            return Some(Role::Remote);
        }

        None
    }

    /// Whether the home slot holds a live connection
    pub fn is_home_online(&self) -> bool {
        self.inner.lock().home_online()
    }

    /// Snapshot of the live home connection
    pub fn home(&self) -> Option<PeerHandle> {
        self.inner.lock().home.clone().filter(PeerHandle::is_live)
    }

    /// Whether `id` still holds the home slot, live or not
    pub fn is_current_home(&self, id: PeerId) -> bool {
        self.inner
            .lock()
            .home
            .as_ref()
            .is_some_and(|home| home.id() == id)
    }

    /// Snapshot of the live remote connections
    pub fn remotes(&self) -> Vec<PeerHandle> {
        self.inner
            .lock()
            .remotes
            .values()
            .filter(|r| r.is_live())
            .cloned()
            .collect()
    }

    /// Number of registered remotes
    pub fn remote_count(&self) -> usize {
        self.inner.lock().remotes.len()
    }

    /// Record `remote` as the caller of `session`
    ///
    /// Fails if another live remote already owns the session. Ignored if
    /// `remote` is not registered.
    pub fn open_session(&self, session: SessionId, remote: PeerId) -> Result<(), RoutingError> {
        let mut state = self.inner.lock();
        if !state.remotes.contains_key(&remote) {
            return Ok(());
        }

        let taken = state
            .sessions
            .get(&session)
            .and_then(|owner| state.remotes.get(owner))
            .is_some_and(|owner| owner.is_live() && owner.id() != remote);
        if taken {
            return Err(RoutingError::SessionInUse(session));
        }

        debug!(peer = %remote, session = %session, "session opened");
        state.sessions.insert(session, remote);
        Ok(())
    }

    /// Live remote that opened `session`
    pub fn session_remote(&self, session: &SessionId) -> Option<PeerHandle> {
        let state = self.inner.lock();
        state
            .sessions
            .get(session)
            .and_then(|id| state.remotes.get(id))
            .filter(|r| r.is_live())
            .cloned()
    }
}
