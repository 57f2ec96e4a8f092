//! WebRTC signaling relay between one home station and its remote callers
//!
//! The relay brokers session establishment only: peers exchange session
//! descriptions and ICE candidates through it, then media flows directly
//! between them.
//!
//! # Protocol
//!
//! Each peer opens a WebSocket on **`/ws`** and sends JSON text frames of the
//! form `{"type": ..., "payload": ...}` (see [`homecall_protocol`]):
//!
//! - `join` binds the connection to the `home` or `remote` role
//! - `offer` from a remote goes to home
//! - `answer` from home goes to the remotes, or only to the caller of the
//!   tagged `sessionId`
//! - `candidate` crosses from home to the remotes or from a remote to home
//! - `status` (`{"homeOnline": bool}`) is sent to remotes on join and on
//!   every home presence change
//! - `error` reports a message the relay could not route
//!
//! Forwarded frames are relayed exactly as received. Frames that do not
//! decode are logged and dropped.
//!
//! **`GET /api/health`** answers `{"status": "ok"}`.
//!
//! # Example
//!
//! ```bash
//! homecall-signaling --listen 0.0.0.0:5000 --heartbeat-interval-secs 30
//! ```

#![forbid(unsafe_code)]

pub mod cli;
pub mod error;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

pub use error::{RoutingError, SignalingError};
pub use router::{ConnectionState, PeerSession};
pub use server::{ServerConfig, ServerHandle, serve, start};
pub use state::{PeerHandle, PeerId, ServerState};
