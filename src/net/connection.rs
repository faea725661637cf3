//! Client connection identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Capture the transport-level peer identity at accept time
//! - Expose the peer's uid when the transport is a Unix domain socket
//!
//! The HTTP layer treats [`ClientInfo`] as an opaque handle passed alongside
//! each request; only the authorization gate looks inside.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::connect_info::Connected;
use axum::serve::IncomingStream;
use tokio::net::{TcpListener, UnixListener};

/// Source of connection IDs. Only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a client connected from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    Unix,
}

/// Transport-level information about an admin client.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: ConnectionId,
    pub peer: PeerAddr,
    /// Peer uid from `SO_PEERCRED`. Only available on Unix domain sockets.
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn tcp(addr: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            peer: PeerAddr::Tcp(addr),
            uid: None,
        }
    }

    pub fn unix(uid: Option<u32>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer: PeerAddr::Unix,
            uid,
        }
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.peer, self.uid) {
            (PeerAddr::Tcp(addr), _) => write!(f, "{} ({})", self.id, addr),
            (PeerAddr::Unix, Some(uid)) => write!(f, "{} (unix, uid {})", self.id, uid),
            (PeerAddr::Unix, None) => write!(f, "{} (unix)", self.id),
        }
    }
}

impl Connected<IncomingStream<'_, TcpListener>> for ClientInfo {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self::tcp(*stream.remote_addr())
    }
}

impl Connected<IncomingStream<'_, UnixListener>> for ClientInfo {
    fn connect_info(stream: IncomingStream<'_, UnixListener>) -> Self {
        let uid = match stream.io().peer_cred() {
            Ok(cred) => Some(cred.uid()),
            Err(e) => {
                tracing::warn!(error = %e, "Unable to read peer credentials");
                None
            }
        };
        Self::unix(uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn client_display_includes_uid() {
        let client = ClientInfo::unix(Some(1000));
        assert!(client.to_string().ends_with("(unix, uid 1000)"));

        let client = ClientInfo::tcp("127.0.0.1:4000".parse().unwrap());
        assert!(client.to_string().ends_with("(127.0.0.1:4000)"));
    }
}
