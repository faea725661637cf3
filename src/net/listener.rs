//! Admin listener binding.
//!
//! # Responsibilities
//! - Parse the configured listen address (TCP or Unix domain socket)
//! - Bind the socket, replacing a stale Unix socket file
//! - Report the bound address for logging

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::net::{TcpListener, UnixListener};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The configured address could not be parsed.
    Address(String),
    /// Failed to bind to address.
    Bind(std::io::Error),
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerError::Address(addr) => write!(f, "Invalid listen address: {}", addr),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A listen address: `unix:/path/to.sock`, `tcp://host:port` or bare `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl FromStr for ListenAddress {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ListenerError::Address(s.to_string()));
            }
            return Ok(ListenAddress::Unix(PathBuf::from(path)));
        }
        let addr = s.strip_prefix("tcp://").unwrap_or(s);
        addr.parse()
            .map(ListenAddress::Tcp)
            .map_err(|_| ListenerError::Address(s.to_string()))
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddress::Tcp(addr) => write!(f, "tcp://{}", addr),
            ListenAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A bound admin listener.
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener, PathBuf),
}

impl Listener {
    /// Bind to the given address.
    pub async fn bind(address: &ListenAddress) -> Result<Self, ListenerError> {
        let listener = match address {
            ListenAddress::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
                Listener::Tcp(listener)
            }
            ListenAddress::Unix(path) => {
                remove_stale_socket(path).map_err(ListenerError::Bind)?;
                let listener = UnixListener::bind(path).map_err(ListenerError::Bind)?;
                Listener::Unix(listener, path.clone())
            }
        };

        tracing::info!(address = %listener.local_address(), "Listener bound");
        Ok(listener)
    }

    /// The address this listener is actually bound to.
    pub fn local_address(&self) -> ListenAddress {
        match self {
            Listener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => ListenAddress::Tcp(addr),
                Err(_) => ListenAddress::Tcp(SocketAddr::from(([0, 0, 0, 0], 0))),
            },
            Listener::Unix(_, path) => ListenAddress::Unix(path.clone()),
        }
    }
}

fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
