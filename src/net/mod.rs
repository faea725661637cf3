//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured listen address
//!     → listener.rs (parse tcp/unix address, bind)
//!     → axum serve loop accepts connections
//!     → connection.rs (connection id, peer credentials)
//!     → Hand off to HTTP layer as ClientInfo
//! ```
//!
//! # Design Decisions
//! - Unix domain sockets are preferred: they carry the peer uid
//! - TCP listeners are supported for tooling; callers must present a key

pub mod connection;
pub mod listener;

pub use connection::{ClientInfo, ConnectionId, PeerAddr};
pub use listener::{ListenAddress, Listener, ListenerError};
