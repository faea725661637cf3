//! Admin API server for a request-routing daemon.

pub mod admin;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::DaemonConfig;
pub use error::ApiError;
pub use http::{ApiServer, ServerSettings};
pub use lifecycle::Shutdown;
