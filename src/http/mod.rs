//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP or Unix socket connection
//!     → server.rs (axum setup, one fallback handler)
//!     → request.rs (ApiRequest checked out of the pool)
//!     → admin::route (dispatch, authorize, handle)
//!     → body.rs (body accumulation for streaming handlers)
//!     → response.rs (single response, conclude)
//!     → Send to client
//! ```

pub mod body;
pub mod request;
pub mod response;
pub mod server;

pub use body::{BodyEvent, ChannelResult};
pub use request::{ApiRequest, RequestPool, RequestRef, RequestState};
pub use server::{ApiServer, ServerSettings};
