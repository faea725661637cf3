//! Admin API dispatch.
//!
//! # Data Flow
//! ```text
//! ApiRequest (head received)
//!     → routes.rs (path + method → Dispatch, or 404 / 405)
//!     → auth.rs (capability check, or 401)
//!     → handlers.rs (answer now, stream the body, or defer)
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

pub use auth::{ApiKey, Authorizer, Capability};
pub use routes::{Dispatch, Route, RoutingError};

use crate::error::ApiError;
use crate::http::request::{ApiRequest, RequestState};
use crate::http::response::{respond_with_401, respond_with_404, respond_with_405};
use crate::http::server::ApiServer;
use crate::net::ClientInfo;
use crate::observability::metrics;

/// Route a request to its handler.
///
/// Unknown paths and wrong methods are answered before authorization, so a
/// 405 says nothing about whether the caller could have used the endpoint.
pub fn route(server: &ApiServer, client: &ClientInfo, req: &Arc<ApiRequest>) -> Result<(), ApiError> {
    let dispatch = match routes::dispatch(req.method(), req.path()) {
        Ok(dispatch) => dispatch,
        Err(RoutingError::NotFound) => {
            respond_with_404(req);
            return Ok(());
        }
        Err(RoutingError::MethodNotAllowed(allowed)) => {
            respond_with_405(req, allowed);
            return Ok(());
        }
    };

    metrics::record_request(dispatch.name());

    if !server
        .authorizer()
        .authorize(dispatch.capability(), client, req.headers())
    {
        tracing::warn!(client = %client, path = %req.path(), "Unauthorized admin request");
        respond_with_401(req);
        return Ok(());
    }

    req.mark(RequestState::DispatchedImmediate);
    match dispatch {
        Dispatch::Ping => handlers::process_ping(req),
        Dispatch::Info => handlers::process_info(req),
        Dispatch::Shutdown => handlers::process_shutdown(server, req),
        Dispatch::Backtraces => handlers::process_backtraces(req),
        Dispatch::ReadConfig => handlers::process_config_read(server, req),
        Dispatch::WriteConfig => handlers::process_config_write(req),
        Dispatch::ReinheritLogs => handlers::process_reinherit_logs(server, req),
        Dispatch::ReopenLogs => handlers::process_reopen_logs(server, req),
        Dispatch::ServerStatus => handlers::process_server_status(server, req)?,
    }
    Ok(())
}
