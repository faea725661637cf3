//! Admin route table.
//!
//! Paths match exactly after the query string is stripped. Each path maps to
//! one [`Route`]; a route plus an allowed method resolves to a [`Dispatch`],
//! which is what handlers are selected on.

use axum::http::Method;

use crate::admin::auth::Capability;

const GET: &[Method] = &[Method::GET];
const PUT: &[Method] = &[Method::PUT];
const POST: &[Method] = &[Method::POST];
const GET_PUT: &[Method] = &[Method::GET, Method::PUT];

/// A recognized admin path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Ping,
    Info,
    Shutdown,
    Backtraces,
    Config,
    ReinheritLogs,
    ReopenLogs,
    ServerStatus,
}

impl Route {
    pub fn resolve(path: &str) -> Option<Route> {
        let route = match normalize_path(path) {
            "/ping.json" => Route::Ping,
            // "/version.json" is the deprecated name of "/info.json"
            "/info.json" | "/version.json" => Route::Info,
            "/shutdown.json" => Route::Shutdown,
            "/backtraces.txt" => Route::Backtraces,
            "/config.json" => Route::Config,
            "/reinherit_logs.json" => Route::ReinheritLogs,
            "/reopen_logs.json" => Route::ReopenLogs,
            "/server.json" => Route::ServerStatus,
            _ => return None,
        };
        Some(route)
    }

    pub fn allowed_methods(&self) -> &'static [Method] {
        match self {
            Route::Ping | Route::Info | Route::Backtraces | Route::ServerStatus => GET,
            Route::Shutdown => PUT,
            Route::ReinheritLogs | Route::ReopenLogs => POST,
            Route::Config => GET_PUT,
        }
    }
}

/// A resolved handler selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Ping,
    Info,
    Shutdown,
    Backtraces,
    ReadConfig,
    WriteConfig,
    ReinheritLogs,
    ReopenLogs,
    ServerStatus,
}

impl Dispatch {
    pub fn capability(&self) -> Capability {
        match self {
            Dispatch::Ping
            | Dispatch::Info
            | Dispatch::Backtraces
            | Dispatch::ReadConfig
            | Dispatch::ServerStatus => Capability::StateInspection,
            Dispatch::Shutdown | Dispatch::WriteConfig | Dispatch::ReinheritLogs | Dispatch::ReopenLogs => {
                Capability::Admin
            }
        }
    }

    /// Metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            Dispatch::Ping => "ping",
            Dispatch::Info => "info",
            Dispatch::Shutdown => "shutdown",
            Dispatch::Backtraces => "backtraces",
            Dispatch::ReadConfig => "config_read",
            Dispatch::WriteConfig => "config_write",
            Dispatch::ReinheritLogs => "reinherit_logs",
            Dispatch::ReopenLogs => "reopen_logs",
            Dispatch::ServerStatus => "server_status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingError {
    NotFound,
    MethodNotAllowed(&'static [Method]),
}

/// Resolve a request head to a handler.
pub fn dispatch(method: &Method, path: &str) -> Result<Dispatch, RoutingError> {
    let route = Route::resolve(path).ok_or(RoutingError::NotFound)?;
    let dispatch = match (route, method) {
        (Route::Ping, &Method::GET) => Dispatch::Ping,
        (Route::Info, &Method::GET) => Dispatch::Info,
        (Route::Shutdown, &Method::PUT) => Dispatch::Shutdown,
        (Route::Backtraces, &Method::GET) => Dispatch::Backtraces,
        (Route::Config, &Method::GET) => Dispatch::ReadConfig,
        (Route::Config, &Method::PUT) => Dispatch::WriteConfig,
        (Route::ReinheritLogs, &Method::POST) => Dispatch::ReinheritLogs,
        (Route::ReopenLogs, &Method::POST) => Dispatch::ReopenLogs,
        (Route::ServerStatus, &Method::GET) => Dispatch::ServerStatus,
        _ => return Err(RoutingError::MethodNotAllowed(route.allowed_methods())),
    };
    Ok(dispatch)
}

/// Strip the query string and fragment from a request target.
pub fn normalize_path(target: &str) -> &str {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}
