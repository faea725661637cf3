//! Admin HTTP server.
//!
//! # Responsibilities
//! - Accept connections on a TCP or Unix socket listener
//! - Turn each inbound exchange into an [`ApiRequest`] and dispatch it
//! - Stream request bodies into the body accumulator
//! - Hand the written response back to axum
//! - Abort requests whose client went away
//! - Apply logging configuration pushed by the config watcher
//!
//! # Design Decisions
//! - One fallback handler; routing is done by `admin::route` so that every
//!   path, including unknown ones, goes through the same request lifecycle
//! - The response travels over a oneshot channel, so deferred handlers can
//!   answer from another loop while the connection task waits
//! - Dropping the connection task aborts the request; deferred callbacks see
//!   `ended()` and leave it alone

use std::backtrace::Backtrace;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::admin::{self, ApiKey, Authorizer};
use crate::config::DaemonConfig;
use crate::controller::{ControllerHandle, EventLoop};
use crate::error::ApiError;
use crate::http::body::BodyEvent;
use crate::http::request::{ApiRequest, RequestPool, RequestState};
use crate::http::response::end_request;
use crate::lifecycle::Shutdown;
use crate::net::{ClientInfo, Listener};
use crate::observability::LogContext;

/// Tunables taken from the daemon configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub instance_dir: String,
    pub fd_passing_password: String,
    pub api_keys: Vec<ApiKey>,
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub request_pool_size: usize,
}

impl ServerSettings {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            instance_dir: config.admin.instance_dir.clone(),
            fd_passing_password: config.admin.fd_passing_password.clone(),
            api_keys: config.admin.api_keys.iter().map(ApiKey::from).collect(),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            max_body_size: config.security.max_body_size,
            request_pool_size: config.admin.request_pool_size,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&DaemonConfig::default())
    }
}

struct ServerInner {
    authorizer: Authorizer,
    logging: Arc<LogContext>,
    controller: ControllerHandle,
    api_loop: EventLoop,
    shutdown: Arc<Shutdown>,
    pool: RequestPool,
    settings: ServerSettings,
}

/// The admin API server. Cheap to clone.
#[derive(Clone)]
pub struct ApiServer {
    inner: Arc<ServerInner>,
}

impl ApiServer {
    /// `api_loop` is the loop deferred work returns to before touching a
    /// request again.
    pub fn new(
        settings: ServerSettings,
        logging: Arc<LogContext>,
        controller: ControllerHandle,
        shutdown: Arc<Shutdown>,
        api_loop: EventLoop,
    ) -> Self {
        let inner = ServerInner {
            authorizer: Authorizer::for_current_process(settings.api_keys.clone()),
            logging,
            controller,
            api_loop,
            shutdown,
            pool: RequestPool::new(settings.request_pool_size),
            settings,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.inner.authorizer
    }

    pub fn logging(&self) -> &Arc<LogContext> {
        &self.inner.logging
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.inner.controller
    }

    pub fn api_loop(&self) -> &EventLoop {
        &self.inner.api_loop
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.inner.shutdown
    }

    pub fn pool(&self) -> &RequestPool {
        &self.inner.pool
    }

    pub fn instance_dir(&self) -> &str {
        &self.inner.settings.instance_dir
    }

    pub fn fd_passing_password(&self) -> &str {
        &self.inner.settings.fd_passing_password
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let settings = &self.inner.settings;
        Router::new().fallback(handle_request).with_state(self.clone()).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CatchPanicLayer::new())
                // Timeout needs a `Default` response body, which the limit
                // layer's body is not, so the limit wraps the timeout.
                .layer(RequestBodyLimitLayer::new(settings.max_body_size))
                .layer(TimeoutLayer::new(settings.request_timeout)),
        )
    }

    /// Serve until a shutdown signal arrives.
    ///
    /// Configurations received on `config_updates` have their logging
    /// section applied as they arrive.
    pub async fn run(
        self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<DaemonConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        tracing::info!(address = %listener.local_address(), "Admin server starting");

        let logging = Arc::clone(&self.inner.logging);
        let updates = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match logging.reload(&config.logging) {
                    Ok(()) => tracing::info!("Logging configuration reloaded from file"),
                    Err(e) => tracing::error!(
                        "Failed to apply reloaded logging configuration: {}. Keeping current configuration.",
                        e
                    ),
                }
            }
        });

        let app = self.router();
        let signal = async move {
            let _ = shutdown.recv().await;
            tracing::info!("Admin server draining connections");
        };

        let result = match listener {
            Listener::Tcp(listener) => {
                axum::serve(listener, app.into_make_service_with_connect_info::<ClientInfo>())
                    .with_graceful_shutdown(signal)
                    .await
            }
            Listener::Unix(listener, path) => {
                let result = axum::serve(listener, app.into_make_service_with_connect_info::<ClientInfo>())
                    .with_graceful_shutdown(signal)
                    .await;
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::debug!(path = %path.display(), error = %e, "Could not remove socket file");
                }
                result
            }
        };

        updates.abort();
        tracing::info!("Admin server stopped");
        result
    }

    /// Dispatch a request whose head has arrived.
    pub fn on_request_begin(&self, client: &ClientInfo, req: &Arc<ApiRequest>) {
        tracing::info!(client = %client, method = %req.method(), path = %req.path(), "API request");
        if let Err(e) = admin::route(self, client, req) {
            self.handle_error(client, req, &e);
        }
    }

    /// Log a handler failure and make sure the client is answered.
    pub(crate) fn handle_error(&self, client: &ClientInfo, req: &ApiRequest, error: &ApiError) {
        let backtrace = Backtrace::capture();
        tracing::error!(
            client = %client,
            method = %req.method(),
            path = %req.path(),
            error = %error,
            backtrace = %backtrace,
            "Error while handling API request"
        );
        if !req.ended() {
            req.set_want_keep_alive(false);
            end_request(req);
        }
    }
}

#[derive(Clone, Copy, Default)]
struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Transport side of one exchange. Aborts the request and returns the slot
/// to the pool when the connection task finishes or is dropped.
struct Exchange<'a> {
    pool: &'a RequestPool,
    req: Option<Arc<ApiRequest>>,
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if let Some(req) = self.req.take() {
            req.abort();
            self.pool.checkin(req);
        }
    }
}

async fn handle_request(
    State(server): State<ApiServer>,
    ConnectInfo(client): ConnectInfo<ClientInfo>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let (req, response_rx) = server.pool().checkout(parts.method, parts.uri.path(), parts.headers);
    let exchange = Exchange {
        pool: server.pool(),
        req: Some(Arc::clone(&req)),
    };

    server.on_request_begin(&client, &req);

    if req.state() == RequestState::DispatchedStreaming && !req.ended() {
        let mut stream = body.into_data_stream();
        loop {
            let result = match stream.next().await {
                Some(Ok(chunk)) => server.on_request_body(&client, &req, BodyEvent::Data(&chunk)),
                Some(Err(e)) => server.on_request_body(&client, &req, BodyEvent::Error(&e)),
                None => server.on_request_body(&client, &req, BodyEvent::End),
            };
            if result.end {
                break;
            }
        }
    }

    drop(req);
    let response = match response_rx.await {
        Ok(response) => response,
        Err(_) => abandoned_response(),
    };
    drop(exchange);
    response
}

/// Nothing will be delivered on this connection; close it.
fn abandoned_response() -> Response {
    let mut response = StatusCode::BAD_REQUEST.into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
