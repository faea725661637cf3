//! Admin endpoint handlers.
//!
//! Every handler either concludes the request before returning, marks it
//! `DispatchedStreaming` so the body accumulator picks it up, or takes a
//! [`RequestRef`] and marks it `DispatchedDeferred`.

use std::backtrace::Backtrace;
use std::sync::Arc;
use std::thread;

use axum::http::{header, HeaderMap, StatusCode};
use serde_json::{json, Value};

use crate::controller::{ControllerHandle, EventLoop, LoopStopped};
use crate::error::ApiError;
use crate::http::request::{ApiRequest, RequestRef, RequestState};
use crate::http::response::{
    end_as_bad_request, end_request, respond_ok, respond_with_error, write_json_response, write_text_response,
};
use crate::http::server::ApiServer;
use crate::observability::reinherit::{self, ReinheritError};
use crate::observability::{metrics, ConfigChangeError, LogContext};

pub fn process_ping(req: &ApiRequest) {
    respond_ok(req);
}

pub fn process_info(req: &ApiRequest) {
    let core_count = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let doc = json!({
        "pid": std::process::id(),
        "program_name": env!("CARGO_PKG_NAME"),
        "program_version": env!("CARGO_PKG_VERSION"),
        "core_count": core_count,
    });
    write_json_response(req, StatusCode::OK, &doc);
    end_request(req);
}

pub fn process_shutdown(server: &ApiServer, req: &ApiRequest) {
    tracing::warn!("Shutdown requested through the admin API");
    respond_ok(req);
    server.shutdown().trigger();
}

pub fn process_backtraces(req: &ApiRequest) {
    let current = thread::current();
    let text = format!(
        "Process {} thread {}\n{}\n",
        std::process::id(),
        current.name().unwrap_or("<unnamed>"),
        Backtrace::force_capture()
    );
    write_text_response(req, StatusCode::OK, text);
    end_request(req);
}

pub fn process_config_read(server: &ApiServer, req: &ApiRequest) {
    let doc = server.logging().config().inspect();
    write_json_response(req, StatusCode::OK, &doc);
    end_request(req);
}

/// Start a configuration write. The change itself is applied by
/// [`process_config_body`] once the body has been read.
pub fn process_config_write(req: &ApiRequest) {
    if !has_body(req.headers()) {
        end_as_bad_request(req, "Body required");
        return;
    }
    req.mark(RequestState::DispatchedStreaming);
}

/// Apply a parsed configuration body.
pub fn process_config_body(server: &ApiServer, req: &ApiRequest) -> Result<(), ApiError> {
    let json = req.json_body().ok_or(ApiError::MissingBody)?;
    apply_config_change(server.logging(), req, &json);
    Ok(())
}

fn apply_config_change(logging: &LogContext, req: &ApiRequest, json: &Value) {
    match logging.apply_config_change(json) {
        Ok(()) => respond_ok(req),
        Err(e) => {
            let outcome = match &e {
                ConfigChangeError::Invalid(_) => "rejected",
                ConfigChangeError::Fault(_) => "fault",
            };
            metrics::record_config_change(outcome);
            tracing::warn!(error = %e, "Logging configuration change refused");
            respond_with_error(
                req,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Error reconfiguring logging system: {}", e),
            );
        }
    }
}

pub fn process_reopen_logs(server: &ApiServer, req: &ApiRequest) {
    match server.logging().reopen_log_files() {
        Ok(()) => respond_ok(req),
        Err(e) => {
            tracing::error!(error = %e, "Cannot reopen log files");
            respond_with_error(
                req,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Cannot reopen log files: {}", e),
            );
        }
    }
}

/// Ask the watchdog for the log file descriptor and switch to it.
pub fn process_reinherit_logs(server: &ApiServer, req: &Arc<ApiRequest>) {
    if server.instance_dir().is_empty() || server.fd_passing_password().is_empty() {
        write_json_response(
            req,
            StatusCode::NOT_IMPLEMENTED,
            &json!({
                "status": "error",
                "code": "NO_WATCHDOG",
                "message": "No watchdog process",
            }),
        );
        end_request(req);
        return;
    }

    let pending = req.ref_request();
    req.mark(RequestState::DispatchedDeferred);

    let instance_dir = server.instance_dir().to_string();
    let password = server.fd_passing_password().to_string();
    let logging = Arc::clone(server.logging());
    let api_loop = server.api_loop().clone();

    tokio::task::spawn_blocking(move || {
        let result = reinherit::fetch_log_file(&instance_dir, &password);
        if api_loop
            .run_later(move || log_file_received(pending, &logging, result))
            .is_err()
        {
            tracing::warn!("API event loop stopped before the log file could be adopted");
        }
    });
}

fn log_file_received(pending: RequestRef, logging: &LogContext, result: Result<std::fs::File, ReinheritError>) {
    let outcome = result.map(|file| logging.adopt_log_file(file));

    let req = pending.request();
    if req.ended() {
        pending.release();
        return;
    }
    match outcome {
        Ok(()) => respond_ok(req),
        Err(e) => {
            tracing::error!(error = %e, "Cannot reinherit log file");
            respond_with_error(req, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    }
    pending.release();
}

pub fn process_server_status(server: &ApiServer, req: &Arc<ApiRequest>) -> Result<(), ApiError> {
    let pending = req.ref_request();
    req.mark(RequestState::DispatchedDeferred);
    defer_state_inspection(server.controller(), server.api_loop().clone(), pending)
}

/// Snapshot the controller's state on its own loop and answer the request
/// back on `api_loop`.
///
/// The request may conclude in between (the client disconnects); the answer
/// is then dropped and only the reference is returned.
pub fn defer_state_inspection(
    controller: &ControllerHandle,
    api_loop: EventLoop,
    pending: RequestRef,
) -> Result<(), ApiError> {
    let inspected = Arc::clone(&controller.controller);
    controller
        .event_loop
        .run_later(move || {
            let state = inspected.inspect_state();
            if api_loop
                .run_later(move || controller_state_gathered(pending, state))
                .is_err()
            {
                tracing::warn!("API event loop stopped before controller state could be delivered");
            }
        })
        .map_err(|LoopStopped| ApiError::LoopStopped("controller"))
}

fn controller_state_gathered(pending: RequestRef, state: Value) {
    let req = pending.request();
    if req.ended() {
        pending.release();
        return;
    }
    write_json_response(req, StatusCode::OK, &state);
    end_request(req);
    pending.release();
}

fn has_body(headers: &HeaderMap) -> bool {
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    match content_length {
        Some(len) => len > 0,
        None => headers.contains_key(header::TRANSFER_ENCODING),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::TrafficStats;
    use crate::http::request::RequestPool;
    use crate::observability::{LogConfig, LogSink};
    use axum::http::{HeaderValue, Method};

    #[test]
    fn test_has_body() {
        let mut headers = HeaderMap::new();
        assert!(!has_body(&headers));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(!has_body(&headers));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("17"));
        assert!(has_body(&headers));

        let mut chunked = HeaderMap::new();
        chunked.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert!(has_body(&chunked));
    }

    #[test]
    fn test_config_write_without_body() {
        let pool = RequestPool::new(1);
        let (req, mut rx) = pool.checkout(Method::PUT, "/config.json", HeaderMap::new());
        process_config_write(&req);

        assert!(req.ended());
        assert_eq!(rx.try_recv().unwrap().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_change_leaves_config_untouched() {
        let logging = LogContext::new(LogConfig::default(), LogSink::stderr());
        let pool = RequestPool::new(1);
        let (req, mut rx) = pool.checkout(Method::PUT, "/config.json", HeaderMap::new());

        apply_config_change(&logging, &req, &json!({ "level": "loud" }));

        assert_eq!(rx.try_recv().unwrap().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*logging.config(), LogConfig::default());
    }

    #[test]
    fn test_state_delivered_on_api_loop() {
        let (controller_loop, mut controller_runner) = EventLoop::new("controller");
        let (api_loop, mut api_runner) = EventLoop::new("api");
        let handle = ControllerHandle::new(Arc::new(TrafficStats::new()), controller_loop);
        let pool = RequestPool::new(1);
        let (req, mut rx) = pool.checkout(Method::GET, "/server.json", HeaderMap::new());

        defer_state_inspection(&handle, api_loop, req.ref_request()).unwrap();
        assert_eq!(req.refcount(), 2);
        assert_eq!(api_runner.run_pending(), 0);

        assert_eq!(controller_runner.run_pending(), 1);
        assert!(!req.response_written());
        assert_eq!(api_runner.run_pending(), 1);

        assert!(req.ended());
        assert_eq!(req.refcount(), 1);
        assert_eq!(rx.try_recv().unwrap().status(), StatusCode::OK);
    }

    #[test]
    fn test_stopped_controller_loop() {
        let (controller_loop, runner) = EventLoop::new("controller");
        drop(runner);
        let (api_loop, _api_runner) = EventLoop::new("api");
        let handle = ControllerHandle::new(Arc::new(TrafficStats::new()), controller_loop);
        let pool = RequestPool::new(1);
        let (req, _rx) = pool.checkout(Method::GET, "/server.json", HeaderMap::new());

        let result = defer_state_inspection(&handle, api_loop, req.ref_request());
        assert!(matches!(result, Err(ApiError::LoopStopped("controller"))));
        assert_eq!(req.refcount(), 1);
    }
}
