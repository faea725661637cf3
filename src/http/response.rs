//! Response writing and request completion.
//!
//! # Responsibilities
//! - Emit exactly one response per request
//! - Honor the request's keep-alive preference (`Connection: close`)
//! - Conclude requests, tolerating a request that already concluded
//! - Provide the canned error responses handlers use
//!
//! # Design Decisions
//! - Writing to a concluded request is refused, not an error
//! - Concluding a request that never got a response answers it with a 500
//!   so the client is never left half-answered

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};

use crate::http::request::ApiRequest;
use crate::observability::metrics;

pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Headers for a JSON response that must not be cached.
pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers
}

fn text_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers
}

/// Write a complete response. Returns false if nothing was written because
/// the request already concluded or already has a response.
pub fn write_simple_response(
    req: &ApiRequest,
    status: StatusCode,
    headers: HeaderMap,
    body: impl Into<Body>,
) -> bool {
    if req.ended() {
        tracing::debug!(path = %req.path(), status = %status, "Request already concluded; response dropped");
        return false;
    }
    let Some(responder) = req.take_responder() else {
        tracing::warn!(path = %req.path(), status = %status, "Response already written");
        return false;
    };

    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().extend(headers);
    if !req.want_keep_alive() {
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }

    metrics::record_response(status.as_u16());
    if responder.send(response).is_err() {
        tracing::debug!(path = %req.path(), "Client went away before the response was delivered");
    }
    true
}

/// Write `doc` as a pretty-printed JSON document.
pub fn write_json_response(req: &ApiRequest, status: StatusCode, doc: &Value) -> bool {
    let mut body = match serde_json::to_string_pretty(doc) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Unable to serialize JSON response");
            req.set_want_keep_alive(false);
            return write_simple_response(req, StatusCode::INTERNAL_SERVER_ERROR, text_headers(), "Internal server error");
        }
    };
    body.push('\n');
    write_simple_response(req, status, json_headers(), body)
}

/// Conclude the request. A no-op if it already concluded.
pub fn end_request(req: &ApiRequest) {
    if req.ended() {
        tracing::debug!(path = %req.path(), "Request already concluded");
        return;
    }
    if !req.response_written() {
        req.set_want_keep_alive(false);
        write_simple_response(
            req,
            StatusCode::INTERNAL_SERVER_ERROR,
            json_headers(),
            "{\"status\":\"error\",\"message\":\"Internal server error\"}\n",
        );
    }
    req.conclude();
}

/// Write `{"status":"ok"}` and conclude.
pub fn respond_ok(req: &ApiRequest) {
    write_json_response(req, StatusCode::OK, &json!({ "status": "ok" }));
    end_request(req);
}

/// Write `{"status":"error","message":...}` with `status` and conclude.
pub fn respond_with_error(req: &ApiRequest, status: StatusCode, message: &str) {
    write_json_response(req, status, &json!({ "status": "error", "message": message }));
    end_request(req);
}

pub fn respond_with_401(req: &ApiRequest) {
    let mut headers = text_headers();
    headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer realm=\"api\""));
    write_simple_response(req, StatusCode::UNAUTHORIZED, headers, "Unauthorized");
    end_request(req);
}

pub fn respond_with_404(req: &ApiRequest) {
    write_simple_response(req, StatusCode::NOT_FOUND, text_headers(), "Not found");
    end_request(req);
}

pub fn respond_with_405(req: &ApiRequest, allowed: &[Method]) {
    let mut headers = text_headers();
    let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        headers.insert(header::ALLOW, value);
    }
    write_simple_response(req, StatusCode::METHOD_NOT_ALLOWED, headers, "Method not allowed");
    end_request(req);
}

pub fn respond_with_413(req: &ApiRequest) {
    write_simple_response(req, StatusCode::PAYLOAD_TOO_LARGE, text_headers(), "Request body too large");
    end_request(req);
}

pub fn respond_with_422(req: &ApiRequest, message: &str) {
    write_simple_response(req, StatusCode::UNPROCESSABLE_ENTITY, text_headers(), message.to_string());
    end_request(req);
}

pub fn end_as_bad_request(req: &ApiRequest, message: &str) {
    write_simple_response(req, StatusCode::BAD_REQUEST, text_headers(), message.to_string());
    end_request(req);
}

/// Plain-text response for text endpoints.
pub fn write_text_response(req: &ApiRequest, status: StatusCode, text: String) -> bool {
    write_simple_response(req, status, text_headers(), text)
}
