//! Admin request state and lifetime tracking.
//!
//! # Responsibilities
//! - Hold per-exchange state: method, path, headers, body, parsed body
//! - Track the request lifecycle and its terminal `Concluded` state
//! - Count references held by deferred callbacks (`RequestRef`)
//! - Recycle request slots through `RequestPool`
//!
//! # Lifecycle
//! ```text
//! Idle → HeadReceived → DispatchedImmediate | DispatchedStreaming | DispatchedDeferred → Concluded
//! ```
//! `Concluded` is terminal for the exchange: it is set once a response has
//! been emitted or the client went away, and nothing that runs later may
//! touch the request without checking [`ApiRequest::ended`] first.

use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::{HeaderMap, Method};
use axum::response::Response;
use serde_json::Value;
use tokio::sync::oneshot;

/// Request lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle = 0,
    HeadReceived = 1,
    DispatchedImmediate = 2,
    DispatchedStreaming = 3,
    DispatchedDeferred = 4,
    Concluded = 5,
}

impl From<u8> for RequestState {
    fn from(val: u8) -> Self {
        match val {
            1 => RequestState::HeadReceived,
            2 => RequestState::DispatchedImmediate,
            3 => RequestState::DispatchedStreaming,
            4 => RequestState::DispatchedDeferred,
            5 => RequestState::Concluded,
            _ => RequestState::Idle,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One inbound admin exchange.
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    state: AtomicU8,
    refcount: AtomicUsize,
    want_keep_alive: AtomicBool,
    response_written: AtomicBool,
    body_finished: AtomicBool,
    body: Mutex<Vec<u8>>,
    json_body: Mutex<Option<Value>>,
    responder: Mutex<Option<oneshot::Sender<Response>>>,
}

impl ApiRequest {
    fn idle() -> Self {
        Self {
            method: Method::GET,
            path: String::new(),
            headers: HeaderMap::new(),
            state: AtomicU8::new(RequestState::Idle as u8),
            refcount: AtomicUsize::new(0),
            want_keep_alive: AtomicBool::new(true),
            response_written: AtomicBool::new(false),
            body_finished: AtomicBool::new(false),
            body: Mutex::new(Vec::new()),
            json_body: Mutex::new(None),
            responder: Mutex::new(None),
        }
    }

    fn initialize(&mut self, method: Method, path: &str, headers: HeaderMap, responder: oneshot::Sender<Response>) {
        self.method = method;
        self.path.clear();
        self.path.push_str(path);
        self.headers = headers;
        *self.state.get_mut() = RequestState::HeadReceived as u8;
        *self.refcount.get_mut() = 1;
        *self.want_keep_alive.get_mut() = true;
        *self.response_written.get_mut() = false;
        *self.body_finished.get_mut() = false;
        *self.responder.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(responder);
    }

    /// Drop everything belonging to the previous exchange.
    fn deinitialize(&mut self) {
        self.body.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
        *self.json_body.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
        *self.responder.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
        self.headers.clear();
        self.path.clear();
        *self.state.get_mut() = RequestState::Idle as u8;
        *self.refcount.get_mut() = 0;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Normalized path (no query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn state(&self) -> RequestState {
        RequestState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether the request has concluded (answered or abandoned).
    pub fn ended(&self) -> bool {
        self.state() == RequestState::Concluded
    }

    /// Move to a dispatch state. Has no effect once concluded.
    pub fn mark(&self, state: RequestState) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current != RequestState::Concluded as u8).then_some(state as u8)
        });
    }

    /// Set the terminal state. Returns false if it was already set.
    pub(crate) fn conclude(&self) -> bool {
        self.state.swap(RequestState::Concluded as u8, Ordering::AcqRel) != RequestState::Concluded as u8
    }

    /// The client went away: conclude without a response.
    pub fn abort(&self) {
        if self.conclude() {
            lock(&self.responder).take();
            if !self.response_written() {
                tracing::debug!(method = %self.method, path = %self.path, "Request aborted");
            }
        }
    }

    pub fn want_keep_alive(&self) -> bool {
        self.want_keep_alive.load(Ordering::Acquire)
    }

    pub fn set_want_keep_alive(&self, keep_alive: bool) {
        self.want_keep_alive.store(keep_alive, Ordering::Release);
    }

    pub fn response_written(&self) -> bool {
        self.response_written.load(Ordering::Acquire)
    }

    /// Take the response channel. Yields it at most once per exchange.
    pub(crate) fn take_responder(&self) -> Option<oneshot::Sender<Response>> {
        let responder = lock(&self.responder).take();
        if responder.is_some() {
            self.response_written.store(true, Ordering::Release);
        }
        responder
    }

    pub fn append_body(&self, data: &[u8]) {
        lock(&self.body).extend_from_slice(data);
    }

    pub fn body_len(&self) -> usize {
        lock(&self.body).len()
    }

    pub fn with_body<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&lock(&self.body))
    }

    /// Record end of the body stream. Returns false if it was already recorded.
    pub(crate) fn finish_body(&self) -> bool {
        !self.body_finished.swap(true, Ordering::AcqRel)
    }

    pub fn body_finished(&self) -> bool {
        self.body_finished.load(Ordering::Acquire)
    }

    pub fn set_json_body(&self, value: Value) {
        *lock(&self.json_body) = Some(value);
    }

    pub fn json_body(&self) -> Option<Value> {
        lock(&self.json_body).clone()
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// Take a counted reference for a deferred callback.
    ///
    /// The callback must check [`ended`](Self::ended) before touching the
    /// request. The reference is returned when the `RequestRef` is released
    /// or dropped.
    #[track_caller]
    pub fn ref_request(self: &Arc<Self>) -> RequestRef {
        let location = Location::caller();
        let count = self.refcount.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(refcount = count, at = %location, path = %self.path, "Request referenced");
        RequestRef {
            request: Arc::clone(self),
            location,
        }
    }

    fn unref(&self, location: &Location<'_>) {
        let previous = self.refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "request refcount underflow");
        tracing::trace!(refcount = previous - 1, referenced_at = %location, path = %self.path, "Request unreferenced");
    }
}

/// A counted reference to a request, held across a deferral.
#[must_use = "dropping a RequestRef releases it immediately"]
pub struct RequestRef {
    request: Arc<ApiRequest>,
    location: &'static Location<'static>,
}

impl RequestRef {
    pub fn request(&self) -> &Arc<ApiRequest> {
        &self.request
    }

    /// Give the reference back.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RequestRef {
    fn drop(&mut self) {
        self.request.unref(self.location);
    }
}

/// Free list of request slots.
///
/// A slot only returns to the pool when no deferred callback still holds
/// it, and it is wiped before it is handed out again.
pub struct RequestPool {
    free: Mutex<Vec<ApiRequest>>,
    capacity: usize,
}

impl RequestPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Start a new exchange, reusing a free slot when one is available.
    pub fn checkout(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
    ) -> (Arc<ApiRequest>, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let mut request = lock(&self.free).pop().unwrap_or_else(ApiRequest::idle);
        request.initialize(method, path, headers, tx);
        (Arc::new(request), rx)
    }

    /// Hand the transport's reference back.
    pub fn checkin(&self, request: Arc<ApiRequest>) {
        request.refcount.fetch_sub(1, Ordering::AcqRel);
        if let Ok(mut request) = Arc::try_unwrap(request) {
            request.deinitialize();
            let mut free = lock(&self.free);
            if free.len() < self.capacity {
                free.push(request);
            }
        }
    }

    pub fn free_count(&self) -> usize {
        lock(&self.free).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checkout(pool: &RequestPool) -> (Arc<ApiRequest>, oneshot::Receiver<Response>) {
        pool.checkout(Method::PUT, "/config.json", HeaderMap::new())
    }

    #[test]
    fn test_state_transitions() {
        let pool = RequestPool::new(4);
        let (req, _rx) = checkout(&pool);
        assert_eq!(req.state(), RequestState::HeadReceived);

        req.mark(RequestState::DispatchedStreaming);
        assert_eq!(req.state(), RequestState::DispatchedStreaming);
        assert!(!req.ended());

        assert!(req.conclude());
        assert!(!req.conclude());

        // Terminal state sticks.
        req.mark(RequestState::DispatchedImmediate);
        assert!(req.ended());
    }

    #[test]
    fn test_ref_unref() {
        let pool = RequestPool::new(4);
        let (req, _rx) = checkout(&pool);
        assert_eq!(req.refcount(), 1);

        let first = req.ref_request();
        let second = req.ref_request();
        assert_eq!(req.refcount(), 3);

        first.release();
        assert_eq!(req.refcount(), 2);
        drop(second);
        assert_eq!(req.refcount(), 1);
    }

    #[test]
    fn test_abort_drops_responder() {
        let pool = RequestPool::new(4);
        let (req, mut rx) = checkout(&pool);
        req.abort();

        assert!(req.ended());
        assert!(!req.response_written());
        assert!(rx.try_recv().is_err());
        assert!(req.take_responder().is_none());
    }

    #[test]
    fn test_recycled_request_is_clean() {
        let pool = RequestPool::new(4);
        let (req, _rx) = checkout(&pool);
        req.append_body(br#"{"level":"debug"}"#);
        req.set_json_body(json!({ "level": "debug" }));
        assert!(req.finish_body());
        req.abort();
        pool.checkin(req);
        assert_eq!(pool.free_count(), 1);

        let (req, _rx) = pool.checkout(Method::GET, "/server.json", HeaderMap::new());
        assert_eq!(pool.free_count(), 0);
        assert_eq!(req.path(), "/server.json");
        assert_eq!(req.body_len(), 0);
        assert!(req.json_body().is_none());
        assert!(!req.body_finished());
        assert!(!req.ended());
        assert_eq!(req.refcount(), 1);
    }

    #[test]
    fn test_referenced_request_not_recycled() {
        let pool = RequestPool::new(4);
        let (req, _rx) = checkout(&pool);
        let pending = req.ref_request();
        req.abort();
        pool.checkin(req);
        assert_eq!(pool.free_count(), 0);

        assert_eq!(pending.request().refcount(), 1);
        pending.release();
    }

    #[test]
    fn test_pool_capacity() {
        let pool = RequestPool::new(1);
        let (a, _rx_a) = checkout(&pool);
        let (b, _rx_b) = checkout(&pool);
        pool.checkin(a);
        pool.checkin(b);
        assert_eq!(pool.free_count(), 1);
    }
}
