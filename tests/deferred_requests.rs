//! Requests answered from another event loop, including clients that leave
//! before the answer is ready.

use std::sync::Arc;

use axum::http::{HeaderMap, Method, StatusCode};

use router_admin::admin::handlers::defer_state_inspection;
use router_admin::controller::{ControllerHandle, EventLoop, TrafficStats};
use router_admin::http::RequestPool;

#[test]
fn test_client_disconnects_while_deferred() {
    let (controller_loop, mut controller_runner) = EventLoop::new("controller");
    let (api_loop, mut api_runner) = EventLoop::new("api");
    let controller = ControllerHandle::new(Arc::new(TrafficStats::new()), controller_loop);
    let pool = RequestPool::new(4);

    let (req, mut rx) = pool.checkout(Method::GET, "/server.json", HeaderMap::new());
    defer_state_inspection(&controller, api_loop, req.ref_request()).unwrap();
    assert_eq!(req.refcount(), 2);

    // The controller answers, then the client goes away before the API loop
    // gets to run the completion.
    assert_eq!(controller_runner.run_pending(), 1);
    req.abort();
    assert_eq!(api_runner.run_pending(), 1);

    assert!(req.ended());
    assert!(!req.response_written());
    assert_eq!(req.refcount(), 1);
    assert!(rx.try_recv().is_err());

    pool.checkin(req);
    assert_eq!(pool.free_count(), 1);
}

#[test]
fn test_disconnect_before_controller_runs() {
    let (controller_loop, mut controller_runner) = EventLoop::new("controller");
    let (api_loop, mut api_runner) = EventLoop::new("api");
    let controller = ControllerHandle::new(Arc::new(TrafficStats::new()), controller_loop);
    let pool = RequestPool::new(4);

    let (req, _rx) = pool.checkout(Method::GET, "/server.json", HeaderMap::new());
    defer_state_inspection(&controller, api_loop, req.ref_request()).unwrap();

    req.abort();
    // The transport lets go first; the slot stays out of the pool until the
    // deferred work is done with it.
    let pending = Arc::clone(&req);
    pool.checkin(req);
    assert_eq!(pool.free_count(), 0);

    controller_runner.run_pending();
    api_runner.run_pending();
    assert_eq!(pending.refcount(), 0);
    assert!(!pending.response_written());
}

#[test]
fn test_many_deferred_requests() {
    let (controller_loop, mut controller_runner) = EventLoop::new("controller");
    let (api_loop, mut api_runner) = EventLoop::new("api");
    let stats = Arc::new(TrafficStats::new());
    stats.record_transaction(10);
    let controller = ControllerHandle::new(stats, controller_loop);
    let pool = RequestPool::new(8);

    let exchanges: Vec<_> = (0..5)
        .map(|_| pool.checkout(Method::GET, "/server.json", HeaderMap::new()))
        .collect();
    for (req, _) in &exchanges {
        defer_state_inspection(&controller, api_loop.clone(), req.ref_request()).unwrap();
    }
    // Every other client leaves.
    for (req, _) in exchanges.iter().step_by(2) {
        req.abort();
    }

    assert_eq!(controller_runner.run_pending(), 5);
    assert_eq!(api_runner.run_pending(), 5);

    for (i, (req, mut rx)) in exchanges.into_iter().enumerate() {
        assert_eq!(req.refcount(), 1);
        if i % 2 == 0 {
            assert!(rx.try_recv().is_err());
        } else {
            assert_eq!(rx.try_recv().unwrap().status(), StatusCode::OK);
        }
        pool.checkin(req);
    }
    assert_eq!(pool.free_count(), 5);
}
