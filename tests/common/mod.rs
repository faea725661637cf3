//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use router_admin::admin::ApiKey;
use router_admin::controller::{ControllerHandle, EventLoop, TrafficStats};
use router_admin::http::{ApiServer, ServerSettings};
use router_admin::lifecycle::Shutdown;
use router_admin::net::{ListenAddress, Listener};
use router_admin::observability::{LogConfig, LogContext, LogSink};

pub const SUPER_KEY: &str = "test-super-key";
pub const APP_KEY: &str = "test-app-key";

/// A running admin server and the handles a test needs to poke at it.
pub struct TestServer {
    pub address: ListenAddress,
    pub shutdown: Arc<Shutdown>,
    pub logging: Arc<LogContext>,
    pub stats: Arc<TrafficStats>,
    pub handle: JoinHandle<io::Result<()>>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        match &self.address {
            ListenAddress::Tcp(addr) => format!("http://{}{}", addr, path),
            ListenAddress::Unix(_) => panic!("no URL for a Unix socket server"),
        }
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        match &self.address {
            ListenAddress::Tcp(addr) => *addr,
            ListenAddress::Unix(_) => panic!("not a TCP server"),
        }
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(SUPER_KEY)
    }

    pub fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(SUPER_KEY)
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(SUPER_KEY)
    }
}

pub fn test_settings() -> ServerSettings {
    ServerSettings {
        api_keys: vec![ApiKey::new(SUPER_KEY, true), ApiKey::new(APP_KEY, false)],
        ..ServerSettings::default()
    }
}

/// Start a server on an ephemeral loopback port.
pub async fn start_server() -> TestServer {
    start_server_on(ListenAddress::Tcp("127.0.0.1:0".parse().unwrap()), test_settings()).await
}

pub async fn start_server_on(address: ListenAddress, settings: ServerSettings) -> TestServer {
    let listener = Listener::bind(&address).await.unwrap();
    let address = listener.local_address();

    let (controller_loop, _) = EventLoop::spawn("controller");
    let (api_loop, _) = EventLoop::spawn("api");
    let stats = Arc::new(TrafficStats::new());
    let controller = ControllerHandle::new(stats.clone(), controller_loop);
    let logging = Arc::new(LogContext::new(LogConfig::default(), LogSink::stderr()));
    let shutdown = Arc::new(Shutdown::new());

    let server = ApiServer::new(settings, logging.clone(), controller, shutdown.clone(), api_loop);
    let (_updates_tx, updates_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(server.run(listener, updates_rx, shutdown.subscribe()));

    TestServer {
        address,
        shutdown,
        logging,
        stats,
        handle,
        client: reqwest::Client::new(),
    }
}
