//! Router admin daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────┐
//!                          │                 ADMIN SERVER                  │
//!   Admin client           │  ┌─────────┐   ┌─────────┐   ┌────────────┐  │
//!   ───────────────────────┼─▶│   net   │──▶│  http   │──▶│   admin    │  │
//!   (TCP or Unix socket)   │  │listener │   │ server  │   │ route/auth │  │
//!                          │  └─────────┘   └─────────┘   └─────┬──────┘  │
//!                          │                                    │         │
//!                          │              ┌─────────────────────┼──────┐  │
//!                          │              ▼                     ▼      │  │
//!                          │     ┌────────────────┐   ┌──────────────┐ │  │
//!                          │     │ observability  │   │  controller  │ │  │
//!                          │     │ log config,    │   │  event loop  │ │  │
//!                          │     │ sink, metrics  │   │  (deferred)  │ │  │
//!                          │     └────────────────┘   └──────────────┘ │  │
//!                          │                                           │  │
//!                          │  config (file + watcher)   lifecycle (signals, shutdown)
//!                          └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use router_admin::config::{load_config, ConfigWatcher, DaemonConfig};
use router_admin::controller::{ControllerHandle, EventLoop, TrafficStats};
use router_admin::http::{ApiServer, ServerSettings};
use router_admin::lifecycle::{handle_signals, Shutdown};
use router_admin::net::{ListenAddress, Listener};
use router_admin::observability::{logging, metrics, LogConfig, LogContext, LogSink};

#[derive(Parser)]
#[command(name = "router-admin")]
#[command(about = "Admin API server for the request-routing daemon", long_about = None)]
struct Args {
    /// TOML configuration file. Watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address (`host:port` or `unix:/path`).
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listener.address = listen;
    }

    // Start on stderr at the default level, then apply the configured
    // logging section through the normal change path.
    let sink = LogSink::stderr();
    let defaults = LogConfig::default();
    let level_hook = logging::init(defaults.level, sink.clone());
    let log_context = Arc::new(LogContext::new(defaults, sink).with_level_hook(level_hook));
    log_context.reload(&config.logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "router-admin starting");
    tracing::info!(
        listen_address = %config.listener.address,
        request_timeout_secs = config.timeouts.request_secs,
        api_keys = config.admin.api_keys.len(),
        watchdog = !config.admin.instance_dir.is_empty(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (controller_loop, _controller_task) = EventLoop::spawn("controller");
    let (api_loop, _api_task) = EventLoop::spawn("api");
    let controller = ControllerHandle::new(Arc::new(TrafficStats::new()), controller_loop);
    let shutdown = Arc::new(Shutdown::new());

    let address: ListenAddress = config.listener.address.parse()?;
    let listener = Listener::bind(&address).await?;
    tracing::info!(address = %listener.local_address(), "Listening for connections");

    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let signals = tokio::spawn(handle_signals(Arc::clone(&shutdown), Arc::clone(&log_context)));

    let server = ApiServer::new(
        ServerSettings::from_config(&config),
        log_context,
        controller,
        Arc::clone(&shutdown),
        api_loop,
    );
    let stop = shutdown.subscribe();
    server.run(listener, config_updates, stop).await?;

    shutdown.trigger();
    match signals.await {
        Ok(Err(e)) => tracing::error!(error = %e, "Signal handling failed"),
        Err(e) => tracing::error!(error = %e, "Signal task panicked"),
        Ok(Ok(())) => {}
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
