//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reopens log files (log rotation), it does not stop the daemon

use std::io;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::lifecycle::shutdown::Shutdown;
use crate::observability::LogContext;

/// Handle signals until shutdown is triggered.
pub async fn handle_signals(shutdown: Arc<Shutdown>, logging: Arc<LogContext>) -> io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut stop = shutdown.subscribe();
    if shutdown.is_triggered() {
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received");
                shutdown.trigger();
            }
            _ = interrupt.recv() => {
                tracing::info!("SIGINT received");
                shutdown.trigger();
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reopening log files");
                if let Err(e) = logging.reopen_log_files() {
                    tracing::error!(error = %e, "Cannot reopen log files");
                }
            }
            _ = stop.recv() => return Ok(()),
        }
    }
}
