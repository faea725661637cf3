//! Subscriber initialization.
//!
//! Installs a `tracing` registry whose filter sits behind a reload layer, so
//! a committed log level takes effect without restarting, and whose `fmt`
//! layer writes through the switchable [`LogSink`].

use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use crate::observability::config::LogLevel;
use crate::observability::context::LevelHook;
use crate::observability::sink::LogSink;

/// Initialize the global subscriber and return the hook that changes its level.
///
/// `RUST_LOG` overrides the configured level at startup.
pub fn init(level: LogLevel, sink: LogSink) -> LevelHook {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(sink).with_ansi(false))
        .try_init();
    if let Err(e) = installed {
        eprintln!("tracing subscriber already installed: {e}");
    }

    Box::new(move |level: LogLevel| {
        if let Err(e) = handle.reload(EnvFilter::new(level.directive())) {
            tracing::warn!(error = %e, "Unable to apply new log level");
        }
    })
}
