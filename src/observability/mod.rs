//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events, written through sink.rs (stderr or log file)
//!     → metrics.rs (counters)
//!
//! Operators change logging at runtime:
//!     PUT /config.json or config file reload
//!     → context.rs prepare (config.rs validation, open new target)
//!     → context.rs commit (swap config, switch sink, reload level)
//!
//! Log files are reopened on SIGHUP / reopen_logs.json, or replaced by a
//! descriptor from the watchdog (reinherit.rs).
//! ```
//!
//! # Design Decisions
//! - One LogContext per process, shared via Arc
//! - Only commit mutates the live configuration
//! - Structured logging for machine parsing

pub mod config;
pub mod context;
pub mod logging;
pub mod metrics;
pub mod reinherit;
pub mod sink;

pub use config::{LogConfig, LogLevel, LogTarget};
pub use context::{ConfigChangeError, ConfigChangeRequest, LogContext};
pub use sink::LogSink;
