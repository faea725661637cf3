//! Live logging context and the two-phase configuration change protocol.
//!
//! ```text
//! JSON delta
//!     → prepare_config_change (validate against current config, open new
//!       log target; no shared state touched)
//!     → ConfigChangeRequest (validated, not yet visible)
//!     → commit_config_change (infallible swap; visible to all readers)
//! ```
//!
//! A `ConfigChangeRequest` can only be obtained from a successful prepare,
//! and commit consumes it, so an unvalidated or half-validated change can
//! never be applied.
//!
//! A request is computed from the configuration live at prepare time.
//! Concurrent writers go through [`LogContext::apply_config_change`], which
//! holds the change lock from prepare to commit.

use std::fs::File;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::observability::config::{errors_to_string, ConfigError, LogConfig, LogLevel, LogTarget};
use crate::observability::metrics;
use crate::observability::sink::LogSink;

/// Callback used to push a new level into the active subscriber.
pub type LevelHook = Box<dyn Fn(LogLevel) + Send + Sync>;

/// Why a configuration change was not prepared.
#[derive(Debug, Error)]
pub enum ConfigChangeError {
    /// The proposed configuration failed validation.
    #[error("{}", errors_to_string(.0))]
    Invalid(Vec<ConfigError>),
    /// Preparing the change hit an unexpected fault.
    #[error("{0}")]
    Fault(#[from] io::Error),
}

/// A validated configuration change, ready to be committed.
#[must_use = "a prepared change has no effect until committed"]
#[derive(Debug)]
pub struct ConfigChangeRequest {
    config: Arc<LogConfig>,
    target_file: Option<File>,
}

impl ConfigChangeRequest {
    /// The configuration that will be in effect after commit.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

/// Process-wide logging state: the live configuration and the log output.
pub struct LogContext {
    config: ArcSwap<LogConfig>,
    sink: LogSink,
    level_hook: Option<LevelHook>,
    change_lock: Mutex<()>,
}

impl LogContext {
    pub fn new(config: LogConfig, sink: LogSink) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            sink,
            level_hook: None,
            change_lock: Mutex::new(()),
        }
    }

    /// Install the hook that applies level changes to the subscriber.
    pub fn with_level_hook(mut self, hook: LevelHook) -> Self {
        self.level_hook = Some(hook);
        self
    }

    /// Snapshot of the live configuration.
    pub fn config(&self) -> Arc<LogConfig> {
        self.config.load_full()
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Validate `updates` against the current configuration.
    ///
    /// When the change switches to a new log file, or starts redirecting
    /// stderr into the current one, the file is opened here so that commit
    /// has nothing left that can fail.
    pub fn prepare_config_change(&self, updates: &Value) -> Result<ConfigChangeRequest, ConfigChangeError> {
        let current = self.config.load();
        let config = current.preview_update(updates).map_err(ConfigChangeError::Invalid)?;

        let needs_file = current.target != config.target
            || self.sink.current_path().is_none()
            || (config.redirect_stderr && !current.redirect_stderr);
        let target_file = match &config.target {
            LogTarget::File(path) if needs_file => Some(LogSink::open_log_file(path)?),
            _ => None,
        };

        Ok(ConfigChangeRequest {
            config: Arc::new(config),
            target_file,
        })
    }

    /// Make a prepared change visible to all readers.
    pub fn commit_config_change(&self, request: ConfigChangeRequest) {
        let ConfigChangeRequest { config, target_file } = request;
        let previous = self.config.load_full();

        match (&config.target, target_file) {
            (LogTarget::File(path), Some(file)) => {
                if config.redirect_stderr {
                    redirect_stderr_to(&file);
                }
                self.sink.use_file(file, Some(path.clone()));
            }
            (LogTarget::Stderr, _) if previous.target != LogTarget::Stderr => self.sink.use_stderr(),
            _ => {}
        }

        if previous.level != config.level {
            if let Some(hook) = &self.level_hook {
                hook(config.level);
            }
        }

        self.config.store(Arc::clone(&config));
        metrics::record_config_change("committed");
        tracing::info!(
            level = %config.level,
            target = ?config.target,
            "Logging configuration changed"
        );
    }

    /// Prepare and commit `updates` as one step, serialized with every other
    /// change made through this method or [`reload`](Self::reload).
    pub fn apply_config_change(&self, updates: &Value) -> Result<(), ConfigChangeError> {
        let _guard = self.change_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let request = self.prepare_config_change(updates)?;
        self.commit_config_change(request);
        Ok(())
    }

    /// Replace the user values wholesale, e.g. after the config file changed.
    ///
    /// Keys that disappeared are reset, so this goes through the same
    /// prepare/commit path as a delta.
    pub fn reload(&self, values: &Map<String, Value>) -> Result<(), ConfigChangeError> {
        let _guard = self.change_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updates = values.clone();
        for key in self.config.load().user_values().keys() {
            updates.entry(key.clone()).or_insert(Value::Null);
        }
        let request = self.prepare_config_change(&Value::Object(updates))?;
        self.commit_config_change(request);
        Ok(())
    }

    /// Reopen the log file after rotation.
    pub fn reopen_log_files(&self) -> io::Result<()> {
        self.sink.reopen()?;
        if let Some(path) = self.sink.current_path() {
            tracing::info!(path = %path.display(), "Log file reopened");
        }
        Ok(())
    }

    /// Start writing to a log file handed over by another process.
    pub fn adopt_log_file(&self, file: File) {
        if self.config.load().redirect_stderr {
            redirect_stderr_to(&file);
        }
        self.sink.use_file(file, None);
        tracing::info!("Log file re-inherited");
    }
}

fn redirect_stderr_to(file: &File) {
    use std::os::fd::AsRawFd;

    // SAFETY: both descriptors are valid for the duration of the call.
    let rc = unsafe { libc::dup2(file.as_raw_fd(), libc::STDERR_FILENO) };
    if rc < 0 {
        tracing::warn!(error = %io::Error::last_os_error(), "Unable to redirect stderr to log file");
    }
}
