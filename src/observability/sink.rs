//! Switchable log output.
//!
//! The `fmt` layer writes through a [`LogSink`], which forwards to either
//! stderr or an open log file. The file can be replaced (config commit, log
//! re-inheritance) or reopened in place (log rotation) while the subscriber
//! keeps running.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

enum Output {
    Stderr,
    File { file: File, path: Option<PathBuf> },
}

/// Shared handle to the current log output.
#[derive(Clone)]
pub struct LogSink {
    output: Arc<Mutex<Output>>,
}

impl LogSink {
    /// A sink writing to stderr.
    pub fn stderr() -> Self {
        Self {
            output: Arc::new(Mutex::new(Output::Stderr)),
        }
    }

    /// Open `path` for appending, creating it if needed.
    pub fn open_log_file(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Switch output to an already opened file.
    ///
    /// `path` is remembered so the file can be reopened later; files received
    /// without a path (inherited descriptors) cannot be reopened.
    pub fn use_file(&self, file: File, path: Option<PathBuf>) {
        *self.lock() = Output::File { file, path };
    }

    pub fn use_stderr(&self) {
        *self.lock() = Output::Stderr;
    }

    /// Reopen the current log file by path. A no-op when writing to stderr.
    pub fn reopen(&self) -> io::Result<()> {
        let path = match &*self.lock() {
            Output::File { path: Some(path), .. } => path.clone(),
            _ => return Ok(()),
        };
        // Open outside the lock; the old file stays in use until the swap.
        let file = Self::open_log_file(&path)?;
        self.use_file(file, Some(path));
        Ok(())
    }

    /// Path of the current log file, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        match &*self.lock() {
            Output::File { path, .. } => path.clone(),
            Output::Stderr => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Output> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::stderr()
    }
}

/// Writer handed out to the `fmt` layer for a single event.
pub struct SinkWriter {
    output: Arc<Mutex<Output>>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *output {
            Output::Stderr => io::stderr().write(buf),
            Output::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *output {
            Output::Stderr => io::stderr().flush(),
            Output::File { file, .. } => file.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            output: Arc::clone(&self.output),
        }
    }
}
