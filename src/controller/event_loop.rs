//! Run-later event loops.
//!
//! An [`EventLoop`] is a queue of jobs drained one at a time by a single
//! task: work scheduled on it never runs concurrently with other work on the
//! same loop, and always runs on a later turn than the code that scheduled
//! it. The API server and the controller each own one; handing a request
//! between them is a `run_later` in each direction.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Returned when scheduling onto a loop that has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopStopped;

/// Handle for scheduling work on a loop.
#[derive(Clone)]
pub struct EventLoop {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
}

/// The receiving half; drives the loop.
pub struct LoopRunner {
    name: Arc<str>,
    rx: mpsc::UnboundedReceiver<Job>,
}

impl EventLoop {
    /// Create a loop. Nothing runs until the runner is driven.
    pub fn new(name: &str) -> (Self, LoopRunner) {
        let (tx, rx) = mpsc::unbounded_channel();
        let name: Arc<str> = Arc::from(name);
        (
            Self {
                name: Arc::clone(&name),
                tx,
            },
            LoopRunner { name, rx },
        )
    }

    /// Create a loop and spawn its runner on the current Tokio runtime.
    pub fn spawn(name: &str) -> (Self, JoinHandle<()>) {
        let (event_loop, runner) = Self::new(name);
        (event_loop, tokio::spawn(runner.run()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule `job` to run on a future turn of this loop.
    ///
    /// On failure the job is dropped without running.
    pub fn run_later(&self, job: impl FnOnce() + Send + 'static) -> Result<(), LoopStopped> {
        self.tx.send(Box::new(job)).map_err(|_| LoopStopped)
    }
}

impl LoopRunner {
    /// Run jobs until every handle has been dropped.
    pub async fn run(mut self) {
        tracing::debug!(event_loop = %self.name, "Event loop started");
        while let Some(job) = self.rx.recv().await {
            job();
        }
        tracing::debug!(event_loop = %self.name, "Event loop stopped");
    }

    /// Run whatever is queued right now, including jobs those jobs schedule
    /// on this loop. Returns the number of jobs run.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            count += 1;
        }
        count
    }
}
