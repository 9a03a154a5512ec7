//! Units of background work executed by the [`TaskQueue`](crate::queue::TaskQueue).
//!
//! Every task implements [`Task`]: a display name and a synchronous `run`
//! that reports progress through its [`TaskContext`] and ends in exactly one
//! outcome, `Ok(TaskOutput)` (finished) or `Err(TaskError)` (failure).
//!
//! # Concrete tasks
//!
//! - [`DownloadTask`]: fetches a build archive through a [`Fetcher`], retrying
//!   once with a relaxed timeout
//! - [`ExtractTask`]: unpacks an archive through an [`Extractor`]
//! - [`RenameTask`], [`RemoveTask`]: library housekeeping on disk
//! - [`WriteBuildInfoTask`]: persists a build's `.blinfo` record
//!
//! # Interruption
//!
//! Rust threads cannot be killed from outside, so a forced stop of the queue
//! raises a flag that long-running tasks must poll through
//! [`TaskContext::is_stopping`] or [`TaskContext::check_stopped`]. A task that
//! never polls delays `fullstop` until it returns.

pub mod download;
pub mod extract;
pub mod files;

pub use download::{DownloadTask, Fetcher};
pub use extract::{ExtractTask, Extractor};
pub use files::{RemoveTask, RenameTask, WriteBuildInfoTask};

use crate::queue::{QueueEvent, WorkerId};
use crate::services::LibraryError;
use camino::Utf8PathBuf;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Identity of a task inside one queue, assigned on append
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identity plus display name, the part of a task that listeners see
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Result payload of a finished task, one variant per task kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    Downloaded(Utf8PathBuf),
    Extracted(Utf8PathBuf),
    Renamed(Utf8PathBuf),
    Removed(Utf8PathBuf),
    Written(Utf8PathBuf),
    Done,
}

/// Errors a task can end with
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed: {0}")]
    Fetch(String),

    #[error("Extraction failed: {0}")]
    Extract(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Interrupted by queue shutdown")]
    Interrupted,

    #[error("Worker crashed while running the task: {0}")]
    WorkerCrashed(String),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("{0}")]
    Other(String),
}

impl TaskError {
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// One unit of asynchronous work.
///
/// `run` is called at most once, on a worker thread. Errors are reported to
/// listeners as a failure and never take the worker down; a panic does, and
/// is treated as a worker crash.
pub trait Task: Send + 'static {
    /// Human-readable name for logs and listeners
    fn name(&self) -> String;

    fn run(&mut self, ctx: &TaskContext) -> Result<TaskOutput, TaskError>;
}

/// Handle given to a running task for reporting and stop checks
pub struct TaskContext {
    worker: WorkerId,
    task: TaskId,
    events: broadcast::Sender<QueueEvent>,
    stop: Arc<AtomicBool>,
}

impl TaskContext {
    pub(crate) fn new(
        worker: WorkerId,
        task: TaskId,
        events: broadcast::Sender<QueueEvent>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            worker,
            task,
            events,
            stop,
        }
    }

    /// Context for running a task outside of a queue.
    ///
    /// Returns the receiver for the task's events and the stop flag.
    pub fn standalone(task: TaskId) -> (Self, broadcast::Receiver<QueueEvent>, Arc<AtomicBool>) {
        let (events, rx) = broadcast::channel(64);
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = Self::new(WorkerId(0), task, events, Arc::clone(&stop));
        (ctx, rx, stop)
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Emit a log/progress line to listeners
    pub fn message(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!("[{} {}] {}", self.worker, self.task, text);
        // Nobody listening is fine
        let _ = self.events.send(QueueEvent::Message {
            worker: self.worker,
            task: self.task,
            text,
        });
    }

    pub fn progress(&self, done: u64, total: Option<u64>) {
        let _ = self.events.send(QueueEvent::Progress {
            worker: self.worker,
            task: self.task,
            done,
            total,
        });
    }

    /// True once the owning worker has been told to stop
    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn check_stopped(&self) -> Result<(), TaskError> {
        if self.is_stopping() {
            Err(TaskError::Interrupted)
        } else {
            Ok(())
        }
    }
}
