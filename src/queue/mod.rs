//! Bounded worker pool draining a shared FIFO of [`Task`]s.
//!
//! # Model
//!
//! - A fixed number of OS worker threads share one pending queue. Claiming a
//!   task is a pop under the queue mutex, so a task is handed to exactly one
//!   worker and never becomes visible in the queue again.
//! - Each worker runs at most one task at a time. Tasks are claimed in
//!   submission order; completion order across workers is not defined.
//! - Everything observable is published as a [`QueueEvent`] on a broadcast
//!   channel ([`TaskQueue::subscribe`]).
//!
//! # Failures
//!
//! A task returning `Err` is a task failure: it is logged, published as
//! [`QueueEvent::Failed`], and the worker moves on. A task that panics takes
//! its worker thread down. The dead worker reports to a supervisor thread over
//! an mpsc channel; the supervisor drops it from the pool and, with
//! `respawn_on_crash`, starts a replacement under the same [`WorkerId`].
//!
//! Event delivery is lossy for slow subscribers: the broadcast channel is
//! bounded and a receiver that falls behind sees `Lagged`. Outcomes are not:
//! every claimed task leaves a [`TaskOutcome`] record that
//! [`TaskQueue::outcome`] and [`TaskQueue::wait_outcome`] read back, so a
//! caller that missed `Finished`/`Failed` can still tell which one happened.
//!
//! # Stopping
//!
//! [`TaskQueue::fullstop`] drops pending tasks, raises every worker's stop
//! flag and joins all threads before returning. Threads cannot be killed, so
//! a running task is abandoned only once it notices the flag through its
//! [`TaskContext`](crate::tasks::TaskContext); work that does not poll the flag
//! delays shutdown until it returns. Partial side effects of an abandoned
//! task are not rolled back.

mod worker;

use crate::metrics::QueueMetrics;
use crate::models::QueueConfig;
use crate::tasks::{Task, TaskError, TaskId, TaskInfo, TaskOutput};
use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// Stable name of a worker slot; a respawned worker keeps the id it replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle events published by the queue
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A worker took a task off the queue
    Claimed { worker: WorkerId, task: TaskInfo },

    /// A worker found the queue empty (sent once per idle stretch)
    Idle { worker: WorkerId },

    /// Log line emitted by a running task
    Message {
        worker: WorkerId,
        task: TaskId,
        text: String,
    },

    Progress {
        worker: WorkerId,
        task: TaskId,
        done: u64,
        total: Option<u64>,
    },

    Finished {
        worker: WorkerId,
        task: TaskInfo,
        output: TaskOutput,
        elapsed: Duration,
    },

    Failed {
        worker: WorkerId,
        task: TaskInfo,
        error: Arc<TaskError>,
    },

    WorkerCrashed { worker: WorkerId, reason: String },

    WorkerRespawned { worker: WorkerId },

    WorkerStopped { worker: WorkerId },
}

impl QueueEvent {
    /// The task this event is about, if any
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Claimed { task, .. } | Self::Finished { task, .. } | Self::Failed { task, .. } => {
                Some(task.id)
            }
            Self::Message { task, .. } | Self::Progress { task, .. } => Some(*task),
            _ => None,
        }
    }

    /// True for the single outcome event every claimed task ends with
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }
}

/// Final result of a claimed task, kept until read with
/// [`TaskQueue::wait_outcome`]
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Finished(TaskOutput),
    Failed(Arc<TaskError>),
}

impl TaskOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Errors returned by queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Task queue is full ({capacity} tasks pending)")]
    Full { capacity: usize },

    #[error("Task queue has been stopped")]
    Stopped,

    #[error("Task queue is already running")]
    AlreadyStarted,

    #[error("Failed to spawn {worker}: {source}")]
    Spawn {
        worker: WorkerId,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn the worker supervisor: {0}")]
    SupervisorSpawn(#[source] std::io::Error),
}

pub(crate) struct QueuedTask {
    info: TaskInfo,
    task: Box<dyn Task>,
}

pub(crate) struct WorkerSlot {
    current: Option<TaskInfo>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Everything behind the queue mutex
pub(crate) struct QueueState {
    pending: VecDeque<QueuedTask>,
    workers: IndexMap<WorkerId, WorkerSlot>,
    outcomes: HashMap<TaskId, TaskOutcome>,
    started: bool,
    stopping: bool,
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    wake: Condvar,
    /// Signalled whenever an outcome is recorded
    settled: Condvar,
    events: broadcast::Sender<QueueEvent>,
    metrics: QueueMetrics,
    config: QueueConfig,
}

impl Shared {
    /// Panics never happen while the lock is held, but a poisoned lock is
    /// still usable: every critical section leaves the state consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the worker's current task and record how it ended, in one
    /// critical section so the task is never both unknown and unsettled
    fn settle(&self, worker: WorkerId, task: TaskId, outcome: TaskOutcome) {
        {
            let mut state = self.lock();
            if let Some(slot) = state.workers.get_mut(&worker) {
                slot.current = None;
            }
            state.outcomes.insert(task, outcome);
        }
        self.settled.notify_all();
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

pub(crate) enum SupervisorMsg {
    Exited {
        worker: WorkerId,
        crash: Option<String>,
    },
    Shutdown,
}

struct Supervisor {
    tx: mpsc::UnboundedSender<SupervisorMsg>,
    handle: JoinHandle<()>,
}

/// Shared FIFO task queue served by a pool of worker threads
pub struct TaskQueue {
    shared: Arc<Shared>,
    next_task_id: AtomicU64,
    supervisor: Mutex<Option<Supervisor>>,
}

impl TaskQueue {
    /// Create a stopped queue; call [`start`](Self::start) to spawn workers.
    ///
    /// Tasks may be appended before starting.
    pub fn new(config: QueueConfig) -> Self {
        let config = QueueConfig {
            worker_count: config.worker_count.max(1),
            event_capacity: config.event_capacity.max(1),
            ..config
        };
        let (events, _) = broadcast::channel(config.event_capacity);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    workers: IndexMap::new(),
                    outcomes: HashMap::new(),
                    started: false,
                    stopping: false,
                }),
                wake: Condvar::new(),
                settled: Condvar::new(),
                events,
                metrics: QueueMetrics::new(),
                config,
            }),
            next_task_id: AtomicU64::new(1),
            supervisor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.shared.metrics
    }

    /// Receive all events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Spawn the configured number of workers and the supervisor
    pub fn start(&self) -> Result<(), QueueError> {
        let mut supervisor = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut state = self.shared.lock();
            if state.stopping {
                return Err(QueueError::Stopped);
            }
            if state.started {
                return Err(QueueError::AlreadyStarted);
            }
            // Set first so fullstop cleans up after a partial start
            state.started = true;

            for n in 0..self.shared.config.worker_count {
                worker::spawn_worker(&self.shared, WorkerId(n), &tx, &mut state)?;
            }
        }

        let handle = thread::Builder::new()
            .name("task-supervisor".to_string())
            .spawn({
                let shared = Arc::clone(&self.shared);
                let tx = tx.clone();
                move || worker::supervise(shared, rx, tx)
            })
            .map_err(QueueError::SupervisorSpawn)?;
        *supervisor = Some(Supervisor { tx, handle });

        tracing::info!(
            "Task queue started: workers={}, max_length={:?}, respawn_on_crash={}",
            self.shared.config.worker_count,
            self.shared.config.max_length,
            self.shared.config.respawn_on_crash
        );
        Ok(())
    }

    /// Enqueue a task at the tail
    pub fn append<T: Task>(&self, task: T) -> Result<TaskId, QueueError> {
        self.append_boxed(Box::new(task))
    }

    pub fn append_boxed(&self, task: Box<dyn Task>) -> Result<TaskId, QueueError> {
        let info = {
            let mut state = self.shared.lock();
            if state.stopping {
                return Err(QueueError::Stopped);
            }
            if let Some(capacity) = self.shared.config.max_length {
                if state.pending.len() >= capacity {
                    tracing::warn!("Rejecting {}: queue full", task.name());
                    return Err(QueueError::Full { capacity });
                }
            }

            let info = TaskInfo {
                id: TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed)),
                name: task.name(),
            };
            state.pending.push_back(QueuedTask {
                info: info.clone(),
                task,
            });
            info
        };

        self.shared.wake.notify_one();
        self.shared.metrics.record_appended();
        tracing::debug!("Queued {}", info);
        Ok(info.id)
    }

    /// Withdraw a task that no worker has claimed yet.
    ///
    /// Returns false if the task is running, done, or unknown.
    pub fn remove(&self, task: TaskId) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            let index = state.pending.iter().position(|queued| queued.info.id == task);
            index.and_then(|index| state.pending.remove(index))
        };

        match removed {
            Some(queued) => {
                self.shared.metrics.record_removed();
                tracing::debug!("Removed {} from the queue", queued.info);
                true
            }
            None => false,
        }
    }

    /// Worker currently running `task`
    pub fn thread_with_task(&self, task: TaskId) -> Option<WorkerId> {
        let state = self.shared.lock();
        state.workers.iter().find_map(|(id, slot)| {
            slot.current
                .as_ref()
                .filter(|current| current.id == task)
                .map(|_| *id)
        })
    }

    /// Recorded outcome of `task`, if it has ended and was not yet taken
    pub fn outcome(&self, task: TaskId) -> Option<TaskOutcome> {
        self.shared.lock().outcomes.get(&task).cloned()
    }

    /// Block until `task` ends and take its outcome record.
    ///
    /// Returns `None` on timeout, or once the task can no longer end: it was
    /// removed, dropped by `fullstop`, never appended, or already taken.
    pub fn wait_outcome(&self, task: TaskId, timeout: Duration) -> Option<TaskOutcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();

        loop {
            if let Some(outcome) = state.outcomes.remove(&task) {
                return Some(outcome);
            }

            let queued = state.pending.iter().any(|queued| queued.info.id == task);
            let running = state
                .workers
                .values()
                .any(|slot| slot.current.as_ref().is_some_and(|current| current.id == task));
            if !queued && !running {
                return None;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = self
                .shared
                .settled
                .wait_timeout(state, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Snapshot of every worker that holds a task, in worker order
    pub fn get_busy_threads(&self) -> IndexMap<WorkerId, TaskInfo> {
        let state = self.shared.lock();
        state
            .workers
            .iter()
            .filter_map(|(id, slot)| slot.current.clone().map(|task| (*id, task)))
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Pending tasks in claim order
    pub fn pending(&self) -> Vec<TaskInfo> {
        self.shared
            .lock()
            .pending
            .iter()
            .map(|queued| queued.info.clone())
            .collect()
    }

    /// Number of live workers
    pub fn worker_count(&self) -> usize {
        self.shared.lock().workers.len()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.shared.lock().workers.keys().copied().collect()
    }

    /// Stop one worker and wait for its thread. The worker is not replaced.
    ///
    /// Returns false for an unknown worker.
    pub fn stop_worker(&self, worker: WorkerId) -> bool {
        let handle = {
            let mut state = self.shared.lock();
            let Some(slot) = state.workers.get_mut(&worker) else {
                return false;
            };
            slot.stop.store(true, Ordering::SeqCst);
            slot.handle.take()
        };
        self.shared.wake.notify_all();

        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("{} panicked while stopping", worker);
            }
        }
        self.shared.lock().workers.shift_remove(&worker);

        tracing::info!("Stopped {}", worker);
        self.shared.emit(QueueEvent::WorkerStopped { worker });
        true
    }

    /// Stop every worker and wait until all threads have terminated.
    ///
    /// Pending tasks are dropped and running tasks are interrupted; see the
    /// module docs for what that means for in-flight work. Safe to call more
    /// than once; the queue cannot be restarted afterwards.
    pub fn fullstop(&self) {
        // Held until the end: a concurrent caller waits here for the first
        // one to finish joining instead of returning early
        let mut supervisor = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);

        let handles: Vec<(WorkerId, JoinHandle<()>)> = {
            let mut state = self.shared.lock();
            if state.stopping && state.workers.is_empty() {
                return;
            }
            state.stopping = true;

            let dropped = state.pending.len();
            state.pending.clear();
            if dropped > 0 {
                tracing::warn!("Dropping {} pending tasks on shutdown", dropped);
            }

            state
                .workers
                .iter_mut()
                .filter_map(|(id, slot)| {
                    slot.stop.store(true, Ordering::SeqCst);
                    slot.handle.take().map(|handle| (*id, handle))
                })
                .collect()
        };
        self.shared.wake.notify_all();
        // Waiters on dropped tasks give up
        self.shared.settled.notify_all();

        for (worker, handle) in handles {
            if handle.join().is_err() {
                tracing::warn!("{} panicked during shutdown", worker);
            }
            self.shared.emit(QueueEvent::WorkerStopped { worker });
        }

        if let Some(supervisor) = supervisor.take() {
            let _ = supervisor.tx.send(SupervisorMsg::Shutdown);
            if supervisor.handle.join().is_err() {
                tracing::warn!("Worker supervisor panicked during shutdown");
            }
        }

        self.shared.lock().workers.clear();
        tracing::info!("Task queue stopped");
        self.shared.metrics.log_summary();
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.fullstop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskContext;

    struct Noop(&'static str);

    impl Task for Noop {
        fn name(&self) -> String {
            self.0.to_string()
        }

        fn run(&mut self, _ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
            Ok(TaskOutput::Done)
        }
    }

    fn config(worker_count: usize, max_length: Option<usize>) -> QueueConfig {
        QueueConfig {
            worker_count,
            max_length,
            respawn_on_crash: true,
            poll_interval: Duration::from_millis(20),
            event_capacity: 64,
        }
    }

    #[test]
    fn test_append_before_start_stays_pending() {
        let queue = TaskQueue::new(config(2, None));
        let first = queue.append(Noop("first")).unwrap();
        let second = queue.append(Noop("second")).unwrap();

        assert_ne!(first, second);
        assert_eq!(queue.pending_len(), 2);
        assert_eq!(queue.worker_count(), 0);
        assert!(queue.get_busy_threads().is_empty());

        let names: Vec<String> = queue.pending().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_bounded_queue_rejects_overflow() {
        let queue = TaskQueue::new(config(1, Some(2)));
        queue.append(Noop("a")).unwrap();
        queue.append(Noop("b")).unwrap();

        assert!(matches!(
            queue.append(Noop("c")),
            Err(QueueError::Full { capacity: 2 })
        ));
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn test_remove_pending_task() {
        let queue = TaskQueue::new(config(1, None));
        let a = queue.append(Noop("a")).unwrap();
        let b = queue.append(Noop("b")).unwrap();

        assert!(queue.remove(a));
        assert!(!queue.remove(a));
        assert_eq!(queue.pending()[0].id, b);
        assert_eq!(queue.metrics().tasks_removed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_start_twice_fails() {
        let queue = TaskQueue::new(config(2, None));
        queue.start().unwrap();
        assert_eq!(queue.worker_count(), 2);
        assert!(matches!(queue.start(), Err(QueueError::AlreadyStarted)));
        queue.fullstop();
    }

    #[test]
    fn test_append_after_fullstop_fails() {
        let queue = TaskQueue::new(config(1, None));
        queue.start().unwrap();
        queue.fullstop();

        assert_eq!(queue.worker_count(), 0);
        assert!(matches!(queue.append(Noop("late")), Err(QueueError::Stopped)));
        assert!(matches!(queue.start(), Err(QueueError::Stopped)));

        // Second call is a no-op
        queue.fullstop();
    }

    #[test]
    fn test_fullstop_drops_pending() {
        let queue = TaskQueue::new(config(1, None));
        let id = queue.append(Noop("never run")).unwrap();
        queue.fullstop();
        assert_eq!(queue.pending_len(), 0);

        // Dropped tasks leave no outcome and waiting on them does not block
        assert!(queue.outcome(id).is_none());
        assert!(queue.wait_outcome(id, Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_zero_workers_clamped() {
        let queue = TaskQueue::new(config(0, None));
        assert_eq!(queue.config().worker_count, 1);
    }

    #[test]
    fn test_event_helpers() {
        let info = TaskInfo {
            id: TaskId(4),
            name: "x".to_string(),
        };
        let finished = QueueEvent::Finished {
            worker: WorkerId(0),
            task: info.clone(),
            output: TaskOutput::Done,
            elapsed: Duration::ZERO,
        };
        assert!(finished.is_terminal());
        assert_eq!(finished.task_id(), Some(TaskId(4)));

        let idle = QueueEvent::Idle {
            worker: WorkerId(1),
        };
        assert!(!idle.is_terminal());
        assert_eq!(idle.task_id(), None);
        assert_eq!(WorkerId(1).to_string(), "worker-1");
    }
}
