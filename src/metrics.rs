// Task queue metrics
//
// Lightweight counters for monitoring the worker pool

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters kept by a [`TaskQueue`](crate::queue::TaskQueue)
///
/// Uses atomic operations so workers can record without taking the queue lock.
#[derive(Debug)]
pub struct QueueMetrics {
    /// Tasks accepted by `append`
    pub tasks_appended: AtomicU64,

    /// Tasks that returned a result
    pub tasks_finished: AtomicU64,

    /// Tasks that returned an error or died with their worker
    pub tasks_failed: AtomicU64,

    /// Pending tasks withdrawn with `remove`
    pub tasks_removed: AtomicU64,

    /// Worker threads that terminated by panicking
    pub worker_crashes: AtomicU64,

    /// Replacement workers spawned after a crash
    pub worker_respawns: AtomicU64,

    /// Total time spent inside `Task::run` in milliseconds
    pub total_run_time_ms: AtomicU64,

    start_time: Instant,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self {
            tasks_appended: AtomicU64::new(0),
            tasks_finished: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_removed: AtomicU64::new(0),
            worker_crashes: AtomicU64::new(0),
            worker_respawns: AtomicU64::new(0),
            total_run_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_appended(&self) {
        self.tasks_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished(&self, run_time: Duration) {
        self.tasks_finished.fetch_add(1, Ordering::Relaxed);
        self.record_run_time(run_time);
    }

    pub fn record_failed(&self, run_time: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.record_run_time(run_time);
    }

    pub fn record_removed(&self) {
        self.tasks_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crash(&self) {
        self.worker_crashes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_respawn(&self) {
        self.worker_respawns.fetch_add(1, Ordering::Relaxed);
    }

    fn record_run_time(&self, run_time: Duration) {
        self.total_run_time_ms
            .fetch_add(run_time.as_millis() as u64, Ordering::Relaxed);
    }

    /// Tasks that reached a terminal outcome
    pub fn completed(&self) -> u64 {
        self.tasks_finished.load(Ordering::Relaxed) + self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per completed task in milliseconds
    pub fn avg_run_time_ms(&self) -> f64 {
        let total = self.total_run_time_ms.load(Ordering::Relaxed);
        let count = self.completed();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Task Queue Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} appended, {} finished, {} failed, {} removed",
            self.tasks_appended.load(Ordering::Relaxed),
            self.tasks_finished.load(Ordering::Relaxed),
            self.tasks_failed.load(Ordering::Relaxed),
            self.tasks_removed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Run time: {:.2}s total (avg: {:.2}ms per task)",
            self.total_run_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_run_time_ms()
        );
        tracing::info!(
            "Workers: {} crashes, {} respawns",
            self.worker_crashes.load(Ordering::Relaxed),
            self.worker_respawns.load(Ordering::Relaxed)
        );
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}
