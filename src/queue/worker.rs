// Worker threads and the supervisor that replaces crashed ones

use super::{
    QueueError, QueueEvent, QueueState, QueuedTask, Shared, SupervisorMsg, TaskOutcome, WorkerId,
    WorkerSlot,
};
use crate::tasks::{TaskContext, TaskError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Start a worker thread and register it under `id`.
///
/// Called with the queue lock held; an existing slot with the same id is
/// replaced in place so the worker keeps its position.
pub(super) fn spawn_worker(
    shared: &Arc<Shared>,
    id: WorkerId,
    exits: &mpsc::UnboundedSender<SupervisorMsg>,
    state: &mut QueueState,
) -> Result<(), QueueError> {
    let stop = Arc::new(AtomicBool::new(false));

    let handle = thread::Builder::new()
        .name(id.to_string())
        .spawn({
            let shared = Arc::clone(shared);
            let stop = Arc::clone(&stop);
            let exits = exits.clone();
            move || worker_main(shared, id, stop, exits)
        })
        .map_err(|source| QueueError::Spawn { worker: id, source })?;

    state.workers.insert(
        id,
        WorkerSlot {
            current: None,
            stop,
            handle: Some(handle),
        },
    );

    tracing::debug!("Spawned {}", id);
    Ok(())
}

/// Thread body: run the loop, and turn a panic into a crash report
fn worker_main(
    shared: Arc<Shared>,
    id: WorkerId,
    stop: Arc<AtomicBool>,
    exits: mpsc::UnboundedSender<SupervisorMsg>,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker_loop(&shared, id, &stop)));

    let crash = outcome.err().map(|payload| panic_message(payload.as_ref()));

    match &crash {
        Some(reason) => {
            tracing::error!("{} crashed: {}", id, reason);
            shared.metrics.record_crash();

            let in_flight = shared
                .lock()
                .workers
                .get(&id)
                .and_then(|slot| slot.current.clone());
            if let Some(task) = in_flight {
                let error = Arc::new(TaskError::WorkerCrashed(reason.clone()));
                shared.metrics.record_failed(Duration::ZERO);
                shared.settle(id, task.id, TaskOutcome::Failed(Arc::clone(&error)));
                shared.emit(QueueEvent::Failed {
                    worker: id,
                    task,
                    error,
                });
            }

            shared.emit(QueueEvent::WorkerCrashed {
                worker: id,
                reason: reason.clone(),
            });
        }
        None => tracing::debug!("{} exited", id),
    }

    // The supervisor is gone only during shutdown
    let _ = exits.send(SupervisorMsg::Exited { worker: id, crash });
}

fn worker_loop(shared: &Shared, id: WorkerId, stop: &Arc<AtomicBool>) {
    tracing::debug!("{} started", id);
    let mut idle_notified = false;

    while let Some(mut queued) = claim_next(shared, id, stop, &mut idle_notified) {
        idle_notified = false;
        let info = queued.info.clone();

        tracing::info!("{} claimed {}", id, info);
        shared.emit(QueueEvent::Claimed {
            worker: id,
            task: info.clone(),
        });

        let ctx = TaskContext::new(id, info.id, shared.events.clone(), Arc::clone(stop));
        let started = Instant::now();
        let result = queued.task.run(&ctx);
        let elapsed = started.elapsed();

        // The outcome record is written before the event goes out
        match result {
            Ok(output) => {
                tracing::info!("{} finished in {:.2}s", info, elapsed.as_secs_f32());
                shared.metrics.record_finished(elapsed);
                shared.settle(id, info.id, TaskOutcome::Finished(output.clone()));
                shared.emit(QueueEvent::Finished {
                    worker: id,
                    task: info,
                    output,
                    elapsed,
                });
            }
            Err(error) => {
                tracing::error!("{} failed: {}", info, error);
                let error = Arc::new(error);
                shared.metrics.record_failed(elapsed);
                shared.settle(id, info.id, TaskOutcome::Failed(Arc::clone(&error)));
                shared.emit(QueueEvent::Failed {
                    worker: id,
                    task: info,
                    error,
                });
            }
        }
    }

    tracing::debug!("{} leaving run loop", id);
}

/// Pop the queue head for `id`, waiting while the queue is empty.
///
/// Returns `None` once the worker has been told to stop. The idle event is
/// sent on the first empty observation only, not on every wake-up.
fn claim_next(
    shared: &Shared,
    id: WorkerId,
    stop: &AtomicBool,
    idle_notified: &mut bool,
) -> Option<QueuedTask> {
    let mut state = shared.lock();

    loop {
        if stop.load(Ordering::SeqCst) {
            return None;
        }

        if let Some(queued) = state.pending.pop_front() {
            if let Some(slot) = state.workers.get_mut(&id) {
                slot.current = Some(queued.info.clone());
            }
            return Some(queued);
        }

        if !*idle_notified {
            *idle_notified = true;
            shared.emit(QueueEvent::Idle { worker: id });
        }

        state = shared
            .wake
            .wait_timeout(state, shared.config.poll_interval)
            .map(|(guard, _)| guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner().0);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Supervisor thread: owns the replacement of crashed workers.
///
/// Workers report their exit over `rx`; `tx` is handed to replacements.
pub(super) fn supervise(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<SupervisorMsg>,
    tx: mpsc::UnboundedSender<SupervisorMsg>,
) {
    tracing::debug!("Worker supervisor started");

    while let Some(msg) = rx.blocking_recv() {
        match msg {
            SupervisorMsg::Shutdown => break,
            SupervisorMsg::Exited { worker, crash: None } => {
                tracing::debug!("{} stopped normally", worker);
            }
            SupervisorMsg::Exited {
                worker,
                crash: Some(reason),
            } => replace_crashed(&shared, worker, &reason, &tx),
        }
    }

    tracing::debug!("Worker supervisor terminated");
}

fn replace_crashed(
    shared: &Arc<Shared>,
    worker: WorkerId,
    reason: &str,
    tx: &mpsc::UnboundedSender<SupervisorMsg>,
) {
    let handle = shared
        .lock()
        .workers
        .get_mut(&worker)
        .and_then(|slot| slot.handle.take());
    // The thread already reported its exit, so this returns promptly
    if let Some(handle) = handle {
        let _ = handle.join();
    }

    let mut state = shared.lock();
    let stop_requested = state
        .workers
        .get(&worker)
        .is_none_or(|slot| slot.stop.load(Ordering::SeqCst));

    if !shared.config.respawn_on_crash || state.stopping || stop_requested {
        state.workers.shift_remove(&worker);
        tracing::warn!("{} crashed and was not replaced", worker);
        return;
    }

    match spawn_worker(shared, worker, tx, &mut state) {
        Ok(()) => {
            shared.metrics.record_respawn();
            tracing::info!("Respawned {} after crash: {}", worker, reason);
            shared.emit(QueueEvent::WorkerRespawned { worker });
        }
        Err(e) => {
            state.workers.shift_remove(&worker);
            tracing::error!("Failed to respawn {}: {}", worker, e);
        }
    }
}

