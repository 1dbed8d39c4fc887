//! Bounded worker pool with completion-order collection.
//!
//! Tasks are spawned onto a dedicated rayon pool and report back over a
//! channel; the calling thread consumes results in completion order and may
//! stop early. Stopping raises a shared cancellation flag that every task
//! checks before it starts, so queued work is skipped while already-running
//! tasks finish normally.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use thiserror::Error;
use tracing::debug;

/// Upper bound used when the platform cannot report its parallelism.
const FALLBACK_PARALLELISM: usize = 4;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome of draining a batch of tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Results handed to the consumer.
    pub completed: usize,
    /// Total tasks submitted.
    pub total: usize,
    /// True if the consumer stopped before every task reported.
    pub stopped: bool,
}

/// Number of CPUs available to this process.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_PARALLELISM)
}

/// Run `work` over every task with at most `workers` concurrent tasks.
///
/// `on_complete` receives `(task_index, result)` in completion order and
/// returns `ControlFlow::Break(())` to stop. With `workers <= 1` or a single
/// task everything runs inline on the calling thread, in task order.
pub fn run_tasks<T, R, F, C>(
    workers: usize,
    tasks: Vec<T>,
    work: F,
    mut on_complete: C,
) -> Result<Completion, PoolError>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
    C: FnMut(usize, R) -> ControlFlow<()>,
{
    let total = tasks.len();
    let mut completed = 0;

    if workers <= 1 || total <= 1 {
        for (index, task) in tasks.into_iter().enumerate() {
            let result = work(task);
            completed += 1;
            if on_complete(index, result).is_break() {
                return Ok(Completion {
                    completed,
                    total,
                    stopped: completed < total,
                });
            }
        }
        return Ok(Completion {
            completed,
            total,
            stopped: false,
        });
    }

    let workers = workers.min(total);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("signallab-worker-{i}"))
        .build()?;
    debug!(workers, tasks = total, "worker pool started");

    let cancel = AtomicBool::new(false);
    let mut stopped = false;

    pool.in_place_scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, R)>();
        for (index, task) in tasks.into_iter().enumerate() {
            let tx = tx.clone();
            let work = &work;
            let cancel = &cancel;
            scope.spawn(move |_| {
                if cancel.load(Ordering::Relaxed) {
                    return;
                }
                // The receiver is gone only once the consumer has stopped.
                let _ = tx.send((index, work(task)));
            });
        }
        drop(tx);

        for (index, result) in rx.iter() {
            completed += 1;
            if on_complete(index, result).is_break() {
                stopped = completed < total;
                cancel.store(true, Ordering::Relaxed);
                break;
            }
        }
    });

    Ok(Completion {
        completed,
        total,
        stopped,
    })
}
