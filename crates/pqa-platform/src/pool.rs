// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Worker Pool
// ─────────────────────────────────────────────────────────────────────
//! Fixed set of worker threads pulling subtasks from one shared queue.
//!
//! Subtasks of an adjacent batch are pushed one job at a time; idle
//! workers pick the next job, which balances uneven subtasks without a
//! scheduler. After running a subtask the worker reports its outcome to
//! the owning task's `TaskCompletion`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use pqa_types::{PqaConfig, PqaError, PqaResult};

use crate::subtask::Subtask;
use crate::task::TaskCompletion;

/// Lifetime-erased pointer to a submitted subtask.
struct SubtaskPtr(*mut (dyn Subtask + 'static));

// SAFETY: the pointee is `Send` (a `Subtask` bound) and is accessed by
// exactly one worker while the submitter is blocked waiting for it.
unsafe impl Send for SubtaskPtr {}

struct Job {
    subtask: SubtaskPtr,
    slot: usize,
    completion: Arc<TaskCompletion>,
}

impl Job {
    fn execute(self) {
        let Job {
            subtask,
            slot,
            completion,
        } = self;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: `enqueue_adjacent` callers keep the subtask alive and
            // untouched until `completion` reports it finished, which only
            // happens below, after the last use of the pointer.
            unsafe { (*subtask.0).run() }
        }));
        let outcome = match outcome {
            Ok(result) => result,
            Err(payload) => Err(PqaError::SubtaskFailed {
                worker: slot,
                message: panic_message(payload.as_ref()),
            }),
        };
        if let Err(e) = &outcome {
            log::error!("Subtask {slot} failed: {e}");
        }
        completion.finish_subtask(outcome);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

fn worker_loop(jobs: Receiver<Job>) {
    for job in jobs.iter() {
        job.execute();
    }
    log::debug!(
        "Worker {} exiting",
        thread::current().name().unwrap_or("<unnamed>")
    );
}

/// Fixed-size pool of worker threads.
///
/// Outlives every task run on it. Dropping the pool closes the queue and
/// joins the workers after they drain it.
pub struct WorkerPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> PqaResult<Self> {
        Self::with_thread_name(worker_count, "pqa-worker")
    }

    pub fn from_config(config: &PqaConfig) -> PqaResult<Self> {
        Self::with_thread_name(config.resolved_worker_count(), &config.thread_name_prefix)
    }

    /// Start `worker_count` threads named `<prefix>-<index>`.
    pub fn with_thread_name(worker_count: usize, prefix: &str) -> PqaResult<Self> {
        if worker_count == 0 {
            return Err(PqaError::Config(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let mut pool = Self {
            jobs: Some(tx),
            workers: Vec::with_capacity(worker_count),
            worker_count,
        };
        for i in 0..worker_count {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{prefix}-{i}"))
                .spawn(move || worker_loop(rx))
                .map_err(|e| PqaError::ThreadSpawn(e.to_string()))?;
            pool.workers.push(handle);
        }
        log::info!("Worker pool started with {worker_count} workers");
        Ok(pool)
    }

    /// The worker count fixed at construction.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Submit `subtasks` as one adjacent batch completing `completion`.
    ///
    /// The outstanding count is raised by the whole batch before the first
    /// job is queued. If the queue is closed, the unsent remainder is
    /// recorded as failed so a waiter never hangs.
    ///
    /// # Safety
    ///
    /// The caller must call `completion.wait_complete()` before it reads,
    /// moves, or drops any element of `subtasks`, including on unwind.
    /// `PoolRunner` upholds this through its `Keeper`.
    pub unsafe fn enqueue_adjacent<'s, S: Subtask + 's>(
        &self,
        subtasks: &mut [S],
        completion: &Arc<TaskCompletion>,
    ) -> PqaResult<()> {
        let n_subtasks = subtasks.len();
        completion.add_outstanding(n_subtasks);
        let Some(jobs) = &self.jobs else {
            for _ in 0..n_subtasks {
                completion.finish_subtask(Err(PqaError::PoolShutdown));
            }
            return Err(PqaError::PoolShutdown);
        };
        for (slot, subtask) in subtasks.iter_mut().enumerate() {
            let ptr: *mut (dyn Subtask + 's) = subtask;
            // SAFETY: only the lifetime bound is erased; the caller keeps the
            // pointee alive until the completion wait returns.
            let ptr: *mut (dyn Subtask + 'static) = unsafe { std::mem::transmute(ptr) };
            let job = Job {
                subtask: SubtaskPtr(ptr),
                slot,
                completion: Arc::clone(completion),
            };
            if jobs.send(job).is_err() {
                log::error!("Worker queue closed, dropping {} subtasks", n_subtasks - slot);
                for _ in slot..n_subtasks {
                    completion.finish_subtask(Err(PqaError::PoolShutdown));
                }
                return Err(PqaError::PoolShutdown);
            }
        }
        Ok(())
    }

    /// Close the queue and join the workers.
    pub fn shutdown(mut self) {
        self.shutdown_internal();
    }

    fn shutdown_internal(&mut self) {
        if self.jobs.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker thread terminated abnormally");
            }
        }
        log::info!("Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_internal();
    }
}
