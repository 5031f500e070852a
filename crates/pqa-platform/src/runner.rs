// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Pool Runner and Subtask Keeper
// ─────────────────────────────────────────────────────────────────────
//! Partitions an index space over workers, constructs one subtask per
//! slice, submits the batch and blocks until it completes.
//!
//! The subtask array lives in a single pre-sized allocation owned by a
//! `Keeper`: its length is the constructed count, its capacity the
//! allocated one. The `Keeper` waits for the task before it destroys the
//! subtasks, each exactly once and in construction order.

use std::sync::Arc;

use pqa_types::PqaResult;

use crate::pool::WorkerPool;
use crate::subtask::{Subtask, SubtaskRange};
use crate::task::{Task, TaskCompletion};

/// Split `[0, n_items)` into `n_workers` contiguous ranges.
///
/// The first `n_items % n_workers` ranges get one extra item. When
/// `n_items < n_workers` the trailing ranges are empty.
pub fn split_range(n_items: usize, n_workers: usize) -> impl Iterator<Item = SubtaskRange> {
    assert!(n_workers > 0, "cannot split over zero workers");
    let quotient = n_items / n_workers;
    let remainder = n_items % n_workers;
    let mut next_start = 0;
    (0..n_workers).map(move |worker| {
        let first = next_start;
        next_start += quotient + usize::from(worker < remainder);
        debug_assert!(next_start <= n_items);
        SubtaskRange::new(worker, first, next_start)
    })
}

/// Detach the first `len` items of `rest` and advance `rest` past them.
///
/// Used by subtask constructors to hand each subtask its own disjoint
/// chunk of an output buffer, in range order.
pub fn take_front<'a, T>(rest: &mut &'a mut [T], len: usize) -> &'a mut [T] {
    let (head, tail) = std::mem::take(rest).split_at_mut(len);
    *rest = tail;
    head
}

/// Owner of a constructed subtask array.
///
/// Dropping it first waits for the pending task, if any, then destroys
/// every constructed subtask once. Moving it moves that responsibility.
pub struct Keeper<S> {
    subtasks: Vec<S>,
    pending: Option<Arc<TaskCompletion>>,
}

impl<S> Keeper<S> {
    fn with_capacity(n_subtasks: usize) -> Self {
        Self {
            subtasks: Vec::with_capacity(n_subtasks),
            pending: None,
        }
    }

    /// Block until the task completes. Idempotent.
    pub fn wait(&mut self) {
        if let Some(completion) = self.pending.take() {
            completion.wait_complete();
        }
    }

    pub fn subtasks(&self) -> &[S] {
        debug_assert!(self.pending.is_none(), "subtasks read while still running");
        &self.subtasks
    }

    pub fn subtasks_mut(&mut self) -> &mut [S] {
        self.wait();
        &mut self.subtasks
    }

    /// Take the subtasks out, after waiting.
    pub fn into_subtasks(mut self) -> Vec<S> {
        self.wait();
        std::mem::take(&mut self.subtasks)
    }

    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }
}

impl<S> Drop for Keeper<S> {
    fn drop(&mut self) {
        self.wait();
        self.subtasks.clear();
    }
}

/// Runs partitioned subtasks on a `WorkerPool`.
pub struct PoolRunner<'p> {
    pool: &'p WorkerPool,
}

impl<'p> PoolRunner<'p> {
    pub fn new(pool: &'p WorkerPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &'p WorkerPool {
        self.pool
    }

    /// Partition `n_items` over `n_workers`, build a subtask per range via
    /// `init`, run them all and wait.
    ///
    /// `init` is called in range order, so it may carve consecutive
    /// output chunks with `take_front`. A captured subtask failure is
    /// returned after every subtask has finished.
    pub fn split_and_run<T, S, F>(
        &self,
        task: &T,
        n_items: usize,
        n_workers: usize,
        mut init: F,
    ) -> PqaResult<Keeper<S>>
    where
        T: Task,
        S: Subtask,
        F: FnMut(SubtaskRange) -> S,
    {
        let mut keeper = Keeper::with_capacity(n_workers);
        for range in split_range(n_items, n_workers) {
            keeper.subtasks.push(init(range));
        }
        self.launch(task, keeper)
    }

    /// `split_and_run` over every worker of the pool.
    pub fn split_and_run_all<T, S, F>(&self, task: &T, n_items: usize, init: F) -> PqaResult<Keeper<S>>
    where
        T: Task,
        S: Subtask,
        F: FnMut(SubtaskRange) -> S,
    {
        self.split_and_run(task, n_items, self.pool.worker_count(), init)
    }

    /// One subtask per worker with range `[worker, worker + 1)`, for
    /// per-worker aggregation passes.
    pub fn run_per_worker_subtasks<T, S, F>(
        &self,
        task: &T,
        n_workers: usize,
        mut init: F,
    ) -> PqaResult<Keeper<S>>
    where
        T: Task,
        S: Subtask,
        F: FnMut(SubtaskRange) -> S,
    {
        let mut keeper = Keeper::with_capacity(n_workers);
        for worker in 0..n_workers {
            keeper
                .subtasks
                .push(init(SubtaskRange::new(worker, worker, worker + 1)));
        }
        self.launch(task, keeper)
    }

    fn launch<T: Task, S: Subtask>(&self, task: &T, mut keeper: Keeper<S>) -> PqaResult<Keeper<S>> {
        let completion = task.completion();
        log::debug!("Dispatching {} subtasks", keeper.subtasks.len());
        keeper.pending = Some(Arc::clone(completion));
        // SAFETY: `keeper` is not touched until `keeper.wait()` below, and
        // if anything unwinds first its drop performs the same wait before
        // releasing the subtasks.
        let submitted = unsafe { self.pool.enqueue_adjacent(&mut keeper.subtasks, completion) };
        keeper.wait();
        submitted?;
        completion.take_result()?;
        Ok(keeper)
    }
}
