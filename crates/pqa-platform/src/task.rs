// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Task Context and Completion Barrier
// ─────────────────────────────────────────────────────────────────────
//! Shared context of one parallel operation.
//!
//! The outstanding-subtask counter is the only synchronisation point of
//! a task: subtasks work on disjoint ranges and never lock each other.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use pqa_types::{PqaError, PqaResult};

#[derive(Default)]
struct CompletionState {
    outstanding: usize,
    failures: Vec<PqaError>,
}

/// Outstanding-subtask counter plus captured failures.
///
/// Workers decrement the counter; the submitting thread blocks in
/// `wait_complete` until it reaches zero. Can be reused by successive
/// submissions once the previous one has been waited for.
#[derive(Default)]
pub struct TaskCompletion {
    state: Mutex<CompletionState>,
    done: Condvar,
}

impl TaskCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for `n` subtasks before any of them can start running.
    pub(crate) fn add_outstanding(&self, n: usize) {
        self.state.lock().outstanding += n;
    }

    /// Record the outcome of one subtask and wake waiters on the last one.
    pub(crate) fn finish_subtask(&self, outcome: PqaResult<()>) {
        let mut state = self.state.lock();
        if let Err(e) = outcome {
            state.failures.push(e);
        }
        debug_assert!(state.outstanding > 0, "more completions than subtasks");
        state.outstanding -= 1;
        if state.outstanding == 0 {
            self.done.notify_all();
        }
    }

    /// Number of submitted subtasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Block until every submitted subtask has finished. Idempotent.
    pub fn wait_complete(&self) {
        let mut state = self.state.lock();
        while state.outstanding > 0 {
            self.done.wait(&mut state);
        }
    }

    /// Drain captured failures, returning the first one.
    pub fn take_result(&self) -> PqaResult<()> {
        let failures = std::mem::take(&mut self.state.lock().failures);
        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(()),
            Some(first) => {
                let extra = failures.count();
                if extra > 0 {
                    log::error!("{extra} more subtask failure(s) after: {first}");
                }
                Err(first)
            }
        }
    }
}

/// Shared context of one parallel operation.
///
/// Holds references to the immutable inputs; subtasks hold a shared
/// reference to it, hence `Sync`.
pub trait Task: Sync {
    fn completion(&self) -> &Arc<TaskCompletion>;
}

/// Completion state embedded by concrete tasks.
#[derive(Default)]
pub struct BaseTask {
    completion: Arc<TaskCompletion>,
}

impl BaseTask {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Task for BaseTask {
    fn completion(&self) -> &Arc<TaskCompletion> {
        &self.completion
    }
}
