// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Subtask Abstraction
// ─────────────────────────────────────────────────────────────────────

use std::ops::Range;

use pqa_types::PqaResult;

/// One worker's half-open slice `[first, limit)` of a task's index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtaskRange {
    pub worker: usize,
    pub first: usize,
    pub limit: usize,
}

impl SubtaskRange {
    pub fn new(worker: usize, first: usize, limit: usize) -> Self {
        debug_assert!(first <= limit, "subtask range [{first}, {limit}) is reversed");
        Self {
            worker,
            first,
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.limit - self.first
    }

    /// A zero-length range is legal and its subtask is a no-op.
    pub fn is_empty(&self) -> bool {
        self.first == self.limit
    }

    pub fn as_range(&self) -> Range<usize> {
        self.first..self.limit
    }
}

/// Unit of parallel work executed by a pool worker.
///
/// A subtask owns its range and whatever disjoint slice of the output it
/// writes; everything shared with siblings is reached through its task
/// and is read-only. Errors and panics are captured by the worker and
/// surfaced to the submitter after the wait.
pub trait Subtask: Send {
    fn run(&mut self) -> PqaResult<()>;
}
