// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Prior Ranking
// ─────────────────────────────────────────────────────────────────────
//! Max-heaps over the priors for top-K target retrieval.
//!
//! `HeapifyPriorsSubtaskMake` builds one heap per target range, ordered
//! by true magnitude (exponent first, mantissa on ties). A per-worker
//! `TopTargetsSubtaskPop` pass then pops up to K entries from each heap
//! and the caller merges those short lists.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use pqa_platform::simd::{f64x4, i64x4, LANES};
use pqa_platform::{BaseTask, ExtendedF64, Subtask, SubtaskRange, Task, TaskCompletion};
use pqa_types::{PqaId, PqaResult, RatedTarget};

/// A target and its prior, ordered by prior; lower id wins ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorEntry {
    pub prior: ExtendedF64,
    pub target: PqaId,
}

impl Ord for PriorEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prior
            .cmp(&other.prior)
            .then_with(|| other.target.cmp(&self.target))
    }
}

impl PartialOrd for PriorEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<PriorEntry> for RatedTarget {
    fn from(entry: PriorEntry) -> Self {
        RatedTarget {
            target: entry.target,
            probability: entry.prior.to_f64(),
        }
    }
}

/// Shared context of a heapify pass.
pub struct HeapifyPriorsTask {
    base: BaseTask,
    n_targets: usize,
}

impl HeapifyPriorsTask {
    pub fn new(n_targets: usize) -> Self {
        Self {
            base: BaseTask::new(),
            n_targets,
        }
    }
}

impl Task for HeapifyPriorsTask {
    fn completion(&self) -> &Arc<TaskCompletion> {
        self.base.completion()
    }
}

/// Builds the heap of one vector range. Padding targets are skipped.
pub struct HeapifyPriorsSubtaskMake<'a> {
    task: &'a HeapifyPriorsTask,
    range: SubtaskRange,
    mants: &'a [f64x4],
    exps: &'a [i64x4],
    heap: BinaryHeap<PriorEntry>,
}

impl<'a> HeapifyPriorsSubtaskMake<'a> {
    /// `mants` and `exps` are the whole buffers; only `range` is read.
    pub fn new(
        task: &'a HeapifyPriorsTask,
        range: SubtaskRange,
        mants: &'a [f64x4],
        exps: &'a [i64x4],
    ) -> Self {
        Self {
            task,
            range,
            mants,
            exps,
            heap: BinaryHeap::new(),
        }
    }

    pub fn heap(&self) -> &BinaryHeap<PriorEntry> {
        &self.heap
    }

    pub fn into_heap(self) -> BinaryHeap<PriorEntry> {
        self.heap
    }
}

impl Subtask for HeapifyPriorsSubtaskMake<'_> {
    fn run(&mut self) -> PqaResult<()> {
        let n_targets = self.task.n_targets;
        let mut entries = Vec::with_capacity(self.range.len() * LANES);
        for v in self.range.as_range() {
            let mants = self.mants[v].to_array();
            let exps = self.exps[v].to_array();
            for lane in 0..LANES {
                let target = v * LANES + lane;
                if target >= n_targets {
                    break;
                }
                entries.push(PriorEntry {
                    prior: ExtendedF64::new(mants[lane], exps[lane]),
                    target,
                });
            }
        }
        // O(n) bottom-up heap construction.
        self.heap = BinaryHeap::from(entries);
        Ok(())
    }
}

/// Shared context of the top-K pass.
pub struct TopTargetsTask {
    base: BaseTask,
    k: usize,
}

impl TopTargetsTask {
    pub fn new(k: usize) -> Self {
        Self {
            base: BaseTask::new(),
            k,
        }
    }
}

impl Task for TopTargetsTask {
    fn completion(&self) -> &Arc<TaskCompletion> {
        self.base.completion()
    }
}

/// Pops up to K entries from one worker's heap.
pub struct TopTargetsSubtaskPop<'a> {
    task: &'a TopTargetsTask,
    heap: BinaryHeap<PriorEntry>,
    top: Vec<PriorEntry>,
}

impl<'a> TopTargetsSubtaskPop<'a> {
    pub fn new(task: &'a TopTargetsTask, heap: BinaryHeap<PriorEntry>) -> Self {
        Self {
            task,
            heap,
            top: Vec::new(),
        }
    }

    /// Entries in descending order.
    pub fn top(&self) -> &[PriorEntry] {
        &self.top
    }
}

impl Subtask for TopTargetsSubtaskPop<'_> {
    fn run(&mut self) -> PqaResult<()> {
        let k = self.task.k.min(self.heap.len());
        self.top.reserve(k);
        for _ in 0..k {
            match self.heap.pop() {
                Some(entry) => self.top.push(entry),
                None => break,
            }
        }
        Ok(())
    }
}

/// Merge per-worker descending lists into the global top `k`.
pub fn merge_top(lists: &[&[PriorEntry]], k: usize) -> Vec<RatedTarget> {
    let mut merged: Vec<PriorEntry> = lists.iter().flat_map(|l| l.iter().copied()).collect();
    merged.sort_unstable_by(|a, b| b.cmp(a));
    merged.truncate(k);
    merged.into_iter().map(RatedTarget::from).collect()
}
