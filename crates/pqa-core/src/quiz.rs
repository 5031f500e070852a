// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Quiz Session
// ─────────────────────────────────────────────────────────────────────
//! Per-session state: the answers given so far, in arrival order, and
//! the target priors in extended-range form.

use pqa_platform::simd::{f64x4, i64x4};
use pqa_platform::{ExtendedF64, ExtendedRangeVector};
use pqa_types::{AnsweredQuestion, PqaId};

/// One quiz in progress. Created by `CpuEngine::start_quiz`.
#[derive(Debug, Clone)]
pub struct Quiz {
    answered: Vec<AnsweredQuestion>,
    priors: ExtendedRangeVector,
}

impl Quiz {
    pub(crate) fn new(n_targets: usize) -> Self {
        Self {
            answered: Vec::new(),
            priors: ExtendedRangeVector::new(n_targets),
        }
    }

    pub fn answered(&self) -> &[AnsweredQuestion] {
        &self.answered
    }

    pub fn n_answered(&self) -> usize {
        self.answered.len()
    }

    pub fn n_targets(&self) -> usize {
        self.priors.n_items()
    }

    pub fn priors(&self) -> &ExtendedRangeVector {
        &self.priors
    }

    pub fn prior(&self, target: PqaId) -> ExtendedF64 {
        self.priors.get(target)
    }

    /// Prior of `target` as a plain double; meaningful after normalisation.
    pub fn probability(&self, target: PqaId) -> f64 {
        self.priors.magnitude(target)
    }

    pub(crate) fn push_answer(&mut self, aq: AnsweredQuestion) {
        self.answered.push(aq);
    }

    /// Answers read-only, prior lanes writable, for the update kernel.
    pub(crate) fn kernel_view(&mut self) -> (&[AnsweredQuestion], &mut [f64x4], &mut [i64x4]) {
        let (mants, exps) = self.priors.lanes_mut();
        (&self.answered, mants, exps)
    }

    pub(crate) fn priors_mut(&mut self) -> &mut ExtendedRangeVector {
        &mut self.priors
    }
}
