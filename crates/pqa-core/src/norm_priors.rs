// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Prior Normalisation
// ─────────────────────────────────────────────────────────────────────
//! Turns extended-range priors into probabilities summing to 1.
//!
//! Three data-parallel passes over one `NormPriorsTask`:
//! 1. `NormPriorsSubtaskMaxExp` — largest canonical exponent per range.
//! 2. `NormPriorsSubtaskSum` — rescale every prior to plain doubles
//!    relative to the global maximum (exponent 0) and sum per range.
//! 3. `NormPriorsSubtaskDiv` — divide by the shared sum-of-priors vector.
//!
//! Priors far below the maximum round to zero in pass 2; they could not
//! contribute to a double-precision probability anyway.

use std::sync::Arc;

use pqa_platform::simd::{self, f64x4, i64x4, LANES};
use pqa_platform::{BaseTask, Subtask, SubtaskRange, Task, TaskCompletion};
use pqa_types::{PqaError, PqaResult};

/// Shared reduction state of one normalisation.
pub struct NormPriorsTask {
    base: BaseTask,
    max_exp: i64,
    sum_priors: f64x4,
}

impl Default for NormPriorsTask {
    fn default() -> Self {
        Self {
            base: BaseTask::new(),
            max_exp: 0,
            sum_priors: f64x4::splat(1.0),
        }
    }
}

impl NormPriorsTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_exp(&self) -> i64 {
        self.max_exp
    }

    pub fn set_max_exp(&mut self, max_exp: i64) {
        self.max_exp = max_exp;
    }

    pub fn sum_priors(&self) -> f64 {
        self.sum_priors.to_array()[0]
    }

    /// Broadcast the total so pass 3 divides all lanes at once.
    pub fn set_sum_priors(&mut self, total: f64) -> PqaResult<()> {
        if !(total.is_finite() && total > 0.0) {
            log::warn!("Cannot normalise priors: sum is {total}");
            return Err(PqaError::Numerical(format!(
                "sum of priors must be finite and positive, got {total}"
            )));
        }
        self.sum_priors = f64x4::splat(total);
        Ok(())
    }
}

impl Task for NormPriorsTask {
    fn completion(&self) -> &Arc<TaskCompletion> {
        self.base.completion()
    }
}

/// Pass 1: largest canonical exponent among the non-zero priors.
pub struct NormPriorsSubtaskMaxExp<'a> {
    range: SubtaskRange,
    mants: &'a [f64x4],
    exps: &'a [i64x4],
    max_exp: Option<i64>,
}

impl<'a> NormPriorsSubtaskMaxExp<'a> {
    /// `mants` and `exps` are the whole buffers; only `range` is read.
    pub fn new(range: SubtaskRange, mants: &'a [f64x4], exps: &'a [i64x4]) -> Self {
        Self {
            range,
            mants,
            exps,
            max_exp: None,
        }
    }

    /// `None` when every prior of the range is zero.
    pub fn max_exp(&self) -> Option<i64> {
        self.max_exp
    }
}

impl Subtask for NormPriorsSubtaskMaxExp<'_> {
    fn run(&mut self) -> PqaResult<()> {
        let range = self.range.as_range();
        for (mants, exps) in self.mants[range.clone()].iter().zip(&self.exps[range]) {
            for (&mant, &exp) in mants.to_array().iter().zip(exps.to_array().iter()) {
                let (canonical, shift) = simd::split_scalar(mant);
                if canonical == 0.0 {
                    continue;
                }
                let e = exp + shift;
                self.max_exp = Some(self.max_exp.map_or(e, |m| m.max(e)));
            }
        }
        Ok(())
    }
}

/// Pass 2: rescale to exponent 0 relative to the maximum, and sum.
pub struct NormPriorsSubtaskSum<'a> {
    task: &'a NormPriorsTask,
    mants: &'a mut [f64x4],
    exps: &'a mut [i64x4],
    sum: f64x4,
}

impl<'a> NormPriorsSubtaskSum<'a> {
    /// `mants` and `exps` are this range's chunks.
    pub fn new(
        task: &'a NormPriorsTask,
        range: SubtaskRange,
        mants: &'a mut [f64x4],
        exps: &'a mut [i64x4],
    ) -> Self {
        assert_eq!(mants.len(), range.len(), "mantissa chunk does not match range");
        assert_eq!(exps.len(), range.len(), "exponent chunk does not match range");
        Self {
            task,
            mants,
            exps,
            sum: f64x4::splat(0.0),
        }
    }

    pub fn sum(&self) -> f64 {
        simd::sum_lanes(self.sum)
    }
}

impl Subtask for NormPriorsSubtaskSum<'_> {
    fn run(&mut self) -> PqaResult<()> {
        let max_exp = self.task.max_exp;
        let zero = simd::zero_exps();
        for (mant, exp) in self.mants.iter_mut().zip(self.exps.iter_mut()) {
            let mut values = [0.0; LANES];
            for ((value, &m), &e) in values
                .iter_mut()
                .zip(mant.to_array().iter())
                .zip(exp.to_array().iter())
            {
                *value = simd::ldexp(m, e - max_exp);
            }
            *mant = f64x4::new(values);
            *exp = zero;
            self.sum = self.sum + *mant;
        }
        Ok(())
    }
}

/// Pass 3: divide every mantissa by the shared sum.
pub struct NormPriorsSubtaskDiv<'a> {
    task: &'a NormPriorsTask,
    mants: &'a mut [f64x4],
}

impl<'a> NormPriorsSubtaskDiv<'a> {
    pub fn new(task: &'a NormPriorsTask, range: SubtaskRange, mants: &'a mut [f64x4]) -> Self {
        assert_eq!(mants.len(), range.len(), "mantissa chunk does not match range");
        Self { task, mants }
    }
}

impl Subtask for NormPriorsSubtaskDiv<'_> {
    fn run(&mut self) -> PqaResult<()> {
        let divisor = self.task.sum_priors;
        for mant in self.mants.iter_mut() {
            *mant = *mant / divisor;
        }
        Ok(())
    }
}
