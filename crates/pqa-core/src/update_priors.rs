// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Prior Update (Multiply-Accumulate)
// ─────────────────────────────────────────────────────────────────────
//! Recomputes the priors of a target range from the answered questions.
//!
//! For answered questions `(q_0, a_0) .. (q_n, a_n)` each target gets
//!
//!   prior(t) = B(t) * Π_i A(q_i, a_i, t) / D(q_i, t)
//!
//! The answers are applied in `(question, answer)` order, not arrival
//! order, so every permutation of the same answers performs the same
//! sequence of roundings and yields bit-identical priors. The first of
//! them seeds the running value from `B`, later ones accumulate into it.
//!
//! `B`, `A` and `D` are each split into mantissa and exponent before
//! they meet, and the product is rescaled to exponent 0 after every
//! multiply with the extracted exponent added to the exponent lane. No
//! finite coefficient and no chain length can overflow or underflow.
//!
//! The kernel is memory-bound with one pass per answer, so the range is
//! walked in cache-sized blocks: every answer is applied to one block
//! before moving on. A finished block may be written back out of cache
//! and is fenced before the next one starts.

use std::sync::Arc;

use pqa_platform::cache;
use pqa_platform::simd::{self, f64x4, i64x4};
use pqa_platform::{BaseTask, Subtask, SubtaskRange, Task, TaskCompletion};
use pqa_types::{AnsweredQuestion, FlushPolicy, PqaError, PqaResult};

use crate::knowledge::KnowledgeBase;

/// Shared context of one prior update.
pub struct UpdatePriorsTask<'a, K: KnowledgeBase> {
    base: BaseTask,
    kb: &'a K,
    /// Sorted by `(question, answer)`.
    answered: Vec<AnsweredQuestion>,
    n_vects_in_cache: usize,
    flush_policy: FlushPolicy,
}

impl<'a, K: KnowledgeBase> UpdatePriorsTask<'a, K> {
    pub fn new(
        kb: &'a K,
        answered: &[AnsweredQuestion],
        n_vects_in_cache: usize,
        flush_policy: FlushPolicy,
    ) -> Self {
        let mut answered = answered.to_vec();
        answered.sort_unstable();
        Self {
            base: BaseTask::new(),
            kb,
            answered,
            n_vects_in_cache,
            flush_policy,
        }
    }

    pub fn n_answered(&self) -> usize {
        self.answered.len()
    }
}

impl<K: KnowledgeBase> Task for UpdatePriorsTask<'_, K> {
    fn completion(&self) -> &Arc<TaskCompletion> {
        self.base.completion()
    }
}

/// `A / D` as a mantissa in `(0.5, 2)` and a separate exponent.
#[inline]
fn ratio_lanes(mul: f64x4, div: f64x4) -> (f64x4, i64x4) {
    let (mul_mant, mul_exp) = simd::split_lanes(mul);
    let (div_mant, div_exp) = simd::split_lanes(div);
    (mul_mant / div_mant, mul_exp - div_exp)
}

/// One worker's slice of a prior update, owning its chunk of the lanes.
pub struct UpdatePriorsSubtaskMul<'a, K: KnowledgeBase> {
    task: &'a UpdatePriorsTask<'a, K>,
    range: SubtaskRange,
    mants: &'a mut [f64x4],
    exps: &'a mut [i64x4],
}

impl<'a, K: KnowledgeBase> UpdatePriorsSubtaskMul<'a, K> {
    /// `mants` and `exps` are the vectors `[range.first, range.limit)`.
    pub fn new(
        task: &'a UpdatePriorsTask<'a, K>,
        range: SubtaskRange,
        mants: &'a mut [f64x4],
        exps: &'a mut [i64x4],
    ) -> Self {
        assert_eq!(mants.len(), range.len(), "mantissa chunk does not match range");
        assert_eq!(exps.len(), range.len(), "exponent chunk does not match range");
        Self {
            task,
            range,
            mants,
            exps,
        }
    }

    fn reset(&mut self) {
        let b = &self.task.kb.b_lanes()[self.range.as_range()];
        self.mants.copy_from_slice(b);
        self.exps.fill(simd::zero_exps());
        cache::store_fence();
    }

    fn run_internal<const CACHE: bool>(&mut self) -> PqaResult<()> {
        let task = self.task;
        let kb = task.kb;
        let (first, limit) = (self.range.first, self.range.limit);
        let n_vects_in_block = if CACHE {
            task.n_vects_in_cache >> 1
        } else {
            limit - first
        };
        let flush = CACHE && task.flush_policy == FlushPolicy::WriteBack;

        let mut block_start = first;
        loop {
            let block_lim = limit.min(block_start + n_vects_in_block);
            let local = block_start - first..block_lim - first;
            let mants = &mut self.mants[local.clone()];
            let exps = &mut self.exps[local];

            // First answer establishes the base value from B.
            let aq = task.answered[0];
            let muls = &kb.a_lanes(aq.question, aq.answer)[block_start..block_lim];
            let divs = &kb.d_lanes(aq.question)[block_start..block_lim];
            let base = &kb.b_lanes()[block_start..block_lim];
            for ((mant, exp), ((&mul, &div), &b)) in mants
                .iter_mut()
                .zip(exps.iter_mut())
                .zip(muls.iter().zip(divs).zip(base))
            {
                // P(answer | target) for 4 targets at once.
                let (ratio, ratio_exp) = ratio_lanes(mul, div);
                let (base_mant, base_exp) = simd::split_lanes(b);
                let (new_mant, prod_exp) = simd::split_lanes(base_mant * ratio);
                *mant = new_mant;
                *exp = base_exp + ratio_exp + prod_exp;
            }

            for aq in &task.answered[1..] {
                let muls = &kb.a_lanes(aq.question, aq.answer)[block_start..block_lim];
                let divs = &kb.d_lanes(aq.question)[block_start..block_lim];
                for ((mant, exp), (&mul, &div)) in mants
                    .iter_mut()
                    .zip(exps.iter_mut())
                    .zip(muls.iter().zip(divs))
                {
                    let (ratio, ratio_exp) = ratio_lanes(mul, div);
                    let (new_mant, prod_exp) = simd::split_lanes(*mant * ratio);
                    *mant = new_mant;
                    *exp = *exp + ratio_exp + prod_exp;
                }
            }

            // Finite coefficients with D > 0 never leave a non-finite prior.
            if let Some(pos) = mants
                .iter()
                .position(|m| m.to_array().iter().any(|v| !v.is_finite()))
            {
                let vect = block_start + pos;
                log::warn!("Non-finite prior in target vector {vect}");
                return Err(PqaError::Numerical(format!(
                    "likelihood ratio is not finite in target vector {vect}"
                )));
            }

            if CACHE {
                if flush {
                    // The bytes left of this subtask's first block may belong
                    // to another worker.
                    let flush_left = block_start > first;
                    cache::flush_block(mants, flush_left);
                    cache::flush_block(exps, flush_left);
                }
                cache::store_fence();
            }
            if block_lim >= limit {
                break;
            }
            block_start = block_lim;
        }
        if !CACHE {
            cache::store_fence();
        }
        Ok(())
    }
}

impl<K: KnowledgeBase> Subtask for UpdatePriorsSubtaskMul<'_, K> {
    fn run(&mut self) -> PqaResult<()> {
        if self.task.answered.is_empty() {
            self.reset();
            Ok(())
        } else if self.task.n_vects_in_cache < 2 {
            self.run_internal::<false>()
        } else {
            self.run_internal::<true>()
        }
    }
}
