// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Knowledge-Base Accessors
// ─────────────────────────────────────────────────────────────────────
//! Read-only access to the likelihood coefficients.
//!
//! `A(q, a, t)` weighs answer `a` to question `q` for target `t`,
//! `D(q, t)` normalises it, `B(t)` is the baseline prior. Rows are laid
//! out as 4-lane vectors over the target index so kernels read them with
//! the same indexing as the prior buffers. Persistence and training live
//! elsewhere; the in-memory store serves tests and embedders.

use pqa_platform::simd::{self, f64x4, LANES};
use pqa_types::{PqaError, PqaId, PqaResult};

/// Trait for coefficient stores. Shared by every worker of a task.
pub trait KnowledgeBase: Send + Sync {
    fn n_questions(&self) -> usize;
    fn n_answers(&self) -> usize;
    fn n_targets(&self) -> usize;

    /// Row `A(question, answer, ·)`, `ceil(n_targets / 4)` vectors.
    fn a_lanes(&self, question: PqaId, answer: PqaId) -> &[f64x4];
    /// Row `D(question, ·)`.
    fn d_lanes(&self, question: PqaId) -> &[f64x4];
    /// Row `B(·)`.
    fn b_lanes(&self) -> &[f64x4];

    fn n_vects(&self) -> usize {
        simd::vects_for(self.n_targets())
    }

    fn get_a(&self, question: PqaId, answer: PqaId, target: PqaId) -> f64 {
        simd::lane_item(self.a_lanes(question, answer), target)
    }

    fn get_d(&self, question: PqaId, target: PqaId) -> f64 {
        simd::lane_item(self.d_lanes(question), target)
    }

    fn get_b(&self, target: PqaId) -> f64 {
        simd::lane_item(self.b_lanes(), target)
    }
}

/// Dense in-memory coefficient store.
///
/// Padding targets past `n_targets` hold `A = 0`, `D = 1`, `B = 0`, so
/// their priors stay zero and never reach a sum or a ranking.
pub struct InMemoryKnowledge {
    n_questions: usize,
    n_answers: usize,
    n_targets: usize,
    n_vects: usize,
    a: Vec<f64x4>,
    d: Vec<f64x4>,
    b: Vec<f64x4>,
}

impl InMemoryKnowledge {
    /// Build from coefficient functions, validating every value.
    pub fn from_fn(
        n_questions: usize,
        n_answers: usize,
        n_targets: usize,
        a: impl Fn(PqaId, PqaId, PqaId) -> f64,
        d: impl Fn(PqaId, PqaId) -> f64,
        b: impl Fn(PqaId) -> f64,
    ) -> PqaResult<Self> {
        if n_targets == 0 {
            return Err(PqaError::Validation(
                "knowledge base needs at least one target".to_string(),
            ));
        }
        if n_questions > 0 && n_answers == 0 {
            return Err(PqaError::Validation(
                "questions need at least one answer".to_string(),
            ));
        }
        let n_vects = simd::vects_for(n_targets);
        let mut a_rows = Vec::with_capacity(n_questions * n_answers * n_vects);
        let mut d_rows = Vec::with_capacity(n_questions * n_vects);
        for q in 0..n_questions {
            for ans in 0..n_answers {
                a_rows.extend(pack_row(n_targets, 0.0, |t| {
                    check_coefficient("A", a(q, ans, t), false)
                })?);
            }
            d_rows.extend(pack_row(n_targets, 1.0, |t| {
                check_coefficient("D", d(q, t), true)
            })?);
        }
        let b_row = pack_row(n_targets, 0.0, |t| check_coefficient("B", b(t), false))?;
        Ok(Self {
            n_questions,
            n_answers,
            n_targets,
            n_vects,
            a: a_rows,
            d: d_rows,
            b: b_row,
        })
    }

    /// Every answer equally likely for every target, uniform baseline.
    pub fn uniform(n_questions: usize, n_answers: usize, n_targets: usize) -> PqaResult<Self> {
        let answer_share = 1.0 / n_answers.max(1) as f64;
        let prior = 1.0 / n_targets.max(1) as f64;
        Self::from_fn(
            n_questions,
            n_answers,
            n_targets,
            |_, _, _| answer_share,
            |_, _| 1.0,
            |_| prior,
        )
    }

    fn check_question(&self, question: PqaId) {
        assert!(
            question < self.n_questions,
            "question {question} out of {}",
            self.n_questions
        );
    }
}

fn check_coefficient(name: &str, value: f64, strictly_positive: bool) -> PqaResult<f64> {
    let ok = value.is_finite() && if strictly_positive { value > 0.0 } else { value >= 0.0 };
    if ok {
        Ok(value)
    } else {
        Err(PqaError::Validation(format!(
            "coefficient {name} must be finite and {}, got {value}",
            if strictly_positive { "> 0" } else { ">= 0" }
        )))
    }
}

fn pack_row(
    n_targets: usize,
    padding: f64,
    mut value: impl FnMut(PqaId) -> PqaResult<f64>,
) -> PqaResult<Vec<f64x4>> {
    let n_vects = simd::vects_for(n_targets);
    let mut row = Vec::with_capacity(n_vects);
    for v in 0..n_vects {
        let mut lanes = [padding; LANES];
        for (lane, slot) in lanes.iter_mut().enumerate() {
            let target = v * LANES + lane;
            if target < n_targets {
                *slot = value(target)?;
            }
        }
        row.push(f64x4::new(lanes));
    }
    Ok(row)
}

impl KnowledgeBase for InMemoryKnowledge {
    fn n_questions(&self) -> usize {
        self.n_questions
    }

    fn n_answers(&self) -> usize {
        self.n_answers
    }

    fn n_targets(&self) -> usize {
        self.n_targets
    }

    fn a_lanes(&self, question: PqaId, answer: PqaId) -> &[f64x4] {
        self.check_question(question);
        assert!(answer < self.n_answers, "answer {answer} out of {}", self.n_answers);
        let start = (question * self.n_answers + answer) * self.n_vects;
        &self.a[start..start + self.n_vects]
    }

    fn d_lanes(&self, question: PqaId) -> &[f64x4] {
        self.check_question(question);
        let start = question * self.n_vects;
        &self.d[start..start + self.n_vects]
    }

    fn b_lanes(&self) -> &[f64x4] {
        &self.b
    }
}
