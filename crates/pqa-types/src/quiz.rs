// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Quiz Records
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

/// Index of a question, answer or target.
pub type PqaId = usize;

/// One answer given during a quiz. Immutable once appended.
///
/// Ordered by question, then answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question: PqaId,
    pub answer: PqaId,
}

impl AnsweredQuestion {
    pub fn new(question: PqaId, answer: PqaId) -> Self {
        Self { question, answer }
    }
}

/// A target together with the probability that it is what the user needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatedTarget {
    pub target: PqaId,
    pub probability: f64,
}
