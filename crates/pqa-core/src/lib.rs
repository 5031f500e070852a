// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Core Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Prior update, normalisation and ranking for probabilistic quizzes.
//!
//! A quiz narrows a set of targets by asking questions. After each
//! answer every target prior is recomputed as `B * Π A / D` over the
//! answered questions, in parallel over contiguous target ranges.
//!
//! # Invariants
//!
//! 1. **Exponents never overflow**: priors and likelihood ratios are
//!    carried as mantissa and 64-bit exponent, so arbitrarily long answer
//!    chains and extreme finite coefficients stay in range. A non-finite
//!    ratio is reported as `PqaError::Numerical`.
//! 2. **Answer order is irrelevant**: answers are applied in
//!    `(question, answer)` order, so any permutation of the same answers
//!    yields bit-identical priors.
//! 3. **Padding is inert**: targets past `n_targets` in the last vector
//!    have zero priors and are never ranked.

pub mod engine;
pub mod heapify_priors;
pub mod knowledge;
pub mod norm_priors;
pub mod quiz;
pub mod update_priors;

pub use engine::CpuEngine;
pub use heapify_priors::PriorEntry;
pub use knowledge::{InMemoryKnowledge, KnowledgeBase};
pub use quiz::Quiz;
