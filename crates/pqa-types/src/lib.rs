// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy shared by the
//! worker-pool platform and the prior-update kernels.

pub mod config;
pub mod error;
pub mod quiz;

pub use config::{FlushPolicy, PqaConfig};
pub use error::{PqaError, PqaResult};
pub use quiz::{AnsweredQuestion, PqaId, RatedTarget};
