// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Platform
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied. Submitted subtasks are handed
// to workers as lifetime-erased pointers and cache lines are flushed via
// intrinsics. Every unsafe block carries a SAFETY comment.
#![deny(unsafe_op_in_unsafe_fn)]
//! Parallel plumbing and numeric primitives for the PQA kernels.
//!
//! - `WorkerPool` — fixed set of named worker threads fed from one queue.
//! - `Task` / `TaskCompletion` — shared context and completion barrier.
//! - `Subtask` / `SubtaskRange` — one worker's slice `[first, limit)`.
//! - `PoolRunner` / `Keeper` — partitioning, dispatch and deterministic
//!   teardown of the subtask array.
//! - `simd`, `ExtendedF64`, `ExtendedRangeVector` — mantissa/exponent
//!   split arithmetic in 4-lane vectors.
//! - `cache` — block write-back and store fences.
//!
//! # Invariants
//!
//! 1. **Disjoint ranges**: `split_range` yields ranges whose union is
//!    exactly `[0, n_items)`, each size within one of the others.
//! 2. **Wait precedes destruction**: a `Keeper` never drops a subtask
//!    that a worker may still be running.
//! 3. **Faults stay local**: a failing or panicking subtask is recorded
//!    on its task; the worker carries on with the next job.

pub mod cache;
pub mod extended;
pub mod pool;
pub mod runner;
pub mod simd;
pub mod subtask;
pub mod task;

pub use extended::{ExtendedF64, ExtendedRangeVector};
pub use pool::WorkerPool;
pub use runner::{split_range, take_front, Keeper, PoolRunner};
pub use subtask::{Subtask, SubtaskRange};
pub use task::{BaseTask, Task, TaskCompletion};
