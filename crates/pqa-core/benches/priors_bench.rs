// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Prior Kernel Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for the pool-driven prior kernels over a
//! 64k-target knowledge base.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pqa_core::{CpuEngine, InMemoryKnowledge};
use pqa_types::{FlushPolicy, PqaConfig};

const N_TARGETS: usize = 65_536;
const N_QUESTIONS: usize = 16;
const N_ANSWERS: usize = 4;

fn knowledge() -> Arc<InMemoryKnowledge> {
    let kb = InMemoryKnowledge::from_fn(
        N_QUESTIONS,
        N_ANSWERS,
        N_TARGETS,
        |q, a, t| 0.1 + ((q * 7 + a * 13 + t) % 17) as f64 / 20.0,
        |_, _| 1.0,
        |t| 1.0 + (t % 5) as f64,
    );
    Arc::new(kb.expect("benchmark knowledge base"))
}

fn engine(flush_policy: FlushPolicy, cache_block_vects: usize) -> CpuEngine<InMemoryKnowledge> {
    let config = PqaConfig {
        flush_policy,
        cache_block_vects,
        ..PqaConfig::default()
    };
    CpuEngine::new(knowledge(), config).expect("benchmark engine")
}

// ── CpuEngine.update_priors() ───────────────────────────────────────

fn bench_update_priors(c: &mut Criterion) {
    for (name, policy, block) in [
        ("update_priors_unblocked", FlushPolicy::Retain, 0),
        ("update_priors_blocked_retain", FlushPolicy::Retain, 8192),
        ("update_priors_blocked_writeback", FlushPolicy::WriteBack, 8192),
    ] {
        let engine = engine(policy, block);
        let mut quiz = engine.start_quiz().expect("quiz");
        for q in 0..8 {
            engine.record_answer(&mut quiz, q, q % N_ANSWERS).expect("answer");
        }
        c.bench_function(name, |b| {
            b.iter(|| engine.update_priors(black_box(&mut quiz)))
        });
    }
}

// ── CpuEngine.normalize_priors() ────────────────────────────────────

fn bench_normalize_priors(c: &mut Criterion) {
    let engine = engine(FlushPolicy::WriteBack, 8192);
    let mut quiz = engine.start_quiz().expect("quiz");
    engine.record_answer(&mut quiz, 3, 1).expect("answer");
    c.bench_function("normalize_priors", |b| {
        b.iter(|| engine.normalize_priors(black_box(&mut quiz)))
    });
}

// ── CpuEngine.list_top_targets() ────────────────────────────────────

fn bench_list_top_targets(c: &mut Criterion) {
    let engine = engine(FlushPolicy::WriteBack, 8192);
    let mut quiz = engine.start_quiz().expect("quiz");
    engine.record_answer(&mut quiz, 5, 2).expect("answer");
    c.bench_function("list_top_targets_k10", |b| {
        b.iter(|| engine.list_top_targets(black_box(&mut quiz), black_box(10)))
    });
}

criterion_group!(
    benches,
    bench_update_priors,
    bench_normalize_priors,
    bench_list_top_targets,
);
criterion_main!(benches);
