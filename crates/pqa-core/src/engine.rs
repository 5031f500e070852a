// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — CPU Engine
// ─────────────────────────────────────────────────────────────────────
//! Drives the prior kernels over a shared worker pool.
//!
//! Every operation is one or more pool passes: the target vectors are
//! split into one contiguous range per worker, each subtask gets the
//! matching chunk of the prior buffers, and the call returns once every
//! subtask has finished. A failed pass leaves the quiz priors in an
//! unspecified state; call `update_priors` to recompute them.

use std::collections::BinaryHeap;
use std::sync::Arc;

use pqa_platform::{take_front, PoolRunner, WorkerPool};
use pqa_types::{AnsweredQuestion, PqaConfig, PqaError, PqaId, PqaResult, RatedTarget};

use crate::heapify_priors::{
    merge_top, HeapifyPriorsSubtaskMake, HeapifyPriorsTask, PriorEntry, TopTargetsSubtaskPop,
    TopTargetsTask,
};
use crate::knowledge::KnowledgeBase;
use crate::norm_priors::{
    NormPriorsSubtaskDiv, NormPriorsSubtaskMaxExp, NormPriorsSubtaskSum, NormPriorsTask,
};
use crate::quiz::Quiz;
use crate::update_priors::{UpdatePriorsSubtaskMul, UpdatePriorsTask};

/// Quiz engine over a knowledge base, running its kernels on CPU workers.
pub struct CpuEngine<K: KnowledgeBase> {
    kb: Arc<K>,
    pool: WorkerPool,
    config: PqaConfig,
}

impl<K: KnowledgeBase> CpuEngine<K> {
    /// Validate `config` and start the worker pool.
    pub fn new(kb: Arc<K>, config: PqaConfig) -> PqaResult<Self> {
        config.validate()?;
        let pool = WorkerPool::from_config(&config)?;
        log::info!(
            "CpuEngine started: {} workers, {} targets, {} questions, blocking {}",
            pool.worker_count(),
            kb.n_targets(),
            kb.n_questions(),
            if config.cache_blocking() { "on" } else { "off" },
        );
        Ok(Self { kb, pool, config })
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    pub fn config(&self) -> &PqaConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &Arc<K> {
        &self.kb
    }

    /// New quiz with priors reset to the baseline `B`.
    pub fn start_quiz(&self) -> PqaResult<Quiz> {
        let mut quiz = Quiz::new(self.kb.n_targets());
        self.update_priors(&mut quiz)?;
        log::debug!("Quiz started over {} targets", quiz.n_targets());
        Ok(quiz)
    }

    /// Append an answer and recompute the priors.
    pub fn record_answer(&self, quiz: &mut Quiz, question: PqaId, answer: PqaId) -> PqaResult<()> {
        if question >= self.kb.n_questions() {
            return Err(PqaError::Validation(format!(
                "question {question} out of range ({} questions)",
                self.kb.n_questions()
            )));
        }
        if answer >= self.kb.n_answers() {
            return Err(PqaError::Validation(format!(
                "answer {answer} out of range ({} answers)",
                self.kb.n_answers()
            )));
        }
        self.check_quiz(quiz)?;
        quiz.push_answer(AnsweredQuestion::new(question, answer));
        self.update_priors(quiz)
    }

    /// Recompute every prior from `B` and the answered questions.
    pub fn update_priors(&self, quiz: &mut Quiz) -> PqaResult<()> {
        self.check_quiz(quiz)?;
        let (answered, mut mants, mut exps) = quiz.kernel_view();
        let n_vects = mants.len();
        let task = UpdatePriorsTask::new(
            &*self.kb,
            answered,
            self.config.cache_block_vects,
            self.config.flush_policy,
        );
        let runner = PoolRunner::new(&self.pool);
        runner.split_and_run_all(&task, n_vects, |range| {
            let m = take_front(&mut mants, range.len());
            let e = take_front(&mut exps, range.len());
            UpdatePriorsSubtaskMul::new(&task, range, m, e)
        })?;
        log::trace!("Priors updated with {} answers", task.n_answered());
        Ok(())
    }

    /// Scale the priors to probabilities summing to 1, all exponents 0.
    pub fn normalize_priors(&self, quiz: &mut Quiz) -> PqaResult<()> {
        self.check_quiz(quiz)?;
        let runner = PoolRunner::new(&self.pool);
        let mut task = NormPriorsTask::new();
        let n_vects = quiz.priors().n_vects();

        let max_exp = {
            let priors = quiz.priors();
            let keeper = runner.split_and_run_all(&task, n_vects, |range| {
                NormPriorsSubtaskMaxExp::new(range, priors.mants(), priors.exps())
            })?;
            let max_exp = keeper.subtasks().iter().filter_map(|s| s.max_exp()).max();
            max_exp
        };
        let max_exp = max_exp.ok_or_else(|| {
            log::warn!("Cannot normalise priors: every prior is zero");
            PqaError::Numerical("every prior is zero".to_string())
        })?;
        task.set_max_exp(max_exp);

        let total = {
            let (mut mants, mut exps) = quiz.priors_mut().lanes_mut();
            let keeper = runner.split_and_run_all(&task, n_vects, |range| {
                let m = take_front(&mut mants, range.len());
                let e = take_front(&mut exps, range.len());
                NormPriorsSubtaskSum::new(&task, range, m, e)
            })?;
            let total: f64 = keeper.subtasks().iter().map(|s| s.sum()).sum();
            total
        };
        task.set_sum_priors(total)?;

        let (mut mants, _) = quiz.priors_mut().lanes_mut();
        runner.split_and_run_all(&task, n_vects, |range| {
            let m = take_front(&mut mants, range.len());
            NormPriorsSubtaskDiv::new(&task, range, m)
        })?;
        log::trace!("Priors normalised: max exponent {max_exp}, sum {total}");
        Ok(())
    }

    /// One max-heap of priors per worker range.
    pub fn heapify_priors(&self, quiz: &Quiz) -> PqaResult<Vec<BinaryHeap<PriorEntry>>> {
        self.check_quiz(quiz)?;
        let runner = PoolRunner::new(&self.pool);
        let task = HeapifyPriorsTask::new(quiz.n_targets());
        let priors = quiz.priors();
        let keeper = runner.split_and_run_all(&task, priors.n_vects(), |range| {
            HeapifyPriorsSubtaskMake::new(&task, range, priors.mants(), priors.exps())
        })?;
        let heaps: Vec<_> = keeper
            .into_subtasks()
            .into_iter()
            .map(HeapifyPriorsSubtaskMake::into_heap)
            .collect();
        Ok(heaps)
    }

    /// The `k` most probable targets, most probable first.
    ///
    /// Normalises the priors in place. Equal probabilities rank the lower
    /// target id first.
    pub fn list_top_targets(&self, quiz: &mut Quiz, k: usize) -> PqaResult<Vec<RatedTarget>> {
        self.normalize_priors(quiz)?;
        let heaps = self.heapify_priors(quiz)?;
        let n_heaps = heaps.len();
        let mut heaps = heaps.into_iter();

        let runner = PoolRunner::new(&self.pool);
        let task = TopTargetsTask::new(k);
        let keeper = runner.run_per_worker_subtasks(&task, n_heaps, |_| {
            TopTargetsSubtaskPop::new(&task, heaps.next().unwrap_or_default())
        })?;
        let lists: Vec<&[PriorEntry]> = keeper.subtasks().iter().map(|s| s.top()).collect();
        let top = merge_top(&lists, k);
        log::debug!("Listed {} of top {k} targets", top.len());
        Ok(top)
    }

    fn check_quiz(&self, quiz: &Quiz) -> PqaResult<()> {
        if quiz.n_targets() != self.kb.n_targets() {
            return Err(PqaError::Validation(format!(
                "quiz has {} targets, knowledge base has {}",
                quiz.n_targets(),
                self.kb.n_targets()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::InMemoryKnowledge;
    use pqa_types::FlushPolicy;

    fn config(workers: usize, cache_block_vects: usize) -> PqaConfig {
        PqaConfig {
            worker_count: workers,
            cache_block_vects,
            flush_policy: FlushPolicy::WriteBack,
            ..PqaConfig::default()
        }
    }

    /// Dyadic coefficients so every product is exact.
    fn dyadic_kb(n_targets: usize) -> Arc<InMemoryKnowledge> {
        let ratios = [0.75, 0.5, 0.625, 0.875, 0.25];
        Arc::new(
            InMemoryKnowledge::from_fn(
                4,
                3,
                n_targets,
                |q, a, t| ratios[(q + 2 * a + t) % ratios.len()],
                |q, t| if (q + t) % 2 == 0 { 1.0 } else { 0.5 },
                |t| 1.0 + (t % 8) as f64 / 8.0,
            )
            .unwrap(),
        )
    }

    fn expected_prior(kb: &InMemoryKnowledge, answers: &[(PqaId, PqaId)], t: PqaId) -> f64 {
        answers
            .iter()
            .fold(kb.get_b(t), |p, &(q, a)| p * kb.get_a(q, a, t) / kb.get_d(q, t))
    }

    #[test]
    fn test_invalid_config_rejected() {
        let kb = dyadic_kb(8);
        assert!(matches!(
            CpuEngine::new(kb, config(2, 7)),
            Err(PqaError::Config(_))
        ));
    }

    #[test]
    fn test_start_quiz_resets_to_baseline() {
        let kb = dyadic_kb(37);
        for (workers, block) in [(1, 0), (3, 2), (4, 8192), (8, 4)] {
            let engine = CpuEngine::new(Arc::clone(&kb), config(workers, block)).unwrap();
            assert_eq!(engine.worker_count(), workers);
            let quiz = engine.start_quiz().unwrap();
            for t in 0..37 {
                assert_eq!(quiz.prior(t).to_f64(), kb.get_b(t), "target {t}");
            }
        }
    }

    #[test]
    fn test_record_answer_matches_direct_product() {
        let kb = dyadic_kb(50);
        let answers = [(0, 1), (3, 2), (1, 0), (2, 2)];
        for (workers, block) in [(1, 0), (2, 2), (5, 4), (7, 8192)] {
            let engine = CpuEngine::new(Arc::clone(&kb), config(workers, block)).unwrap();
            let mut quiz = engine.start_quiz().unwrap();
            for &(q, a) in &answers {
                engine.record_answer(&mut quiz, q, a).unwrap();
            }
            assert_eq!(quiz.n_answered(), answers.len());
            for t in 0..50 {
                assert_eq!(quiz.prior(t).to_f64(), expected_prior(&kb, &answers, t));
            }
        }
    }

    /// Coefficients with long binary expansions, so rounding shows.
    fn inexact_kb(n_targets: usize) -> Arc<InMemoryKnowledge> {
        Arc::new(
            InMemoryKnowledge::from_fn(
                4,
                3,
                n_targets,
                |q, a, t| 0.07 + ((q * 7 + a * 3 + t) % 13) as f64 * 0.061,
                |q, t| 0.3 + ((q * 5 + t) % 9) as f64 * 0.097,
                |t| 0.011 + (t % 17) as f64 * 0.0093,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_answer_order_is_bit_identical() {
        let kb = inexact_kb(64);
        let engine = CpuEngine::new(kb, config(3, 2)).unwrap();
        let answers = [(0, 0), (1, 2), (2, 1), (3, 0)];
        let mut forward = engine.start_quiz().unwrap();
        for &(q, a) in &answers {
            engine.record_answer(&mut forward, q, a).unwrap();
        }
        for order in [[3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2]] {
            let mut permuted = engine.start_quiz().unwrap();
            for i in order {
                let (q, a) = answers[i];
                engine.record_answer(&mut permuted, q, a).unwrap();
            }
            for t in 0..64 {
                let (fm, fe) = forward.priors().raw(t);
                let (pm, pe) = permuted.priors().raw(t);
                assert_eq!(
                    (fm.to_bits(), fe),
                    (pm.to_bits(), pe),
                    "target {t}, order {order:?}"
                );
            }
        }
    }

    #[test]
    fn test_huge_likelihood_ratio_is_exact_in_extended_range() {
        let kb = Arc::new(
            InMemoryKnowledge::from_fn(
                1,
                1,
                2,
                |_, _, t| if t == 0 { 1e300 } else { 1e200 },
                |_, _| 1e-100,
                |_| 1.0,
            )
            .unwrap(),
        );
        let engine = CpuEngine::new(kb, config(2, 0)).unwrap();
        let mut quiz = engine.start_quiz().unwrap();
        engine.record_answer(&mut quiz, 0, 0).unwrap();
        let log10_2 = 2f64.log10();
        assert!((quiz.prior(0).log2() * log10_2 - 400.0).abs() < 1e-9);
        assert!((quiz.prior(1).log2() * log10_2 - 300.0).abs() < 1e-9);

        engine.normalize_priors(&mut quiz).unwrap();
        assert_eq!(quiz.probability(0), 1.0);
        assert!((quiz.probability(1) / 1e-100 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_chain_does_not_underflow() {
        let kb = Arc::new(
            InMemoryKnowledge::from_fn(1, 1, 6, |_, _, _| 1e-20, |_, _| 1.0, |_| 1.0).unwrap(),
        );
        let engine = CpuEngine::new(kb, config(2, 4)).unwrap();
        let mut quiz = engine.start_quiz().unwrap();
        for _ in 0..10_000 {
            quiz.push_answer(AnsweredQuestion::new(0, 0));
        }
        engine.update_priors(&mut quiz).unwrap();
        let expected_log2 = 10_000.0 * 1e-20_f64.log2();
        for t in 0..6 {
            let prior = quiz.prior(t);
            assert!(!prior.is_zero());
            assert_eq!(prior.to_f64(), 0.0);
            assert!((prior.log2() - expected_log2).abs() < 1e-6 * expected_log2.abs());
        }
    }

    #[test]
    fn test_normalize_sums_to_one() {
        let kb = dyadic_kb(41);
        let engine = CpuEngine::new(kb, config(4, 2)).unwrap();
        let mut quiz = engine.start_quiz().unwrap();
        engine.record_answer(&mut quiz, 2, 1).unwrap();
        engine.record_answer(&mut quiz, 0, 2).unwrap();
        engine.normalize_priors(&mut quiz).unwrap();
        let total: f64 = (0..41).map(|t| quiz.probability(t)).sum();
        assert!((total - 1.0).abs() < 1e-12, "sum {total}");
        assert!(quiz.priors().iter().all(|p| p.is_zero() || p.to_f64() <= 1.0));
        assert!(quiz.priors().exps().iter().all(|e| e.to_array() == [0; 4]));
    }

    #[test]
    fn test_normalize_after_underflow_keeps_ratios() {
        let kb = Arc::new(
            InMemoryKnowledge::from_fn(
                1,
                1,
                2,
                |_, _, t| if t == 0 { 1e-20 } else { 2e-20 },
                |_, _| 1.0,
                |_| 1.0,
            )
            .unwrap(),
        );
        let engine = CpuEngine::new(kb, config(2, 0)).unwrap();
        let mut quiz = engine.start_quiz().unwrap();
        for _ in 0..100 {
            quiz.push_answer(AnsweredQuestion::new(0, 0));
        }
        engine.update_priors(&mut quiz).unwrap();
        engine.normalize_priors(&mut quiz).unwrap();
        // Target 1 is 2^100 times more likely.
        assert_eq!(quiz.probability(1), 1.0);
        assert!(quiz.probability(0) < 1e-29);
    }

    #[test]
    fn test_normalize_all_zero_is_numerical_error() {
        let kb = Arc::new(
            InMemoryKnowledge::from_fn(1, 2, 5, |_, _, _| 0.5, |_, _| 1.0, |_| 0.0).unwrap(),
        );
        let engine = CpuEngine::new(kb, config(2, 0)).unwrap();
        let mut quiz = engine.start_quiz().unwrap();
        assert!(matches!(
            engine.normalize_priors(&mut quiz),
            Err(PqaError::Numerical(_))
        ));
    }

    #[test]
    fn test_heapify_one_heap_per_worker() {
        let kb = dyadic_kb(23);
        let engine = CpuEngine::new(kb, config(3, 0)).unwrap();
        let mut quiz = engine.start_quiz().unwrap();
        engine.record_answer(&mut quiz, 1, 1).unwrap();
        let heaps = engine.heapify_priors(&quiz).unwrap();
        assert_eq!(heaps.len(), 3);
        assert_eq!(heaps.iter().map(|h| h.len()).sum::<usize>(), 23);
        for heap in &heaps {
            if let Some(root) = heap.peek() {
                assert!(heap.iter().all(|e| e <= root));
                assert_eq!(root.prior, quiz.prior(root.target));
            }
        }
    }

    #[test]
    fn test_top_targets_match_brute_force() {
        let kb = dyadic_kb(97);
        let answers = [(0, 2), (2, 0), (3, 1)];
        for workers in [1, 2, 5, 16] {
            let engine = CpuEngine::new(Arc::clone(&kb), config(workers, 4)).unwrap();
            let mut quiz = engine.start_quiz().unwrap();
            for &(q, a) in &answers {
                engine.record_answer(&mut quiz, q, a).unwrap();
            }
            let mut brute: Vec<(f64, PqaId)> = (0..97)
                .map(|t| (expected_prior(&kb, &answers, t), t))
                .collect();
            brute.sort_by(|x, y| y.0.total_cmp(&x.0).then(x.1.cmp(&y.1)));

            let top = engine.list_top_targets(&mut quiz, 10).unwrap();
            let ids: Vec<_> = top.iter().map(|r| r.target).collect();
            let brute_ids: Vec<_> = brute.iter().take(10).map(|&(_, t)| t).collect();
            assert_eq!(ids, brute_ids, "workers {workers}");
            assert!(top.windows(2).all(|w| w[0].probability >= w[1].probability));
        }
    }

    #[test]
    fn test_top_targets_k_larger_than_targets() {
        let kb = dyadic_kb(3);
        let engine = CpuEngine::new(kb, config(4, 0)).unwrap();
        let mut quiz = engine.start_quiz().unwrap();
        let top = engine.list_top_targets(&mut quiz, 10).unwrap();
        assert_eq!(top.len(), 3);
        let total: f64 = top.iter().map(|r| r.probability).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(engine.list_top_targets(&mut quiz, 0).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_answer_ids_rejected() {
        let kb = dyadic_kb(8);
        let engine = CpuEngine::new(kb, config(2, 0)).unwrap();
        let mut quiz = engine.start_quiz().unwrap();
        assert!(matches!(
            engine.record_answer(&mut quiz, 4, 0),
            Err(PqaError::Validation(_))
        ));
        assert!(matches!(
            engine.record_answer(&mut quiz, 0, 3),
            Err(PqaError::Validation(_))
        ));
        assert_eq!(quiz.n_answered(), 0);
    }

    #[test]
    fn test_quiz_from_other_engine_rejected() {
        let small = CpuEngine::new(dyadic_kb(4), config(1, 0)).unwrap();
        let large = CpuEngine::new(dyadic_kb(9), config(1, 0)).unwrap();
        let mut quiz = small.start_quiz().unwrap();
        assert!(matches!(
            large.update_priors(&mut quiz),
            Err(PqaError::Validation(_))
        ));
    }
}
