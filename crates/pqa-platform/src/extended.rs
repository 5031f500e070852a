// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Extended-Range Numbers
// ─────────────────────────────────────────────────────────────────────
//! Positive reals stored as `mantissa * 2^exponent` with a 64-bit
//! exponent, as a scalar (`ExtendedF64`) and as index-aligned lane
//! buffers over a target space (`ExtendedRangeVector`).

use std::cmp::Ordering;

use crate::simd::{self, f64x4, i64x4, LANES};

/// Scalar extended-range value with a canonical mantissa in `[1, 2)`,
/// or zero.
///
/// Ordered by true magnitude: exponent first, mantissa on ties.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedF64 {
    mant: f64,
    exp: i64,
}

impl ExtendedF64 {
    pub const ZERO: Self = Self { mant: 0.0, exp: 0 };
    pub const ONE: Self = Self { mant: 1.0, exp: 0 };

    /// Canonicalise `mant * 2^exp`. `mant` must be finite and non-negative.
    pub fn new(mant: f64, exp: i64) -> Self {
        debug_assert!(mant.is_finite() && mant >= 0.0, "bad mantissa {mant}");
        let (mant, shift) = simd::split_scalar(mant);
        if mant == 0.0 {
            return Self::ZERO;
        }
        Self {
            mant,
            exp: exp + shift,
        }
    }

    pub fn from_f64(value: f64) -> Self {
        Self::new(value, 0)
    }

    pub fn mantissa(&self) -> f64 {
        self.mant
    }

    pub fn exponent(&self) -> i64 {
        self.exp
    }

    pub fn is_zero(&self) -> bool {
        self.mant == 0.0
    }

    /// Multiply by a plain factor; exponents add, nothing underflows.
    pub fn mul_f64(self, factor: f64) -> Self {
        let (mant, shift) = simd::split_scalar(self.mant * factor);
        if mant == 0.0 {
            return Self::ZERO;
        }
        Self {
            mant,
            exp: self.exp + shift,
        }
    }

    /// Nearest double; 0 or infinity when out of range.
    pub fn to_f64(self) -> f64 {
        simd::ldexp(self.mant, self.exp)
    }

    /// Base-2 logarithm of the magnitude, `-inf` for zero.
    pub fn log2(self) -> f64 {
        if self.is_zero() {
            return f64::NEG_INFINITY;
        }
        self.exp as f64 + self.mant.log2()
    }
}

impl PartialEq for ExtendedF64 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ExtendedF64 {}

impl PartialOrd for ExtendedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExtendedF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_zero(), other.is_zero()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .exp
                .cmp(&other.exp)
                .then_with(|| self.mant.total_cmp(&other.mant)),
        }
    }
}

/// Mantissa and exponent lane buffers over `n_items` values.
///
/// Both buffers always hold `ceil(n_items / 4)` vectors. Padding lanes
/// past `n_items` are kept at zero by whoever writes them.
#[derive(Debug, Clone)]
pub struct ExtendedRangeVector {
    mants: Vec<f64x4>,
    exps: Vec<i64x4>,
    n_items: usize,
}

impl ExtendedRangeVector {
    /// All values zero.
    pub fn new(n_items: usize) -> Self {
        let n_vects = simd::vects_for(n_items);
        Self {
            mants: vec![f64x4::splat(0.0); n_vects],
            exps: vec![simd::zero_exps(); n_vects],
            n_items,
        }
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn n_vects(&self) -> usize {
        self.mants.len()
    }

    pub fn mants(&self) -> &[f64x4] {
        &self.mants
    }

    pub fn exps(&self) -> &[i64x4] {
        &self.exps
    }

    /// Both buffers mutably, index-aligned.
    pub fn lanes_mut(&mut self) -> (&mut [f64x4], &mut [i64x4]) {
        (&mut self.mants, &mut self.exps)
    }

    /// Raw stored pair of item `index`, without canonicalisation.
    pub fn raw(&self, index: usize) -> (f64, i64) {
        assert!(index < self.n_items, "item {index} out of {}", self.n_items);
        let (v, lane) = (index / LANES, index % LANES);
        (self.mants[v].to_array()[lane], self.exps[v].to_array()[lane])
    }

    pub fn get(&self, index: usize) -> ExtendedF64 {
        let (mant, exp) = self.raw(index);
        ExtendedF64::new(mant, exp)
    }

    pub fn set(&mut self, index: usize, value: ExtendedF64) {
        assert!(index < self.n_items, "item {index} out of {}", self.n_items);
        let (v, lane) = (index / LANES, index % LANES);
        let mut mants = self.mants[v].to_array();
        let mut exps = self.exps[v].to_array();
        mants[lane] = value.mantissa();
        exps[lane] = value.exponent();
        self.mants[v] = f64x4::new(mants);
        self.exps[v] = i64x4::new(exps);
    }

    /// `mantissa * 2^exponent` of item `index` as a double.
    pub fn magnitude(&self, index: usize) -> f64 {
        self.get(index).to_f64()
    }

    pub fn iter(&self) -> impl Iterator<Item = ExtendedF64> + '_ {
        (0..self.n_items).map(move |i| self.get(i))
    }
}
