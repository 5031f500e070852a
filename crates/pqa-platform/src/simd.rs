// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Lane Arithmetic
// ─────────────────────────────────────────────────────────────────────
//! Mantissa/exponent split of 4-lane double vectors.
//!
//! A positive value is kept as `mantissa * 2^exponent` with the mantissa
//! rescaled to exponent 0, i.e. into `[1, 2)`, after every multiply and
//! the exponent held in a separate 64-bit lane. Multiplying values then
//! adds exponents, so a chain of any length never underflows.

pub use wide::{f64x4, i64x4};

/// Doubles per vector.
pub const LANES: usize = 4;
/// Bytes per vector.
pub const VECT_BYTES: usize = 32;

const EXP_MASK: u64 = 0x7FF0_0000_0000_0000;
const MANT_BITS: u32 = 52;
const EXP_BIAS: i64 = 1023;
// Scale bringing any subnormal into the normal range.
const SUBNORMAL_SHIFT: i32 = 64;

/// Number of vectors covering `n_items` doubles.
pub fn vects_for(n_items: usize) -> usize {
    n_items.div_ceil(LANES)
}

/// All-zero exponent vector.
pub fn zero_exps() -> i64x4 {
    i64x4::new([0; LANES])
}

/// Item `index` of a lane buffer viewed as a flat array of doubles.
pub fn lane_item(lanes: &[f64x4], index: usize) -> f64 {
    lanes[index / LANES].to_array()[index % LANES]
}

/// Split a non-negative value into a mantissa in `[1, 2)` and its binary
/// exponent. Zero maps to `(0.0, 0)`.
///
/// Infinity and NaN come back unchanged with exponent 0, never as a
/// finite mantissa, so callers can detect them.
pub fn split_scalar(value: f64) -> (f64, i64) {
    if value == 0.0 {
        return (0.0, 0);
    }
    let bits = value.to_bits();
    if bits & EXP_MASK == EXP_MASK {
        return (value, 0);
    }
    let biased = ((bits & EXP_MASK) >> MANT_BITS) as i64;
    if biased == 0 {
        let (mant, exp) = split_scalar(value * 2f64.powi(SUBNORMAL_SHIFT));
        return (mant, exp - SUBNORMAL_SHIFT as i64);
    }
    let mant = f64::from_bits((bits & !EXP_MASK) | ((EXP_BIAS as u64) << MANT_BITS));
    (mant, biased - EXP_BIAS)
}

/// `mant * 2^exp`, saturating to 0 or infinity outside the double range.
pub fn ldexp(mant: f64, exp: i64) -> f64 {
    if mant == 0.0 {
        return 0.0;
    }
    let exp = exp.clamp(-2200, 2200) as i32;
    let half = exp / 2;
    // Two factors so that neither power of two leaves the double range.
    mant * 2f64.powi(half) * 2f64.powi(exp - half)
}

/// Rescale every lane to exponent 0.
pub fn make_exponent0(v: f64x4) -> f64x4 {
    split_lanes(v).0
}

/// Binary exponent of every lane.
pub fn extract_exponents(v: f64x4) -> i64x4 {
    split_lanes(v).1
}

/// Mantissas at exponent 0 together with the extracted exponents.
#[inline]
pub fn split_lanes(v: f64x4) -> (f64x4, i64x4) {
    let values = v.to_array();
    let mut mants = [0.0; LANES];
    let mut exps = [0_i64; LANES];
    for ((value, mant), exp) in values.iter().zip(mants.iter_mut()).zip(exps.iter_mut()) {
        (*mant, *exp) = split_scalar(*value);
    }
    (f64x4::new(mants), i64x4::new(exps))
}

/// Horizontal sum of the lanes.
pub fn sum_lanes(v: f64x4) -> f64 {
    v.to_array().iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vects_for() {
        assert_eq!(vects_for(0), 0);
        assert_eq!(vects_for(1), 1);
        assert_eq!(vects_for(4), 1);
        assert_eq!(vects_for(9), 3);
    }

    #[test]
    fn test_split_scalar_normal() {
        assert_eq!(split_scalar(1.0), (1.0, 0));
        assert_eq!(split_scalar(0.375), (1.5, -2));
        assert_eq!(split_scalar(12.0), (1.5, 3));
    }

    #[test]
    fn test_split_scalar_zero() {
        assert_eq!(split_scalar(0.0), (0.0, 0));
    }

    #[test]
    fn test_split_scalar_subnormal() {
        let tiny = f64::from_bits(1); // 2^-1074
        assert_eq!(split_scalar(tiny), (1.0, -1074));
        let (mant, exp) = split_scalar(3.0 * tiny);
        assert_eq!((mant, exp), (1.5, -1073));
    }

    #[test]
    fn test_split_scalar_non_finite_passes_through() {
        assert_eq!(split_scalar(f64::INFINITY), (f64::INFINITY, 0));
        let (mant, exp) = split_scalar(f64::NAN);
        assert!(mant.is_nan());
        assert_eq!(exp, 0);
        let (mants, _) = split_lanes(f64x4::new([f64::INFINITY, 1.0, 2.0, 3.0]));
        assert!(mants.to_array()[0].is_infinite());
    }

    #[test]
    fn test_ldexp_inverts_split() {
        for v in [1e-300, 0.1, 0.75, 3.0, 1e300] {
            let (mant, exp) = split_scalar(v);
            assert_eq!(ldexp(mant, exp), v);
        }
        assert_eq!(ldexp(1.0, -5000), 0.0);
        assert_eq!(ldexp(1.0, 5000), f64::INFINITY);
        assert_eq!(ldexp(0.0, 5000), 0.0);
    }

    #[test]
    fn test_split_lanes() {
        let v = f64x4::new([1.0, 0.25, 6.0, 0.0]);
        let (mants, exps) = split_lanes(v);
        assert_eq!(mants.to_array(), [1.0, 1.0, 1.5, 0.0]);
        assert_eq!(exps.to_array(), [0, -2, 2, 0]);
        assert_eq!(make_exponent0(v).to_array(), mants.to_array());
        assert_eq!(extract_exponents(v).to_array(), exps.to_array());
    }

    #[test]
    fn test_lane_item_and_sum() {
        let lanes = [f64x4::new([1.0, 2.0, 3.0, 4.0]), f64x4::new([5.0, 6.0, 7.0, 8.0])];
        assert_eq!(lane_item(&lanes, 5), 6.0);
        assert_eq!(sum_lanes(lanes[1]), 26.0);
    }
}
