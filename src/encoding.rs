use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::Zero;

use crate::error::{HeError, Result};
use crate::params::RingContext;
use crate::ring::IntPoly;

/// Encode a scalar as the constant polynomial m.
pub fn encode_scalar(m: &BigUint, ctx: &RingContext) -> Result<IntPoly> {
    if m >= ctx.ptxt_space() {
        return Err(HeError::InvalidParam(format!(
            "plaintext {m} >= plaintext space {}",
            ctx.ptxt_space()
        )));
    }
    Ok(IntPoly::constant(ctx.ring_degree(), BigInt::from(m.clone())))
}

/// Decode a scalar from a plaintext polynomial (read coefficient 0).
pub fn decode_scalar(poly: &IntPoly, t: &BigUint) -> BigUint {
    poly.coeffs
        .first()
        .map(|c| reduce(c, t))
        .unwrap_or_default()
}

/// Place `values` in the low coefficients; the rest are zero.
pub fn encode_coeffs(values: &[u64], ctx: &RingContext) -> Result<IntPoly> {
    let n = ctx.ring_degree();
    if values.len() > n {
        return Err(HeError::DimensionMismatch { expected: n, got: values.len() });
    }
    let t = ctx.ptxt_space();
    if let Some(&v) = values.iter().find(|&&v| BigUint::from(v) >= *t) {
        return Err(HeError::InvalidParam(format!("plaintext {v} >= plaintext space {t}")));
    }
    let mut poly = IntPoly::zero(n);
    for (dst, &v) in poly.coeffs.iter_mut().zip(values) {
        *dst = BigInt::from(v);
    }
    Ok(poly)
}

/// The first `count` coefficients reduced into [0, t).
pub fn decode_coeffs(poly: &IntPoly, t: &BigUint, count: usize) -> Vec<BigUint> {
    poly.coeffs
        .iter()
        .chain(std::iter::repeat(&BigInt::zero()))
        .take(count)
        .map(|c| reduce(c, t))
        .collect()
}

fn reduce(c: &BigInt, t: &BigUint) -> BigUint {
    let t = BigInt::from(t.clone());
    c.mod_floor(&t).magnitude().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::presets::compact_bgv;

    #[test]
    fn test_encode_decode_scalar() {
        let ctx = compact_bgv(257).unwrap();
        let pt = encode_scalar(&BigUint::from(42u32), &ctx).unwrap();
        assert_eq!(decode_scalar(&pt, ctx.ptxt_space()), BigUint::from(42u32));
        assert!(encode_scalar(&BigUint::from(300u32), &ctx).is_err());
    }

    #[test]
    fn test_encode_coeffs() {
        let ctx = compact_bgv(257).unwrap();
        let values = vec![1, 2, 3, 4, 5];
        let pt = encode_coeffs(&values, &ctx).unwrap();
        let decoded = decode_coeffs(&pt, ctx.ptxt_space(), 6);
        let expected: Vec<BigUint> = [1u32, 2, 3, 4, 5, 0].iter().map(|&v| BigUint::from(v)).collect();
        assert_eq!(decoded, expected);
        assert!(encode_coeffs(&vec![0; 33], &ctx).is_err());
    }

    #[test]
    fn test_negative_coefficients_decode_mod_t() {
        let pt = IntPoly::from_i64s(&[-1, 9], 4);
        let t = BigUint::from(7u32);
        assert_eq!(decode_coeffs(&pt, &t, 2), vec![BigUint::from(6u32), BigUint::from(2u32)]);
    }
}
