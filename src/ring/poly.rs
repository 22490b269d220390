use std::fmt;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{Signed, Zero};

use crate::error::{HeError, Result};
use crate::ring::modular::{barrett_constant, mod_add, mod_mul, mod_neg, mod_sub};

/// Residue polynomial in coefficient representation over Z_q[X]/(X^n + 1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoeffPoly {
    pub coeffs: Vec<u64>,
    pub modulus: u64,
}

impl CoeffPoly {
    pub fn zero(n: usize, modulus: u64) -> Self {
        Self { coeffs: vec![0u64; n], modulus }
    }

    /// Create a polynomial from coefficients (reduced mod q).
    pub fn from_coeffs(coeffs: Vec<u64>, modulus: u64) -> Self {
        let mut p = Self { coeffs, modulus };
        p.reduce();
        p
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn reduce(&mut self) {
        for c in self.coeffs.iter_mut() {
            *c %= self.modulus;
        }
    }

    /// Schoolbook multiply in Z_q[X]/(X^n+1). Reference implementation for tests.
    pub fn mul_naive(&self, other: &Self) -> Result<Self> {
        if self.len() != other.len() {
            return Err(HeError::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        if self.modulus != other.modulus {
            return Err(HeError::ModulusMismatch);
        }
        let n = self.len();
        let bk = barrett_constant(self.modulus);
        let mut result = vec![0u64; n];
        for i in 0..n {
            if self.coeffs[i] == 0 {
                continue;
            }
            for j in 0..n {
                let prod = mod_mul(self.coeffs[i], other.coeffs[j], self.modulus, bk);
                let idx = i + j;
                if idx < n {
                    result[idx] = mod_add(result[idx], prod, self.modulus);
                } else {
                    // X^n ≡ -1
                    result[idx - n] = mod_sub(result[idx - n], prod, self.modulus);
                }
            }
        }
        Ok(Self { coeffs: result, modulus: self.modulus })
    }

    /// Apply X -> X^k in Z_q[X]/(X^n+1), k odd.
    ///
    /// Coefficient i moves to i·k mod 2n; exponents in [n, 2n) wrap with a sign flip.
    pub fn automorph(&self, k: usize) -> Self {
        let n = self.len();
        let two_n = 2 * n;
        let mut coeffs = vec![0u64; n];
        for (i, &c) in self.coeffs.iter().enumerate() {
            let e = (i * k) % two_n;
            if e < n {
                coeffs[e] = c;
            } else {
                coeffs[e - n] = mod_neg(c, self.modulus);
            }
        }
        Self { coeffs, modulus: self.modulus }
    }
}

/// Integer polynomial in Z[X]/(X^n+1) with arbitrary-precision coefficients.
///
/// Plaintexts and plaintext constants travel through the API in this form; the
/// plaintext modulus is applied by [`IntPoly::reduce_mod`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntPoly {
    pub coeffs: Vec<BigInt>,
}

impl IntPoly {
    pub fn zero(n: usize) -> Self {
        Self { coeffs: vec![BigInt::zero(); n] }
    }

    /// The constant polynomial `c`.
    pub fn constant(n: usize, c: impl Into<BigInt>) -> Self {
        let mut p = Self::zero(n);
        if n > 0 {
            p.coeffs[0] = c.into();
        }
        p
    }

    pub fn from_i64s(values: &[i64], n: usize) -> Self {
        let mut p = Self::zero(n);
        for (dst, &v) in p.coeffs.iter_mut().zip(values) {
            *dst = BigInt::from(v);
        }
        p
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_zero())
    }

    /// Largest absolute coefficient.
    pub fn max_abs(&self) -> BigInt {
        self.coeffs.iter().map(|c| c.abs()).max().unwrap_or_default()
    }

    /// Coefficients reduced into [0, t).
    pub fn reduce_mod(&self, t: &BigUint) -> Self {
        let t = BigInt::from(t.clone());
        Self { coeffs: self.coeffs.iter().map(|c| c.mod_floor(&t)).collect() }
    }

    /// Apply X -> X^k, sign-flipping the wrapped exponents.
    pub fn automorph(&self, k: usize) -> Self {
        let n = self.len();
        let two_n = 2 * n;
        let mut coeffs = vec![BigInt::zero(); n];
        for (i, c) in self.coeffs.iter().enumerate() {
            let e = (i * k) % two_n;
            if e < n {
                coeffs[e] = c.clone();
            } else {
                coeffs[e - n] = -c;
            }
        }
        Self { coeffs }
    }

    /// Negacyclic product, schoolbook. Used for small reference computations.
    pub fn mul_naive(&self, other: &Self) -> Self {
        let n = self.len();
        let mut coeffs = vec![BigInt::zero(); n];
        for (i, a) in self.coeffs.iter().enumerate() {
            if a.is_zero() {
                continue;
            }
            for (j, b) in other.coeffs.iter().enumerate().take(n) {
                let prod = a * b;
                if i + j < n {
                    coeffs[i + j] += prod;
                } else {
                    coeffs[i + j - n] -= prod;
                }
            }
        }
        Self { coeffs }
    }
}

impl fmt::Display for IntPoly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.coeffs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_naive_wraparound() {
        // X^3 * X^3 = X^6 = -X^2 in Z_17[X]/(X^4+1)
        let a = CoeffPoly::from_coeffs(vec![0, 0, 0, 1], 17);
        let c = a.mul_naive(&a).unwrap();
        assert_eq!(c.coeffs, vec![0, 0, 16, 0]);
    }

    #[test]
    fn test_coeff_automorph_signed_permutation() {
        // n=4, k=3: X -> X^3, X^2 -> X^6 = -X^2, X^3 -> X^9 = X
        let a = CoeffPoly::from_coeffs(vec![1, 2, 3, 4], 17);
        let b = a.automorph(3);
        assert_eq!(b.coeffs, vec![1, 4, 17 - 3, 2]);
        // k = 2n-1 composed with itself is the identity
        assert_eq!(a.automorph(7).automorph(7), a);
    }

    #[test]
    fn test_int_poly_automorph_matches_coeff_poly() {
        let p = IntPoly::from_i64s(&[5, -1, 0, 2], 4);
        let q = CoeffPoly::from_coeffs(vec![5, 16, 0, 2], 17);
        let lhs = p.automorph(5).reduce_mod(&BigUint::from(17u32));
        let rhs = q.automorph(5);
        let rhs: Vec<BigInt> = rhs.coeffs.into_iter().map(BigInt::from).collect();
        assert_eq!(lhs.coeffs, rhs);
    }

    #[test]
    fn test_int_poly_helpers() {
        let p = IntPoly::from_i64s(&[3, -7], 4);
        assert_eq!(p.max_abs(), BigInt::from(7));
        assert_eq!(p.reduce_mod(&BigUint::from(5u32)).coeffs[1], BigInt::from(3));
        assert!(IntPoly::zero(4).is_zero());
        let x = IntPoly::from_i64s(&[0, 0, 0, 1], 4);
        assert_eq!(x.mul_naive(&x).coeffs, IntPoly::from_i64s(&[0, 0, -1, 0], 4).coeffs);
        assert_eq!(format!("{}", IntPoly::constant(2, 4)), "[4 0]");
    }
}
