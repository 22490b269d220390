use std::sync::Arc;
use concrete_ntt::prime64::Plan;

use crate::error::{HeError, Result};
use crate::ring::modular::{barrett_constant, mod_add, mod_mul, mod_neg, mod_sub};
use crate::ring::poly::CoeffPoly;

/// Residue polynomial in NTT (evaluation) representation over Z_q[X]/(X^n + 1).
///
/// Uses `concrete-ntt` for the negacyclic transform, so pointwise products are
/// ring products.
#[derive(Clone, Debug)]
pub struct NttPoly {
    pub evals: Vec<u64>,
    pub modulus: u64,
    pub plan: Arc<Plan>,
}

/// Build an NTT plan for ring degree `n` and prime `modulus`.
pub fn make_plan(n: usize, modulus: u64) -> Result<Arc<Plan>> {
    if !n.is_power_of_two() || n < 16 {
        return Err(HeError::InvalidRingDegree(n));
    }
    // concrete-ntt requires modulus to be prime and ≡ 1 (mod 2n)
    let plan = Plan::try_new(n, modulus).ok_or_else(|| {
        HeError::InvalidParam(format!(
            "cannot create NTT plan for n={n}, q={modulus} (need prime q ≡ 1 mod {})",
            2 * n
        ))
    })?;
    Ok(Arc::new(plan))
}

impl NttPoly {
    pub fn zero(n: usize, plan: Arc<Plan>) -> Self {
        Self { evals: vec![0u64; n], modulus: plan.modulus(), plan }
    }

    /// Forward NTT: convert from coefficient to evaluation representation.
    pub fn from_coeff_poly(poly: &CoeffPoly, plan: Arc<Plan>) -> Result<Self> {
        if poly.modulus != plan.modulus() {
            return Err(HeError::ModulusMismatch);
        }
        let mut evals = poly.coeffs.clone();
        plan.fwd(&mut evals);
        let mut out = Self { evals, modulus: poly.modulus, plan };
        out.reduce();
        Ok(out)
    }

    /// Inverse NTT: convert back to coefficient representation.
    pub fn to_coeff_poly(&self) -> CoeffPoly {
        let mut coeffs = self.evals.clone();
        self.plan.inv(&mut coeffs);
        self.plan.normalize(&mut coeffs);
        CoeffPoly::from_coeffs(coeffs, self.modulus)
    }

    pub fn len(&self) -> usize {
        self.evals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evals.is_empty()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.modulus != other.modulus {
            return Err(HeError::ModulusMismatch);
        }
        if self.len() != other.len() {
            return Err(HeError::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        Ok(())
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        let q = self.modulus;
        for (a, &b) in self.evals.iter_mut().zip(&other.evals) {
            *a = mod_add(*a, b, q);
        }
        Ok(())
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        let q = self.modulus;
        for (a, &b) in self.evals.iter_mut().zip(&other.evals) {
            *a = mod_sub(*a, b, q);
        }
        Ok(())
    }

    pub fn neg_assign(&mut self) {
        let q = self.modulus;
        for a in self.evals.iter_mut() {
            *a = mod_neg(*a, q);
        }
    }

    /// Pointwise product (= negacyclic polynomial product).
    pub fn mul_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let bk = barrett_constant(q);
        for (a, &b) in self.evals.iter_mut().zip(&other.evals) {
            *a = mod_mul(*a, b, q, bk);
        }
        Ok(())
    }

    pub fn scalar_mul_assign(&mut self, scalar: u64) {
        let q = self.modulus;
        let s = scalar % q;
        let bk = barrett_constant(q);
        for a in self.evals.iter_mut() {
            *a = mod_mul(*a, s, q, bk);
        }
    }

    /// X -> X^k, computed through the coefficient domain.
    pub fn automorph(&self, k: usize) -> Result<Self> {
        let coeffs = self.to_coeff_poly().automorph(k);
        Self::from_coeff_poly(&coeffs, self.plan.clone())
    }

    pub fn is_zero(&self) -> bool {
        self.evals.iter().all(|&e| e == 0)
    }

    /// Bring every evaluation into [0, q).
    pub fn reduce(&mut self) {
        let q = self.modulus;
        for e in self.evals.iter_mut() {
            if *e >= q {
                *e %= q;
            }
        }
    }
}

impl PartialEq for NttPoly {
    fn eq(&self, other: &Self) -> bool {
        self.modulus == other.modulus && self.evals == other.evals
    }
}
