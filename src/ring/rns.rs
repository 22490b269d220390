use std::collections::BTreeMap;
use std::fmt;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;
use zeroize::Zeroize;

use crate::error::{HeError, Result};
use crate::params::RingContext;
use crate::ring::modular::{
    biguint_mod_u64, bigint_mod_u64, centered_mod, mod_inv, mod_inverse_big,
};
use crate::ring::ntt::NttPoly;
use crate::ring::poly::{CoeffPoly, IntPoly};
use crate::ring::IndexSet;
use crate::sampling::sample_uniform_residues;
use crate::text::Tokens;

/// Polynomial in double-CRT form: one NTT-domain residue per prime index.
///
/// The represented value lives in Z_Q[X]/(X^n+1) where Q is the product of
/// the primes in [`RnsPoly::index_set`]. Primes can be added and removed while
/// the polynomial is alive, which is what modulus switching is built from.
#[derive(Clone, Debug, PartialEq)]
pub struct RnsPoly {
    components: BTreeMap<usize, NttPoly>,
    ring_degree: usize,
}

impl RnsPoly {
    pub fn zero(ctx: &RingContext, set: &IndexSet) -> Self {
        let n = ctx.ring_degree();
        let components = set
            .iter()
            .map(|i| (i, NttPoly::zero(n, ctx.modulus(i).plan.clone())))
            .collect();
        Self { components, ring_degree: n }
    }

    /// Residues of integer coefficients modulo every prime in `set`.
    pub fn from_bigints(coeffs: &[BigInt], ctx: &RingContext, set: &IndexSet) -> Result<Self> {
        let n = ctx.ring_degree();
        if coeffs.len() != n {
            return Err(HeError::DimensionMismatch { expected: n, got: coeffs.len() });
        }
        let mut components = BTreeMap::new();
        for i in set.iter() {
            let modulus = ctx.modulus(i);
            let residues = coeffs.iter().map(|c| bigint_mod_u64(c, modulus.value)).collect();
            let coeff_poly = CoeffPoly::from_coeffs(residues, modulus.value);
            components.insert(i, NttPoly::from_coeff_poly(&coeff_poly, modulus.plan.clone())?);
        }
        Ok(Self { components, ring_degree: n })
    }

    pub fn from_int_poly(poly: &IntPoly, ctx: &RingContext, set: &IndexSet) -> Result<Self> {
        Self::from_bigints(&poly.coeffs, ctx, set)
    }

    pub fn from_small_coeffs(coeffs: &[i64], ctx: &RingContext, set: &IndexSet) -> Result<Self> {
        let n = ctx.ring_degree();
        if coeffs.len() != n {
            return Err(HeError::DimensionMismatch { expected: n, got: coeffs.len() });
        }
        let mut components = BTreeMap::new();
        for i in set.iter() {
            let modulus = ctx.modulus(i);
            let q = modulus.value as i128;
            let residues = coeffs.iter().map(|&c| (c as i128).rem_euclid(q) as u64).collect();
            let coeff_poly = CoeffPoly::from_coeffs(residues, modulus.value);
            components.insert(i, NttPoly::from_coeff_poly(&coeff_poly, modulus.plan.clone())?);
        }
        Ok(Self { components, ring_degree: n })
    }

    /// The constant polynomial `c`.
    pub fn constant(c: &BigInt, ctx: &RingContext, set: &IndexSet) -> Result<Self> {
        let mut coeffs = vec![BigInt::zero(); ctx.ring_degree()];
        coeffs[0] = c.clone();
        Self::from_bigints(&coeffs, ctx, set)
    }

    /// Uniformly random element of R_Q, sampled directly in the evaluation domain.
    ///
    /// Residues are drawn prime by prime in increasing index order, so two
    /// callers that start from the same stream state and the same set obtain
    /// the same polynomial.
    pub fn uniform<R: Rng>(ctx: &RingContext, set: &IndexSet, rng: &mut R) -> Self {
        let n = ctx.ring_degree();
        let components = set
            .iter()
            .map(|i| {
                let modulus = ctx.modulus(i);
                let evals = sample_uniform_residues(n, modulus.value, rng);
                (i, NttPoly { evals, modulus: modulus.value, plan: modulus.plan.clone() })
            })
            .collect();
        Self { components, ring_degree: n }
    }

    pub fn index_set(&self) -> IndexSet {
        self.components.keys().copied().collect()
    }

    pub fn ring_degree(&self) -> usize {
        self.ring_degree
    }

    pub fn component(&self, i: usize) -> Option<&NttPoly> {
        self.components.get(&i)
    }

    pub fn is_zero(&self) -> bool {
        self.components.values().all(NttPoly::is_zero)
    }

    fn check_same_set(&self, other: &Self) -> Result<()> {
        if self.components.len() != other.components.len()
            || !self.components.keys().eq(other.components.keys())
        {
            return Err(HeError::IndexSetMismatch { left: self.index_set(), right: other.index_set() });
        }
        Ok(())
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_same_set(other)?;
        for (i, comp) in self.components.iter_mut() {
            comp.add_assign(&other.components[i])?;
        }
        Ok(())
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.check_same_set(other)?;
        for (i, comp) in self.components.iter_mut() {
            comp.sub_assign(&other.components[i])?;
        }
        Ok(())
    }

    pub fn neg_assign(&mut self) {
        for comp in self.components.values_mut() {
            comp.neg_assign();
        }
    }

    /// Ring product; both operands must share the index set.
    pub fn mul_assign(&mut self, other: &Self) -> Result<()> {
        self.check_same_set(other)?;
        for (i, comp) in self.components.iter_mut() {
            comp.mul_assign(&other.components[i])?;
        }
        Ok(())
    }

    /// Ring product over `self`'s index set; `other` may carry extra primes.
    pub fn mul_assign_restricted(&mut self, other: &Self) -> Result<()> {
        if !self.components.keys().all(|i| other.components.contains_key(i)) {
            return Err(HeError::IndexSetMismatch { left: self.index_set(), right: other.index_set() });
        }
        for (i, comp) in self.components.iter_mut() {
            comp.mul_assign(&other.components[i])?;
        }
        Ok(())
    }

    pub fn scale_by(&mut self, c: &BigUint) {
        for comp in self.components.values_mut() {
            comp.scalar_mul_assign(biguint_mod_u64(c, comp.modulus));
        }
    }

    pub fn scale_by_int(&mut self, c: &BigInt) {
        for comp in self.components.values_mut() {
            comp.scalar_mul_assign(bigint_mod_u64(c, comp.modulus));
        }
    }

    /// Multiply by the product P of the primes in `diff` and append those primes
    /// with zero residues (P·x ≡ 0 mod each of them). Returns ln P.
    pub fn add_primes_and_scale(&mut self, ctx: &RingContext, diff: &IndexSet) -> f64 {
        let fresh = diff.difference(&self.index_set());
        if fresh.is_empty() {
            return 0.0;
        }
        let product = ctx.product_of_primes(&fresh);
        self.scale_by(&product);
        for i in fresh.iter() {
            self.components
                .insert(i, NttPoly::zero(self.ring_degree, ctx.modulus(i).plan.clone()));
        }
        ctx.log_of_product(&fresh)
    }

    /// Exact base extension: append residues of the centred lift for the
    /// primes in `diff`.
    pub fn add_primes(&mut self, ctx: &RingContext, diff: &IndexSet) -> Result<()> {
        let fresh = diff.difference(&self.index_set());
        if fresh.is_empty() {
            return Ok(());
        }
        let lifted = self.to_bigints_centered(ctx);
        let extension = Self::from_bigints(&lifted, ctx, &fresh)?;
        self.components.extend(extension.components);
        Ok(())
    }

    pub fn remove_primes(&mut self, diff: &IndexSet) {
        for i in diff.iter() {
            self.components.remove(&i);
        }
    }

    /// BGV modulus switching from the current set to `self ∩ target`.
    ///
    /// With P the product of the dropped primes, finds δ ≡ x (mod P) with
    /// δ ≡ 0 (mod t) and replaces x by (x - δ)/P, which keeps x/P's residue
    /// mod t up to the factor P^{-1}.
    pub fn scale_down_to_set(
        &mut self,
        ctx: &RingContext,
        target: &IndexSet,
        ptxt_space: &BigUint,
    ) -> Result<()> {
        let current = self.index_set();
        let dropped = current.difference(target);
        if dropped.is_empty() {
            return Ok(());
        }
        let kept = current.intersection(target);
        if kept.is_empty() {
            return Err(HeError::EmptyModDown { from: current, to: target.clone() });
        }

        let product = ctx.product_of_primes(&dropped);
        let product_int = BigInt::from(product.clone());
        let t = BigInt::from(ptxt_space.clone());
        let p_inv_t = if ptxt_space > &BigUint::one() {
            let inv = mod_inverse_big(&product, ptxt_space).ok_or_else(|| {
                HeError::InvalidParam("dropped primes are not invertible mod the plaintext space".into())
            })?;
            Some(BigInt::from(inv))
        } else {
            None
        };

        let mut residue_part = self.clone();
        residue_part.remove_primes(&kept);
        let lifted = residue_part.to_bigints_centered(ctx);
        let delta: Vec<BigInt> = lifted
            .into_iter()
            .map(|c| match &p_inv_t {
                Some(inv) => {
                    let k = centered_mod(&(-(&c * inv)), &t);
                    c + &product_int * k
                }
                None => c,
            })
            .collect();
        let delta = Self::from_bigints(&delta, ctx, &kept)?;

        self.remove_primes(&dropped);
        self.sub_assign(&delta)?;
        for (&i, comp) in self.components.iter_mut() {
            let q = ctx.prime(i);
            let p_mod_q = biguint_mod_u64(&product, q);
            let inv = mod_inv(p_mod_q, q).ok_or(HeError::ModulusMismatch)?;
            comp.scalar_mul_assign(inv);
        }
        Ok(())
    }

    /// X -> X^k on every residue.
    pub fn automorph(&mut self, k: usize) -> Result<()> {
        for comp in self.components.values_mut() {
            *comp = comp.automorph(k)?;
        }
        Ok(())
    }

    /// Mixed-radix split over the first `n_digits` digit moduli of the chain.
    ///
    /// With Q_j the product of digit j, the centred lift x is written as
    /// x = d_0 + Q_0·d_1 + Q_0·Q_1·d_2 + ... where each d_j (j < n_digits - 1) is
    /// centred mod Q_j and the last digit absorbs the remainder exactly. Every
    /// digit is returned over the current set plus the special primes.
    pub fn break_into_digits(&self, ctx: &RingContext, n_digits: usize) -> Result<Vec<RnsPoly>> {
        if n_digits == 0 || n_digits > ctx.digits().len() {
            return Err(HeError::InvalidParam(format!(
                "cannot split into {n_digits} digits (chain has {})",
                ctx.digits().len()
            )));
        }
        let target = self.index_set().union(ctx.special_primes());
        let mut remainder = self.to_bigints_centered(ctx);
        let mut out = Vec::with_capacity(n_digits);
        for j in 0..n_digits {
            if j + 1 == n_digits {
                out.push(Self::from_bigints(&remainder, ctx, &target)?);
                break;
            }
            let qj = BigInt::from(ctx.product_of_primes(&ctx.digits()[j]));
            let digit: Vec<BigInt> = remainder.iter().map(|x| centered_mod(x, &qj)).collect();
            for (r, d) in remainder.iter_mut().zip(&digit) {
                *r = (&*r - d).div_floor(&qj);
            }
            out.push(Self::from_bigints(&digit, ctx, &target)?);
        }
        Ok(out)
    }

    /// Centred CRT reconstruction over the polynomial's own index set.
    pub fn to_bigints_centered(&self, ctx: &RingContext) -> Vec<BigInt> {
        let n = self.ring_degree;
        if self.components.is_empty() {
            return vec![BigInt::zero(); n];
        }
        let set = self.index_set();
        let q_total = ctx.product_of_primes(&set);
        let q_total_int = BigInt::from(q_total.clone());

        let mut acc = vec![BigUint::zero(); n];
        for (&i, comp) in &self.components {
            let q = ctx.prime(i);
            let q_star = &q_total / q;
            let q_star_mod = biguint_mod_u64(&q_star, q);
            let inv = mod_inv(q_star_mod, q).unwrap_or(0);
            let term = q_star * inv;
            let coeffs = comp.to_coeff_poly();
            for (a, &c) in acc.iter_mut().zip(&coeffs.coeffs) {
                *a += &term * c;
            }
        }
        acc.into_iter()
            .map(|a| centered_mod(&BigInt::from(a), &q_total_int))
            .collect()
    }

    pub fn to_int_poly(&self, ctx: &RingContext) -> IntPoly {
        IntPoly { coeffs: self.to_bigints_centered(ctx) }
    }

    /// Canonicalise residues into [0, q); idempotent.
    pub fn reduce(&mut self) {
        for comp in self.components.values_mut() {
            comp.reduce();
        }
    }

    /// Inverse of the `Display` form.
    pub fn parse(ctx: &RingContext, text: &str) -> Result<Self> {
        let mut tokens = Tokens::new(text);
        let poly = Self::read_tokens(&mut tokens, ctx)?;
        if !tokens.is_exhausted() {
            return Err(HeError::Parse("trailing input after polynomial".into()));
        }
        Ok(poly)
    }

    pub(crate) fn read_tokens(tokens: &mut Tokens<'_>, ctx: &RingContext) -> Result<Self> {
        let n = ctx.ring_degree();
        tokens.expect("[")?;
        let set = tokens.index_set()?;
        let mut components = BTreeMap::new();
        for i in set.iter() {
            if i >= ctx.num_primes() {
                return Err(HeError::Parse(format!("prime index {i} out of range")));
            }
            let modulus = ctx.modulus(i);
            tokens.expect("[")?;
            let mut evals = Vec::with_capacity(n);
            for _ in 0..n {
                let v: u64 = tokens.parse()?;
                if v >= modulus.value {
                    return Err(HeError::Parse(format!("residue {v} not below q_{i}")));
                }
                evals.push(v);
            }
            tokens.expect("]")?;
            components.insert(i, NttPoly { evals, modulus: modulus.value, plan: modulus.plan.clone() });
        }
        tokens.expect("]")?;
        Ok(Self { components, ring_degree: n })
    }
}

impl Zeroize for RnsPoly {
    fn zeroize(&mut self) {
        for comp in self.components.values_mut() {
            comp.evals.zeroize();
        }
    }
}

impl fmt::Display for RnsPoly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.index_set())?;
        for comp in self.components.values() {
            write!(f, " [")?;
            for (pos, e) in comp.evals.iter().enumerate() {
                if pos > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{e}")?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}
