use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::Rng;
use tracing::instrument;

use super::{fresh_value_id, Ciphertext, CiphertextPart, SecretKeyHandle};
use crate::error::{HeError, Result};
use crate::noise::XDouble;
use crate::random::RandomStream;
use crate::ring::modular::{centered_mod, mod_inverse_big};
use crate::ring::{IntPoly, RnsPoly};

fn compatible_space(a: &BigUint, b: &BigUint) -> Result<BigUint> {
    let g = a.gcd(b);
    if g <= BigUint::one() {
        return Err(HeError::IncompatiblePlaintextSpace(a.clone(), b.clone()));
    }
    Ok(g)
}

/// Size of the centred representative of `c mod t`, as used by the noise
/// bookkeeping.
fn centred_size(c: &BigUint, t: &BigUint) -> XDouble {
    let centred = centered_mod(&BigInt::from(c.clone()), &BigInt::from(t.clone()));
    XDouble::from_biguint(centred.magnitude())
}

fn binomial(n: u32, k: u32) -> f64 {
    (1..=k).fold(1.0, |acc, i| acc * (n - k + i) as f64 / i as f64)
}

impl<'a> Ciphertext<'a> {
    /// Add or subtract one part.
    ///
    /// With `match_prime_set` the existing parts are extended exactly to any
    /// primes the part carries beyond `prime_set`. A part over fewer primes
    /// is scaled up on a private copy before accumulation.
    pub fn add_part(
        &mut self,
        poly: &RnsPoly,
        handle: SecretKeyHandle,
        match_prime_set: bool,
        negate: bool,
    ) -> Result<()> {
        let ctx = self.context;
        let part_set = poly.index_set();
        let mut parts = self.parts.clone();
        let mut prime_set = self.prime_set.clone();

        if !part_set.is_subset(&prime_set) {
            if !match_prime_set && !parts.is_empty() {
                return Err(HeError::IndexSetMismatch { left: prime_set, right: part_set });
            }
            let diff = part_set.difference(&prime_set);
            for part in &mut parts {
                part.poly.add_primes(ctx, &diff)?;
            }
            prime_set = prime_set.union(&diff);
        }

        let mut incoming = poly.clone();
        if parts.is_empty() {
            prime_set = part_set;
            if negate {
                incoming.neg_assign();
            }
            parts.push(CiphertextPart::new(incoming, handle));
        } else {
            let missing = prime_set.difference(&part_set);
            if !missing.is_empty() {
                incoming.add_primes_and_scale(ctx, &missing);
            }
            match parts.iter().position(|p| p.handle == handle) {
                Some(j) if negate => parts[j].poly.sub_assign(&incoming)?,
                Some(j) => parts[j].poly.add_assign(&incoming)?,
                None => {
                    if negate {
                        incoming.neg_assign();
                    }
                    parts.push(CiphertextPart::new(incoming, handle));
                }
            }
        }

        self.parts = parts;
        self.prime_set = prime_set;
        self.value_id = fresh_value_id();
        Ok(())
    }

    /// `self ± other`. Prime sets are matched by scaling up whichever side is
    /// missing primes; `other` itself is never modified.
    pub fn add_ctxt(&mut self, other: &Ciphertext<'a>, negative: bool) -> Result<()> {
        self.check_same_session(other)?;
        if self.is_empty() {
            *self = other.clone();
            if negative {
                self.negate();
            }
            return Ok(());
        }
        let g = compatible_space(&self.ptxt_space, &other.ptxt_space)?;

        let mut this = self.clone();
        this.ptxt_space = g;
        let missing_here = other.prime_set.difference(&this.prime_set);
        if !missing_here.is_empty() {
            this.mod_up_to_set(&missing_here)?;
        }

        let missing_there = this.prime_set.difference(&other.prime_set);
        let scaled;
        let rhs = if missing_there.is_empty() {
            other
        } else {
            let mut tmp = other.clone();
            tmp.mod_up_to_set(&missing_there)?;
            scaled = tmp;
            &scaled
        };

        for part in &rhs.parts {
            match this.part_index(&part.handle) {
                Some(j) if negative => this.parts[j].poly.sub_assign(&part.poly)?,
                Some(j) => this.parts[j].poly.add_assign(&part.poly)?,
                None => {
                    let mut p = part.clone();
                    if negative {
                        p.poly.neg_assign();
                    }
                    this.parts.push(p);
                }
            }
        }
        this.noise_var += rhs.noise_var;
        this.value_id = fresh_value_id();
        *self = this;
        Ok(())
    }

    /// Re-randomize by adding a high-noise encryption of `poly`.
    ///
    /// Pass a zero polynomial to keep the message. The ciphertext ends up at
    /// the full ciphertext-prime set.
    pub fn blind<R: Rng>(&mut self, poly: &IntPoly, rng: &mut R) -> Result<()> {
        let mask = self.public_key.encrypt_high_noise(poly, Some(&self.ptxt_space), rng)?;
        self.add_ctxt(&mask, false)
    }

    pub fn sub_ctxt(&mut self, other: &Ciphertext<'a>) -> Result<()> {
        self.add_ctxt(other, true)
    }

    pub fn negate(&mut self) {
        for part in &mut self.parts {
            part.poly.neg_assign();
        }
        self.value_id = fresh_value_id();
    }

    /// Add a constant given in RNS form over (at least) `prime_set`.
    ///
    /// `size` is the variance bound of the constant, by default φ·(t/2)².
    pub fn add_constant_rns(&mut self, constant: &RnsPoly, size: Option<f64>) -> Result<()> {
        let t = self.ptxt_space.clone();
        let size = match size {
            Some(s) => XDouble::from_f64(s),
            None => XDouble::from_biguint(&t).powi(2) * (self.context.phi_m() as f64 / 4.0),
        };
        self.fold_constant(constant, size)
    }

    pub fn add_constant_poly(&mut self, constant: &IntPoly, size: Option<f64>) -> Result<()> {
        let rns = RnsPoly::from_int_poly(constant, self.context, &self.prime_set)?;
        self.add_constant_rns(&rns, size)
    }

    /// Add an integer constant; its noise is the square of its centred residue.
    pub fn add_constant(&mut self, c: &BigInt) -> Result<()> {
        let t = BigInt::from(self.ptxt_space.clone());
        let reduced = c.mod_floor(&t);
        let size = centred_size(reduced.magnitude(), &self.ptxt_space).powi(2);
        let rns = RnsPoly::constant(&reduced, self.context, &self.prime_set)?;
        self.fold_constant(&rns, size)
    }

    fn fold_constant(&mut self, constant: &RnsPoly, size: XDouble) -> Result<()> {
        let ctx = self.context;
        let const_set = constant.index_set();
        if !self.prime_set.is_subset(&const_set) {
            return Err(HeError::IndexSetMismatch { left: self.prime_set.clone(), right: const_set });
        }
        let t = &self.ptxt_space;
        let f = ctx.product_of_primes(&self.prime_set) % t;

        let mut scaled = constant.clone();
        scaled.remove_primes(&const_set.difference(&self.prime_set));
        if !f.is_one() {
            scaled.scale_by(&f);
        }
        self.add_part(&scaled, SecretKeyHandle::one(), false, false)?;
        self.noise_var += size * XDouble::from_biguint(&f).powi(2);
        Ok(())
    }

    /// Tensor product of two ciphertexts over the same prime set.
    ///
    /// Parts of `c1` are pre-multiplied by `(Q mod t)^{-1}` so that the product
    /// again decrypts to `Q·m1·m2 mod t`. The noise estimate is
    /// `n1·n2·C(d1+d2, d2)·c_M`, with d1, d2 the largest key powers present.
    #[instrument(skip_all, fields(parts1 = c1.parts.len(), parts2 = c2.parts.len()))]
    pub fn tensor_product(c1: &Ciphertext<'a>, c2: &Ciphertext<'a>) -> Result<Ciphertext<'a>> {
        let ctx = c1.context;
        c1.check_same_session(c2)?;
        if c1.prime_set != c2.prime_set {
            return Err(HeError::IndexSetMismatch {
                left: c1.prime_set.clone(),
                right: c2.prime_set.clone(),
            });
        }
        let t = compatible_space(&c1.ptxt_space, &c2.ptxt_space)?;
        let q_mod_t = ctx.product_of_primes(&c1.prime_set) % &t;
        let correction = if q_mod_t.is_one() {
            None
        } else {
            Some(mod_inverse_big(&q_mod_t, &t).ok_or_else(|| {
                HeError::InvalidParam(format!("modulus not invertible mod {t}"))
            })?)
        };

        let mut out = Ciphertext::from_parts(
            c1.public_key,
            Vec::new(),
            c1.prime_set.clone(),
            t,
            XDouble::ZERO,
        );
        for p1 in &c1.parts {
            let mut left = p1.poly.clone();
            if let Some(f) = &correction {
                left.scale_by(f);
            }
            for p2 in &c2.parts {
                let handle = p1
                    .handle
                    .mul(&p2.handle)
                    .ok_or(HeError::HandleProduct(p1.handle, p2.handle))?;
                let mut prod = p2.poly.clone();
                prod.mul_assign(&left)?;
                match out.part_index(&handle) {
                    Some(k) => out.parts[k].poly.add_assign(&prod)?,
                    None => out.parts.push(CiphertextPart::new(prod, handle)),
                }
            }
        }

        let max_power = |c: &Ciphertext<'_>| c.parts.iter().map(|p| p.handle.power_of_s()).max().unwrap_or(0);
        let (n1, n2) = (max_power(c1), max_power(c2));
        let mut noise = c1.noise_var * c2.noise_var * binomial(n1 + n2, n2) * ctx.ring_constant();
        if let Some(f) = &correction {
            noise *= XDouble::from_biguint(f).powi(2);
        }
        out.noise_var = noise;
        Ok(out)
    }

    /// `self *= other` without relinearization.
    ///
    /// Squaring (same value id) first switches down to the base level and
    /// doubles the tensor noise for the dependent terms. Otherwise both sides
    /// are brought to the lower of their base levels.
    pub fn mul_ctxt(&mut self, other: &Ciphertext<'a>) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        self.check_same_session(other)?;
        let g = compatible_space(&self.ptxt_space, &other.ptxt_space)?;
        let mut this = self.clone();
        this.ptxt_space = g;

        let product = if this.value_id == other.value_id {
            let lvl = this.find_base_level();
            this.mod_down_to_level(lvl)?;
            let mut squared = Self::tensor_product(&this, &this)?;
            squared.noise_var *= 2.0;
            squared
        } else {
            let lvl = this.find_base_level().min(other.find_base_level());
            this.mod_down_to_level(lvl)?;
            if this.prime_set != other.prime_set {
                let mut rhs = other.clone();
                rhs.mod_down_to_level(lvl)?;
                Self::tensor_product(&this, &rhs)?
            } else {
                Self::tensor_product(&this, other)?
            }
        };
        *self = product;
        Ok(())
    }

    /// Multiply and relinearize.
    pub fn multiply_by(&mut self, other: &Ciphertext<'a>, stream: &mut RandomStream) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let mut this = self.clone();
        this.mul_ctxt(other)?;
        this.relinearize(None, stream)?;
        *self = this;
        Ok(())
    }

    /// `self *= a·b` with a single relinearization, multiplying in the order
    /// that keeps the running level high.
    ///
    /// When `self` is the same value as one operand the product has dependent
    /// terms; the noise is then scaled by 2, or by 3 for a cube.
    pub fn multiply_by2(
        &mut self,
        a: &Ciphertext<'a>,
        b: &Ciphertext<'a>,
        stream: &mut RandomStream,
    ) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let lvl = self.find_base_level();
        let lvl_a = a.find_base_level();
        let lvl_b = b.find_base_level();
        let mut this = self.clone();

        if lvl < lvl_a && lvl < lvl_b {
            let mut tmp = a.clone();
            if a.value_id == b.value_id {
                let same = tmp.clone();
                tmp.mul_ctxt(&same)?;
            } else {
                tmp.mul_ctxt(b)?;
            }
            this.mul_ctxt(&tmp)?;
        } else {
            let (first, second) = if lvl < lvl_b { (b, a) } else { (a, b) };
            let own_id = this.value_id;
            if own_id == second.value_id {
                let saved = second.clone();
                this.mul_ctxt(first)?;
                this.mul_ctxt(&saved)?;
                this.noise_var *= if own_id == first.value_id { 3.0 } else { 2.0 };
            } else {
                this.mul_ctxt(first)?;
                this.mul_ctxt(second)?;
            }
        }
        this.relinearize(None, stream)?;
        *self = this;
        Ok(())
    }

    /// Multiply by an integer constant reduced mod t.
    pub fn mult_by_constant(&mut self, c: &BigInt) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let t = BigInt::from(self.ptxt_space.clone());
        let reduced = c.mod_floor(&t);
        let reduced = reduced.magnitude();
        for part in &mut self.parts {
            part.poly.scale_by(reduced);
        }
        let size = centred_size(reduced, &self.ptxt_space);
        self.noise_var = self.noise_var * size.powi(2) * self.context.ring_constant();
        self.value_id = fresh_value_id();
        Ok(())
    }

    /// Multiply by a constant in RNS form over (at least) `prime_set`.
    ///
    /// `size` is the constant's variance bound, by default φ·(t/2)².
    pub fn mult_by_constant_rns(&mut self, constant: &RnsPoly, size: Option<f64>) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let const_set = constant.index_set();
        if !self.prime_set.is_subset(&const_set) {
            return Err(HeError::IndexSetMismatch { left: self.prime_set.clone(), right: const_set });
        }
        let size = match size {
            Some(s) => XDouble::from_f64(s),
            None => XDouble::from_biguint(&self.ptxt_space).powi(2) * (self.context.phi_m() as f64 / 4.0),
        };
        let mut parts = self.parts.clone();
        for part in &mut parts {
            part.poly.mul_assign_restricted(constant)?;
        }
        self.parts = parts;
        self.noise_var = self.noise_var * size * self.context.ring_constant();
        self.value_id = fresh_value_id();
        Ok(())
    }

    pub fn mult_by_constant_poly(&mut self, constant: &IntPoly, size: Option<f64>) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let rns = RnsPoly::from_int_poly(constant, self.context, &self.prime_set)?;
        self.mult_by_constant_rns(&rns, size)
    }

    /// Exact division of an even message by 2, for t = 2^r with r > 1.
    ///
    /// Halves the plaintext space and divides the noise variance by 4. The
    /// message must be even; this cannot be checked without the secret key.
    pub fn divide_by_2(&mut self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let two = BigUint::from(2u32);
        if !self.ptxt_space.is_even() || self.ptxt_space <= two {
            return Err(HeError::InvalidParam(format!(
                "divide_by_2 needs an even plaintext space above 2, have {}",
                self.ptxt_space
            )));
        }
        let q = self.context.product_of_primes(&self.prime_set);
        let two_inverse = (q + 1u32) / &two;
        for part in &mut self.parts {
            part.poly.scale_by(&two_inverse);
        }
        self.noise_var /= 4.0;
        self.ptxt_space /= two;
        self.value_id = fresh_value_id();
        Ok(())
    }

    /// Exact division by the base prime p, for t = p^r with r > 1.
    ///
    /// Divides the plaintext space by p and the noise variance by p². The
    /// message must be divisible by p.
    pub fn divide_by_p(&mut self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let p = BigUint::from(self.context.p());
        if self.ptxt_space <= p || !(&self.ptxt_space % &p).is_zero() {
            return Err(HeError::InvalidParam(format!(
                "divide_by_p needs a proper power of {p}, have {}",
                self.ptxt_space
            )));
        }
        let q = self.context.product_of_primes(&self.prime_set);
        let p_inverse = mod_inverse_big(&p, &q)
            .ok_or_else(|| HeError::InvalidParam(format!("{p} is not invertible mod Q")))?;
        for part in &mut self.parts {
            part.poly.scale_by(&p_inverse);
        }
        let p_f64 = p.to_f64().unwrap_or(f64::INFINITY);
        self.noise_var /= p_f64 * p_f64;
        self.ptxt_space /= p;
        self.value_id = fresh_value_id();
        Ok(())
    }
}
