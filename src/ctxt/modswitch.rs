use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};
use tracing::{debug, error, instrument, warn};

use super::Ciphertext;
use crate::error::{HeError, Result};
use crate::keys::SecretKey;
use crate::noise::XDouble;
use crate::params::RingContext;
use crate::ring::modular::mod_inverse_big;
use crate::ring::{IndexSet, IntPoly};

/// All special primes or none, and a non-empty interval of ciphertext primes
/// starting at index 0 or 1.
pub(crate) fn prime_set_is_valid(ctx: &RingContext, set: &IndexSet) -> bool {
    let special = set.intersection(ctx.special_primes());
    if !special.is_empty() && &special != ctx.special_primes() {
        return false;
    }
    let ctxt = set.difference(&special);
    ctxt.is_interval() && ctxt.first().is_some_and(|first| first <= 1)
}

impl<'a> Ciphertext<'a> {
    /// Scale every part up by the primes in `target \ prime_set`.
    pub fn mod_up_to_set(&mut self, target: &IndexSet) -> Result<()> {
        let ctx = self.context;
        let diff = target.difference(&self.prime_set);
        if diff.is_empty() {
            return Ok(());
        }
        let grown = self.prime_set.union(&diff);
        if !prime_set_is_valid(ctx, &grown) {
            return Err(HeError::InvariantViolation(format!(
                "mod-up to {grown} breaks the prime-set layout"
            )));
        }

        let f = ctx.log_of_product(&diff);
        let mut parts = self.parts.clone();
        for part in &mut parts {
            let added = part.poly.add_primes_and_scale(ctx, &diff);
            if (added - f).abs() > 1e-6 {
                return Err(HeError::InvariantViolation(format!(
                    "part scaled by e^{added} instead of e^{f}"
                )));
            }
        }
        self.parts = parts;
        self.noise_var *= XDouble::exp(2.0 * f);
        self.prime_set = grown;
        Ok(())
    }

    /// Switch down to `prime_set ∩ target`, either dropping the extra primes
    /// outright or rounding, whichever leaves less noise.
    #[instrument(skip_all, fields(from = %self.prime_set, to = %target))]
    pub fn mod_down_to_set(&mut self, target: &IndexSet) -> Result<()> {
        let ctx = self.context;
        let intersection = self.prime_set.intersection(target);
        if intersection.is_empty() {
            error!(from = %self.prime_set, to = %target, "mod-down leaves no primes");
            return Err(HeError::EmptyModDown { from: self.prime_set.clone(), to: target.clone() });
        }
        if intersection == self.prime_set {
            return Ok(());
        }
        if !prime_set_is_valid(ctx, &intersection) {
            return Err(HeError::InvariantViolation(format!(
                "mod-down to {intersection} breaks the prime-set layout"
            )));
        }
        let dropped = self.prime_set.difference(&intersection);
        let t = &self.ptxt_space;
        let added = self.mod_switch_added_noise_var();
        let mut parts = self.parts.clone();

        let noise_var = if self.noise_var * XDouble::from_biguint(t).powi(2) < added {
            debug!(dropped = %dropped, "dropping primes without rounding");
            let product = ctx.product_of_primes(&dropped) % t;
            let inverse = mod_inverse_big(&product, t).ok_or_else(|| {
                HeError::InvalidParam(format!("dropped primes not invertible mod {t}"))
            })?;
            for part in &mut parts {
                part.poly.remove_primes(&dropped);
                part.poly.scale_by(&inverse);
            }
            self.noise_var * XDouble::from_biguint(&inverse).powi(2)
        } else {
            debug!(dropped = %dropped, "rounding to the smaller modulus");
            for part in &mut parts {
                part.poly.scale_down_to_set(ctx, &intersection, t)?;
            }
            let f = ctx.log_of_product(&dropped);
            self.noise_var / XDouble::exp(2.0 * f) + added
        };

        self.parts = parts;
        self.noise_var = noise_var;
        self.prime_set = intersection;
        Ok(())
    }

    /// Mod-switch to level `lvl`; also strips special primes.
    pub fn mod_down_to_level(&mut self, lvl: usize) -> Result<()> {
        let ctx = self.context;
        if lvl == 0 {
            return Err(HeError::InvalidParam("cannot mod-switch to level 0".into()));
        }
        let current = self.prime_set.intersection(ctx.ctxt_primes());
        let current_level = super::level_of(ctx, &self.prime_set);
        let mut target = if ctx.contains_small_prime() {
            if lvl % 2 == 1 {
                IndexSet::interval(0, (lvl - 1) / 2)
            } else {
                IndexSet::interval(1, lvl / 2)
            }
        } else {
            IndexSet::interval(0, lvl - 1)
        };

        if lvl >= current_level {
            if current == self.prime_set {
                return Ok(());
            }
            target = current.clone();
        }
        if !target.is_disjoint(ctx.special_primes()) {
            return Err(HeError::InvariantViolation(format!(
                "level {lvl} maps onto special primes"
            )));
        }
        if target.contains(0) && !current.contains(0) {
            self.mod_up_to_set(&target)?;
        }
        self.mod_down_to_set(&target)
    }

    /// Expected variance added by rounding away primes:
    /// Σ_parts (1 or d!·h^d) · φ · t² / 12.
    pub fn mod_switch_added_noise_var(&self) -> XDouble {
        let ctx = self.context;
        let mut added = XDouble::ZERO;
        for part in &self.parts {
            if part.handle.is_one() {
                added += XDouble::ONE;
                continue;
            }
            let h = self.public_key.secret_key_weight(part.handle.key_id()).unwrap_or(1) as f64;
            let mut term = XDouble::from_f64(h);
            for j in 2..=part.handle.power_of_s() {
                term = term * h * j as f64;
            }
            added += term;
        }
        added * ctx.phi_m() as f64 * XDouble::from_biguint(&self.ptxt_space).powi(2) / 12.0
    }

    /// Target set that makes the rounding noise the dominant noise term.
    ///
    /// Greedy: drop special primes, then the half-size prime, then the
    /// largest-index primes while the scaled noise exceeds the threshold.
    /// Calling it again right after switching to the result returns the same
    /// set.
    pub fn find_base_set(&self) -> IndexSet {
        let ctx = self.context;
        if self.noise_var.is_zero() {
            return ctx.ctxt_primes().clone();
        }
        let half_size = ctx.contains_small_prime();
        let mut cur_noise = self.noise_var.ln() / 2.0;
        let first_noise = ctx.log_of_prime(0);
        let threshold = self.mod_switch_added_noise_var().ln() * ctx.base_set_noise_factor();

        let mut set = self.prime_set.clone();
        if !set.is_disjoint(ctx.special_primes()) {
            cur_noise -= ctx.log_of_product(ctx.special_primes());
            set = set.difference(ctx.special_primes());
        }
        // switching adds about `threshold` itself, hence the slack
        if cur_noise <= threshold + 1.0 {
            return set;
        }

        if half_size && set.contains(0) {
            cur_noise -= first_noise;
            set.remove(0);
        }
        while cur_noise > threshold {
            let Some(last) = set.last() else { break };
            cur_noise -= ctx.log_of_prime(last);
            set.remove(last);
        }
        if set.is_empty() || (!set.contains(0) && cur_noise + first_noise <= threshold) {
            set.insert(0);
            cur_noise += first_noise;
        }

        if cur_noise > threshold && self.log_of_ratio() > -0.5 {
            warn!(noise = cur_noise, threshold, "already at lowest level");
        }
        set
    }

    pub fn find_base_level(&self) -> usize {
        let ctx = self.context;
        let set = self.find_base_set();
        if ctx.contains_small_prime() {
            let first = ctx.ctxt_primes().first().unwrap_or(0);
            if set.contains(first) {
                2 * set.len() - 1
            } else {
                2 * set.len()
            }
        } else {
            set.len()
        }
    }

    /// How many trailing ciphertext primes could be dropped before the
    /// measured noise would reach the modulus.
    ///
    /// Needs the secret key and the expected message, so it is a diagnostic
    /// for calibrating the noise estimate.
    pub fn useless_primes(&self, secret_key: &SecretKey, message: &IntPoly) -> Result<usize> {
        let ctx = self.context;
        if self.noise_var.is_zero() {
            return Ok(0);
        }
        let mut set = self.prime_set.clone();
        let mut cur_noise = secret_key.measured_noise(self, message)?;
        let threshold = 0.0;

        if !set.is_disjoint(ctx.special_primes()) {
            cur_noise -= ctx.log_of_product(ctx.special_primes());
            set = set.difference(ctx.special_primes());
        }
        let initial = set.len();
        if cur_noise <= threshold + 1.0 {
            return Ok(0);
        }
        if ctx.contains_small_prime() && set.contains(0) {
            cur_noise -= ctx.log_of_prime(0);
            set.remove(0);
        }
        while cur_noise > threshold {
            let Some(last) = set.last() else { break };
            cur_noise -= ctx.log_of_prime(last);
            set.remove(last);
        }
        Ok(initial - set.len())
    }

    /// Switch to an external modulus that need not belong to the chain,
    /// returning the rounded integer parts and the resulting noise variance.
    /// `self` is left unchanged.
    ///
    /// Each coefficient c becomes an integer within t of `c·to/Q` that is
    /// congruent to `c·to·Q⁻¹` mod t, so the parts decrypt to `to·m mod t`
    /// over the new modulus. `to_modulus` must be coprime to t.
    pub fn raw_mod_switch(&self, to_modulus: &BigUint) -> Result<(Vec<IntPoly>, XDouble)> {
        let ctx = self.context;
        let t = &self.ptxt_space;
        if *to_modulus <= BigUint::one() || !to_modulus.gcd(t).is_one() {
            return Err(HeError::InvalidParam(format!(
                "raw mod-switch target {to_modulus} must exceed 1 and be coprime to {t}"
            )));
        }
        let from_modulus = ctx.product_of_primes(&self.prime_set);
        let from_inverse = mod_inverse_big(&from_modulus, t)
            .ok_or_else(|| HeError::InvalidParam(format!("modulus not invertible mod {t}")))?;
        let ratio_mod_t = BigInt::from(to_modulus % t * from_inverse % t);
        let ratio = XDouble::exp(
            XDouble::from_biguint(to_modulus).ln() - ctx.log_of_product(&self.prime_set),
        );

        let t_int = BigInt::from(t.clone());
        let to_int = BigInt::from(to_modulus.clone());
        let from_int = BigInt::from(from_modulus);
        let parts = self
            .parts
            .iter()
            .map(|part| {
                let coeffs = part
                    .poly
                    .to_bigints_centered(ctx)
                    .into_iter()
                    .map(|c| {
                        let want = (c.mod_floor(&t_int) * &ratio_mod_t).mod_floor(&t_int);
                        let mut rounded = (&c * &to_int).div_floor(&from_int);
                        let delta = (&want - &rounded).mod_floor(&t_int);
                        if !delta.is_zero() {
                            rounded += &delta;
                            // nearer representative of the residue class
                            if &delta + &delta > t_int {
                                rounded -= &t_int;
                            }
                        }
                        rounded
                    })
                    .collect();
                IntPoly { coeffs }
            })
            .collect();

        let noise = self.noise_var * ratio.powi(2) + self.mod_switch_added_noise_var();
        debug!(to = %to_modulus, parts = self.parts.len(), "raw mod-switch");
        Ok((parts, noise))
    }

    pub(crate) fn special_primes_present(&self) -> bool {
        !self.prime_set.is_disjoint(self.context.special_primes())
    }
}
