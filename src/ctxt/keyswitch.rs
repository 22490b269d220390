use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;
use tracing::{debug, instrument};

use super::{Ciphertext, CiphertextPart, SecretKeyHandle};
use crate::error::{HeError, Result};
use crate::keys::KeySwitchMatrix;
use crate::noise::XDouble;
use crate::random::{derive_masks, RandomStream};
use crate::ring::modular::{mod_inv, mod_pow};

impl<'a> Ciphertext<'a> {
    /// Bring the ciphertext back to the canonical `[1, s_key]` form.
    ///
    /// With `key_id` set, only matrices into that key are used. Otherwise the
    /// ciphertext's own key is preferred, and any matrix leaving the handle is
    /// accepted as a fallback. The value id is preserved.
    #[instrument(skip_all, fields(parts = self.parts.len(), key = ?key_id))]
    pub fn relinearize(&mut self, key_id: Option<usize>, stream: &mut RandomStream) -> Result<()> {
        let target = key_id.or_else(|| self.key_id()).unwrap_or(0);
        if self.is_empty() || self.in_canonical_form(target) {
            return Ok(());
        }
        let ctx = self.context;
        let pk = self.public_key;

        let mut g = self.ptxt_space.clone();
        let mut matrices: Vec<Option<&KeySwitchMatrix>> = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            if part.handle.is_one() || part.handle.is_base(target) {
                matrices.push(None);
                continue;
            }
            let matrix = match key_id {
                Some(k) => pk.key_switch_matrix(&part.handle, k),
                None => pk
                    .key_switch_matrix(&part.handle, target)
                    .or_else(|| pk.any_key_switch_matrix(&part.handle)),
            }
            .ok_or_else(|| {
                HeError::MissingKey(format!("no switching matrix from {} to key {target}", part.handle))
            })?;
            g = g.gcd(&matrix.ptxt_space);
            if g <= BigUint::one() {
                return Err(HeError::IncompatiblePlaintextSpace(
                    self.ptxt_space.clone(),
                    matrix.ptxt_space.clone(),
                ));
            }
            matrices.push(Some(matrix));
        }

        let mut this = self.clone();
        this.reduce();
        if this.special_primes_present() {
            let target_set = this.prime_set.difference(ctx.special_primes());
            this.mod_down_to_set(&target_set)?;
        }

        let log_special = ctx.log_of_product(ctx.special_primes());
        let mut out = Ciphertext::from_parts(
            pk,
            Vec::new(),
            ctx.ctxt_primes().clone(),
            g,
            this.noise_var * XDouble::exp(2.0 * log_special),
        );
        for (part, matrix) in this.parts.iter().zip(matrices) {
            match matrix {
                None => {
                    let mut poly = part.poly.clone();
                    poly.add_primes_and_scale(ctx, ctx.special_primes());
                    out.add_part(&poly, part.handle, true, false)?;
                }
                Some(matrix) => out.key_switch_part(part, matrix, stream)?,
            }
        }
        out.value_id = self.value_id;
        *self = out;
        Ok(())
    }

    /// Accumulate the key-switched form of one part into `self`.
    ///
    /// The part is split into digits, each multiplied against the matrix
    /// rows. `self` ends up over the part's primes plus the special primes.
    #[instrument(skip_all, fields(handle = %part.handle))]
    pub fn key_switch_part(
        &mut self,
        part: &CiphertextPart,
        matrix: &KeySwitchMatrix,
        stream: &mut RandomStream,
    ) -> Result<()> {
        let ctx = self.context;
        let part_set = part.index_set();
        if !part_set.is_disjoint(ctx.special_primes()) {
            return Err(HeError::InvariantViolation(format!(
                "part over {part_set} already carries special primes"
            )));
        }
        if part.handle.is_one() || part.handle.is_base(matrix.to_key_id) {
            let mut poly = part.poly.clone();
            poly.add_primes_and_scale(ctx, ctx.special_primes());
            return self.add_part(&poly, part.handle, true, false);
        }
        if matrix.from_handle != part.handle {
            return Err(HeError::InvariantViolation(format!(
                "matrix switches from {} but the part is {}",
                matrix.from_handle, part.handle
            )));
        }

        let t_sq = XDouble::from_biguint(&matrix.ptxt_space).powi(2);
        let sigma = ctx.stdev();
        let mut n_digits = 0;
        let mut added = XDouble::ZERO;
        let mut size_left = ctx.log_of_product(&part_set);
        for digit in ctx.digits() {
            if size_left <= 0.0 {
                break;
            }
            n_digits += 1;
            let digit_size = ctx.log_of_product(digit).min(size_left);
            added += t_sq * XDouble::exp(2.0 * digit_size) * (ctx.phi_m() as f64 * sigma * sigma / 4.0);
            size_left -= digit_size;
        }

        let weight = self
            .public_key
            .secret_key_weight(part.handle.key_id())
            .ok_or_else(|| HeError::MissingKey(format!("no weight for key {}", part.handle.key_id())))?;
        let mod_switch = (weight as f64).ln() + t_sq.ln() + (ctx.phi_m() as f64).ln() - 12f64.ln();
        let key_switch = added.ln() - 2.0 * ctx.log_of_product(ctx.special_primes());
        if key_switch >= mod_switch {
            return Err(HeError::NoiseBudget { key_switch, mod_switch });
        }
        debug!(n_digits, key_switch, mod_switch, "switching part");

        let digits = part.poly.break_into_digits(ctx, n_digits)?;
        let masks = derive_masks(ctx, matrix.prg_seed, n_digits, stream);
        let base = SecretKeyHandle::base(matrix.to_key_id);
        let one = SecretKeyHandle::one();

        let mut out = self.clone();
        for ((digit, mask), row) in digits.into_iter().zip(&masks).zip(&matrix.b) {
            let mut against_mask = digit.clone();
            against_mask.mul_assign_restricted(mask)?;
            out.add_part(&against_mask, base, true, false)?;

            let mut against_row = digit;
            against_row.mul_assign_restricted(row)?;
            out.add_part(&against_row, one, true, false)?;
        }
        out.noise_var += added;
        *self = out;
        Ok(())
    }

    /// Apply X -> X^k to every part. Handles other than the constant term
    /// record the rotation in their power of X.
    pub fn automorph(&mut self, k: usize) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let ctx = self.context;
        let m = ctx.m();
        let k = k % m;
        if !ctx.in_zm_star(k) {
            return Err(HeError::InvalidParam(format!("{k} is not a unit mod {m}")));
        }
        let mut parts = self.parts.clone();
        for part in &mut parts {
            part.poly.automorph(k)?;
            if !part.handle.is_one() {
                let x = (part.handle.power_of_x() * k) % m;
                part.handle.set_power_of_x(x);
            }
        }
        self.parts = parts;
        self.refresh_value_id();
        Ok(())
    }

    /// Automorphism followed by key switching, chaining matrices along the
    /// stored reachability map when no direct matrix exists.
    #[instrument(skip_all, fields(k = k))]
    pub fn smart_automorph(&mut self, k: usize, stream: &mut RandomStream) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let ctx = self.context;
        let m = ctx.m();
        let mut k = k % m;
        if !ctx.in_zm_star(k) {
            return Err(HeError::InvalidParam(format!("{k} is not a unit mod {m}")));
        }
        let key = self.key_id().unwrap_or(0);
        if !self.public_key.is_reachable(k, key) {
            return Err(HeError::UnreachableAutomorphism { k, key_id: key });
        }

        let mut this = self.clone();
        if !this.in_canonical_form(key) {
            this.relinearize(Some(key), stream)?;
        }
        while k != 1 {
            let matrix = this
                .public_key
                .next_matrix(k, key)
                .ok_or(HeError::UnreachableAutomorphism { k, key_id: key })?;
            let amount = matrix.from_handle.power_of_x();
            this.automorph(amount)?;
            this.relinearize(Some(key), stream)?;
            let inverse = mod_inv(amount as u64, m as u64)
                .ok_or_else(|| HeError::InvalidParam(format!("{amount} is not a unit mod {m}")))?;
            k = ((k as u64 * inverse) % m as u64) as usize;
        }
        *self = this;
        Ok(())
    }

    /// The Frobenius map X -> X^{p^j}; `j` is taken modulo the order of p.
    pub fn frobenius_automorph(&mut self, j: i64, stream: &mut RandomStream) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let ctx = self.context;
        let d = ctx
            .ord_p()
            .ok_or_else(|| HeError::InvalidParam(format!("{} is not a unit mod {}", ctx.p(), ctx.m())))?;
        let j = j.rem_euclid(d as i64) as u64;
        let m = ctx.m() as u64;
        let k = mod_pow(ctx.p() % m, j, m) as usize;
        self.smart_automorph(k, stream)
    }

    /// Relinearize, canonicalise and drop any special primes.
    pub fn clean_up(&mut self, stream: &mut RandomStream) -> Result<()> {
        self.relinearize(None, stream)?;
        self.reduce();
        if self.special_primes_present() {
            let target = self.prime_set.difference(self.context.special_primes());
            self.mod_down_to_set(&target)?;
        }
        Ok(())
    }
}
