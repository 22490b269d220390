use std::ptr;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use rand::Rng;
use tracing::debug;

use super::{PublicKey, SecretKey};
use crate::ctxt::{Ciphertext, CiphertextPart, SecretKeyHandle};
use crate::error::{HeError, Result};
use crate::noise::XDouble;
use crate::params::RingContext;
use crate::ring::modular::{centered_mod, mod_inverse_big};
use crate::ring::{IndexSet, IntPoly, RnsPoly};
use crate::sampling::{sample_gaussian_coeffs, sample_zero_one};

/// Centred residues of `f·m mod t`.
fn scale_message(message: &IntPoly, f: &BigUint, t: &BigUint) -> Vec<BigInt> {
    let f = BigInt::from(f.clone());
    let t = BigInt::from(t.clone());
    message.coeffs.iter().map(|c| centered_mod(&(c * &f), &t)).collect()
}

fn effective_space(key_space: &BigUint, requested: Option<&BigUint>) -> Result<BigUint> {
    match requested {
        None => Ok(key_space.clone()),
        Some(t) => {
            let g = t.gcd(key_space);
            if g <= BigUint::one() {
                return Err(HeError::IncompatiblePlaintextSpace(t.clone(), key_space.clone()));
            }
            Ok(g)
        }
    }
}

impl PublicKey {
    /// Public-key encryption into a canonical `[1, s_0]` ciphertext over the
    /// ciphertext primes.
    ///
    /// `ptxt_space` defaults to the key's; a requested modulus is reduced to
    /// its gcd with it. The message is pre-scaled by `Q mod t`.
    pub fn encrypt<R: Rng>(
        &self,
        message: &IntPoly,
        ptxt_space: Option<&BigUint>,
        rng: &mut R,
    ) -> Result<Ciphertext<'_>> {
        self.encrypt_with_flooding(message, ptxt_space, false, rng)
    }

    /// As [`PublicKey::encrypt`], with an extra uniform error term whose
    /// magnitude is close to the square root of the modulus.
    ///
    /// The flooding term is drawn uniformly modulo the lowest ciphertext
    /// primes whose product stays below that bound, so it hides the noise
    /// of any ciphertext the result is added to. Used by
    /// [`Ciphertext::blind`].
    pub fn encrypt_high_noise<R: Rng>(
        &self,
        message: &IntPoly,
        ptxt_space: Option<&BigUint>,
        rng: &mut R,
    ) -> Result<Ciphertext<'_>> {
        self.encrypt_with_flooding(message, ptxt_space, true, rng)
    }

    fn encrypt_with_flooding<R: Rng>(
        &self,
        message: &IntPoly,
        ptxt_space: Option<&BigUint>,
        flood: bool,
        rng: &mut R,
    ) -> Result<Ciphertext<'_>> {
        let ctx = self.context();
        let n = ctx.ring_degree();
        let sigma = ctx.stdev();
        let t = effective_space(self.ptxt_space(), ptxt_space)?;
        let set = ctx.ctxt_primes().clone();

        let f = ctx.product_of_primes(&set) % &t;
        let m = RnsPoly::from_bigints(&scale_message(message, &f, &t), ctx, &set)?;
        let r = RnsPoly::from_small_coeffs(&sample_zero_one(n, rng), ctx, &set)?;
        let mut e0 = RnsPoly::from_small_coeffs(&sample_gaussian_coeffs(n, sigma, rng), ctx, &set)?;
        let mut e1 = RnsPoly::from_small_coeffs(&sample_gaussian_coeffs(n, sigma, rng), ctx, &set)?;

        let h = self.secret_key_weight(0).unwrap_or(0) as f64;
        let phi = ctx.phi_m() as f64;
        let mut noise = self.encryption_noise() * (phi / 2.0)
            + XDouble::from_biguint(&t).powi(2) * (sigma * sigma * phi * (1.0 + h));

        if flood {
            let flood_set = flooding_primes(ctx, &set, &t);
            if !flood_set.is_empty() {
                let mut big = RnsPoly::uniform(ctx, &flood_set, rng);
                big.add_primes(ctx, &set.difference(&flood_set))?;
                e0.add_assign(&big)?;
                let bound = XDouble::from_biguint(&ctx.product_of_primes(&flood_set));
                noise += XDouble::from_biguint(&t).powi(2) * bound.powi(2) * (phi / 12.0);
            }
            debug!(flood_primes = %flood_set, "high-noise encryption");
        }
        e0.scale_by(&t);
        e1.scale_by(&t);

        let (b, a) = self.encryption_key();
        let mut c0 = b.clone();
        c0.mul_assign(&r)?;
        c0.add_assign(&e0)?;
        c0.add_assign(&m)?;
        let mut c1 = a.clone();
        c1.mul_assign(&r)?;
        c1.add_assign(&e1)?;

        Ok(Ciphertext::from_parts(
            self,
            vec![
                CiphertextPart::new(c0, SecretKeyHandle::one()),
                CiphertextPart::new(c1, SecretKeyHandle::base(0)),
            ],
            set,
            t,
            noise,
        ))
    }
}

/// Lowest primes of `set` whose product B keeps `t·B·sqrt(φ)` below `sqrt(Q)`.
fn flooding_primes(ctx: &RingContext, set: &IndexSet, t: &BigUint) -> IndexSet {
    let budget = ctx.log_of_product(set) / 2.0
        - XDouble::from_biguint(t).ln()
        - (ctx.phi_m() as f64).ln() / 2.0;
    let mut chosen = IndexSet::new();
    let mut used = 0.0;
    for i in set.iter() {
        used += ctx.log_of_prime(i);
        if used > budget {
            break;
        }
        chosen.insert(i);
    }
    chosen
}

impl SecretKey {
    /// Secret-key encryption under key 0: `(-a·s + t·e + f·m, a)`.
    pub fn encrypt_symmetric<R: Rng>(
        &self,
        message: &IntPoly,
        ptxt_space: Option<&BigUint>,
        rng: &mut R,
    ) -> Result<Ciphertext<'_>> {
        let pk = &self.public_key;
        let ctx = pk.context();
        let n = ctx.ring_degree();
        let sigma = ctx.stdev();
        let t = effective_space(pk.ptxt_space(), ptxt_space)?;
        let set = ctx.ctxt_primes().clone();

        let f = ctx.product_of_primes(&set) % &t;
        let m = RnsPoly::from_bigints(&scale_message(message, &f, &t), ctx, &set)?;
        let a = RnsPoly::uniform(ctx, &set, rng);
        let mut e = RnsPoly::from_small_coeffs(&sample_gaussian_coeffs(n, sigma, rng), ctx, &set)?;
        e.scale_by(&t);

        let mut s = self.secrets[0].poly.clone();
        s.remove_primes(ctx.special_primes());
        let mut c0 = a.clone();
        c0.mul_assign(&s)?;
        c0.neg_assign();
        c0.add_assign(&e)?;
        c0.add_assign(&m)?;

        let noise = XDouble::from_biguint(&t).powi(2) * (sigma * sigma * n as f64);
        Ok(Ciphertext::from_parts(
            pk,
            vec![
                CiphertextPart::new(c0, SecretKeyHandle::one()),
                CiphertextPart::new(a, SecretKeyHandle::base(0)),
            ],
            set,
            t,
            noise,
        ))
    }

    /// Centred coefficients of `Σ part · s_handle` over the ciphertext's
    /// prime set.
    fn phase(&self, ctxt: &Ciphertext<'_>) -> Result<Vec<BigInt>> {
        if !ptr::eq(ctxt.public_key(), &self.public_key) {
            return Err(HeError::ForeignCiphertext);
        }
        let ctx = self.public_key.context();
        let set = ctxt.prime_set();
        let unused = ctx.all_primes().difference(set);
        let mut acc = RnsPoly::zero(ctx, set);
        for part in ctxt.parts() {
            let mut term = part.poly().clone();
            if !part.handle().is_one() {
                let mut s = self.handle_secret(part.handle())?;
                s.remove_primes(&unused);
                term.mul_assign(&s)?;
            }
            acc.add_assign(&term)?;
        }
        Ok(acc.to_bigints_centered(ctx))
    }

    /// Recover the message, as coefficients in `[0, t)`.
    ///
    /// Works at any prime set, special primes included.
    pub fn decrypt(&self, ctxt: &Ciphertext<'_>) -> Result<IntPoly> {
        let phase = self.phase(ctxt)?;
        let ctx = self.public_key.context();
        let t = ctxt.ptxt_space();
        let f = ctx.product_of_primes(ctxt.prime_set()) % t;
        let f_inv = if f.is_one() {
            BigUint::one()
        } else {
            mod_inverse_big(&f, t)
                .ok_or_else(|| HeError::InvalidParam(format!("modulus not invertible mod {t}")))?
        };
        let t = BigInt::from(t.clone());
        let f_inv = BigInt::from(f_inv);
        let coeffs = phase.iter().map(|c| (c.mod_floor(&t) * &f_inv).mod_floor(&t)).collect();
        Ok(IntPoly { coeffs })
    }

    /// Natural log of the largest coefficient of the actual noise term,
    /// given the message the ciphertext is known to encrypt.
    pub fn measured_noise(&self, ctxt: &Ciphertext<'_>, message: &IntPoly) -> Result<f64> {
        let phase = self.phase(ctxt)?;
        let ctx = self.public_key.context();
        let t = ctxt.ptxt_space();
        let f = ctx.product_of_primes(ctxt.prime_set()) % t;
        let expected = scale_message(message, &f, t);
        let largest = phase
            .iter()
            .zip(expected.iter().chain(std::iter::repeat(&BigInt::zero())))
            .map(|(c, e)| (c - e).abs())
            .max()
            .unwrap_or_default();
        Ok(XDouble::from_biguint(largest.magnitude()).ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::presets::{compact_bgv, compact_bgv_lifted};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_public_key_round_trip() {
        let ctx = compact_bgv(17).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let sk = SecretKey::generate_with_rng(ctx.clone(), 8, &mut rng).unwrap();
        let msg = IntPoly::from_i64s(&[3, 0, 16, 5], ctx.ring_degree());
        let ct = sk.public_key().encrypt(&msg, None, &mut rng).unwrap();
        assert_eq!(ct.parts().len(), 2);
        assert!(ct.in_canonical_form(0));
        assert_eq!(sk.decrypt(&ct).unwrap(), msg);
    }

    #[test]
    fn test_symmetric_round_trip() {
        let ctx = compact_bgv(7).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let sk = SecretKey::generate_with_rng(ctx.clone(), 8, &mut rng).unwrap();
        let msg = IntPoly::from_i64s(&[1, 2, 3, 4, 5, 6], ctx.ring_degree());
        let ct = sk.encrypt_symmetric(&msg, None, &mut rng).unwrap();
        assert_eq!(sk.decrypt(&ct).unwrap(), msg);
    }

    #[test]
    fn test_negative_coefficients_wrap() {
        let ctx = compact_bgv(7).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let sk = SecretKey::generate_with_rng(ctx.clone(), 8, &mut rng).unwrap();
        let msg = IntPoly::from_i64s(&[-1, -9], ctx.ring_degree());
        let ct = sk.public_key().encrypt(&msg, None, &mut rng).unwrap();
        let expected = IntPoly::from_i64s(&[6, 5], ctx.ring_degree());
        assert_eq!(sk.decrypt(&ct).unwrap(), expected);
    }

    #[test]
    fn test_requested_space_is_reduced() {
        let ctx = compact_bgv_lifted(2, 4).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let sk = SecretKey::generate_with_rng(ctx.clone(), 8, &mut rng).unwrap();
        let msg = IntPoly::constant(ctx.ring_degree(), 3);
        let ct = sk.public_key().encrypt(&msg, Some(&BigUint::from(12u32)), &mut rng).unwrap();
        assert_eq!(ct.ptxt_space(), &BigUint::from(4u32));
        assert_eq!(sk.decrypt(&ct).unwrap(), msg);
        assert!(sk.public_key().encrypt(&msg, Some(&BigUint::from(9u32)), &mut rng).is_err());
    }

    #[test]
    fn test_measured_noise_is_small() {
        let ctx = compact_bgv(7).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let sk = SecretKey::generate_with_rng(ctx.clone(), 8, &mut rng).unwrap();
        let msg = IntPoly::constant(ctx.ring_degree(), 2);
        let ct = sk.public_key().encrypt(&msg, None, &mut rng).unwrap();
        let log_noise = sk.measured_noise(&ct, &msg).unwrap();
        assert!(log_noise > 0.0);
        assert!(log_noise < ctx.log_of_product(ctx.ctxt_primes()) / 2.0);
        // the estimate is an upper-bound style variance
        assert!(log_noise < ct.noise_var().ln());
    }

    #[test]
    fn test_high_noise_encryption() {
        let ctx = compact_bgv(17).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let sk = SecretKey::generate_with_rng(ctx.clone(), 8, &mut rng).unwrap();
        let msg = IntPoly::from_i64s(&[4, 1], ctx.ring_degree());
        let quiet = sk.public_key().encrypt(&msg, None, &mut rng).unwrap();
        let loud = sk.public_key().encrypt_high_noise(&msg, None, &mut rng).unwrap();
        assert_eq!(sk.decrypt(&loud).unwrap(), msg);

        // two 40-bit primes of flooding against a 240-bit modulus
        let measured = sk.measured_noise(&loud, &msg).unwrap();
        assert!(measured > sk.measured_noise(&quiet, &msg).unwrap() + 40.0);
        assert!(measured < ctx.log_of_product(ctx.ctxt_primes()) / 2.0);
        assert!(loud.noise_var() > quiet.noise_var());
    }

    #[test]
    fn test_raw_mod_switch_decrypts_over_new_modulus() {
        let ctx = compact_bgv(17).unwrap();
        let n = ctx.ring_degree();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let sk = SecretKey::generate_with_rng(ctx.clone(), 8, &mut rng).unwrap();
        let msg = IntPoly::from_i64s(&[5, 0, 16, 1], n);
        let ct = sk.public_key().encrypt(&msg, None, &mut rng).unwrap();

        let to = BigUint::from(1u64 << 40);
        let (parts, noise) = ct.raw_mod_switch(&to).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(noise >= ct.mod_switch_added_noise_var());

        let s = IntPoly::from_i64s(&sk.secrets[0].coeffs, n);
        let mut phase = parts[1].mul_naive(&s);
        for (p, c) in phase.coeffs.iter_mut().zip(&parts[0].coeffs) {
            *p += c;
        }
        let to_int = BigInt::from(to.clone());
        let t = BigInt::from(17);
        let scale = BigInt::from(&to % 17u32);
        for (p, m) in phase.coeffs.iter().zip(&msg.coeffs) {
            let centred = centered_mod(p, &to_int);
            assert!(centred.abs() < BigInt::from(1u64 << 20));
            assert_eq!(centred.mod_floor(&t), (m * &scale).mod_floor(&t));
        }

        assert!(matches!(ct.raw_mod_switch(&BigUint::from(34u32)), Err(HeError::InvalidParam(_))));
        assert!(ct.raw_mod_switch(&BigUint::one()).is_err());
    }
}
