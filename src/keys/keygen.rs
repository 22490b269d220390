use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::One;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;
use zeroize::Zeroize;

use super::{KeySwitchMatrix, PublicKey};
use crate::ctxt::SecretKeyHandle;
use crate::error::{HeError, Result};
use crate::noise::XDouble;
use crate::params::RingContext;
use crate::random::{derive_masks, RandomStream};
use crate::ring::modular::mod_pow;
use crate::ring::RnsPoly;
use crate::sampling::{sample_gaussian_coeffs, sample_sparse_ternary};

/// One sparse ternary secret, kept both as small integers and in RNS form
/// over every prime of the chain.
pub(super) struct SecretPoly {
    pub(super) coeffs: Vec<i64>,
    pub(super) poly: RnsPoly,
    pub(super) weight: usize,
}

impl SecretPoly {
    fn sample<R: Rng>(ctx: &RingContext, weight: usize, rng: &mut R) -> Result<Self> {
        let n = ctx.ring_degree();
        if weight == 0 || weight > n {
            return Err(HeError::InvalidParam(format!("secret weight {weight} outside 1..={n}")));
        }
        let coeffs = sample_sparse_ternary(n, weight, rng);
        let poly = RnsPoly::from_small_coeffs(&coeffs, ctx, &ctx.all_primes())?;
        Ok(Self { coeffs, poly, weight })
    }
}

impl Drop for SecretPoly {
    fn drop(&mut self) {
        self.coeffs.zeroize();
        self.poly.zeroize();
    }
}

/// Secret keys of a session together with the public key they publish.
///
/// Key 0 is generated with the public encryption key; further keys come from
/// [`SecretKey::gen_secret`] and are only reachable through switching matrices.
pub struct SecretKey {
    pub(super) public_key: PublicKey,
    pub(super) secrets: Vec<SecretPoly>,
}

impl SecretKey {
    /// Generate key 0 and the public encryption key with an OS-seeded RNG.
    pub fn generate(ctx: Arc<RingContext>, weight: usize) -> Result<Self> {
        let mut rng = ChaCha20Rng::from_os_rng();
        Self::generate_with_rng(ctx, weight, &mut rng)
    }

    /// Generate with a provided RNG (for deterministic testing).
    ///
    /// The encryption key is `(b, a)` with `b = -a·s + t·e` over the
    /// ciphertext primes.
    pub fn generate_with_rng<R: Rng>(ctx: Arc<RingContext>, weight: usize, rng: &mut R) -> Result<Self> {
        let secret = SecretPoly::sample(&ctx, weight, rng)?;
        let set = ctx.ctxt_primes().clone();
        let t = ctx.ptxt_space().clone();
        let n = ctx.ring_degree();
        let sigma = ctx.stdev();

        let mut s = secret.poly.clone();
        s.remove_primes(ctx.special_primes());
        let a = RnsPoly::uniform(&ctx, &set, rng);
        let mut e = RnsPoly::from_small_coeffs(&sample_gaussian_coeffs(n, sigma, rng), &ctx, &set)?;
        e.scale_by(&t);

        // b = -a·s + t·e
        let mut b = a.clone();
        b.mul_assign(&s)?;
        b.neg_assign();
        b.add_assign(&e)?;
        s.zeroize();

        let noise = XDouble::from_biguint(&t).powi(2) * (sigma * sigma * n as f64);
        debug!(n, weight, "generated secret key 0 and encryption key");
        let public_key = PublicKey::new(ctx, (b, a), noise, weight);
        Ok(Self { public_key, secrets: vec![secret] })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn context(&self) -> &RingContext {
        self.public_key.context()
    }

    pub fn num_keys(&self) -> usize {
        self.secrets.len()
    }

    /// Add another secret of the given weight; returns its key id.
    pub fn gen_secret<R: Rng>(&mut self, weight: usize, rng: &mut R) -> Result<usize> {
        let secret = SecretPoly::sample(self.public_key.context(), weight, rng)?;
        self.secrets.push(secret);
        let id = self.public_key.add_weight(weight);
        debug!(key_id = id, weight, "generated secret key");
        Ok(id)
    }

    /// `s_id(X^x)^d` for `handle = (d, x, id)` over every prime of the chain.
    pub(super) fn handle_secret(&self, handle: &SecretKeyHandle) -> Result<RnsPoly> {
        let ctx = self.public_key.context();
        if handle.is_one() {
            return RnsPoly::constant(&BigInt::one(), ctx, &ctx.all_primes());
        }
        let secret = self
            .secrets
            .get(handle.key_id())
            .ok_or_else(|| HeError::MissingKey(format!("secret key {}", handle.key_id())))?;
        let mut base = secret.poly.clone();
        if handle.power_of_x() != 1 {
            base.automorph(handle.power_of_x())?;
        }
        let mut out = base.clone();
        for _ in 1..handle.power_of_s() {
            out.mul_assign(&base)?;
        }
        base.zeroize();
        Ok(out)
    }

    /// Publish a matrix switching `from` to `s_{to_key_id}`. Requests for the
    /// trivial handles, or for a matrix that already exists, are no-ops.
    pub fn gen_key_switch_matrix<R: Rng>(
        &mut self,
        from: SecretKeyHandle,
        to_key_id: usize,
        rng: &mut R,
    ) -> Result<()> {
        if from.is_one() || from.is_base(to_key_id) {
            return Ok(());
        }
        if self.public_key.key_switch_matrix(&from, to_key_id).is_some() {
            return Ok(());
        }
        let ctx = Arc::clone(self.public_key.context_arc());
        let n = ctx.ring_degree();
        let sigma = ctx.stdev();
        let all = ctx.all_primes();
        let t = self.public_key.ptxt_space().clone();

        let s_to = &self
            .secrets
            .get(to_key_id)
            .ok_or_else(|| HeError::MissingKey(format!("secret key {to_key_id}")))?
            .poly;
        let mut s_from = self.handle_secret(&from)?;

        let prg_seed: u64 = rng.random();
        let mut stream = RandomStream::from_seed(prg_seed);
        let masks = derive_masks(&ctx, prg_seed, ctx.digits().len(), &mut stream);

        let mut gadget = ctx.product_of_primes(ctx.special_primes());
        let mut rows = Vec::with_capacity(masks.len());
        for (digit, mask) in ctx.digits().iter().zip(&masks) {
            let mut row = s_from.clone();
            row.scale_by(&gadget);
            let mut masked = mask.clone();
            masked.mul_assign(s_to)?;
            row.sub_assign(&masked)?;
            let mut e = RnsPoly::from_small_coeffs(&sample_gaussian_coeffs(n, sigma, rng), &ctx, &all)?;
            e.scale_by(&t);
            row.add_assign(&e)?;
            rows.push(row);
            gadget *= ctx.product_of_primes(digit);
        }
        s_from.zeroize();

        debug!(from = %from, to = to_key_id, rows = rows.len(), "generated key-switching matrix");
        self.public_key.push_matrix(KeySwitchMatrix {
            from_handle: from,
            to_key_id,
            b: rows,
            prg_seed,
            ptxt_space: t,
        });
        Ok(())
    }

    /// Matrix for `s_key^2 -> s_key`.
    pub fn gen_relin_matrix<R: Rng>(&mut self, key_id: usize, rng: &mut R) -> Result<()> {
        self.gen_key_switch_matrix(SecretKeyHandle::new(2, 1, key_id), key_id, rng)
    }

    /// Matrix for `s_key(X^k) -> s_key`.
    pub fn gen_automorph_matrix<R: Rng>(&mut self, k: usize, key_id: usize, rng: &mut R) -> Result<()> {
        let ctx = self.public_key.context();
        let m = ctx.m();
        let k = k % m;
        if !ctx.in_zm_star(k) {
            return Err(HeError::InvalidParam(format!("{k} is not a unit mod {m}")));
        }
        self.gen_key_switch_matrix(SecretKeyHandle::new(1, k, key_id), key_id, rng)
    }

    /// Automorphism matrices for every non-trivial power of the Frobenius map.
    pub fn gen_frobenius_matrices<R: Rng>(&mut self, key_id: usize, rng: &mut R) -> Result<()> {
        let ctx = self.public_key.context();
        let m = ctx.m() as u64;
        let p = ctx.p() % m;
        let d = ctx
            .ord_p()
            .ok_or_else(|| HeError::InvalidParam(format!("{} is not a unit mod {m}", ctx.p())))?;
        for j in 1..d {
            let k = mod_pow(p, j as u64, m) as usize;
            self.gen_automorph_matrix(k, key_id, rng)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::presets::compact_bgv;

    fn setup() -> SecretKey {
        let ctx = compact_bgv(7).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        SecretKey::generate_with_rng(ctx, 8, &mut rng).unwrap()
    }

    #[test]
    fn test_secret_weight() {
        let sk = setup();
        assert_eq!(sk.secrets[0].coeffs.iter().filter(|&&c| c != 0).count(), 8);
        assert_eq!(sk.public_key().secret_key_weight(0), Some(8));
        assert_eq!(sk.public_key().secret_key_weight(1), None);
    }

    #[test]
    fn test_matrix_lookup_and_dedup() {
        let mut sk = setup();
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        sk.gen_relin_matrix(0, &mut rng).unwrap();
        sk.gen_relin_matrix(0, &mut rng).unwrap();
        let pk = sk.public_key();
        assert_eq!(pk.matrices().len(), 1);
        let w = pk.key_switch_matrix(&SecretKeyHandle::new(2, 1, 0), 0).unwrap();
        assert_eq!(w.b.len(), pk.context().digits().len());
        assert_eq!(w.b[0].index_set(), pk.context().all_primes());
        assert!(pk.key_switch_matrix(&SecretKeyHandle::new(2, 1, 0), 1).is_none());
        assert!(pk.any_key_switch_matrix(&SecretKeyHandle::new(2, 1, 0)).is_some());
    }

    #[test]
    fn test_reachability_closure() {
        let mut sk = setup();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let m = sk.context().m();
        sk.gen_automorph_matrix(3, 0, &mut rng).unwrap();
        let pk = sk.public_key();
        // 3 generates a cyclic subgroup of Z_m*; its powers are reachable
        let mut k = 3;
        for _ in 0..5 {
            assert!(pk.is_reachable(k, 0));
            k = (k * 3) % m;
        }
        assert!(pk.is_reachable(1, 0));
        assert!(!pk.is_reachable(m - 1, 0));
        assert!(!pk.is_reachable(3, 1));
        assert_eq!(pk.next_matrix(9, 0).unwrap().from_handle.power_of_x(), 3);
    }

    #[test]
    fn test_bad_automorphism_rejected() {
        let mut sk = setup();
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        assert!(sk.gen_automorph_matrix(4, 0, &mut rng).is_err());
        assert!(sk.gen_key_switch_matrix(SecretKeyHandle::new(2, 1, 3), 3, &mut rng).is_err());
    }

    #[test]
    fn test_second_key() {
        let mut sk = setup();
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let id = sk.gen_secret(4, &mut rng).unwrap();
        assert_eq!(id, 1);
        assert_eq!(sk.num_keys(), 2);
        sk.gen_key_switch_matrix(SecretKeyHandle::base(1), 0, &mut rng).unwrap();
        assert!(sk.public_key().key_switch_matrix(&SecretKeyHandle::base(1), 0).is_some());
        assert!(sk.gen_secret(0, &mut rng).is_err());
    }
}
