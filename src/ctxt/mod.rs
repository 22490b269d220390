//! Ciphertexts of the levelled scheme and the algebra on them.
//!
//! A [`Ciphertext`] is a list of [`CiphertextPart`]s, each an RNS polynomial
//! tagged with the secret-key monomial it decrypts against. Decryption of a
//! ciphertext over modulus Q yields `Q·m mod t`; every operation here keeps
//! that scaling invariant while tracking a heuristic noise variance.

mod arith;
mod batch;
mod keyswitch;
mod modswitch;
mod serialize;

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::One;
use tracing::info;

use crate::error::{HeError, Result};
use crate::keys::PublicKey;
use crate::noise::XDouble;
use crate::params::RingContext;
use crate::ring::modular::centered_mod;
use crate::ring::{IndexSet, IntPoly, RnsPoly};

pub use batch::{incremental_product, inner_product, inner_product_const, inner_product_const_rns};
pub(crate) use modswitch::prime_set_is_valid;

static NEXT_VALUE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn fresh_value_id() -> u64 {
    NEXT_VALUE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Secret-key monomial `s_id(X^x)^d` that a ciphertext part is paired with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SecretKeyHandle {
    power_of_s: u32,
    power_of_x: usize,
    key_id: usize,
}

impl SecretKeyHandle {
    pub fn new(power_of_s: u32, power_of_x: usize, key_id: usize) -> Self {
        Self { power_of_s, power_of_x, key_id }
    }

    /// The constant term.
    pub fn one() -> Self {
        Self::new(0, 1, 0)
    }

    /// `s_id` itself.
    pub fn base(key_id: usize) -> Self {
        Self::new(1, 1, key_id)
    }

    pub fn power_of_s(&self) -> u32 {
        self.power_of_s
    }

    pub fn power_of_x(&self) -> usize {
        self.power_of_x
    }

    pub fn key_id(&self) -> usize {
        self.key_id
    }

    pub fn is_one(&self) -> bool {
        self.power_of_s == 0
    }

    pub fn is_base(&self, key_id: usize) -> bool {
        self.power_of_s == 1 && self.power_of_x == 1 && self.key_id == key_id
    }

    /// Symbolic product, defined when one side is the constant term or both
    /// are un-rotated powers of the same key.
    pub fn mul(&self, other: &Self) -> Option<Self> {
        if self.is_one() {
            return Some(*other);
        }
        if other.is_one() {
            return Some(*self);
        }
        if self.key_id != other.key_id || self.power_of_x != 1 || other.power_of_x != 1 {
            return None;
        }
        Some(Self::new(self.power_of_s + other.power_of_s, 1, self.key_id))
    }

    pub(crate) fn set_power_of_x(&mut self, x: usize) {
        self.power_of_x = x;
    }
}

impl Default for SecretKeyHandle {
    fn default() -> Self {
        Self::one()
    }
}

impl fmt::Display for SecretKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.power_of_s, self.power_of_x, self.key_id)
    }
}

/// One RNS polynomial and the key monomial it pairs with.
#[derive(Clone, Debug, PartialEq)]
pub struct CiphertextPart {
    pub(crate) poly: RnsPoly,
    pub(crate) handle: SecretKeyHandle,
}

impl CiphertextPart {
    pub fn new(poly: RnsPoly, handle: SecretKeyHandle) -> Self {
        Self { poly, handle }
    }

    pub fn poly(&self) -> &RnsPoly {
        &self.poly
    }

    pub fn handle(&self) -> &SecretKeyHandle {
        &self.handle
    }

    pub fn index_set(&self) -> IndexSet {
        self.poly.index_set()
    }
}

/// A ciphertext bound to the context and public key of one evaluation session.
///
/// Invariants kept by every operation:
/// - every part lives over exactly `prime_set`;
/// - `prime_set` holds all special primes or none, and its ciphertext primes
///   form an interval starting at 0 or 1;
/// - handles are unique within `parts`;
/// - `ptxt_space` divides the key's plaintext space.
///
/// Cloning copies every part and keeps the value id, so a clone is recognised
/// as the same logical value by squaring and the aliasing corrections of
/// [`Ciphertext::multiply_by2`].
#[derive(Clone, Debug)]
pub struct Ciphertext<'a> {
    context: &'a RingContext,
    public_key: &'a PublicKey,
    parts: Vec<CiphertextPart>,
    prime_set: IndexSet,
    ptxt_space: BigUint,
    noise_var: XDouble,
    value_id: u64,
}

impl<'a> Ciphertext<'a> {
    /// An empty ciphertext over the full ciphertext-prime set.
    ///
    /// `ptxt_space` defaults to the key's and must otherwise share a factor
    /// with it.
    pub fn new(public_key: &'a PublicKey, ptxt_space: Option<&BigUint>) -> Result<Self> {
        let context = public_key.context();
        let key_space = public_key.ptxt_space();
        let ptxt_space = match ptxt_space {
            None => key_space.clone(),
            Some(t) => {
                if t.gcd(key_space) <= BigUint::one() {
                    return Err(HeError::IncompatiblePlaintextSpace(t.clone(), key_space.clone()));
                }
                t.clone()
            }
        };
        Ok(Self {
            context,
            public_key,
            parts: Vec::new(),
            prime_set: context.ctxt_primes().clone(),
            ptxt_space,
            noise_var: XDouble::ZERO,
            value_id: fresh_value_id(),
        })
    }

    pub(crate) fn from_parts(
        public_key: &'a PublicKey,
        parts: Vec<CiphertextPart>,
        prime_set: IndexSet,
        ptxt_space: BigUint,
        noise_var: XDouble,
    ) -> Self {
        Self {
            context: public_key.context(),
            public_key,
            parts,
            prime_set,
            ptxt_space,
            noise_var,
            value_id: fresh_value_id(),
        }
    }

    pub fn context(&self) -> &'a RingContext {
        self.context
    }

    pub fn public_key(&self) -> &'a PublicKey {
        self.public_key
    }

    pub fn parts(&self) -> &[CiphertextPart] {
        &self.parts
    }

    pub fn prime_set(&self) -> &IndexSet {
        &self.prime_set
    }

    pub fn ptxt_space(&self) -> &BigUint {
        &self.ptxt_space
    }

    pub fn noise_var(&self) -> XDouble {
        self.noise_var
    }

    pub fn value_id(&self) -> u64 {
        self.value_id
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Drop all parts and return to the full ciphertext-prime set.
    pub fn clear(&mut self) {
        self.parts.clear();
        self.prime_set = self.context.ctxt_primes().clone();
        self.noise_var = XDouble::ZERO;
        self.value_id = fresh_value_id();
    }

    /// Encode `ptxt` as a noiseless one-part ciphertext.
    ///
    /// `size` is the noise variance to record; it defaults to φ·t²/12.
    pub fn dummy_encrypt(&mut self, ptxt: &IntPoly, size: Option<f64>) -> Result<()> {
        let ctx = self.context;
        let noise = match size {
            Some(s) => XDouble::from_f64(s),
            None => XDouble::from_biguint(&self.ptxt_space).powi(2) * (ctx.phi_m() as f64 / 12.0),
        };
        let set = ctx.ctxt_primes().clone();
        let t = BigInt::from(self.ptxt_space.clone());
        let factor = BigInt::from(ctx.product_of_primes(&set) % &self.ptxt_space);
        let scaled: Vec<BigInt> = if factor.is_one() {
            ptxt.coeffs.clone()
        } else {
            ptxt.coeffs.iter().map(|c| centered_mod(&(c * &factor), &t)).collect()
        };
        let poly = RnsPoly::from_bigints(&scaled, ctx, &set)?;

        self.parts = vec![CiphertextPart::new(poly, SecretKeyHandle::one())];
        self.prime_set = set;
        self.noise_var = noise;
        self.value_id = fresh_value_id();
        Ok(())
    }

    /// Replace the plaintext space by `gcd(t, new_space)`.
    pub fn reduce_ptxt_space(&mut self, new_space: &BigUint) -> Result<()> {
        let g = self.ptxt_space.gcd(new_space);
        if g <= BigUint::one() {
            return Err(HeError::IncompatiblePlaintextSpace(self.ptxt_space.clone(), new_space.clone()));
        }
        self.ptxt_space = g;
        Ok(())
    }

    /// Key id of the first part that is not the constant term.
    pub fn key_id(&self) -> Option<usize> {
        self.parts.iter().find(|p| !p.handle.is_one()).map(|p| p.handle.key_id)
    }

    /// True when the parts are exactly `[1, s_key]` (or a prefix of it).
    pub fn in_canonical_form(&self, key_id: usize) -> bool {
        if self.parts.len() > 2 {
            return false;
        }
        if let Some(first) = self.parts.first() {
            if !first.handle.is_one() {
                return false;
            }
        }
        if let Some(second) = self.parts.get(1) {
            if !second.handle.is_base(key_id) {
                return false;
            }
        }
        true
    }

    /// Current level: one per ciphertext prime, or two per prime when the
    /// first prime is half-size.
    pub fn level(&self) -> usize {
        level_of(self.context, &self.prime_set)
    }

    /// ln(noise standard deviation) − ln(modulus).
    pub fn log_of_ratio(&self) -> f64 {
        let log_noise = if self.noise_var.is_zero() { 0.0 } else { self.noise_var.ln() / 2.0 };
        let log_mod = if self.prime_set.is_empty() {
            0.0
        } else {
            self.context.log_of_product(&self.prime_set)
        };
        log_noise - log_mod
    }

    pub fn log_status(&self, label: &str) {
        info!(
            label,
            level = self.find_base_level(),
            log_noise = self.noise_var.ln() / 2.0,
            log_ratio = self.log_of_ratio(),
            "ciphertext status"
        );
    }

    /// Structural comparison; noise is compared within ±10%.
    pub fn equals_to(&self, other: &Ciphertext<'_>, compare_public_keys: bool) -> bool {
        if !ptr::eq(self.context, other.context) {
            return false;
        }
        if compare_public_keys && !ptr::eq(self.public_key, other.public_key) {
            return false;
        }
        if self.parts != other.parts
            || self.prime_set != other.prime_set
            || self.ptxt_space != other.ptxt_space
        {
            return false;
        }
        if self.noise_var.is_zero() {
            return other.noise_var.is_zero();
        }
        let ratio = (other.noise_var / self.noise_var).to_f64();
        ratio > 0.9 && ratio < 1.1
    }

    pub fn verify_prime_set(&self) -> bool {
        prime_set_is_valid(self.context, &self.prime_set)
    }

    /// Canonicalise every residue; no change in value.
    pub fn reduce(&mut self) {
        for part in &mut self.parts {
            part.poly.reduce();
        }
    }

    pub(crate) fn check_same_session(&self, other: &Ciphertext<'_>) -> Result<()> {
        if !ptr::eq(self.context, other.context) || !ptr::eq(self.public_key, other.public_key) {
            return Err(HeError::ForeignCiphertext);
        }
        Ok(())
    }

    pub(crate) fn part_index(&self, handle: &SecretKeyHandle) -> Option<usize> {
        self.parts.iter().position(|p| p.handle == *handle)
    }

    pub(crate) fn refresh_value_id(&mut self) {
        self.value_id = fresh_value_id();
    }
}

pub(crate) fn level_of(ctx: &RingContext, set: &IndexSet) -> usize {
    let current = set.intersection(ctx.ctxt_primes());
    if ctx.contains_small_prime() {
        2 * current.len() - usize::from(current.contains(0))
    } else {
        current.len()
    }
}
