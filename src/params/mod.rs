pub mod presets;

use std::sync::Arc;

use concrete_ntt::prime64::Plan;
use num_bigint::BigUint;
use num_traits::One;
use tracing::debug;

use crate::error::{HeError, Result};
use crate::ring::modular::{is_prime, mult_order, next_ntt_prime};
use crate::ring::ntt::make_plan;
use crate::ring::IndexSet;

/// Default multiplier on `ln(mod_switch_added_noise_var)` giving the noise
/// threshold of `find_base_set`. Tunable per context; the analytical value is 0.5.
pub const DEFAULT_BASE_SET_NOISE_FACTOR: f64 = 0.55;

const MAX_SPECIAL_PRIME_BITS: f64 = 50.0;

/// One prime of the modulus chain together with its NTT plan.
#[derive(Clone, Debug)]
pub struct Modulus {
    pub value: u64,
    pub plan: Arc<Plan>,
    pub log: f64,
}

/// Immutable per-session ring parameters and modulus chain.
///
/// The ring is Z[X]/(X^n + 1), i.e. the m-th cyclotomic ring with m = 2n and
/// φ(m) = n. Prime indices `0..L` are the ciphertext primes, the remaining
/// indices are the special primes that only appear during key switching.
#[derive(Debug)]
pub struct RingContext {
    ring_degree: usize,
    p: u64,
    r: u32,
    ptxt_space: BigUint,
    ord_p: Option<usize>,
    moduli: Vec<Modulus>,
    ctxt_primes: IndexSet,
    special_primes: IndexSet,
    digits: Vec<IndexSet>,
    small_prime: bool,
    stdev: f64,
    ring_constant: f64,
    base_set_noise_factor: f64,
}

impl RingContext {
    pub fn ring_degree(&self) -> usize {
        self.ring_degree
    }

    /// Cyclotomic index m = 2n.
    pub fn m(&self) -> usize {
        2 * self.ring_degree
    }

    pub fn phi_m(&self) -> usize {
        self.ring_degree
    }

    /// Base prime of the plaintext space.
    pub fn p(&self) -> u64 {
        self.p
    }

    pub fn r(&self) -> u32 {
        self.r
    }

    /// p^r
    pub fn ptxt_space(&self) -> &BigUint {
        &self.ptxt_space
    }

    /// Multiplicative order of p in Z_m^*, or `None` when p divides m.
    pub fn ord_p(&self) -> Option<usize> {
        self.ord_p
    }

    pub fn num_primes(&self) -> usize {
        self.moduli.len()
    }

    pub fn modulus(&self, i: usize) -> &Modulus {
        &self.moduli[i]
    }

    pub fn prime(&self, i: usize) -> u64 {
        self.moduli[i].value
    }

    pub fn log_of_prime(&self, i: usize) -> f64 {
        self.moduli[i].log
    }

    /// Natural log of the product of the primes in `set`.
    pub fn log_of_product(&self, set: &IndexSet) -> f64 {
        set.iter().map(|i| self.moduli[i].log).sum()
    }

    pub fn product_of_primes(&self, set: &IndexSet) -> BigUint {
        set.iter().fold(BigUint::one(), |acc, i| acc * self.moduli[i].value)
    }

    pub fn ctxt_primes(&self) -> &IndexSet {
        &self.ctxt_primes
    }

    pub fn special_primes(&self) -> &IndexSet {
        &self.special_primes
    }

    pub fn all_primes(&self) -> IndexSet {
        self.ctxt_primes.union(&self.special_primes)
    }

    /// Contiguous groups of ciphertext primes used by key-switching digits.
    pub fn digits(&self) -> &[IndexSet] {
        &self.digits
    }

    /// Whether prime 0 is a half-size prime (two levels per prime).
    pub fn contains_small_prime(&self) -> bool {
        self.small_prime
    }

    pub fn stdev(&self) -> f64 {
        self.stdev
    }

    pub fn ring_constant(&self) -> f64 {
        self.ring_constant
    }

    pub fn base_set_noise_factor(&self) -> f64 {
        self.base_set_noise_factor
    }

    /// Membership test for the Galois group Z_m^* (odd residues mod 2n).
    pub fn in_zm_star(&self, k: usize) -> bool {
        k < self.m() && k % 2 == 1
    }
}

/// Builder for [`RingContext`].
pub struct RingContextBuilder {
    ring_degree: usize,
    plaintext_prime: u64,
    hensel_lifting: u32,
    ctxt_primes: usize,
    prime_bits: u32,
    digits: usize,
    small_first_prime: bool,
    stdev: f64,
    ring_constant: f64,
    base_set_noise_factor: f64,
}

impl Default for RingContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RingContextBuilder {
    pub fn new() -> Self {
        Self {
            ring_degree: 32,
            plaintext_prime: 2,
            hensel_lifting: 1,
            ctxt_primes: 4,
            prime_bits: 40,
            digits: 2,
            small_first_prime: false,
            stdev: 3.2,
            ring_constant: 1.0,
            base_set_noise_factor: DEFAULT_BASE_SET_NOISE_FACTOR,
        }
    }

    pub fn ring_degree(mut self, n: usize) -> Self {
        self.ring_degree = n;
        self
    }

    pub fn plaintext_prime(mut self, p: u64) -> Self {
        self.plaintext_prime = p;
        self
    }

    /// Plaintext space is p^r.
    pub fn hensel_lifting(mut self, r: u32) -> Self {
        self.hensel_lifting = r;
        self
    }

    pub fn ctxt_primes(mut self, count: usize) -> Self {
        self.ctxt_primes = count;
        self
    }

    pub fn prime_bits(mut self, bits: u32) -> Self {
        self.prime_bits = bits;
        self
    }

    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    pub fn small_first_prime(mut self, enabled: bool) -> Self {
        self.small_first_prime = enabled;
        self
    }

    pub fn stdev(mut self, sigma: f64) -> Self {
        self.stdev = sigma;
        self
    }

    pub fn ring_constant(mut self, c: f64) -> Self {
        self.ring_constant = c;
        self
    }

    pub fn base_set_noise_factor(mut self, factor: f64) -> Self {
        self.base_set_noise_factor = factor;
        self
    }

    pub fn build(self) -> Result<Arc<RingContext>> {
        let n = self.ring_degree;
        if !n.is_power_of_two() || n < 16 {
            return Err(HeError::InvalidRingDegree(n));
        }
        if !is_prime(self.plaintext_prime) {
            return Err(HeError::InvalidParam(format!(
                "plaintext base {} is not prime",
                self.plaintext_prime
            )));
        }
        if self.hensel_lifting == 0 {
            return Err(HeError::InvalidParam("Hensel lifting exponent must be >= 1".into()));
        }
        if self.ctxt_primes == 0 {
            return Err(HeError::InvalidParam("need at least one ciphertext prime".into()));
        }
        if self.digits == 0 || self.digits > self.ctxt_primes {
            return Err(HeError::InvalidParam(format!(
                "digit count {} must lie in 1..={}",
                self.digits, self.ctxt_primes
            )));
        }
        if !(20..=60).contains(&self.prime_bits) {
            return Err(HeError::InvalidParam(format!(
                "prime size {} bits outside 20..=60",
                self.prime_bits
            )));
        }
        if self.stdev <= 0.0 || self.ring_constant <= 0.0 || self.base_set_noise_factor <= 0.0 {
            return Err(HeError::InvalidParam("stdev, ring constant and noise factor must be positive".into()));
        }

        let mut values: Vec<u64> = Vec::new();
        let pick = |bits: u32, values: &mut Vec<u64>| -> Result<u64> {
            let q = next_ntt_prime(bits, n, values).ok_or_else(|| {
                HeError::InvalidParam(format!("no {bits}-bit prime ≡ 1 mod {}", 2 * n))
            })?;
            values.push(q);
            Ok(q)
        };

        for i in 0..self.ctxt_primes {
            let bits = if i == 0 && self.small_first_prime {
                self.prime_bits / 2
            } else {
                self.prime_bits
            };
            pick(bits, &mut values)?;
        }

        let digits = split_into_digits(self.ctxt_primes, self.digits);
        let max_digit_bits = digits
            .iter()
            .map(|d| d.iter().map(|i| (values[i] as f64).log2()).sum::<f64>())
            .fold(0.0f64, f64::max);
        // P must exceed sqrt(3·digits)·σ·max|digit| for the key-switch sanity check
        let need_bits = max_digit_bits
            + self.stdev.log2()
            + 0.5 * (3.0 * digits.len() as f64).log2()
            + 2.0;
        let special_count = (need_bits / MAX_SPECIAL_PRIME_BITS).ceil().max(1.0) as usize;
        let special_bits = ((need_bits / special_count as f64).ceil() as u32 + 1).clamp(20, 60);
        for _ in 0..special_count {
            pick(special_bits, &mut values)?;
        }

        let moduli = values
            .iter()
            .map(|&q| {
                Ok(Modulus { value: q, plan: make_plan(n, q)?, log: (q as f64).ln() })
            })
            .collect::<Result<Vec<_>>>()?;

        let ctxt_primes = IndexSet::interval(0, self.ctxt_primes - 1);
        let special_primes = IndexSet::interval(self.ctxt_primes, self.ctxt_primes + special_count - 1);
        let m = 2 * n as u64;
        let ord_p = mult_order(self.plaintext_prime % m, m);
        let ptxt_space = BigUint::from(self.plaintext_prime).pow(self.hensel_lifting);

        debug!(
            n,
            ctxt = self.ctxt_primes,
            special = special_count,
            special_bits,
            "built modulus chain"
        );

        Ok(Arc::new(RingContext {
            ring_degree: n,
            p: self.plaintext_prime,
            r: self.hensel_lifting,
            ptxt_space,
            ord_p,
            moduli,
            ctxt_primes,
            special_primes,
            digits,
            small_prime: self.small_first_prime,
            stdev: self.stdev,
            ring_constant: self.ring_constant,
            base_set_noise_factor: self.base_set_noise_factor,
        }))
    }
}

/// Split `0..count` into `parts` contiguous groups, the first ones one larger.
fn split_into_digits(count: usize, parts: usize) -> Vec<IndexSet> {
    let base = count / parts;
    let extra = count % parts;
    let mut start = 0;
    (0..parts)
        .map(|d| {
            let len = base + usize::from(d < extra);
            let set = IndexSet::interval(start, start + len - 1);
            start += len;
            set
        })
        .collect()
}
