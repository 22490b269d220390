use std::sync::Arc;

use crate::error::Result;
use crate::params::{RingContext, RingContextBuilder};

/// Compact chain for fast tests and examples.
/// n=32, six 40-bit ciphertext primes in three digits, plaintext space `p`.
pub fn compact_bgv(p: u64) -> Result<Arc<RingContext>> {
    RingContextBuilder::new()
        .ring_degree(32)
        .plaintext_prime(p)
        .ctxt_primes(6)
        .prime_bits(40)
        .digits(3)
        .stdev(3.2)
        .build()
}

/// As [`compact_bgv`] but over Z_{p^r}.
pub fn compact_bgv_lifted(p: u64, r: u32) -> Result<Arc<RingContext>> {
    RingContextBuilder::new()
        .ring_degree(32)
        .plaintext_prime(p)
        .hensel_lifting(r)
        .ctxt_primes(6)
        .prime_bits(40)
        .digits(3)
        .stdev(3.2)
        .build()
}

/// Chain whose first prime is roughly half-size, exercising the small-prime
/// level rules. n=64, eight ciphertext primes of 36 bits (the first 18 bits).
pub fn halfsize_bgv(p: u64) -> Result<Arc<RingContext>> {
    RingContextBuilder::new()
        .ring_degree(64)
        .plaintext_prime(p)
        .ctxt_primes(8)
        .prime_bits(36)
        .small_first_prime(true)
        .digits(4)
        .stdev(3.2)
        .build()
}
