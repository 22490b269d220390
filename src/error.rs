use num_bigint::BigUint;
use thiserror::Error;

use crate::ctxt::SecretKeyHandle;
use crate::ring::IndexSet;

#[derive(Debug, Error)]
pub enum HeError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("modulus mismatch")]
    ModulusMismatch,

    #[error("ring degree must be a power of 2 and at least 16, got {0}")]
    InvalidRingDegree(usize),

    #[error("index sets differ: {left} vs {right}")]
    IndexSetMismatch { left: IndexSet, right: IndexSet },

    #[error("plaintext spaces {0} and {1} are incompatible (gcd = 1)")]
    IncompatiblePlaintextSpace(BigUint, BigUint),

    #[error("ciphertexts belong to different contexts or public keys")]
    ForeignCiphertext,

    #[error("mod-down from {from} to {to} would leave no primes")]
    EmptyModDown { from: IndexSet, to: IndexSet },

    #[error("cannot encode the product of handles {0} and {1}")]
    HandleProduct(SecretKeyHandle, SecretKeyHandle),

    #[error("key not available: {0}")]
    MissingKey(String),

    #[error("automorphism X -> X^{k} is not reachable for key {key_id}")]
    UnreachableAutomorphism { k: usize, key_id: usize },

    #[error("key-switching noise {key_switch:.2} (log) exceeds mod-switch noise {mod_switch:.2} (log)")]
    NoiseBudget { key_switch: f64, mod_switch: f64 },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("malformed ciphertext text: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, HeError>;
