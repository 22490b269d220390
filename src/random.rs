//! Pseudorandom stream shared between key-switching matrix generation and
//! key switching itself.
//!
//! A matrix stores only a seed for its uniform half. Whoever consumes that
//! half re-derives it by reseeding a stream, drawing the masks in order, and
//! then handing the stream back in the state it was in before.

use std::ops::{Deref, DerefMut};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::params::RingContext;
use crate::ring::RnsPoly;

#[derive(Clone, Debug)]
pub struct RandomStream {
    rng: ChaCha20Rng,
}

impl RandomStream {
    pub fn from_seed(seed: u64) -> Self {
        Self { rng: ChaCha20Rng::seed_from_u64(seed) }
    }

    pub fn from_os_rng() -> Self {
        Self { rng: ChaCha20Rng::from_os_rng() }
    }

    pub fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }

    /// Swap in a stream seeded from `seed` until the guard is dropped.
    pub fn reseeded(&mut self, seed: u64) -> ReseededStream<'_> {
        let saved = std::mem::replace(&mut self.rng, ChaCha20Rng::seed_from_u64(seed));
        ReseededStream { stream: self, saved: Some(saved) }
    }
}

/// Scoped reseed of a [`RandomStream`]; restores the prior state on drop.
pub struct ReseededStream<'s> {
    stream: &'s mut RandomStream,
    saved: Option<ChaCha20Rng>,
}

impl Deref for ReseededStream<'_> {
    type Target = ChaCha20Rng;

    fn deref(&self) -> &ChaCha20Rng {
        &self.stream.rng
    }
}

impl DerefMut for ReseededStream<'_> {
    fn deref_mut(&mut self) -> &mut ChaCha20Rng {
        &mut self.stream.rng
    }
}

impl Drop for ReseededStream<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.stream.rng = saved;
        }
    }
}

/// The `count` uniform masks of a key-switching matrix with seed `seed`.
///
/// Masks always span every prime of the chain so that the draw sequence does
/// not depend on the prime set of the part being switched.
pub fn derive_masks(
    ctx: &RingContext,
    seed: u64,
    count: usize,
    stream: &mut RandomStream,
) -> Vec<RnsPoly> {
    let all = ctx.all_primes();
    let mut guard = stream.reseeded(seed);
    (0..count).map(|_| RnsPoly::uniform(ctx, &all, &mut *guard)).collect()
}
