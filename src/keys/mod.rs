//! Key material: public key with key-switching matrices, and the secret key
//! that generates them.

mod encrypt;
mod keygen;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use num_bigint::BigUint;

use crate::ctxt::SecretKeyHandle;
use crate::noise::XDouble;
use crate::params::RingContext;
use crate::ring::RnsPoly;

pub use keygen::SecretKey;

/// Switches a part paired with `from_handle` to one paired with `s_{to_key_id}`.
///
/// Row `i` is `b_i = -a_i·s_to + t·e_i + P·G_i·s_from` over every prime of the
/// chain, where P is the special-prime product and `G_i` the product of the
/// digits below `i`. The masks `a_i` are not stored; they are re-derived from
/// `prg_seed`.
#[derive(Clone, Debug)]
pub struct KeySwitchMatrix {
    pub from_handle: SecretKeyHandle,
    pub to_key_id: usize,
    pub b: Vec<RnsPoly>,
    pub prg_seed: u64,
    pub ptxt_space: BigUint,
}

/// Everything an evaluator needs: the ring, the encryption key and the
/// published switching matrices.
#[derive(Clone, Debug)]
pub struct PublicKey {
    context: Arc<RingContext>,
    ptxt_space: BigUint,
    encryption_key: (RnsPoly, RnsPoly),
    encryption_noise: XDouble,
    key_weights: Vec<usize>,
    matrices: Vec<KeySwitchMatrix>,
    // key id -> (k -> index of the last matrix on a path from 1 to k)
    reachability: BTreeMap<usize, BTreeMap<usize, usize>>,
}

impl PublicKey {
    pub(crate) fn new(
        context: Arc<RingContext>,
        encryption_key: (RnsPoly, RnsPoly),
        encryption_noise: XDouble,
        weight: usize,
    ) -> Self {
        let ptxt_space = context.ptxt_space().clone();
        Self {
            context,
            ptxt_space,
            encryption_key,
            encryption_noise,
            key_weights: vec![weight],
            matrices: Vec::new(),
            reachability: BTreeMap::new(),
        }
    }

    pub fn context(&self) -> &RingContext {
        &self.context
    }

    pub fn context_arc(&self) -> &Arc<RingContext> {
        &self.context
    }

    pub fn ptxt_space(&self) -> &BigUint {
        &self.ptxt_space
    }

    pub fn encryption_noise(&self) -> XDouble {
        self.encryption_noise
    }

    pub fn matrices(&self) -> &[KeySwitchMatrix] {
        &self.matrices
    }

    /// Hamming weight of secret `key_id`, if that key exists.
    pub fn secret_key_weight(&self, key_id: usize) -> Option<usize> {
        self.key_weights.get(key_id).copied()
    }

    pub fn key_switch_matrix(&self, from: &SecretKeyHandle, to_key_id: usize) -> Option<&KeySwitchMatrix> {
        self.matrices
            .iter()
            .find(|m| m.from_handle == *from && m.to_key_id == to_key_id)
    }

    /// Any matrix leaving `from`, whatever its target key.
    pub fn any_key_switch_matrix(&self, from: &SecretKeyHandle) -> Option<&KeySwitchMatrix> {
        self.matrices.iter().find(|m| m.from_handle == *from)
    }

    /// Whether X -> X^k can be key-switched back to `key_id` by chaining
    /// stored automorphism matrices.
    pub fn is_reachable(&self, k: usize, key_id: usize) -> bool {
        let k = k % self.context.m();
        k == 1 || self.reachability.get(&key_id).is_some_and(|map| map.contains_key(&k))
    }

    /// The matrix to apply first when heading for X -> X^k; after it, the
    /// remaining exponent is `k · power_of_x^{-1}`.
    pub fn next_matrix(&self, k: usize, key_id: usize) -> Option<&KeySwitchMatrix> {
        let k = k % self.context.m();
        let idx = *self.reachability.get(&key_id)?.get(&k)?;
        self.matrices.get(idx)
    }

    pub(crate) fn add_weight(&mut self, weight: usize) -> usize {
        self.key_weights.push(weight);
        self.key_weights.len() - 1
    }

    pub(crate) fn encryption_key(&self) -> &(RnsPoly, RnsPoly) {
        &self.encryption_key
    }

    pub(crate) fn push_matrix(&mut self, matrix: KeySwitchMatrix) {
        let key = matrix.to_key_id;
        self.matrices.push(matrix);
        self.rebuild_reachability(key);
    }

    /// Breadth-first search over the group generated by the stored
    /// automorphism matrices into `key_id`.
    fn rebuild_reachability(&mut self, key_id: usize) {
        let m = self.context.m();
        let steps: Vec<(usize, usize)> = self
            .matrices
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                let h = w.from_handle;
                w.to_key_id == key_id && h.key_id() == key_id && h.power_of_s() == 1 && h.power_of_x() != 1
            })
            .map(|(idx, w)| (idx, w.from_handle.power_of_x()))
            .collect();

        let mut map = BTreeMap::new();
        let mut seen = BTreeSet::from([1usize]);
        let mut queue = VecDeque::from([1usize]);
        while let Some(u) = queue.pop_front() {
            for &(idx, a) in &steps {
                let v = (u * a) % m;
                if seen.insert(v) {
                    map.insert(v, idx);
                    queue.push_back(v);
                }
            }
        }
        self.reachability.insert(key_id, map);
    }
}
