//! Additive multiset hashing.
//!
//! An [`MSetHash`] commits to a multiset of messages by summing, slot-wise,
//! the Poseidon digests of its members. Insertions and removals commute, so
//! the hashes of independently computed sub-multisets can be added together
//! and compared with the hash of the union. This is what lets segment proofs
//! "send" values to each other through the aggregation tree: a sender inserts
//! a message, the receiver removes the same message, and the aggregated
//! multiset is empty when every message was received.

use std::ops::{Add, AddAssign};

use plonky2::field::types::Field;
use serde::{Deserialize, Serialize};

use crate::field::{hash_elements, Digest, F};

pub const MSET_HASH_SIZE: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MSetHash(pub [F; MSET_HASH_SIZE]);

impl MSetHash {
    pub fn empty() -> Self {
        Self([F::ZERO; MSET_HASH_SIZE])
    }

    pub fn from_slice(elems: &[F]) -> Self {
        assert_eq!(
            elems.len(),
            MSET_HASH_SIZE,
            "multiset hash must have {MSET_HASH_SIZE} elements"
        );
        Self(std::array::from_fn(|i| elems[i]))
    }

    pub fn insert(&mut self, msg: &[F]) {
        let h = hash_elements(msg);
        for (slot, e) in self.0.iter_mut().zip(h.elements) {
            *slot += e;
        }
    }

    pub fn remove(&mut self, msg: &[F]) {
        let h = hash_elements(msg);
        for (slot, e) in self.0.iter_mut().zip(h.elements) {
            *slot -= e;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|e| e.is_zero())
    }

    pub fn as_slice(&self) -> &[F] {
        &self.0
    }

    /// Derives the randomness shared by all the LPP segments from the
    /// multiset of their column commitments.
    pub fn shared_randomness(&self) -> Digest {
        hash_elements(&self.0)
    }
}

impl AddAssign for MSetHash {
    fn add_assign(&mut self, rhs: Self) {
        for (slot, e) in self.0.iter_mut().zip(rhs.0) {
            *slot += e;
        }
    }
}

impl Add for MSetHash {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(x: u64) -> Vec<F> {
        vec![F::from_canonical_u64(x), F::from_canonical_u64(x + 1)]
    }

    #[test]
    fn insert_then_remove_is_empty() {
        let mut m = MSetHash::empty();
        m.insert(&msg(1));
        m.insert(&msg(7));
        assert!(!m.is_empty());
        m.remove(&msg(7));
        m.remove(&msg(1));
        assert!(m.is_empty());
    }

    #[test]
    fn split_multisets_add_up() {
        let mut sender = MSetHash::empty();
        sender.insert(&msg(42));
        let mut receiver = MSetHash::empty();
        receiver.remove(&msg(42));
        assert!((sender + receiver).is_empty());

        let mut wrong = MSetHash::empty();
        wrong.remove(&msg(43));
        assert!(!(sender + wrong).is_empty());
    }
}
