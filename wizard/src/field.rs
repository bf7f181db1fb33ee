use plonky2::field::goldilocks_field::GoldilocksField;
use plonky2::field::types::Field;
use plonky2::hash::poseidon::{Poseidon, PoseidonHash};
use plonky2::plonk::config::Hasher;

pub type F = GoldilocksField;
pub type Hash = PoseidonHash;
pub type Digest = <PoseidonHash as Hasher<F>>::Hash;

/// Number of bytes packed into a single field element by
/// [`bytes_to_elements`]. Seven bytes always fit below the Goldilocks modulus.
const BYTES_PER_ELEMENT: usize = 7;

/// Returns `Poseidon(state, x, 0, .., 0)[0]`, one step of a hash chain.
pub fn block_compression(state: F, x: F) -> F {
    F::poseidon(std::array::from_fn(|i| match i {
        0 => state,
        1 => x,
        _ => F::ZERO,
    }))[0]
}

/// Folds `values` into a hash chain starting from zero. The empty chain
/// hashes to zero.
pub fn hash_chain<I: IntoIterator<Item = F>>(values: I) -> F {
    values.into_iter().fold(F::ZERO, block_compression)
}

/// Sponge hash of an arbitrary list of elements.
pub fn hash_elements(values: &[F]) -> Digest {
    Hash::hash_no_pad(values)
}

pub fn hash_two(left: Digest, right: Digest) -> Digest {
    Hash::two_to_one(left, right)
}

/// Packs a byte string into field elements, seven bytes at a time in
/// little-endian order.
pub fn bytes_to_elements(bytes: &[u8]) -> Vec<F> {
    bytes
        .chunks(BYTES_PER_ELEMENT)
        .map(|chunk| {
            let limb = chunk
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            F::from_canonical_u64(limb)
        })
        .collect()
}

/// Hashes a string label together with a list of elements. Used to derive
/// coins and verifying keys from names.
pub fn hash_labelled(label: &str, values: &[F]) -> Digest {
    let mut input = bytes_to_elements(label.as_bytes());
    input.push(F::from_canonical_usize(label.len()));
    input.extend_from_slice(values);
    hash_elements(&input)
}

pub fn from_usize(x: usize) -> F {
    F::from_canonical_usize(x)
}

pub fn from_bool(b: bool) -> F {
    if b {
        F::ONE
    } else {
        F::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_chain_of_nothing_is_zero() {
        assert_eq!(hash_chain(std::iter::empty()), F::ZERO);
    }

    #[test]
    fn hash_chain_is_order_sensitive() {
        let a = F::from_canonical_u64(3);
        let b = F::from_canonical_u64(5);
        assert_ne!(hash_chain([a, b]), hash_chain([b, a]));
        assert_eq!(
            hash_chain([a, b]),
            block_compression(block_compression(F::ZERO, a), b)
        );
    }

    #[test]
    fn bytes_are_packed_by_seven() {
        let elems = bytes_to_elements(&[1, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(elems, vec![F::ONE, F::TWO]);
    }
}
