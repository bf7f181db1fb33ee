//! Arity-2 conglomeration of segment proofs.
//!
//! Every node of the aggregation tree holds the public inputs its children
//! combine into, plus the edges of the segment range it covers, so that
//! adjacency between two subtrees can be checked without walking the whole
//! segment list again. The nodes are checked level by level; the root is
//! then checked for completeness.

use itertools::Itertools;
use log::{debug, info};
use plonky2::field::types::{Field, PrimeField64};
use plonky2::hash::merkle_proofs::verify_merkle_proof_to_cap;
use plonky2::hash::merkle_tree::MerkleTree;
use plonky2::hash::poseidon::PoseidonHash;
use plonky2_maybe_rayon::*;
use serde::{Deserialize, Serialize};
use wizard::field::{from_usize, hash_labelled, F};

use crate::conglomeration::{
    check_complete, check_ends, check_join, check_siblings, combine, SegmentEdge,
};
use crate::error::{ConglomerationError, ConglomerationErrors};
use crate::proof::{ProofType, SegmentProof, VerifyingKey};
use crate::public_input::{
    indexed, LimitlessPublicInput, GENERAL_MULTISET, GLOBAL_PROVIDER, GLOBAL_RECEIVER,
    GL_SEGMENT_COUNT, GRAND_PRODUCT, HORNER_N0_HASH, HORNER_N1_HASH, HORNER_SUM,
    INITIAL_RANDOMNESS, IS_FIRST, IS_LAST, LOG_DERIVATIVE_SUM, LPP_SEGMENT_COUNT,
    SHARED_RANDOMNESS_MULTISET, VK_MERKLE_ROOT,
};

const VK_LEAF_LEN: usize = 8;

/// Merkle tree over the verifying keys a conglomeration accepts.
///
/// Leaves are laid out as `[GL_0..GL_n, LPP_0..LPP_n, conglomeration]`,
/// padded with zero leaves to a power of two. Modules without LPP part get a
/// zero leaf.
#[derive(Clone, Debug)]
pub struct VkMerkleTree {
    nb_modules: usize,
    tree: MerkleTree<F, PoseidonHash>,
}

impl VkMerkleTree {
    pub fn new(
        gl_vks: &[VerifyingKey],
        lpp_vks: &[Option<VerifyingKey>],
        conglomeration_vk: &VerifyingKey,
    ) -> Self {
        assert_eq!(
            gl_vks.len(),
            lpp_vks.len(),
            "every module needs a GL verifying key and an LPP slot"
        );
        let nb_modules = gl_vks.len();
        let mut leaves = gl_vks.iter().map(VerifyingKey::leaf).collect_vec();
        leaves.extend(
            lpp_vks
                .iter()
                .map(|vk| vk.map_or_else(|| vec![F::ZERO; VK_LEAF_LEN], |vk| vk.leaf())),
        );
        leaves.push(conglomeration_vk.leaf());
        leaves.resize(leaves.len().next_power_of_two(), vec![F::ZERO; VK_LEAF_LEN]);
        Self {
            nb_modules,
            tree: MerkleTree::new(leaves, 0),
        }
    }

    pub fn root(&self) -> [F; 4] {
        self.tree.cap.0[0].elements
    }

    /// Position of the leaf of a proof kind.
    pub const fn position(&self, proof_type: ProofType, module_index: usize) -> usize {
        match proof_type {
            ProofType::Gl => module_index,
            ProofType::Lpp => self.nb_modules + module_index,
            ProofType::Conglomeration => 2 * self.nb_modules,
        }
    }

    /// Checks that `vk` sits at `position` in the tree.
    pub fn verify(&self, position: usize, vk: &VerifyingKey) -> anyhow::Result<()> {
        let proof = self.tree.prove(position);
        verify_merkle_proof_to_cap::<F, PoseidonHash>(vk.leaf(), position, &self.tree.cap, &proof)
    }
}

/// Recovers the kind of a proof from its segment counters: a segment proof
/// counts exactly one segment.
pub fn find_proof_type_and_module(pi: &LimitlessPublicInput) -> Option<(ProofType, usize)> {
    // The counters come from untrusted proofs: an overflowing sum is not a
    // proof type.
    let sum = |v: &[F]| {
        v.iter()
            .try_fold(0u64, |acc, x| acc.checked_add(x.to_canonical_u64()))
    };
    let one_hot = |v: &[F]| v.iter().position(|x| *x == F::ONE);
    match (sum(&pi.gl_segment_count)?, sum(&pi.lpp_segment_count)?) {
        (1, 0) => one_hot(&pi.gl_segment_count).map(|k| (ProofType::Gl, k)),
        (0, 1) => one_hot(&pi.lpp_segment_count).map(|k| (ProofType::Lpp, k)),
        (gl, lpp) if gl.checked_add(lpp)? > 1 => Some((ProofType::Conglomeration, 0)),
        _ => None,
    }
}

/// A node of the aggregation tree. Leaves wrap one segment proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConglomerationProof {
    pub public_input: LimitlessPublicInput,
    /// Position of the first covered segment in the proof order.
    pub offset: usize,
    pub nb_segments: usize,
    pub first: SegmentEdge,
    pub last: SegmentEdge,
}

impl ConglomerationProof {
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            vk0: self.public_input.verifying_key,
            vk1: self.public_input.verifying_key_2,
        }
    }
}

/// Aggregates the segment proofs of one distributed protocol.
#[derive(Clone, Debug)]
pub struct Conglomerator {
    pub nb_modules: usize,
    pub has_lpp: Vec<bool>,
    pub vk: VerifyingKey,
    pub vk_tree: VkMerkleTree,
}

impl Conglomerator {
    /// The verifying key of the conglomeration nodes of a protocol with
    /// `nb_modules` modules.
    pub fn verifying_key(nb_modules: usize) -> VerifyingKey {
        let vk0 = hash_labelled("conglomeration", &[from_usize(nb_modules)]);
        VerifyingKey {
            vk0: vk0.elements,
            vk1: hash_labelled("conglomeration.precomputed", &vk0.elements).elements,
        }
    }

    pub fn new(gl_vks: &[VerifyingKey], lpp_vks: &[Option<VerifyingKey>]) -> Self {
        let nb_modules = gl_vks.len();
        let vk = Self::verifying_key(nb_modules);
        Self {
            nb_modules,
            has_lpp: lpp_vks.iter().map(Option::is_some).collect(),
            vk,
            vk_tree: VkMerkleTree::new(gl_vks, lpp_vks, &vk),
        }
    }

    pub fn vk_merkle_root(&self) -> [F; 4] {
        self.vk_tree.root()
    }

    /// Wraps the segment proof at `offset` in the proof order.
    pub fn leaf(&self, proof: &SegmentProof, offset: usize) -> ConglomerationProof {
        let edge = SegmentEdge::of(proof);
        ConglomerationProof {
            public_input: proof.public_input.clone(),
            offset,
            nb_segments: 1,
            first: edge.clone(),
            last: edge,
        }
    }

    /// Computes the node covering two adjacent subtrees, without checking
    /// anything.
    ///
    /// # Panics
    ///
    /// When the ranges covered by `a` and `b` are not adjacent.
    pub fn assign(&self, a: &ConglomerationProof, b: &ConglomerationProof) -> ConglomerationProof {
        assert_eq!(
            a.offset + a.nb_segments,
            b.offset,
            "only adjacent ranges of segments can be conglomerated"
        );
        self.parent_of(a, b)
    }

    fn parent_of(&self, a: &ConglomerationProof, b: &ConglomerationProof) -> ConglomerationProof {
        let mut pi = combine(&a.public_input, &b.public_input);
        pi.is_first = a.first.is_first;
        pi.is_last = b.last.is_last;
        pi.horner_n0_hash = a.first.horner_n0_hash;
        pi.horner_n1_hash = b.last.horner_n1_hash;
        pi.global_receiver = a.first.global_receiver;
        pi.global_provider = b.last.global_provider;
        pi.verifying_key = self.vk.vk0;
        pi.verifying_key_2 = self.vk.vk1;
        ConglomerationProof {
            public_input: pi,
            offset: a.offset,
            nb_segments: a.nb_segments.saturating_add(b.nb_segments),
            first: a.first.clone(),
            last: b.last.clone(),
        }
    }

    fn check_membership(&self, child: &ConglomerationProof, errors: &mut Vec<ConglomerationError>) {
        let Some((proof_type, module)) = find_proof_type_and_module(&child.public_input) else {
            errors.push(ConglomerationError::UnknownProofType { position: child.offset });
            return;
        };
        let fail = |reason: String| ConglomerationError::VkMembership {
            position: child.offset,
            proof_type,
            module,
            reason,
        };
        if proof_type == ProofType::Lpp && !self.has_lpp.get(module).copied().unwrap_or(false) {
            errors.push(fail("the module has no LPP part".to_string()));
            return;
        }
        if let Err(e) = self
            .vk_tree
            .verify(self.vk_tree.position(proof_type, module), &child.verifying_key())
        {
            errors.push(fail(e.to_string()));
        }
    }

    /// Checks that `parent` is the correct aggregate of `a` and `b`, and
    /// that the two children may be placed next to each other.
    pub fn verify_node(
        &self,
        a: &ConglomerationProof,
        b: &ConglomerationProof,
        parent: &ConglomerationProof,
    ) -> Result<(), ConglomerationErrors> {
        let mut errors = Vec::new();
        for child in [a, b] {
            if child.public_input.vk_merkle_root != self.vk_merkle_root() {
                errors.push(ConglomerationError::VkMerkleRoot {
                    name: VK_MERKLE_ROOT.to_string(),
                    expected: self.vk_merkle_root(),
                    actual: child.public_input.vk_merkle_root,
                });
            }
            self.check_membership(child, &mut errors);
        }
        let left_end = a.offset.saturating_add(a.nb_segments);
        if left_end != b.offset {
            errors.push(ConglomerationError::NotAdjacent {
                left_end,
                right_offset: b.offset,
            });
        }
        check_siblings(&a.public_input, &b.public_input, &mut errors);
        check_join(&a.last, &b.first, b.offset, &mut errors);
        check_parent(&self.parent_of(a, b), parent, &mut errors);
        ConglomerationErrors::join(errors)
    }

    /// Assigns and checks the node above `a` and `b`.
    pub fn aggregate(
        &self,
        a: &ConglomerationProof,
        b: &ConglomerationProof,
    ) -> Result<ConglomerationProof, ConglomerationErrors> {
        let parent = self.parent_of(a, b);
        self.verify_node(a, b, &parent)?;
        debug!(
            "conglomerated segments {}..{}",
            parent.offset,
            parent.offset + parent.nb_segments
        );
        Ok(parent)
    }

    /// Checks that the root covers the whole protocol and that every
    /// accumulator telescopes.
    pub fn verify_root(&self, root: &ConglomerationProof) -> Result<(), ConglomerationErrors> {
        let mut errors = Vec::new();
        if root.public_input.vk_merkle_root != self.vk_merkle_root() {
            errors.push(ConglomerationError::VkMerkleRoot {
                name: VK_MERKLE_ROOT.to_string(),
                expected: self.vk_merkle_root(),
                actual: root.public_input.vk_merkle_root,
            });
        }
        self.check_membership(root, &mut errors);
        check_ends(&root.first, &root.last, root.nb_segments, &mut errors);
        check_complete(&root.public_input, &self.has_lpp, &mut errors);
        ConglomerationErrors::join(errors)
    }

    /// The leaves of the aggregation tree over an ordered list of segment
    /// proofs.
    pub fn leaves(&self, proofs: &[SegmentProof]) -> Vec<ConglomerationProof> {
        proofs.iter().enumerate().map(|(i, p)| self.leaf(p, i)).collect()
    }

    /// Combines the nodes of a level pairwise until one is left. An odd node
    /// at the end of a level moves up unchanged.
    pub fn reduce_with<E, C>(
        &self,
        mut level: Vec<ConglomerationProof>,
        combine: C,
    ) -> Result<ConglomerationProof, E>
    where
        E: Send,
        C: Fn(&ConglomerationProof, &ConglomerationProof) -> Result<ConglomerationProof, E> + Sync,
    {
        assert!(!level.is_empty(), "nothing to conglomerate");
        let mut depth = 0;
        while level.len() > 1 {
            level = level
                .par_chunks(2)
                .map(|pair| match pair {
                    [a, b] => combine(a, b),
                    [a] => Ok(a.clone()),
                    _ => unreachable!(),
                })
                .collect::<Result<Vec<_>, _>>()?;
            depth += 1;
        }
        let root = level.remove(0);
        info!(
            "conglomerated {} segment proofs in a tree of depth {depth}",
            root.nb_segments
        );
        Ok(root)
    }

    /// Conglomerates an ordered list of segment proofs and checks the root.
    pub fn reduce(
        &self,
        proofs: &[SegmentProof],
    ) -> Result<ConglomerationProof, ConglomerationErrors> {
        let root = self.reduce_with(self.leaves(proofs), |a, b| self.aggregate(a, b))?;
        self.verify_root(&root)?;
        Ok(root)
    }
}

/// Compares the declared parent against the node its children assign to.
fn check_parent(
    expected_node: &ConglomerationProof,
    parent: &ConglomerationProof,
    errors: &mut Vec<ConglomerationError>,
) {
    let offset = expected_node.offset;
    let expected = &expected_node.public_input;
    let actual = &parent.public_input;

    let expected_range = (expected_node.offset, expected_node.nb_segments);
    let actual_range = (parent.offset, parent.nb_segments);
    if expected_range != actual_range {
        errors.push(ConglomerationError::ParentRange {
            offset,
            expected: expected_range,
            actual: actual_range,
        });
    }
    for (side, exp, act) in [
        ("first", &expected_node.first, &parent.first),
        ("last", &expected_node.last, &parent.last),
    ] {
        if exp != act {
            errors.push(ConglomerationError::ParentEdge { offset, side });
        }
    }
    if expected_node.verifying_key() != parent.verifying_key() {
        errors.push(ConglomerationError::ParentVerifyingKey {
            offset,
            expected: expected_node.verifying_key(),
            actual: parent.verifying_key(),
        });
    }
    for (name, exp, act) in [
        (IS_FIRST, expected.is_first, actual.is_first),
        (IS_LAST, expected.is_last, actual.is_last),
        (HORNER_N0_HASH, expected.horner_n0_hash, actual.horner_n0_hash),
        (HORNER_N1_HASH, expected.horner_n1_hash, actual.horner_n1_hash),
        (GLOBAL_RECEIVER, expected.global_receiver, actual.global_receiver),
        (GLOBAL_PROVIDER, expected.global_provider, actual.global_provider),
    ] {
        if exp != act {
            errors.push(ConglomerationError::ParentValue {
                offset,
                name: name.to_string(),
                expected: exp,
                actual: act,
            });
        }
    }

    for (name, v) in &expected.functionals {
        let got = actual.functionals.get(name).copied().unwrap_or(F::ZERO);
        if got != *v {
            errors.push(ConglomerationError::Functional {
                name: name.clone(),
                expected: *v,
                actual: got,
            });
        }
    }
    if actual.log_derivative_sum != expected.log_derivative_sum {
        errors.push(ConglomerationError::LogDerivativeSum {
            name: LOG_DERIVATIVE_SUM.to_string(),
            expected: expected.log_derivative_sum,
            actual: actual.log_derivative_sum,
        });
    }
    if actual.grand_product != expected.grand_product {
        errors.push(ConglomerationError::GrandProduct {
            name: GRAND_PRODUCT.to_string(),
            expected: expected.grand_product,
            actual: actual.grand_product,
        });
    }
    if actual.horner_sum != expected.horner_sum {
        errors.push(ConglomerationError::HornerSum {
            name: HORNER_SUM.to_string(),
            expected: expected.horner_sum,
            actual: actual.horner_sum,
        });
    }
    for (base, exp, act) in [
        (GL_SEGMENT_COUNT, &expected.gl_segment_count, &actual.gl_segment_count),
        (LPP_SEGMENT_COUNT, &expected.lpp_segment_count, &actual.lpp_segment_count),
    ] {
        let pairs = exp.iter().zip_longest(act.iter()).map(|p| p.or(&F::ZERO, &F::ZERO));
        for (k, (e, g)) in pairs.enumerate() {
            if e != g {
                errors.push(ConglomerationError::SegmentCount {
                    name: indexed(base, k),
                    expected: *e,
                    actual: *g,
                });
            }
        }
    }
    for (name, exp, act) in [
        (GENERAL_MULTISET, expected.general_multiset, actual.general_multiset),
        (
            SHARED_RANDOMNESS_MULTISET,
            expected.shared_randomness_multiset,
            actual.shared_randomness_multiset,
        ),
    ] {
        if exp != act {
            errors.push(ConglomerationError::MultiSet {
                name: name.to_string(),
                expected: exp,
                actual: act,
            });
        }
    }
    if actual.initial_randomness != expected.initial_randomness {
        errors.push(ConglomerationError::SharedRandomness {
            name: INITIAL_RANDOMNESS.to_string(),
            expected: expected.initial_randomness,
            actual: actual.initial_randomness,
        });
    }
    check_siblings(expected, actual, errors);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vk(seed: u64) -> VerifyingKey {
        VerifyingKey {
            vk0: [F::from_canonical_u64(seed); 4],
            vk1: [F::from_canonical_u64(seed + 1); 4],
        }
    }

    #[test]
    fn vk_tree_positions() {
        let tree = VkMerkleTree::new(&[vk(1), vk(3)], &[Some(vk(5)), None], &vk(7));
        assert_eq!(tree.position(ProofType::Gl, 1), 1);
        assert_eq!(tree.position(ProofType::Lpp, 0), 2);
        assert_eq!(tree.position(ProofType::Conglomeration, 0), 4);

        assert!(tree.verify(0, &vk(1)).is_ok());
        assert!(tree.verify(2, &vk(5)).is_ok());
        assert!(tree.verify(4, &vk(7)).is_ok());
        assert!(tree.verify(1, &vk(1)).is_err());
        assert!(tree.verify(3, &vk(9)).is_err());
    }

    #[test]
    fn proof_type_from_counts() {
        let pi = |gl: Vec<u64>, lpp: Vec<u64>| LimitlessPublicInput {
            gl_segment_count: gl.into_iter().map(F::from_canonical_u64).collect(),
            lpp_segment_count: lpp.into_iter().map(F::from_canonical_u64).collect(),
            ..Default::default()
        };
        assert_eq!(
            find_proof_type_and_module(&pi(vec![0, 1], vec![0, 0])),
            Some((ProofType::Gl, 1))
        );
        assert_eq!(
            find_proof_type_and_module(&pi(vec![0, 0], vec![1, 0])),
            Some((ProofType::Lpp, 0))
        );
        assert_eq!(
            find_proof_type_and_module(&pi(vec![2, 1], vec![1, 0])),
            Some((ProofType::Conglomeration, 0))
        );
        assert_eq!(find_proof_type_and_module(&pi(vec![0, 0], vec![0, 0])), None);

        let minus_one = F::NEG_ONE.to_canonical_u64();
        assert_eq!(
            find_proof_type_and_module(&pi(vec![minus_one, minus_one], vec![0, 0])),
            None
        );
        assert_eq!(
            find_proof_type_and_module(&pi(vec![minus_one, 0], vec![0, minus_one])),
            None
        );
    }

    #[test]
    fn conglomeration_vk_depends_on_module_count() {
        assert_ne!(Conglomerator::verifying_key(2), Conglomerator::verifying_key(3));
        assert_eq!(Conglomerator::verifying_key(2), Conglomerator::verifying_key(2));
    }
}
