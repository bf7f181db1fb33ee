//! Recombination of segment public inputs, and the flat check over an
//! ordered list of segment proofs.

use std::collections::BTreeMap;

use itertools::Itertools;
use plonky2::field::types::Field;
use serde::{Deserialize, Serialize};
use wizard::field::{from_bool, F};
use wizard::mset::MSetHash;

use crate::error::{ConglomerationError, ConglomerationErrors};
use crate::proof::{ProofType, SegmentProof, VerifyingKey};
use crate::public_input::{
    indexed, LimitlessPublicInput, GENERAL_MULTISET, GL_SEGMENT_COUNT, GRAND_PRODUCT, HORNER_SUM,
    INITIAL_RANDOMNESS, LOG_DERIVATIVE_SUM, LPP_SEGMENT_COUNT, TARGET_NB_SEGMENTS, VK_MERKLE_ROOT,
};

fn is_zero_vec(v: &[F]) -> bool {
    v.iter().all(|x| x.is_zero())
}

/// Combines the public inputs of two consecutive proofs into the public
/// input of their aggregate. Flags, edge values and the verifying key are
/// left neutral for the caller to fill.
pub fn combine(a: &LimitlessPublicInput, b: &LimitlessPublicInput) -> LimitlessPublicInput {
    let mut functionals: BTreeMap<String, F> = a.functionals.clone();
    for (name, v) in &b.functionals {
        *functionals.entry(name.clone()).or_insert(F::ZERO) += *v;
    }
    let add = |x: &[F], y: &[F]| x.iter().zip(y).map(|(u, v)| *u + *v).collect_vec();
    LimitlessPublicInput {
        functionals,
        log_derivative_sum: a.log_derivative_sum + b.log_derivative_sum,
        grand_product: a.grand_product * b.grand_product,
        horner_sum: a.horner_sum + b.horner_sum,
        target_nb_segments: a.target_nb_segments.clone(),
        gl_segment_count: add(&a.gl_segment_count, &b.gl_segment_count),
        lpp_segment_count: add(&a.lpp_segment_count, &b.lpp_segment_count),
        general_multiset: a.general_multiset + b.general_multiset,
        shared_randomness_multiset: a.shared_randomness_multiset + b.shared_randomness_multiset,
        initial_randomness: if is_zero_vec(&a.initial_randomness) {
            b.initial_randomness
        } else {
            a.initial_randomness
        },
        vk_merkle_root: a.vk_merkle_root,
        ..Default::default()
    }
}

/// Relations between two sibling public inputs that must hold whatever
/// their position.
pub(crate) fn check_siblings(
    a: &LimitlessPublicInput,
    b: &LimitlessPublicInput,
    errors: &mut Vec<ConglomerationError>,
) {
    for (i, (x, y)) in a.target_nb_segments.iter().zip(&b.target_nb_segments).enumerate() {
        if x != y {
            errors.push(ConglomerationError::TargetNbSegments {
                name: indexed(TARGET_NB_SEGMENTS, i),
                expected: *x,
                actual: *y,
            });
        }
    }
    if a.vk_merkle_root != b.vk_merkle_root {
        errors.push(ConglomerationError::VkMerkleRoot {
            name: VK_MERKLE_ROOT.to_string(),
            expected: a.vk_merkle_root,
            actual: b.vk_merkle_root,
        });
    }
    if !is_zero_vec(&a.initial_randomness)
        && !is_zero_vec(&b.initial_randomness)
        && a.initial_randomness != b.initial_randomness
    {
        errors.push(ConglomerationError::SharedRandomness {
            name: INITIAL_RANDOMNESS.to_string(),
            expected: a.initial_randomness,
            actual: b.initial_randomness,
        });
    }
}

/// The relations a complete aggregate must satisfy: every accumulator
/// telescopes and every module is covered by the expected number of
/// segments. `has_lpp[k]` tells whether module `k` has LPP segments.
pub(crate) fn check_complete(
    pi: &LimitlessPublicInput,
    has_lpp: &[bool],
    errors: &mut Vec<ConglomerationError>,
) {
    if !pi.log_derivative_sum.is_zero() {
        errors.push(ConglomerationError::LogDerivativeSum {
            name: LOG_DERIVATIVE_SUM.to_string(),
            expected: F::ZERO,
            actual: pi.log_derivative_sum,
        });
    }
    if pi.grand_product != F::ONE {
        errors.push(ConglomerationError::GrandProduct {
            name: GRAND_PRODUCT.to_string(),
            expected: F::ONE,
            actual: pi.grand_product,
        });
    }
    if !pi.horner_sum.is_zero() {
        errors.push(ConglomerationError::HornerSum {
            name: HORNER_SUM.to_string(),
            expected: F::ZERO,
            actual: pi.horner_sum,
        });
    }
    if !pi.general_multiset.is_empty() {
        errors.push(ConglomerationError::MultiSet {
            name: GENERAL_MULTISET.to_string(),
            expected: MSetHash::empty(),
            actual: pi.general_multiset,
        });
    }
    for (k, &target) in pi.target_nb_segments.iter().enumerate() {
        let expected_lpp = if has_lpp.get(k).copied().unwrap_or(false) {
            target
        } else {
            F::ZERO
        };
        for (base, counts, expected) in [
            (GL_SEGMENT_COUNT, &pi.gl_segment_count, target),
            (LPP_SEGMENT_COUNT, &pi.lpp_segment_count, expected_lpp),
        ] {
            let actual = counts.get(k).copied().unwrap_or(F::ZERO);
            if actual != expected {
                errors.push(ConglomerationError::SegmentCount {
                    name: indexed(base, k),
                    expected,
                    actual,
                });
            }
        }
    }
    let any_lpp = has_lpp.iter().any(|&b| b);
    if any_lpp {
        let expected = pi.shared_randomness_multiset.shared_randomness().elements;
        if pi.initial_randomness != expected {
            errors.push(ConglomerationError::SharedRandomness {
                name: INITIAL_RANDOMNESS.to_string(),
                expected,
                actual: pi.initial_randomness,
            });
        }
    }
}

/// What the neighbours of a segment need to know about it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEdge {
    pub proof_type: ProofType,
    pub vk: VerifyingKey,
    pub is_first: F,
    pub is_last: F,
    pub horner_n0_hash: F,
    pub horner_n1_hash: F,
    pub global_provider: F,
    pub global_receiver: F,
}

impl SegmentEdge {
    pub fn of(proof: &SegmentProof) -> Self {
        let pi = &proof.public_input;
        Self {
            proof_type: proof.proof_type,
            vk: proof.verifying_key(),
            is_first: pi.is_first,
            is_last: pi.is_last,
            horner_n0_hash: pi.horner_n0_hash,
            horner_n1_hash: pi.horner_n1_hash,
            global_provider: pi.global_provider,
            global_receiver: pi.global_receiver,
        }
    }
}

/// Checks two segments that are next to each other in the proof order.
/// `position` is the position of `right`. Segments sharing a verifying key
/// are consecutive segments of one module.
pub(crate) fn check_join(
    left: &SegmentEdge,
    right: &SegmentEdge,
    position: usize,
    errors: &mut Vec<ConglomerationError>,
) {
    let same_module = left.vk == right.vk;
    if left.proof_type == ProofType::Gl {
        let expected = from_bool(!same_module);
        if left.is_last != expected {
            errors.push(ConglomerationError::IsLast {
                position: position.saturating_sub(1),
                expected,
                actual: left.is_last,
            });
        }
    }
    if right.proof_type == ProofType::Gl {
        let expected = from_bool(!same_module);
        if right.is_first != expected {
            errors.push(ConglomerationError::IsFirst {
                position,
                expected,
                actual: right.is_first,
            });
        }
    }
    if !same_module {
        return;
    }
    match right.proof_type {
        ProofType::Lpp if right.horner_n0_hash != left.horner_n1_hash => {
            errors.push(ConglomerationError::HornerContinuity {
                position,
                n0: right.horner_n0_hash,
                prev_n1: left.horner_n1_hash,
            });
        }
        ProofType::Gl if right.global_receiver != left.global_provider => {
            errors.push(ConglomerationError::GlobalSentReceived {
                position,
                sent: left.global_provider,
                received: right.global_receiver,
            });
        }
        _ => {}
    }
}

/// Checks the two ends of a complete proof order: the first segment starts
/// its module and the last one ends it.
pub(crate) fn check_ends(
    first: &SegmentEdge,
    last: &SegmentEdge,
    nb_segments: usize,
    errors: &mut Vec<ConglomerationError>,
) {
    if first.proof_type == ProofType::Gl && first.is_first != F::ONE {
        errors.push(ConglomerationError::IsFirst {
            position: 0,
            expected: F::ONE,
            actual: first.is_first,
        });
    }
    if last.proof_type == ProofType::Gl && last.is_last != F::ONE {
        errors.push(ConglomerationError::IsLast {
            position: nb_segments.saturating_sub(1),
            expected: F::ONE,
            actual: last.is_last,
        });
    }
}

/// Checks the whole ordered list of segment proofs at once. `has_lpp[k]`
/// tells whether module `k` has LPP segments.
pub fn check_flat(proofs: &[SegmentProof], has_lpp: &[bool]) -> Result<(), ConglomerationErrors> {
    let (Some(first), Some(last)) = (proofs.first(), proofs.last()) else {
        return Ok(());
    };
    let mut errors = Vec::new();
    let edges = proofs.iter().map(SegmentEdge::of).collect_vec();

    for (i, proof) in proofs.iter().enumerate() {
        if proof.proof_type == ProofType::Conglomeration {
            errors.push(ConglomerationError::UnknownProofType { position: i });
        }
        check_siblings(&first.public_input, &proof.public_input, &mut errors);
    }
    for (i, (left, right)) in edges.iter().tuple_windows().enumerate() {
        check_join(left, right, i + 1, &mut errors);
    }
    check_ends(&SegmentEdge::of(first), &SegmentEdge::of(last), proofs.len(), &mut errors);

    let total = proofs
        .iter()
        .skip(1)
        .fold(first.public_input.clone(), |acc, p| combine(&acc, &p.public_input));
    check_complete(&total, has_lpp, &mut errors);
    log::debug!("flat check over {} proofs: {} error(s)", proofs.len(), errors.len());
    ConglomerationErrors::join(errors)
}
