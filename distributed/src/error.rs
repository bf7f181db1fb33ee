use std::fmt;

use wizard::error::QueryError;
use wizard::field::F;
use wizard::mset::MSetHash;

use crate::proof::{ProofType, VerifyingKey};

/// One inconsistency between the public inputs of proofs being
/// conglomerated.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConglomerationError {
    #[error("{name}: target number of segments differs, expected {expected}, got {actual}")]
    TargetNbSegments { name: String, expected: F, actual: F },

    #[error("{name}: segment count mismatch, expected {expected}, got {actual}")]
    SegmentCount { name: String, expected: F, actual: F },

    #[error("{name}: multiset mismatch, expected {expected:?}, got {actual:?}")]
    MultiSet {
        name: String,
        expected: MSetHash,
        actual: MSetHash,
    },

    #[error("{name}: log-derivative sum mismatch, expected {expected}, got {actual}")]
    LogDerivativeSum { name: String, expected: F, actual: F },

    #[error("{name}: grand product mismatch, expected {expected}, got {actual}")]
    GrandProduct { name: String, expected: F, actual: F },

    #[error("{name}: horner sum mismatch, expected {expected}, got {actual}")]
    HornerSum { name: String, expected: F, actual: F },

    #[error("{name}: functional public input mismatch, expected {expected}, got {actual}")]
    Functional { name: String, expected: F, actual: F },

    #[error("{name}: shared randomness mismatch, expected {expected:?}, got {actual:?}")]
    SharedRandomness {
        name: String,
        expected: [F; 4],
        actual: [F; 4],
    },

    #[error("{name}: verifying key merkle root mismatch, expected {expected:?}, got {actual:?}")]
    VkMerkleRoot {
        name: String,
        expected: [F; 4],
        actual: [F; 4],
    },

    #[error("VERIFYING_KEY of proof {position} ({proof_type:?} of module {module}) is not in the tree: {reason}")]
    VkMembership {
        position: usize,
        proof_type: ProofType,
        module: usize,
        reason: String,
    },

    #[error("proof {position}: cannot tell the proof type from the segment counts")]
    UnknownProofType { position: usize },

    #[error("HORNER_N0_HASH_0 of proof {position} is {n0} but the previous HORNER_N1_HASH_0 is {prev_n1}")]
    HornerContinuity { position: usize, n0: F, prev_n1: F },

    #[error("IS_FIRST of proof {position}: expected {expected}, got {actual}")]
    IsFirst {
        position: usize,
        expected: F,
        actual: F,
    },

    #[error("IS_LAST of proof {position}: expected {expected}, got {actual}")]
    IsLast {
        position: usize,
        expected: F,
        actual: F,
    },

    #[error("GLOBAL_RECEIVER of proof {position} is {received} but the previous GLOBAL_PROVIDER is {sent}")]
    GlobalSentReceived { position: usize, sent: F, received: F },

    #[error("segments ..{left_end} and {right_offset}.. are not adjacent")]
    NotAdjacent { left_end: usize, right_offset: usize },

    #[error("node at {offset}: {name} expected {expected}, got {actual}")]
    ParentValue {
        offset: usize,
        name: String,
        expected: F,
        actual: F,
    },

    #[error("node at {offset}: covers {actual:?} instead of {expected:?}")]
    ParentRange {
        offset: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("node at {offset}: its {side} edge differs from its children's")]
    ParentEdge { offset: usize, side: &'static str },

    #[error("node at {offset}: verifying key {actual:?} instead of {expected:?}")]
    ParentVerifyingKey {
        offset: usize,
        expected: VerifyingKey,
        actual: VerifyingKey,
    },
}

/// Every inconsistency found while conglomerating, reported at once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConglomerationErrors(pub Vec<ConglomerationError>);

impl ConglomerationErrors {
    /// Turns a list of errors into a result, `Ok` when the list is empty.
    pub fn join(errors: Vec<ConglomerationError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self(errors))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConglomerationError> {
        self.0.iter()
    }
}

impl fmt::Display for ConglomerationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} conglomeration error(s):", self.0.len())?;
        for e in &self.0 {
            writeln!(f, "  - {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConglomerationErrors {}

/// A segment proof was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("{module}: {reason}")]
    ModuleCheck { module: String, reason: String },

    #[error("public input {name}: the proof claims {claimed} but the transcript gives {computed}")]
    PublicInput { name: String, claimed: F, computed: F },

    #[error("the assignment misses the columns {0:?}")]
    MissingColumns(Vec<String>),

    #[error("the proof does not carry its transcript")]
    MissingTranscript,

    #[error("no {proof_type:?} part is known for module {module_index}")]
    UnknownModule {
        proof_type: ProofType,
        module_index: usize,
    },

    #[error("a {expected:?} verifier was given a {actual:?} proof")]
    ProofType { expected: ProofType, actual: ProofType },

    #[error("invalid transcript: {0}")]
    Transcript(anyhow::Error),
}

impl SegmentError {
    pub(crate) fn module_check(module: &str, reason: impl Into<String>) -> Self {
        SegmentError::ModuleCheck {
            module: module.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use plonky2::field::types::Field;

    use super::*;

    #[test]
    fn joined_errors_list_every_entry() {
        let errs = ConglomerationErrors::join(vec![
            ConglomerationError::LogDerivativeSum {
                name: "LOG_DERIVATE_SUM_PUBLIC_INPUT".to_string(),
                expected: F::ZERO,
                actual: F::ONE,
            },
            ConglomerationError::GrandProduct {
                name: "GRAND_PRODUCT_PUBLIC_INPUT".to_string(),
                expected: F::ONE,
                actual: F::TWO,
            },
        ])
        .expect_err("two errors");
        let msg = errs.to_string();
        assert!(msg.contains("LOG_DERIVATE_SUM_PUBLIC_INPUT"));
        assert!(msg.contains("GRAND_PRODUCT_PUBLIC_INPUT"));
        assert!(ConglomerationErrors::join(vec![]).is_ok());
    }
}
