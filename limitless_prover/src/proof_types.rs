//! The output of the prover.

use distributed::{ConglomerationProof, LimitlessPublicInput, SegmentProof, VerifyingKey};
use serde::{Deserialize, Serialize};

/// A proof that is either a leaf or an inner node of the conglomeration
/// tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregatableProof {
    Segment(SegmentProof),
    Conglomeration(ConglomerationProof),
}

impl AggregatableProof {
    pub fn public_input(&self) -> &LimitlessPublicInput {
        match self {
            Self::Segment(p) => &p.public_input,
            Self::Conglomeration(p) => &p.public_input,
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            Self::Segment(p) => p.verifying_key(),
            Self::Conglomeration(p) => p.verifying_key(),
        }
    }
}

impl From<SegmentProof> for AggregatableProof {
    fn from(p: SegmentProof) -> Self {
        Self::Segment(p)
    }
}

impl From<ConglomerationProof> for AggregatableProof {
    fn from(p: ConglomerationProof) -> Self {
        Self::Conglomeration(p)
    }
}

/// The proof of a whole protocol, conglomerated from its segment proofs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDistributedProof {
    pub nb_modules: usize,
    /// Root of the Merkle tree of every verifying key the root vouches for.
    pub vk_merkle_root: [wizard::field::F; 4],
    /// The root of the conglomeration tree, or the single segment proof when
    /// the protocol fits in one.
    pub proof: AggregatableProof,
}
