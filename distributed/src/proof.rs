//! Segment proofs and the generic prove/verify steps shared by the GL and
//! LPP modules.
//!
//! Proofs are transparent: a segment proof carries the public inputs it
//! claims and, unless it was produced in test-only mode, the transcript the
//! verifier replays to recompute them.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use wizard::check::check_all;
use wizard::field::F;
use wizard::iop::CompiledIop;
use wizard::runtime::{Runtime, Transcript};

use crate::error::SegmentError;
use crate::public_input::{indexed, LimitlessPublicInput, VERIFYING_KEY, VERIFYING_KEY_2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProofType {
    Lpp = 0,
    Gl = 1,
    Conglomeration = 2,
}

/// Identifies the protocol a proof was produced for: a digest of its
/// structure and a digest of its fixed columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifyingKey {
    pub vk0: [F; 4],
    pub vk1: [F; 4],
}

impl VerifyingKey {
    pub fn of(wiop: &CompiledIop) -> Self {
        let structure = wiop.structure_digest();
        let precomputed = wiop.precomputed_digest(structure);
        Self {
            vk0: structure.elements,
            vk1: precomputed.elements,
        }
    }

    /// The eight elements hashed into a leaf of the verifying key tree.
    pub fn leaf(&self) -> Vec<F> {
        self.vk0.iter().chain(&self.vk1).copied().collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentProof {
    pub proof_type: ProofType,
    pub module_index: usize,
    pub segment_index: usize,
    pub public_input: LimitlessPublicInput,
    /// Absent for proofs produced in test-only mode, which cannot be
    /// verified but can still be conglomerated.
    pub transcript: Option<Transcript>,
}

impl SegmentProof {
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            vk0: self.public_input.verifying_key,
            vk1: self.public_input.verifying_key_2,
        }
    }
}

/// A module protocol a segment of the distributed protocol is proved
/// against.
pub trait SegmentModule: Sync {
    type Witness;

    const PROOF_TYPE: ProofType;

    fn wiop(&self) -> &CompiledIop;

    fn module_name(&self) -> &str;

    fn module_index(&self) -> usize;

    fn nb_modules(&self) -> usize;

    /// Assigns the whole runtime from the witness of one segment, calling
    /// [`SegmentModule::replay`] once round 0 is assigned.
    fn assign(&self, rt: &mut Runtime, witness: &Self::Witness) -> Result<(), SegmentError>;

    /// Brings a runtime whose round 0 is assigned to its last round, sampling
    /// the coins on the way.
    fn replay(&self, rt: &mut Runtime) -> Result<(), SegmentError>;

    /// The checks specific to the module, on top of its queries.
    fn check(&self, rt: &Runtime) -> Result<(), SegmentError>;
}

/// Public inputs of a checked runtime, with the verifying key appended.
pub fn public_input_of(
    rt: &Runtime,
    vk: &VerifyingKey,
    nb_modules: usize,
) -> Result<LimitlessPublicInput, SegmentError> {
    let mut named: BTreeMap<String, F> = rt.public_inputs().into_iter().collect();
    for i in 0..4 {
        named.insert(indexed(VERIFYING_KEY, i), vk.vk0[i]);
        named.insert(indexed(VERIFYING_KEY_2, i), vk.vk1[i]);
    }
    LimitlessPublicInput::from_named(&named, nb_modules).map_err(SegmentError::Transcript)
}

fn ensure_complete(rt: &Runtime) -> Result<(), SegmentError> {
    let missing = rt.missing_columns();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SegmentError::MissingColumns(missing))
    }
}

/// Proves one segment. The assignment is checked in full before the proof
/// is returned.
pub fn prove_segment<M: SegmentModule>(
    module: &M,
    vk: &VerifyingKey,
    witness: &M::Witness,
    segment_index: usize,
    keep_transcript: bool,
) -> Result<SegmentProof, SegmentError> {
    let mut rt = Runtime::new(module.wiop());
    module.assign(&mut rt, witness)?;
    ensure_complete(&rt)?;
    check_all(&rt)?;
    module.check(&rt)?;
    let public_input = public_input_of(&rt, vk, module.nb_modules())?;
    debug!(
        "proved {:?} segment {segment_index} of {}",
        M::PROOF_TYPE,
        module.module_name()
    );
    Ok(SegmentProof {
        proof_type: M::PROOF_TYPE,
        module_index: module.module_index(),
        segment_index,
        public_input,
        transcript: keep_transcript.then(|| rt.transcript()),
    })
}

/// Replays the transcript of a segment proof and checks that it supports
/// the public inputs the proof claims.
pub fn verify_segment<M: SegmentModule>(
    module: &M,
    vk: &VerifyingKey,
    proof: &SegmentProof,
) -> Result<(), SegmentError> {
    if proof.proof_type != M::PROOF_TYPE {
        return Err(SegmentError::ProofType {
            expected: M::PROOF_TYPE,
            actual: proof.proof_type,
        });
    }
    let transcript = proof.transcript.as_ref().ok_or(SegmentError::MissingTranscript)?;
    let mut rt =
        Runtime::from_transcript(module.wiop(), transcript).map_err(SegmentError::Transcript)?;
    ensure_complete(&rt)?;
    module.replay(&mut rt)?;
    check_all(&rt)?;
    module.check(&rt)?;

    let computed = public_input_of(&rt, vk, module.nb_modules())?.to_named();
    let claimed = proof.public_input.to_named();
    for (name, &c) in &claimed {
        let v = computed.get(name).copied();
        if v != Some(c) {
            return Err(SegmentError::PublicInput {
                name: name.clone(),
                claimed: c,
                computed: v.unwrap_or_default(),
            });
        }
    }
    if let Some(name) = computed.keys().find(|k| !claimed.contains_key(*k)) {
        return Err(SegmentError::PublicInput {
            name: name.clone(),
            claimed: F::default(),
            computed: computed[name],
        });
    }
    Ok(())
}
