use anyhow::Context;
use distributed::{DiscoveryConfig, DistributedWizard, ModuleDiscoveryAdvice};
use plonky2_maybe_rayon::*;
use tracing::info;
use wizard::iop::CompiledIop;
use wizard::runtime::Runtime;

use crate::ops::{ConglomerationOp, SegmentInput, SegmentProofOp};
use crate::proof_types::{AggregatableProof, GeneratedDistributedProof};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProverConfig {
    pub target_weight: usize,
    pub test_only: bool,
    pub save_inputs_on_error: bool,
    pub check_flat: bool,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            target_weight: 1 << 24,
            test_only: false,
            save_inputs_on_error: false,
            check_flat: false,
        }
    }
}

/// Proves assignments of a protocol, segment by segment.
#[derive(Debug)]
pub struct LimitlessProver {
    pub dw: DistributedWizard,
    pub config: ProverConfig,
}

impl LimitlessProver {
    pub fn new(comp: CompiledIop, config: ProverConfig) -> Self {
        Self::with_advices(comp, Vec::new(), config)
    }

    /// Distributes `comp` following the given module advices.
    pub fn with_advices(
        comp: CompiledIop,
        advices: Vec<ModuleDiscoveryAdvice>,
        config: ProverConfig,
    ) -> Self {
        let disc_config = DiscoveryConfig {
            target_weight: config.target_weight,
            advices,
        };
        let dw = DistributedWizard::distribute(comp, &disc_config);
        Self { dw, config }
    }

    /// Assigns the protocol with `assign`, proves every segment in parallel
    /// and conglomerates the segment proofs.
    pub fn prove(
        &self,
        assign: impl FnOnce(&mut Runtime<'_>),
    ) -> anyhow::Result<GeneratedDistributedProof> {
        let rt = self.dw.runtime(assign);
        let witness = self.dw.segment(&rt);
        info!(
            "proving {} GL and {} LPP segments over {} modules",
            witness.gl.len(),
            witness.lpp.len(),
            self.dw.nb_modules()
        );

        // Conglomeration expects the GL segments first.
        let inputs = witness
            .gl
            .iter()
            .map(SegmentInput::Gl)
            .chain(witness.lpp.iter().map(SegmentInput::Lpp))
            .collect::<Vec<_>>();
        let segment_op = SegmentProofOp {
            save_inputs_on_error: self.config.save_inputs_on_error,
            test_only: self.config.test_only,
        };
        let proofs = inputs
            .par_iter()
            .map(|input| segment_op.execute(&self.dw, *input))
            .collect::<anyhow::Result<Vec<_>>>()?;

        if !self.config.test_only {
            for proof in &proofs {
                self.dw.verify_segment(proof).with_context(|| {
                    format!(
                        "verifying {:?} segment {} of module {}",
                        proof.proof_type, proof.segment_index, proof.module_index
                    )
                })?;
            }
        }
        if self.config.check_flat {
            self.dw
                .check_flat(&proofs)
                .context("checking the segment proofs as a flat list")?;
        }

        let conglomerator = &self.dw.conglomerator;
        let conglomeration_op = ConglomerationOp {
            save_inputs_on_error: self.config.save_inputs_on_error,
        };
        let root = conglomerator.reduce_with(conglomerator.leaves(&proofs), |a, b| {
            conglomeration_op.execute(conglomerator, a, b)
        })?;
        conglomerator
            .verify_root(&root)
            .context("checking the root of the conglomeration")?;
        info!("conglomerated {} segment proofs", root.nb_segments);

        let proof = match <[_; 1]>::try_from(proofs) {
            Ok([single]) => AggregatableProof::Segment(single),
            Err(_) => AggregatableProof::Conglomeration(root),
        };
        Ok(GeneratedDistributedProof {
            nb_modules: self.dw.nb_modules(),
            vk_merkle_root: conglomerator.vk_merkle_root(),
            proof,
        })
    }
}
