//! Entry point of the crate: splits a compiled protocol into modules, and
//! drives segmentation, segment proving and conglomeration.

use itertools::Itertools;
use log::info;
use plonky2_maybe_rayon::*;
use wizard::compiler::run_prover_actions;
use wizard::iop::CompiledIop;
use wizard::runtime::Runtime;

use crate::conglomeration::check_flat;
use crate::discoverer::{Discovery, DiscoveryConfig};
use crate::error::{ConglomerationErrors, SegmentError};
use crate::filter::filter_module;
use crate::hierarchical::{ConglomerationProof, Conglomerator};
use crate::module_gl::ModuleGL;
use crate::module_lpp::ModuleLPP;
use crate::proof::{self, ProofType, SegmentProof, VerifyingKey};
use crate::witness::{segment_runtime, ModuleWitnessGL, ModuleWitnessLPP, SegmentedWitness};

/// A protocol compiled for distributed proving.
#[derive(Debug)]
pub struct DistributedWizard {
    /// The protocol being distributed, with its lookups already compiled.
    pub source: CompiledIop,
    pub disc: Discovery,
    pub gls: Vec<ModuleGL>,
    /// `None` for the modules with no lookup part.
    pub lpps: Vec<Option<ModuleLPP>>,
    pub vks_gl: Vec<VerifyingKey>,
    pub vks_lpp: Vec<Option<VerifyingKey>>,
    pub conglomerator: Conglomerator,
}

impl DistributedWizard {
    /// Discovers the modules of `source` and compiles their GL and LPP
    /// protocols.
    ///
    /// # Panics
    ///
    /// When `source` still holds inclusion, permutation or projection
    /// queries, or when discovery finds it inconsistent.
    pub fn distribute(source: CompiledIop, config: &DiscoveryConfig) -> Self {
        let disc = Discovery::analyze(&source, config);
        info!(
            "distributing {} columns over {} modules: {:?}",
            source.num_columns(),
            disc.nb_modules(),
            disc.module_list()
        );

        let modules = (0..disc.nb_modules())
            .into_par_iter()
            .map(|k| {
                let inputs = filter_module(&source, &disc, k);
                let gl = ModuleGL::new(&source, &disc, &inputs);
                let lpp = inputs
                    .has_lpp()
                    .then(|| ModuleLPP::new(&source, &disc, &inputs));
                (gl, lpp)
            })
            .collect::<Vec<_>>();
        let (gls, lpps): (Vec<_>, Vec<_>) = modules.into_iter().unzip();

        let vks_gl = gls.iter().map(|m| VerifyingKey::of(&m.wiop)).collect_vec();
        let vks_lpp = lpps
            .iter()
            .map(|m| m.as_ref().map(|m| VerifyingKey::of(&m.wiop)))
            .collect_vec();
        let conglomerator = Conglomerator::new(&vks_gl, &vks_lpp);
        for (gl, lpp) in gls.iter().zip(&lpps) {
            info!(
                "module {}: {} GL columns, {} LPP columns",
                gl.module_name,
                gl.wiop.num_columns(),
                lpp.as_ref().map_or(0, |m| m.wiop.num_columns()),
            );
        }

        Self {
            source,
            disc,
            gls,
            lpps,
            vks_gl,
            vks_lpp,
            conglomerator,
        }
    }

    pub fn nb_modules(&self) -> usize {
        self.disc.nb_modules()
    }

    pub fn has_lpp(&self) -> &[bool] {
        &self.conglomerator.has_lpp
    }

    /// Assigns the protocol being distributed. `assign` fills the round-0
    /// columns; the multiplicity columns of the compiled lookups are
    /// computed afterwards.
    pub fn runtime(&self, assign: impl FnOnce(&mut Runtime<'_>)) -> Runtime<'_> {
        let mut rt = Runtime::new(&self.source);
        assign(&mut rt);
        run_prover_actions(&mut rt);
        rt
    }

    /// Cuts an assignment of the protocol into segment witnesses.
    pub fn segment(&self, rt: &Runtime<'_>) -> SegmentedWitness {
        let blueprints_gl = self.gls.iter().map(|m| m.blueprint.clone()).collect_vec();
        let blueprints_lpp = self
            .lpps
            .iter()
            .flatten()
            .map(|m| m.blueprint.clone())
            .collect_vec();
        segment_runtime(
            rt,
            &self.disc,
            &blueprints_gl,
            &blueprints_lpp,
            self.conglomerator.vk_merkle_root(),
        )
    }

    fn lpp(&self, module_index: usize) -> &ModuleLPP {
        self.lpps[module_index]
            .as_ref()
            .unwrap_or_else(|| panic!("module {module_index} has no LPP part"))
    }

    /// Proves a GL segment. In test-only mode the transcript is dropped and
    /// the proof cannot be verified.
    pub fn prove_segment_gl(
        &self,
        w: &ModuleWitnessGL,
        test_only: bool,
    ) -> Result<SegmentProof, SegmentError> {
        let k = w.module_index;
        proof::prove_segment(&self.gls[k], &self.vks_gl[k], w, w.segment_index, !test_only)
    }

    pub fn prove_segment_lpp(
        &self,
        w: &ModuleWitnessLPP,
        test_only: bool,
    ) -> Result<SegmentProof, SegmentError> {
        let k = w.module_index;
        let vk = self.vks_lpp[k].unwrap_or_default();
        proof::prove_segment(self.lpp(k), &vk, w, w.segment_index, !test_only)
    }

    /// Checks a segment proof. The module it names is looked up, never
    /// trusted: an unknown module is an error.
    pub fn verify_segment(&self, proof: &SegmentProof) -> Result<(), SegmentError> {
        let k = proof.module_index;
        let unknown = || SegmentError::UnknownModule {
            proof_type: proof.proof_type,
            module_index: k,
        };
        match proof.proof_type {
            ProofType::Gl => {
                let (gl, vk) = self.gls.get(k).zip(self.vks_gl.get(k)).ok_or_else(unknown)?;
                proof::verify_segment(gl, vk, proof)
            }
            ProofType::Lpp => {
                let lpp = self.lpps.get(k).and_then(Option::as_ref).ok_or_else(unknown)?;
                let vk = self.vks_lpp.get(k).copied().flatten().ok_or_else(unknown)?;
                proof::verify_segment(lpp, &vk, proof)
            }
            ProofType::Conglomeration => Err(SegmentError::ProofType {
                expected: ProofType::Gl,
                actual: proof.proof_type,
            }),
        }
    }

    /// Proves every segment in parallel. The proofs come back in
    /// conglomeration order: the GL segments module by module, then the LPP
    /// ones.
    pub fn prove_all(
        &self,
        witness: &SegmentedWitness,
        test_only: bool,
    ) -> Result<Vec<SegmentProof>, SegmentError> {
        let mut proofs = witness
            .gl
            .par_iter()
            .map(|w| self.prove_segment_gl(w, test_only))
            .collect::<Result<Vec<_>, _>>()?;
        proofs.extend(
            witness
                .lpp
                .par_iter()
                .map(|w| self.prove_segment_lpp(w, test_only))
                .collect::<Result<Vec<_>, _>>()?,
        );
        info!("proved {} segments", proofs.len());
        Ok(proofs)
    }

    pub fn conglomerate(
        &self,
        proofs: &[SegmentProof],
    ) -> Result<ConglomerationProof, ConglomerationErrors> {
        self.conglomerator.reduce(proofs)
    }

    pub fn check_flat(&self, proofs: &[SegmentProof]) -> Result<(), ConglomerationErrors> {
        check_flat(proofs, self.has_lpp())
    }
}
