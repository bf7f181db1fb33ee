//! The LPP module: the log-derivative, grand-product and Horner parts of one
//! module, evaluated segment by segment.
//!
//! Each segment computes a partial result, exposed as a public input; the
//! conglomeration adds the log-derivative sums and Horner results together
//! and multiplies the grand products. All the segments draw their coins from
//! the same seed, derived from the commitments to the LPP columns of every
//! segment, which is why those columns live in round 0.

use itertools::Itertools;
use log::debug;
use plonky2::field::types::{Field, PrimeField64};
use wizard::column::{Column, ColumnId};
use wizard::expression::Accessor;
use wizard::field::{from_bool, from_usize, hash_chain, Digest, F};
use wizard::iop::{CoinKind, CompiledIop};
use wizard::mset::MSetHash;
use wizard::query::{FractionPart, HornerPart, HornerParams, Query, QueryId, QueryParams};
use wizard::runtime::Runtime;

use crate::discoverer::Discovery;
use crate::error::SegmentError;
use crate::filter::FilteredModuleInputs;
use crate::module_gl::{IS_FIRST_COLUMN, IS_LAST_COLUMN, SEGMENT_INDEX_COLUMN};
use crate::proof::{ProofType, SegmentModule};
use crate::public_input::{declare_public_inputs, PiColumns, SegmentAccessors};
use crate::translator::ModuleTranslator;
use crate::witness::{
    commitment_message, lpp_commitment, BlueprintLPP, HornerSelector, ModuleWitnessLPP,
};

pub const INITIAL_FIATSHAMIR_STATE: &str = "INITIAL_FIATSHAMIR_STATE";
pub const MAIN_LOG_DERIVATIVE: &str = "MAIN_LOGDERIVATIVE";
pub const MAIN_GRAND_PRODUCT: &str = "MAIN_GRANDPRODUCT";
pub const MAIN_HORNER: &str = "MAIN_HORNER";
pub const HORNER_N0_HASH_COLUMN: &str = "N0_HASH";
pub const HORNER_N1_HASH_COLUMN: &str = "N1_HASH";
const DUMMY_COIN: &str = "LPP_DUMMY_COIN_1";

/// Tag of the general multiset messages chaining the Horner counters.
const HORNER_TAG: u64 = 0;

fn translate_parts(tr: &mut ModuleTranslator<'_>, parts: &[FractionPart]) -> Vec<FractionPart> {
    parts
        .iter()
        .map(|p| FractionPart {
            num: tr.translate_expr(&p.num),
            den: tr.translate_expr(&p.den),
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct HornerHandles {
    pub query: QueryId,
    pub n0_hash: ColumnId,
    pub n1_hash: ColumnId,
}

#[derive(Clone, Debug)]
pub struct ModuleLPP {
    pub wiop: CompiledIop,
    pub module_name: String,
    pub module_index: usize,
    pub nb_modules: usize,
    pub initial_fs_state: ColumnId,
    pub is_first: ColumnId,
    pub is_last: ColumnId,
    pub segment_index: ColumnId,
    pub lpp_columns: Vec<ColumnId>,
    pub pi: PiColumns,
    pub log_derivative: Option<QueryId>,
    pub grand_product: Option<QueryId>,
    pub horner: Option<HornerHandles>,
    pub blueprint: BlueprintLPP,
}

impl ModuleLPP {
    pub fn new(source: &CompiledIop, disc: &Discovery, inputs: &FilteredModuleInputs) -> Self {
        let nb_modules = disc.nb_modules();
        let k = inputs.module_index;
        let mut tr = ModuleTranslator::new(source, disc);

        let lpp_columns = inputs
            .columns_lpp
            .iter()
            .map(|&c| tr.insert_column(c, 0))
            .collect_vec();
        let initial_fs_state = tr.wiop.insert_proof(0, INITIAL_FIATSHAMIR_STATE, 4);
        let is_first = tr.wiop.insert_proof(0, IS_FIRST_COLUMN, 1);
        let is_last = tr.wiop.insert_proof(0, IS_LAST_COLUMN, 1);
        let segment_index = tr.wiop.insert_proof(0, SEGMENT_INDEX_COLUMN, 1);
        let pi = PiColumns::insert(&mut tr.wiop, nb_modules);
        tr.wiop.insert_coin(DUMMY_COIN, 1, CoinKind::Field);

        let lds_parts = translate_parts(&mut tr, &inputs.log_derivative_parts);
        let gp_parts = translate_parts(&mut tr, &inputs.grand_product_parts);

        let log_derivative = (!lds_parts.is_empty()).then(|| {
            tr.wiop
                .insert_query(MAIN_LOG_DERIVATIVE, 1, Query::LogDerivativeSum(lds_parts))
        });
        let grand_product = (!gp_parts.is_empty())
            .then(|| tr.wiop.insert_query(MAIN_GRAND_PRODUCT, 1, Query::GrandProduct(gp_parts)));

        let mut horner_selectors = Vec::new();
        let mut horner_parts = Vec::new();
        for p in &inputs.horner_parts {
            let rows = match p.selector.root() {
                Some(root) => disc.new_size_of(root),
                None => tr.size_of_expr(&p.coefficient),
            };
            horner_selectors.push(match &p.selector {
                Column::Constant { value, .. } => HornerSelector::Constant { value: *value, rows },
                col => match col.root() {
                    Some(root) => HornerSelector::Column(root),
                    None => unreachable!("non-constant columns have a root"),
                },
            });
            horner_parts.push(HornerPart {
                coefficient: tr.translate_expr(&p.coefficient),
                selector: tr.translate_column(&p.selector, rows),
                x: tr.translate_accessor(&p.x),
                negative: p.negative,
            });
        }
        let horner = (!horner_parts.is_empty()).then(|| HornerHandles {
            query: tr.wiop.insert_query(MAIN_HORNER, 1, Query::Horner(horner_parts)),
            n0_hash: tr.wiop.insert_proof(1, HORNER_N0_HASH_COLUMN, 1),
            n1_hash: tr.wiop.insert_proof(1, HORNER_N1_HASH_COLUMN, 1),
        });

        let mut acc = SegmentAccessors::neutral(k, nb_modules, false);
        acc.functionals = inputs
            .functionals
            .iter()
            .map(|f| (f.name.clone(), Accessor::Constant(F::ZERO)))
            .collect();
        acc.is_first = Accessor::cell(is_first, 0);
        acc.is_last = Accessor::cell(is_last, 0);
        if let Some(q) = log_derivative {
            acc.log_derivative_sum = Accessor::LogDerivativeSum(q);
        }
        if let Some(q) = grand_product {
            acc.grand_product = Accessor::GrandProduct(q);
        }
        if let Some(h) = &horner {
            acc.horner_sum = Accessor::HornerFinal(h.query);
            acc.horner_n0_hash = Accessor::cell(h.n0_hash, 0);
            acc.horner_n1_hash = Accessor::cell(h.n1_hash, 0);
        }
        acc.initial_randomness = std::array::from_fn(|i| Accessor::cell(initial_fs_state, i));
        declare_public_inputs(&mut tr.wiop, &pi, acc);

        let blueprint = BlueprintLPP {
            module_name: inputs.module_name.clone(),
            module_index: k,
            columns: inputs.columns_lpp.clone(),
            horner_selectors,
        };
        debug!(
            "LPP module {}: {} columns, log-derivative {}, grand product {}, horner {}",
            inputs.module_name,
            lpp_columns.len(),
            log_derivative.is_some(),
            grand_product.is_some(),
            horner.is_some()
        );
        Self {
            wiop: tr.wiop,
            module_name: inputs.module_name.clone(),
            module_index: k,
            nb_modules,
            initial_fs_state,
            is_first,
            is_last,
            segment_index,
            lpp_columns,
            pi,
            log_derivative,
            grand_product,
            horner,
            blueprint,
        }
    }

    fn commitment(&self, rt: &Runtime) -> F {
        lpp_commitment(self.lpp_columns.iter().map(|&c| rt.column(c)))
    }

    fn segment_of(&self, rt: &Runtime) -> (usize, usize) {
        let seg = rt.column(self.segment_index)[0].to_canonical_u64() as usize;
        let targets = self.pi.target_nb_segments(rt);
        (seg, targets[self.module_index])
    }

    fn horner_params<'r>(
        &self,
        rt: &'r Runtime,
        h: &HornerHandles,
    ) -> Result<&'r HornerParams, SegmentError> {
        match rt.params(h.query) {
            Some(QueryParams::Horner(p)) => Ok(p),
            _ => Err(self.fail(format!("{MAIN_HORNER} has no parameters"))),
        }
    }

    /// Hashes of the starting and final Horner counters of the segment.
    fn counter_hashes(params: &HornerParams) -> (F, F) {
        let n0 = hash_chain(params.parts.iter().map(|p| from_usize(p.n0)));
        let n1 = hash_chain(params.parts.iter().map(|p| from_usize(p.n1)));
        (n0, n1)
    }

    fn general_multiset(&self, rt: &Runtime) -> MSetHash {
        let (seg, total) = self.segment_of(rt);
        let k = from_usize(self.module_index);
        let mut general = MSetHash::empty();
        general.remove(&commitment_message(self.module_index, seg, self.commitment(rt)));
        if let Some(h) = &self.horner {
            let tag = F::from_canonical_u64(HORNER_TAG);
            if seg < total.saturating_sub(1) {
                general.insert(&[k, from_usize(seg), tag, rt.column(h.n1_hash)[0]]);
            }
            if seg > 0 {
                general.remove(&[k, from_usize(seg - 1), tag, rt.column(h.n0_hash)[0]]);
            }
        }
        general
    }

    fn fail(&self, reason: String) -> SegmentError {
        SegmentError::module_check(&self.module_name, reason)
    }
}

impl SegmentModule for ModuleLPP {
    type Witness = ModuleWitnessLPP;

    const PROOF_TYPE: ProofType = ProofType::Lpp;

    fn wiop(&self) -> &CompiledIop {
        &self.wiop
    }

    fn module_name(&self) -> &str {
        &self.module_name
    }

    fn module_index(&self) -> usize {
        self.module_index
    }

    fn nb_modules(&self) -> usize {
        self.nb_modules
    }

    fn assign(&self, rt: &mut Runtime, w: &ModuleWitnessLPP) -> Result<(), SegmentError> {
        for (name, values) in &w.columns {
            rt.assign_column_by_name(name, values.clone());
        }
        rt.assign_column(self.initial_fs_state, w.initial_fiat_shamir_state.to_vec());
        rt.assign_column(self.is_first, vec![from_bool(w.is_first())]);
        rt.assign_column(self.is_last, vec![from_bool(w.is_last())]);
        rt.assign_column(self.segment_index, vec![from_usize(w.segment_index)]);
        let commitment = self.commitment(rt);
        self.pi
            .assign_setup(rt, &w.total_segment_counts, w.vk_merkle_root, commitment);

        self.replay(rt)?;

        for q in [self.log_derivative, self.grand_product].into_iter().flatten() {
            rt.assign_query_params(q, &[])?;
        }
        if let Some(h) = &self.horner {
            rt.assign_query_params(h.query, &w.n0_values)?;
            let (n0, n1) = Self::counter_hashes(self.horner_params(rt, h)?);
            rt.assign_column(h.n0_hash, vec![n0]);
            rt.assign_column(h.n1_hash, vec![n1]);
        }
        let general = self.general_multiset(rt);
        self.pi.assign_general_multiset(rt, &general);
        Ok(())
    }

    /// Every LPP segment starts from the shared randomness instead of the
    /// state left by its own round 0.
    fn replay(&self, rt: &mut Runtime) -> Result<(), SegmentError> {
        let state = rt.column(self.initial_fs_state);
        let state = Digest {
            elements: std::array::from_fn(|i| state[i]),
        };
        rt.set_fs_state(state);
        rt.go_to_round(1);
        Ok(())
    }

    fn check(&self, rt: &Runtime) -> Result<(), SegmentError> {
        let (seg, total) = self.segment_of(rt);
        if seg >= total {
            return Err(self.fail(format!("segment {seg} of a module with {total} segments")));
        }
        for (col, expected, what) in [
            (self.is_first, from_bool(seg == 0), "IS_FIRST"),
            (self.is_last, from_bool(total.checked_sub(1) == Some(seg)), "IS_LAST"),
        ] {
            if rt.column(col)[0] != expected {
                return Err(self.fail(format!(
                    "{what} is inconsistent with segment {seg} of {total}"
                )));
            }
        }
        if rt.column(self.pi.lpp_commitment)[0] != self.commitment(rt) {
            return Err(self.fail("the LPP commitment does not match the LPP columns".to_string()));
        }

        if let Some(h) = &self.horner {
            let params = self.horner_params(rt, h)?;
            if seg == 0 && params.parts.iter().any(|p| p.n0 != 0) {
                return Err(self.fail(
                    "the first segment must start its Horner counters at zero".to_string(),
                ));
            }
            let (n0, n1) = Self::counter_hashes(params);
            if rt.column(h.n0_hash)[0] != n0 || rt.column(h.n1_hash)[0] != n1 {
                return Err(self.fail("the Horner counter hashes are wrong".to_string()));
            }
        }

        if self.pi.general_multiset(rt) != self.general_multiset(rt) {
            return Err(self.fail("the general multiset is wrong".to_string()));
        }
        Ok(())
    }
}
