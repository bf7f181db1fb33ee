//! The GL module: the global and local constraints of one module, proved
//! segment by segment.
//!
//! Global constraints with shifted columns read rows of the neighbouring
//! segments. A segment opens the last rows of its columns ("sends" them) and
//! the next segment receives them as a proof column; the rows the segment
//! check skips are then re-checked as local constraints over the received
//! values. The exchange is bound by hashes inserted in and removed from the
//! general multiset.

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use log::debug;
use plonky2::field::types::{Field, PrimeField64};
use wizard::column::{Column, ColumnId};
use wizard::expression::{Accessor, Evaluator, Expr};
use wizard::field::{from_bool, from_usize, hash_chain, F};
use wizard::iop::{CoinKind, CompiledIop};
use wizard::mset::{MSetHash, MSET_HASH_SIZE};
use wizard::query::{PlonkInWizard, Query, QueryId, Range};
use wizard::runtime::Runtime;

use crate::discoverer::Discovery;
use crate::error::SegmentError;
use crate::filter::FilteredModuleInputs;
use crate::proof::{ProofType, SegmentModule};
use crate::public_input::{
    declare_public_inputs, indexed, pi_column_name, PiColumns, SegmentAccessors,
    SHARED_RANDOMNESS_MULTISET,
};
use crate::translator::ModuleTranslator;
use crate::witness::{commitment_message, lpp_commitment, BlueprintGL, ModuleWitnessGL};

pub const IS_FIRST_COLUMN: &str = "IS_FIRST";
pub const IS_LAST_COLUMN: &str = "IS_LAST";
pub const SEGMENT_INDEX_COLUMN: &str = "SEGMENT_MODULE_INDEX";
pub const SENT_VALUES_HASH: &str = "SENT_VALUES_GLOBAL_HASH";
pub const RECEIVED_VALUES_HASH: &str = "RECEIVED_VALUES_GLOBAL_HASH";
pub const RECEIVED_VALUES: &str = "RECEIVED_VALUES_GLOBAL";
const DUMMY_COIN: &str = "DUMMY_GL_COIN";

/// Tag of the general multiset messages exchanged between GL segments.
const GL_EXCHANGE_TAG: u64 = 1;

/// The columns and openings of the boundary exchange between consecutive
/// segments.
#[derive(Clone, Debug)]
pub struct Boundary {
    /// `SENT_VALUE_GLOBAL_j` opens the value received as
    /// `RECEIVED_VALUES_GLOBAL[j]` by the next segment.
    pub sent_openings: Vec<QueryId>,
    pub sent_hash: ColumnId,
    pub received_hash: ColumnId,
    pub received_values: ColumnId,
    pub nb_received: usize,
}

/// Received values requested by the completion of the global constraints,
/// deduplicated, with the position each is sent from.
#[derive(Default)]
struct Exchanges {
    received: Vec<(ColumnId, isize)>,
    sent: Vec<(ColumnId, isize)>,
    index: HashMap<(ColumnId, isize), usize>,
}

impl Exchanges {
    fn request(&mut self, root: ColumnId, received_at: isize, sent_at: isize) {
        if self.index.contains_key(&(root, received_at)) {
            return;
        }
        self.index.insert((root, received_at), self.received.len());
        self.received.push((root, received_at));
        self.sent.push((root, sent_at));
    }
}

/// Offsets of the global constraint, widened to include zero.
fn clamped_offsets(expr: &Expr) -> (isize, isize) {
    let (min, max) = expr.min_max_offset();
    (min.min(0), max.max(0))
}

#[derive(Clone, Debug)]
pub struct ModuleGL {
    pub wiop: CompiledIop,
    pub module_name: String,
    pub module_index: usize,
    pub nb_modules: usize,
    pub is_first: ColumnId,
    pub is_last: ColumnId,
    pub segment_index: ColumnId,
    /// Whether the module has an LPP counterpart, whose commitment the GL
    /// segments insert in the multisets.
    pub has_lpp: bool,
    /// The LPP columns of the module, in the order they are committed to.
    pub lpp_columns: Vec<ColumnId>,
    pub pi: PiColumns,
    pub shared_multiset: [ColumnId; MSET_HASH_SIZE],
    pub boundary: Option<Boundary>,
    /// Completions of global constraints that read no column of the
    /// segment, checked directly by the verifier.
    pub explicitly_verified: Vec<(String, Expr)>,
    pub blueprint: BlueprintGL,
}

impl ModuleGL {
    pub fn new(source: &CompiledIop, disc: &Discovery, inputs: &FilteredModuleInputs) -> Self {
        let nb_modules = disc.nb_modules();
        let k = inputs.module_index;
        let mut tr = ModuleTranslator::new(source, disc);

        let in_lpp: HashSet<ColumnId> = inputs.columns_lpp.iter().copied().collect();
        let lpp_columns = inputs
            .columns_lpp
            .iter()
            .map(|&c| tr.insert_column(c, 0))
            .collect_vec();
        for &c in inputs.columns.iter().filter(|c| !in_lpp.contains(*c)) {
            tr.insert_column(c, 1);
        }

        let is_first = tr.wiop.insert_proof(0, IS_FIRST_COLUMN, 1);
        let is_last = tr.wiop.insert_proof(0, IS_LAST_COLUMN, 1);
        let segment_index = tr.wiop.insert_proof(0, SEGMENT_INDEX_COLUMN, 1);
        let pi = PiColumns::insert(&mut tr.wiop, nb_modules);
        let shared_multiset = std::array::from_fn(|i| {
            tr.wiop
                .insert_proof(1, pi_column_name(&indexed(SHARED_RANDOMNESS_MULTISET, i)), 1)
        });
        tr.wiop.insert_coin(DUMMY_COIN, 1, CoinKind::Field);

        for (name, col) in &inputs.local_openings {
            let col = tr.translate_column(col, 1);
            tr.wiop.insert_query(name.clone(), 1, Query::LocalOpening(col));
        }
        for (name, col, bound) in &inputs.ranges {
            let column = tr.translate_column(col, 1);
            tr.wiop
                .insert_query(name.clone(), 1, Query::Range(Range { column, bound: *bound }));
        }
        for (name, p) in &inputs.plonk_in_wizard {
            let q = PlonkInWizard {
                data: tr.translate_column(&p.data, 1),
                selector: tr.translate_column(&p.selector, 1),
                circuit: p.circuit.clone(),
                max_nb_instances: p.max_nb_instances,
            };
            tr.wiop.insert_query(name.clone(), 1, Query::PlonkInWizard(q));
        }

        let mut exchanges = Exchanges::default();
        let mut shifted_globals = Vec::new();
        for (name, e) in &inputs.global_constraints {
            let t = tr.translate_expr(e);
            tr.wiop.insert_query(name.clone(), 1, Query::Global(t.clone()));
            let (min, max) = clamped_offsets(&t);
            if (min, max) == (0, 0) {
                continue;
            }
            for col in t.columns() {
                let Some(root) = col.root() else { continue };
                let size = tr.wiop.column(root).size as isize;
                for i in col.offset()..max {
                    let received_at = i - max;
                    exchanges.request(root, received_at, received_at + size);
                }
            }
            shifted_globals.push((name.clone(), t, min, max));
        }

        let boundary = (!exchanges.received.is_empty()).then(|| {
            let sent_openings = exchanges
                .sent
                .iter()
                .enumerate()
                .map(|(j, &(root, pos))| {
                    tr.wiop.insert_query(
                        format!("SENT_VALUE_GLOBAL_{j}"),
                        1,
                        Query::LocalOpening(Column::Natural(root).shift(pos)),
                    )
                })
                .collect();
            let nb_received = exchanges.received.len();
            Boundary {
                sent_openings,
                sent_hash: tr.wiop.insert_proof(1, SENT_VALUES_HASH, 1),
                received_hash: tr.wiop.insert_proof(1, RECEIVED_VALUES_HASH, 1),
                received_values: tr
                    .wiop
                    .insert_proof(1, RECEIVED_VALUES, nb_received.next_power_of_two()),
                nb_received,
            }
        });

        let not_first = Expr::one() - Expr::Accessor(Accessor::cell(is_first, 0));
        let mut explicitly_verified = Vec::new();
        for (name, t, min, max) in &shifted_globals {
            for row in -max..-min {
                let completed = t.rebuild(
                    &mut |c| match c.root() {
                        None => Expr::Column(c.clone()),
                        Some(root) => {
                            let shifted = row + c.offset();
                            if shifted >= 0 {
                                return Expr::Column(Column::Natural(root).shift(shifted));
                            }
                            match (&boundary, exchanges.index.get(&(root, shifted))) {
                                (Some(b), Some(&j)) => {
                                    Expr::Accessor(Accessor::cell(b.received_values, j))
                                }
                                _ => panic!(
                                    "{name}: row {shifted} of the previous segment is not received"
                                ),
                            }
                        }
                    },
                    &mut |a| Expr::Accessor(a.clone()),
                );
                let query_name = format!("COMPLETE_GLOBAL_CS_{row}_QUERY_{name}");
                let columnless = completed.is_columnless();
                let gated = completed * not_first.clone();
                if columnless {
                    explicitly_verified.push((query_name, gated));
                } else {
                    tr.wiop.insert_query(query_name, 1, Query::Local(gated));
                }
            }
        }

        for (name, e) in &inputs.local_constraints {
            let t = tr.translate_expr(e);
            let (min, max) = t.min_max_offset();
            assert!(
                !(min < 0 && max >= 0),
                "local constraint {name} mixes negative and non-negative offsets"
            );
            // Constraints on the last rows only hold in the last segment.
            let gate = if max < 0 { is_last } else { is_first };
            tr.wiop.insert_query(
                name.clone(),
                1,
                Query::Local(t * Expr::Accessor(Accessor::cell(gate, 0))),
            );
        }

        let functionals = inputs
            .functionals
            .iter()
            .map(|f| {
                let acc = if f.owned {
                    let value = Expr::Accessor(tr.translate_accessor(&f.acc));
                    Accessor::Expr(Box::new(value * Expr::Accessor(Accessor::cell(is_first, 0))))
                } else {
                    Accessor::Constant(F::ZERO)
                };
                (f.name.clone(), acc)
            })
            .collect_vec();

        let mut acc = SegmentAccessors::neutral(k, nb_modules, true);
        acc.functionals = functionals;
        acc.is_first = Accessor::cell(is_first, 0);
        acc.is_last = Accessor::cell(is_last, 0);
        if let Some(b) = &boundary {
            acc.global_provider = Accessor::cell(b.sent_hash, 0);
            acc.global_receiver = Accessor::cell(b.received_hash, 0);
        }
        acc.shared_randomness_multiset =
            std::array::from_fn(|i| Accessor::cell(shared_multiset[i], 0));
        declare_public_inputs(&mut tr.wiop, &pi, acc);

        let source_of = |c: ColumnId| {
            let name = &tr.wiop.column(c).name;
            match source.column_by_name(name) {
                Some(id) => id,
                None => unreachable!("module columns are named after source columns"),
            }
        };
        let blueprint = BlueprintGL {
            module_name: inputs.module_name.clone(),
            module_index: k,
            columns: inputs.columns.clone(),
            sent_values: exchanges
                .sent
                .iter()
                .map(|&(root, pos)| (source_of(root), pos))
                .collect(),
        };

        debug!(
            "GL module {}: {} columns, {} received values, {} explicitly verified",
            inputs.module_name,
            tr.wiop.num_columns(),
            exchanges.received.len(),
            explicitly_verified.len()
        );
        Self {
            wiop: tr.wiop,
            module_name: inputs.module_name.clone(),
            module_index: k,
            nb_modules,
            is_first,
            is_last,
            segment_index,
            has_lpp: inputs.has_lpp(),
            lpp_columns,
            pi,
            shared_multiset,
            boundary,
            explicitly_verified,
            blueprint,
        }
    }

    fn commitment(&self, rt: &Runtime) -> F {
        lpp_commitment(self.lpp_columns.iter().map(|&c| rt.column(c)))
    }

    fn sent_hash(rt: &Runtime, b: &Boundary) -> F {
        hash_chain(
            b.sent_openings
                .iter()
                .map(|&q| rt.accessor_value(&Accessor::LocalOpening(q))),
        )
    }

    fn received_hash(rt: &Runtime, b: &Boundary) -> F {
        hash_chain(rt.column(b.received_values)[..b.nb_received].iter().copied())
    }

    fn segment_of(&self, rt: &Runtime) -> (usize, usize) {
        let seg = rt.column(self.segment_index)[0].to_canonical_u64() as usize;
        let targets = self.pi.target_nb_segments(rt);
        (seg, targets[self.module_index])
    }

    /// The general and shared multisets of the segment, from the values of
    /// its columns.
    fn multisets(&self, rt: &Runtime) -> (MSetHash, MSetHash) {
        let (seg, total) = self.segment_of(rt);
        let k = from_usize(self.module_index);
        let mut shared = MSetHash::empty();
        if self.has_lpp {
            shared.insert(&commitment_message(self.module_index, seg, self.commitment(rt)));
        }
        let mut general = shared;
        if let Some(b) = &self.boundary {
            let tag = F::from_canonical_u64(GL_EXCHANGE_TAG);
            if seg < total.saturating_sub(1) {
                general.insert(&[k, from_usize(seg), tag, rt.column(b.sent_hash)[0]]);
            }
            if seg > 0 {
                general.remove(&[k, from_usize(seg - 1), tag, rt.column(b.received_hash)[0]]);
            }
        }
        (general, shared)
    }

    fn fail(&self, reason: String) -> SegmentError {
        SegmentError::module_check(&self.module_name, reason)
    }
}

impl SegmentModule for ModuleGL {
    type Witness = ModuleWitnessGL;

    const PROOF_TYPE: ProofType = ProofType::Gl;

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

    fn assign(&self, rt: &mut Runtime, w: &ModuleWitnessGL) -> Result<(), SegmentError> {
        for (name, values) in &w.columns {
            rt.assign_column_by_name(name, values.clone());
        }
        rt.assign_column(self.is_first, vec![from_bool(w.is_first())]);
        rt.assign_column(self.is_last, vec![from_bool(w.is_last())]);
        rt.assign_column(self.segment_index, vec![from_usize(w.segment_index)]);
        let commitment = self.commitment(rt);
        self.pi
            .assign_setup(rt, &w.total_segment_counts, w.vk_merkle_root, commitment);

        self.replay(rt)?;

        rt.assign_all_params()?;
        if let Some(b) = &self.boundary {
            assert_eq!(
                w.received_values_global.len(),
                b.nb_received,
                "{} receives {} values, the witness holds {}",
                self.module_name,
                b.nb_received,
                w.received_values_global.len()
            );
            let mut received = w.received_values_global.clone();
            received.resize(rt.spec().column(b.received_values).size, F::ZERO);
            rt.assign_column(b.received_values, received);
            let sent = Self::sent_hash(rt, b);
            let received = Self::received_hash(rt, b);
            rt.assign_column(b.sent_hash, vec![sent]);
            rt.assign_column(b.received_hash, vec![received]);
        }
        let (general, shared) = self.multisets(rt);
        for (&col, &v) in self.shared_multiset.iter().zip(&shared.0) {
            rt.assign_column(col, vec![v]);
        }
        self.pi.assign_general_multiset(rt, &general);
        Ok(())
    }

    fn replay(&self, rt: &mut Runtime) -> Result<(), SegmentError> {
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

        let commitment = self.commitment(rt);
        if rt.column(self.pi.lpp_commitment)[0] != commitment {
            return Err(self.fail("the LPP commitment does not match the LPP columns".to_string()));
        }

        if let Some(b) = &self.boundary {
            if rt.column(b.sent_hash)[0] != Self::sent_hash(rt, b) {
                return Err(self.fail("the hash of the sent values is wrong".to_string()));
            }
            if rt.column(b.received_hash)[0] != Self::received_hash(rt, b) {
                return Err(self.fail("the hash of the received values is wrong".to_string()));
            }
        }

        let (general, shared) = self.multisets(rt);
        let shared_claimed =
            MSetHash(std::array::from_fn(|i| rt.column(self.shared_multiset[i])[0]));
        if shared_claimed != shared {
            return Err(self.fail("the shared randomness multiset is wrong".to_string()));
        }
        if self.pi.general_multiset(rt) != general {
            return Err(self.fail("the general multiset is wrong".to_string()));
        }

        for (name, e) in &self.explicitly_verified {
            let value = e.eval_row(rt, 0);
            if !value.is_zero() {
                return Err(self.fail(format!("{name} does not vanish (got {value})")));
            }
        }
        Ok(())
    }
}
