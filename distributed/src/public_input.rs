//! The public inputs every segment proof exposes, and their structured
//! view.
//!
//! GL and LPP segments of a protocol declare exactly the same list of names
//! so that the conglomeration can treat every proof uniformly. Entries that
//! make no sense for a segment kind are declared with a neutral constant.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use plonky2::field::types::{Field, PrimeField64};
use serde::{Deserialize, Serialize};
use wizard::column::ColumnId;
use wizard::expression::Accessor;
use wizard::field::{from_usize, F};
use wizard::iop::CompiledIop;
use wizard::mset::{MSetHash, MSET_HASH_SIZE};
use wizard::runtime::Runtime;

pub const IS_FIRST: &str = "IS_FIRST";
pub const IS_LAST: &str = "IS_LAST";
pub const IS_GL: &str = "IS_GL";
pub const IS_LPP: &str = "IS_LPP";
pub const GLOBAL_PROVIDER: &str = "GLOBAL_PROVIDER";
pub const GLOBAL_RECEIVER: &str = "GLOBAL_RECEIVER";
pub const LOG_DERIVATIVE_SUM: &str = "LOG_DERIVATE_SUM_PUBLIC_INPUT";
pub const GRAND_PRODUCT: &str = "GRAND_PRODUCT_PUBLIC_INPUT";
pub const HORNER_SUM: &str = "HORNER_FINAL_RES_PUBLIC_INPUT";
pub const HORNER_N0_HASH: &str = "HORNER_N0_HASH_0";
pub const HORNER_N1_HASH: &str = "HORNER_N1_HASH_0";
pub const LPP_COMMITMENT: &str = "LPP_COLUMNS_MERKLE_ROOTS_0";
pub const TARGET_NB_SEGMENTS: &str = "TARGET_NB_SEGMENTS";
pub const GL_SEGMENT_COUNT: &str = "GL_SEGMENT_COUNT";
pub const LPP_SEGMENT_COUNT: &str = "LPP_SEGMENT_COUNT";
pub const GENERAL_MULTISET: &str = "GENERAL_MULTI_SET";
pub const SHARED_RANDOMNESS_MULTISET: &str = "SHARED_RANDOMNESS_MULTI_SET";
pub const INITIAL_RANDOMNESS: &str = "INITIAL_RANDOMNESS_PUBLIC_INPUT";
pub const VK_MERKLE_ROOT: &str = "VK_MERKLE_ROOT";
pub const VERIFYING_KEY: &str = "VERIFYING_KEY";
pub const VERIFYING_KEY_2: &str = "VERIFYING_KEY_2";

pub fn indexed(base: &str, i: usize) -> String {
    format!("{base}_{i}")
}

/// Name of the proof column holding the value of a public input computed by
/// the prover.
pub fn pi_column_name(name: &str) -> String {
    format!("{name}_PI_COLUMN")
}

/// The structured view of the public inputs of a segment or
/// conglomeration proof.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitlessPublicInput {
    pub functionals: BTreeMap<String, F>,
    pub is_first: F,
    pub is_last: F,
    pub is_gl: F,
    pub is_lpp: F,
    pub global_provider: F,
    pub global_receiver: F,
    pub log_derivative_sum: F,
    pub grand_product: F,
    pub horner_sum: F,
    pub horner_n0_hash: F,
    pub horner_n1_hash: F,
    pub lpp_commitment: F,
    pub target_nb_segments: Vec<F>,
    pub gl_segment_count: Vec<F>,
    pub lpp_segment_count: Vec<F>,
    pub general_multiset: MSetHash,
    pub shared_randomness_multiset: MSetHash,
    pub initial_randomness: [F; 4],
    pub vk_merkle_root: [F; 4],
    pub verifying_key: [F; 4],
    pub verifying_key_2: [F; 4],
}

impl LimitlessPublicInput {
    pub fn nb_modules(&self) -> usize {
        self.target_nb_segments.len()
    }

    /// Every public input, by name.
    pub fn to_named(&self) -> BTreeMap<String, F> {
        let mut res = self.functionals.clone();
        let mut put = |name: String, v: F| {
            res.insert(name, v);
        };
        put(IS_FIRST.into(), self.is_first);
        put(IS_LAST.into(), self.is_last);
        put(IS_GL.into(), self.is_gl);
        put(IS_LPP.into(), self.is_lpp);
        put(GLOBAL_PROVIDER.into(), self.global_provider);
        put(GLOBAL_RECEIVER.into(), self.global_receiver);
        put(LOG_DERIVATIVE_SUM.into(), self.log_derivative_sum);
        put(GRAND_PRODUCT.into(), self.grand_product);
        put(HORNER_SUM.into(), self.horner_sum);
        put(HORNER_N0_HASH.into(), self.horner_n0_hash);
        put(HORNER_N1_HASH.into(), self.horner_n1_hash);
        put(LPP_COMMITMENT.into(), self.lpp_commitment);
        for (base, values) in [
            (TARGET_NB_SEGMENTS, &self.target_nb_segments),
            (GL_SEGMENT_COUNT, &self.gl_segment_count),
            (LPP_SEGMENT_COUNT, &self.lpp_segment_count),
        ] {
            for (i, v) in values.iter().enumerate() {
                put(indexed(base, i), *v);
            }
        }
        for (base, values) in [
            (GENERAL_MULTISET, &self.general_multiset.0),
            (SHARED_RANDOMNESS_MULTISET, &self.shared_randomness_multiset.0),
            (INITIAL_RANDOMNESS, &self.initial_randomness),
            (VK_MERKLE_ROOT, &self.vk_merkle_root),
            (VERIFYING_KEY, &self.verifying_key),
            (VERIFYING_KEY_2, &self.verifying_key_2),
        ] {
            for (i, v) in values.iter().enumerate() {
                put(indexed(base, i), *v);
            }
        }
        res
    }

    /// Public inputs sorted by name.
    pub fn sorted(&self) -> Vec<(String, F)> {
        self.to_named().into_iter().collect()
    }

    pub fn from_named(named: &BTreeMap<String, F>, nb_modules: usize) -> Result<Self> {
        let get = |name: &str| {
            named
                .get(name)
                .copied()
                .ok_or_else(|| anyhow!("missing public input {name}"))
        };
        let vec_of = |base: &str, n: usize| {
            (0..n)
                .map(|i| get(&indexed(base, i)))
                .collect::<Result<Vec<_>>>()
        };
        let arr_of = |base: &str| -> Result<[F; MSET_HASH_SIZE]> {
            let v = vec_of(base, MSET_HASH_SIZE)?;
            Ok(std::array::from_fn(|i| v[i]))
        };
        Ok(Self {
            functionals: named
                .iter()
                .filter(|(k, _)| k.starts_with(crate::filter::FUNCTIONAL_PREFIX))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            is_first: get(IS_FIRST)?,
            is_last: get(IS_LAST)?,
            is_gl: get(IS_GL)?,
            is_lpp: get(IS_LPP)?,
            global_provider: get(GLOBAL_PROVIDER)?,
            global_receiver: get(GLOBAL_RECEIVER)?,
            log_derivative_sum: get(LOG_DERIVATIVE_SUM)?,
            grand_product: get(GRAND_PRODUCT)?,
            horner_sum: get(HORNER_SUM)?,
            horner_n0_hash: get(HORNER_N0_HASH)?,
            horner_n1_hash: get(HORNER_N1_HASH)?,
            lpp_commitment: get(LPP_COMMITMENT)?,
            target_nb_segments: vec_of(TARGET_NB_SEGMENTS, nb_modules)?,
            gl_segment_count: vec_of(GL_SEGMENT_COUNT, nb_modules)?,
            lpp_segment_count: vec_of(LPP_SEGMENT_COUNT, nb_modules)?,
            general_multiset: MSetHash(arr_of(GENERAL_MULTISET)?),
            shared_randomness_multiset: MSetHash(arr_of(SHARED_RANDOMNESS_MULTISET)?),
            initial_randomness: arr_of(INITIAL_RANDOMNESS)?,
            vk_merkle_root: arr_of(VK_MERKLE_ROOT)?,
            verifying_key: arr_of(VERIFYING_KEY)?,
            verifying_key_2: arr_of(VERIFYING_KEY_2)?,
        })
    }
}

/// Proof columns backing the public inputs the prover computes and the
/// module checks recompute.
#[derive(Clone, Debug)]
pub struct PiColumns {
    pub target_nb_segments: Vec<ColumnId>,
    pub general_multiset: [ColumnId; MSET_HASH_SIZE],
    pub vk_merkle_root: [ColumnId; 4],
    pub lpp_commitment: ColumnId,
}

impl PiColumns {
    /// Declares the columns. Everything but the general multiset is known
    /// before the first coin and lives in round 0.
    pub fn insert(wiop: &mut CompiledIop, nb_modules: usize) -> Self {
        let mut proof =
            |round: usize, name: String| wiop.insert_proof(round, pi_column_name(&name), 1);
        Self {
            target_nb_segments: (0..nb_modules)
                .map(|i| proof(0, indexed(TARGET_NB_SEGMENTS, i)))
                .collect(),
            vk_merkle_root: std::array::from_fn(|i| proof(0, indexed(VK_MERKLE_ROOT, i))),
            lpp_commitment: proof(0, LPP_COMMITMENT.to_string()),
            general_multiset: std::array::from_fn(|i| proof(1, indexed(GENERAL_MULTISET, i))),
        }
    }

    pub fn assign_setup(
        &self,
        rt: &mut Runtime,
        targets: &[usize],
        vk_merkle_root: [F; 4],
        commitment: F,
    ) {
        for (&col, &t) in self.target_nb_segments.iter().zip(targets) {
            rt.assign_column(col, vec![from_usize(t)]);
        }
        for (&col, v) in self.vk_merkle_root.iter().zip(vk_merkle_root) {
            rt.assign_column(col, vec![v]);
        }
        rt.assign_column(self.lpp_commitment, vec![commitment]);
    }

    pub fn assign_general_multiset(&self, rt: &mut Runtime, mset: &MSetHash) {
        for (&col, &v) in self.general_multiset.iter().zip(&mset.0) {
            rt.assign_column(col, vec![v]);
        }
    }

    pub fn target_nb_segments(&self, rt: &Runtime) -> Vec<usize> {
        self.target_nb_segments
            .iter()
            .map(|&c| rt.column(c)[0].to_canonical_u64() as usize)
            .collect()
    }

    pub fn general_multiset(&self, rt: &Runtime) -> MSetHash {
        MSetHash(std::array::from_fn(|i| rt.column(self.general_multiset[i])[0]))
    }
}

/// What a segment module exposes besides its [`PiColumns`].
pub struct SegmentAccessors {
    pub module_index: usize,
    pub nb_modules: usize,
    pub is_gl: bool,
    pub functionals: Vec<(String, Accessor)>,
    pub is_first: Accessor,
    pub is_last: Accessor,
    pub global_provider: Accessor,
    pub global_receiver: Accessor,
    pub log_derivative_sum: Accessor,
    pub grand_product: Accessor,
    pub horner_sum: Accessor,
    pub horner_n0_hash: Accessor,
    pub horner_n1_hash: Accessor,
    pub shared_randomness_multiset: [Accessor; MSET_HASH_SIZE],
    pub initial_randomness: [Accessor; 4],
}

impl SegmentAccessors {
    /// Accessors of a module with no lookup and no boundary exchange.
    pub fn neutral(module_index: usize, nb_modules: usize, is_gl: bool) -> Self {
        let zero = || Accessor::Constant(F::ZERO);
        Self {
            module_index,
            nb_modules,
            is_gl,
            functionals: Vec::new(),
            is_first: zero(),
            is_last: zero(),
            global_provider: zero(),
            global_receiver: zero(),
            log_derivative_sum: zero(),
            grand_product: Accessor::Constant(F::ONE),
            horner_sum: zero(),
            horner_n0_hash: zero(),
            horner_n1_hash: zero(),
            shared_randomness_multiset: std::array::from_fn(|_| zero()),
            initial_randomness: std::array::from_fn(|_| zero()),
        }
    }
}

/// Declares the public inputs of a segment module. The verifying key
/// entries are appended by the proof layer.
pub fn declare_public_inputs(wiop: &mut CompiledIop, cols: &PiColumns, acc: SegmentAccessors) {
    for (name, a) in acc.functionals {
        wiop.insert_public_input(name, a);
    }
    let flag = |b: bool| Accessor::Constant(if b { F::ONE } else { F::ZERO });
    wiop.insert_public_input(IS_FIRST, acc.is_first);
    wiop.insert_public_input(IS_LAST, acc.is_last);
    wiop.insert_public_input(IS_GL, flag(acc.is_gl));
    wiop.insert_public_input(IS_LPP, flag(!acc.is_gl));
    wiop.insert_public_input(GLOBAL_PROVIDER, acc.global_provider);
    wiop.insert_public_input(GLOBAL_RECEIVER, acc.global_receiver);
    wiop.insert_public_input(LOG_DERIVATIVE_SUM, acc.log_derivative_sum);
    wiop.insert_public_input(GRAND_PRODUCT, acc.grand_product);
    wiop.insert_public_input(HORNER_SUM, acc.horner_sum);
    wiop.insert_public_input(HORNER_N0_HASH, acc.horner_n0_hash);
    wiop.insert_public_input(HORNER_N1_HASH, acc.horner_n1_hash);
    wiop.insert_public_input(LPP_COMMITMENT, Accessor::cell(cols.lpp_commitment, 0));
    for i in 0..acc.nb_modules {
        wiop.insert_public_input(
            indexed(TARGET_NB_SEGMENTS, i),
            Accessor::cell(cols.target_nb_segments[i], 0),
        );
        let own = i == acc.module_index;
        wiop.insert_public_input(indexed(GL_SEGMENT_COUNT, i), flag(own && acc.is_gl));
        wiop.insert_public_input(indexed(LPP_SEGMENT_COUNT, i), flag(own && !acc.is_gl));
    }
    for (i, a) in acc.shared_randomness_multiset.into_iter().enumerate() {
        wiop.insert_public_input(
            indexed(GENERAL_MULTISET, i),
            Accessor::cell(cols.general_multiset[i], 0),
        );
        wiop.insert_public_input(indexed(SHARED_RANDOMNESS_MULTISET, i), a);
    }
    for (i, a) in acc.initial_randomness.into_iter().enumerate() {
        wiop.insert_public_input(indexed(INITIAL_RANDOMNESS, i), a);
        wiop.insert_public_input(
            indexed(VK_MERKLE_ROOT, i),
            Accessor::cell(cols.vk_merkle_root[i], 0),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_view_round_trips() -> Result<()> {
        let mut pi = LimitlessPublicInput {
            is_first: F::ONE,
            horner_sum: F::from_canonical_u64(42),
            target_nb_segments: vec![F::TWO, F::ONE],
            gl_segment_count: vec![F::ZERO, F::ONE],
            lpp_segment_count: vec![F::ZERO, F::ZERO],
            vk_merkle_root: [F::from_canonical_u64(7); 4],
            ..Default::default()
        };
        pi.functionals.insert("functional.sum".to_string(), F::from_canonical_u64(9));
        pi.general_multiset.insert(&[F::ONE]);

        let named = pi.to_named();
        assert!(named.contains_key("TARGET_NB_SEGMENTS_1"));
        assert!(named.contains_key("VERIFYING_KEY_2_3"));
        assert_eq!(LimitlessPublicInput::from_named(&named, 2)?, pi);
        Ok(())
    }

    #[test]
    fn missing_entries_are_reported() {
        let pi = LimitlessPublicInput {
            target_nb_segments: vec![F::ONE],
            gl_segment_count: vec![F::ONE],
            lpp_segment_count: vec![F::ZERO],
            ..Default::default()
        };
        let mut named = pi.to_named();
        named.remove(HORNER_N1_HASH);
        let err = LimitlessPublicInput::from_named(&named, 1).expect_err("entry removed");
        assert!(err.to_string().contains(HORNER_N1_HASH));
    }
}
