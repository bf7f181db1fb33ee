//! Assignments of a compiled IOP and the Fiat-Shamir transcript state.

use std::collections::BTreeMap;

use anyhow::{anyhow, ensure, Result};
use plonky2::field::types::Field;
use serde::{Deserialize, Serialize};

use crate::column::{positive_mod, Column, ColumnId};
use crate::error::QueryError;
use crate::expression::{Accessor, Evaluator, Expr};
use crate::field::{hash_elements, hash_labelled, Digest, F};
use crate::iop::{CoinId, CoinKind, CompiledIop};
use crate::query::{
    FractionPart, HornerPart, HornerPartParams, HornerParams, Query, QueryId, QueryParams,
};

/// Everything the prover sends: the assignment of every non-fixed column
/// and the claimed result of every query with parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub columns: BTreeMap<String, Vec<F>>,
    pub params: BTreeMap<String, QueryParams>,
}

pub fn zero_digest() -> Digest {
    Digest {
        elements: [F::ZERO; 4],
    }
}

pub struct Runtime<'a> {
    spec: &'a CompiledIop,
    columns: Vec<Option<Vec<F>>>,
    coins: Vec<Option<F>>,
    params: Vec<Option<QueryParams>>,
    fs_state: Digest,
    seed: Digest,
    round: usize,
}

impl<'a> Runtime<'a> {
    pub fn new(spec: &'a CompiledIop) -> Self {
        let columns = spec
            .columns()
            .map(|(id, _)| spec.precomputed(id).map(<[F]>::to_vec))
            .collect();
        let mut rt = Self {
            spec,
            columns,
            coins: vec![None; spec.coins().count()],
            params: vec![None; spec.queries().count()],
            fs_state: zero_digest(),
            seed: zero_digest(),
            round: 0,
        };
        rt.sample_coins(0);
        rt
    }

    /// Rebuilds the runtime of a verifier from a prover transcript. Coins are
    /// not part of the transcript and must be re-derived by the caller.
    pub fn from_transcript(spec: &'a CompiledIop, transcript: &Transcript) -> Result<Self> {
        let mut rt = Self::new(spec);
        for (name, values) in &transcript.columns {
            let id = spec
                .column_by_name(name)
                .ok_or_else(|| anyhow!("transcript assigns unknown column {name}"))?;
            let info = spec.column(id);
            ensure!(
                !info.status.is_fixed(),
                "transcript overrides the fixed column {name}"
            );
            ensure!(
                values.len() == info.size,
                "column {name} has {} values, expected {}",
                values.len(),
                info.size
            );
            rt.columns[id.0] = Some(values.clone());
        }
        for (name, params) in &transcript.params {
            let id = spec
                .query_by_name(name)
                .ok_or_else(|| anyhow!("transcript holds parameters of unknown query {name}"))?;
            rt.params[id.0] = Some(params.clone());
        }
        Ok(rt)
    }

    pub fn transcript(&self) -> Transcript {
        let mut transcript = Transcript::default();
        for (id, info) in self.spec.columns() {
            if info.status.is_fixed() {
                continue;
            }
            if let Some(values) = &self.columns[id.0] {
                transcript.columns.insert(info.name.clone(), values.clone());
            }
        }
        for (id, info) in self.spec.queries() {
            if let Some(p) = &self.params[id.0] {
                transcript.params.insert(info.name.clone(), p.clone());
            }
        }
        transcript
    }

    pub const fn spec(&self) -> &'a CompiledIop {
        self.spec
    }

    pub fn assign_column(&mut self, id: ColumnId, values: Vec<F>) {
        let info = self.spec.column(id);
        assert_eq!(
            values.len(),
            info.size,
            "column {} is assigned {} values but has size {}",
            info.name,
            values.len(),
            info.size
        );
        self.columns[id.0] = Some(values);
    }

    pub fn assign_column_by_name(&mut self, name: &str, values: Vec<F>) {
        let id = self
            .spec
            .column_by_name(name)
            .unwrap_or_else(|| panic!("unknown column {name}"));
        self.assign_column(id, values);
    }

    pub fn has_column(&self, id: ColumnId) -> bool {
        self.columns[id.0].is_some()
    }

    /// Names of the columns still waiting for an assignment.
    pub fn missing_columns(&self) -> Vec<String> {
        self.spec
            .columns()
            .filter(|(id, _)| !self.has_column(*id))
            .map(|(_, info)| info.name.clone())
            .collect()
    }

    pub fn column(&self, id: ColumnId) -> &[F] {
        match &self.columns[id.0] {
            Some(v) => v,
            None => panic!("column {} is not assigned", self.spec.column(id).name),
        }
    }

    pub fn column_by_name(&self, name: &str) -> &[F] {
        let id = self
            .spec
            .column_by_name(name)
            .unwrap_or_else(|| panic!("unknown column {name}"));
        self.column(id)
    }

    pub fn column_size(&self, col: &Column) -> usize {
        match col {
            Column::Constant { size, .. } => *size,
            _ => col.root().map_or(1, |id| self.spec.column(id).size),
        }
    }

    /// Returns the full assignment of a possibly shifted column.
    pub fn column_values(&self, col: &Column) -> Vec<F> {
        let n = self.column_size(col);
        (0..n).map(|i| self.column_value(col, i)).collect()
    }

    /// Number of rows an expression is evaluated on.
    pub fn expr_size(&self, expr: &Expr) -> usize {
        let cols = expr.columns();
        cols.iter()
            .find(|c| !c.is_constant())
            .or_else(|| cols.first())
            .map_or(1, |c| self.column_size(c))
    }

    pub const fn fs_state(&self) -> Digest {
        self.fs_state
    }

    /// Overrides the Fiat-Shamir state. The new state also becomes the seed
    /// of the `FieldFromSeed` coins.
    pub fn set_fs_state(&mut self, state: Digest) {
        self.fs_state = state;
        self.seed = state;
    }

    pub const fn round(&self) -> usize {
        self.round
    }

    /// Moves to `round`, absorbing the columns of every round left behind
    /// and sampling the coins of every round entered.
    pub fn go_to_round(&mut self, round: usize) {
        while self.round < round {
            let mut absorbed: Vec<F> = self.fs_state.elements.to_vec();
            for (id, info) in self.spec.columns() {
                if info.round != self.round || info.status.is_fixed() {
                    continue;
                }
                absorbed.extend_from_slice(self.column(id));
            }
            self.fs_state = hash_elements(&absorbed);
            self.round += 1;
            self.sample_coins(self.round);
        }
    }

    fn sample_coins(&mut self, round: usize) {
        for (id, info) in self.spec.coins() {
            if info.round != round {
                continue;
            }
            let source = match info.kind {
                CoinKind::Field => self.fs_state,
                CoinKind::FieldFromSeed => self.seed,
            };
            self.coins[id.0] = Some(hash_labelled(&info.name, &source.elements).elements[0]);
        }
    }

    pub fn coin(&self, id: CoinId) -> F {
        match self.coins[id.0] {
            Some(v) => v,
            None => panic!("coin {} is not sampled yet", self.spec.coin(id).name),
        }
    }

    pub fn set_params(&mut self, id: QueryId, params: QueryParams) {
        self.params[id.0] = Some(params);
    }

    pub fn params(&self, id: QueryId) -> Option<&QueryParams> {
        self.params[id.0].as_ref()
    }

    fn must_params(&self, id: QueryId) -> &QueryParams {
        self.params(id)
            .unwrap_or_else(|| panic!("parameters of {} are missing", self.spec.query(id).name))
    }

    pub fn compute_log_derivative_sum(
        &self,
        name: &str,
        parts: &[FractionPart],
    ) -> Result<F, QueryError> {
        let mut res = F::ZERO;
        for (k, part) in parts.iter().enumerate() {
            let n = self.expr_size(&part.num).max(self.expr_size(&part.den));
            for row in 0..n {
                let den = part.den.eval_row(self, row);
                let inv = den.try_inverse().ok_or_else(|| QueryError::ZeroDenominator {
                    name: name.to_string(),
                    part: k,
                    row,
                })?;
                res += part.num.eval_row(self, row) * inv;
            }
        }
        Ok(res)
    }

    pub fn compute_grand_product(
        &self,
        name: &str,
        parts: &[FractionPart],
    ) -> Result<F, QueryError> {
        let mut num = F::ONE;
        let mut den = F::ONE;
        for part in parts {
            let n = self.expr_size(&part.num).max(self.expr_size(&part.den));
            for row in 0..n {
                num *= part.num.eval_row(self, row);
                den *= part.den.eval_row(self, row);
            }
        }
        let inv = den.try_inverse().ok_or_else(|| QueryError::ZeroDenominator {
            name: name.to_string(),
            part: 0,
            row: 0,
        })?;
        Ok(num * inv)
    }

    /// Computes the result of a Horner query, each part starting its power
    /// count at `n0s[k]`.
    pub fn compute_horner(
        &self,
        name: &str,
        parts: &[HornerPart],
        n0s: &[usize],
    ) -> Result<HornerParams, QueryError> {
        assert_eq!(
            parts.len(),
            n0s.len(),
            "horner {name} has {} parts but {} starting counters",
            parts.len(),
            n0s.len()
        );
        let mut final_result = F::ZERO;
        let mut counters = Vec::with_capacity(parts.len());
        for (k, (part, &n0)) in parts.iter().zip(n0s).enumerate() {
            let x = self.accessor_value(&part.x);
            let mut power = x.exp_u64(n0 as u64);
            let mut acc = F::ZERO;
            let mut count = 0;
            for row in 0..self.column_size(&part.selector) {
                let s = self.column_value(&part.selector, row);
                if s.is_zero() {
                    continue;
                }
                if !s.is_one() {
                    return Err(QueryError::NonBinarySelector {
                        name: name.to_string(),
                        part: k,
                        row,
                    });
                }
                acc += part.coefficient.eval_row(self, row) * power;
                power *= x;
                count += 1;
            }
            final_result += if part.negative { -acc } else { acc };
            counters.push(HornerPartParams { n0, n1: n0 + count });
        }
        Ok(HornerParams {
            final_result,
            parts: counters,
        })
    }

    /// Computes and records the parameters of query `id`. Horner queries
    /// start their counters at `horner_n0s`.
    pub fn assign_query_params(
        &mut self,
        id: QueryId,
        horner_n0s: &[usize],
    ) -> Result<(), QueryError> {
        let info = self.spec.query(id);
        let params = match &info.query {
            Query::LocalOpening(col) => QueryParams::LocalOpening(self.column_value(col, 0)),
            Query::LogDerivativeSum(parts) => {
                QueryParams::LogDerivativeSum(self.compute_log_derivative_sum(&info.name, parts)?)
            }
            Query::GrandProduct(parts) => {
                QueryParams::GrandProduct(self.compute_grand_product(&info.name, parts)?)
            }
            Query::Horner(parts) => {
                QueryParams::Horner(self.compute_horner(&info.name, parts, horner_n0s)?)
            }
            _ => return Ok(()),
        };
        self.set_params(id, params);
        Ok(())
    }

    /// Assigns the parameters of every query that has some, with Horner
    /// counters starting at zero.
    pub fn assign_all_params(&mut self) -> Result<(), QueryError> {
        let ids: Vec<(QueryId, usize)> = self
            .spec
            .queries()
            .filter(|(_, q)| !q.ignored && q.query.has_params())
            .map(|(id, q)| (id, q.query.as_horner().map_or(0, Vec::len)))
            .collect();
        for (id, nb_parts) in ids {
            self.assign_query_params(id, &vec![0; nb_parts])?;
        }
        Ok(())
    }

    pub fn public_inputs(&self) -> Vec<(String, F)> {
        self.spec
            .public_inputs()
            .iter()
            .map(|pi| (pi.name.clone(), self.accessor_value(&pi.acc)))
            .collect()
    }

    pub fn public_input(&self, name: &str) -> F {
        let pi = self
            .spec
            .public_inputs()
            .iter()
            .find(|pi| pi.name == name)
            .unwrap_or_else(|| panic!("unknown public input {name}"));
        self.accessor_value(&pi.acc)
    }
}

impl Evaluator for Runtime<'_> {
    fn column_value(&self, column: &Column, row: usize) -> F {
        match column {
            Column::Constant { value, .. } => *value,
            Column::Natural(id) => {
                let v = self.column(*id);
                v[row % v.len()]
            }
            Column::Shifted { parent, offset } => {
                let v = self.column(*parent);
                v[positive_mod(row as isize + offset, v.len())]
            }
        }
    }

    fn accessor_value(&self, accessor: &Accessor) -> F {
        match accessor {
            Accessor::Constant(x) => *x,
            Accessor::Cell { column, position } => self.column_value(column, *position),
            Accessor::Coin(id) => self.coin(*id),
            Accessor::LocalOpening(q) => match self.must_params(*q) {
                QueryParams::LocalOpening(y) => *y,
                _ => panic!("{} is not a local opening", self.spec.query(*q).name),
            },
            Accessor::LogDerivativeSum(q) => match self.must_params(*q) {
                QueryParams::LogDerivativeSum(y) => *y,
                _ => panic!("{} is not a log-derivative sum", self.spec.query(*q).name),
            },
            Accessor::GrandProduct(q) => match self.must_params(*q) {
                QueryParams::GrandProduct(y) => *y,
                _ => panic!("{} is not a grand product", self.spec.query(*q).name),
            },
            Accessor::HornerFinal(q) => match self.must_params(*q) {
                QueryParams::Horner(h) => h.final_result,
                _ => panic!("{} is not a horner query", self.spec.query(*q).name),
            },
            Accessor::Expr(e) => e.eval_row(self, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnStatus;
    use crate::expression::Expr;

    fn felts(xs: &[u64]) -> Vec<F> {
        xs.iter().copied().map(F::from_canonical_u64).collect()
    }

    #[test]
    fn seeded_coins_only_depend_on_the_seed() {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 4);
        let seeded = comp.insert_coin("GAMMA", 1, CoinKind::FieldFromSeed);
        let plain = comp.insert_coin("BETA", 1, CoinKind::Field);

        let seed = hash_elements(&felts(&[1, 2, 3]));
        let run = |values: &[u64]| {
            let mut rt = Runtime::new(&comp);
            rt.assign_column(a, felts(values));
            rt.set_fs_state(seed);
            rt.go_to_round(1);
            (rt.coin(seeded), rt.coin(plain))
        };

        let (s1, p1) = run(&[1, 2, 3, 4]);
        let (s2, p2) = run(&[4, 3, 2, 1]);
        assert_eq!(s1, s2);
        assert_ne!(p1, p2);
    }

    #[test]
    fn horner_counts_from_n0() -> Result<()> {
        let mut comp = CompiledIop::new();
        let c = comp.insert_commit("C", 4);
        let s = comp.insert_commit("S", 4);
        let parts = vec![HornerPart {
            coefficient: Expr::from(c),
            selector: Column::Natural(s),
            x: Accessor::Constant(F::TWO),
            negative: false,
        }];
        let mut rt = Runtime::new(&comp);
        rt.assign_column(c, felts(&[3, 5, 7, 9]));
        rt.assign_column(s, felts(&[1, 0, 1, 0]));

        let res = rt.compute_horner("H", &parts, &[2])?;
        // 3 * 2^2 + 7 * 2^3
        assert_eq!(res.final_result, F::from_canonical_u64(68));
        assert_eq!(res.parts, vec![HornerPartParams { n0: 2, n1: 4 }]);
        Ok(())
    }

    #[test]
    fn transcript_round_trips_through_the_verifier() -> Result<()> {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 2);
        comp.insert_column("P", 2, 0, ColumnStatus::Proof);
        let lo = comp.insert_query("LO", 0, Query::LocalOpening(Column::Natural(a)));

        let mut rt = Runtime::new(&comp);
        rt.assign_column(a, felts(&[7, 8]));
        rt.assign_column_by_name("P", felts(&[1, 1]));
        rt.assign_all_params()?;

        let replayed = Runtime::from_transcript(&comp, &rt.transcript())?;
        assert_eq!(replayed.params(lo), Some(&QueryParams::LocalOpening(F::from_canonical_u64(7))));
        assert!(replayed.missing_columns().is_empty());
        Ok(())
    }
}
