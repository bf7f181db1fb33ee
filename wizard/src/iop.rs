//! The compiled IOP: the static description of a protocol.

use std::fmt::Write;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::column::{ColumnId, ColumnInfo, ColumnStatus, Pragmas};
use crate::expression::Accessor;
use crate::field::{hash_labelled, hash_two, Digest, F};
use crate::query::{Query, QueryId, QueryInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoinId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinKind {
    /// Sampled from the Fiat-Shamir state of the round.
    Field,
    /// Derived from the seed of the runtime, identical for every runtime
    /// sharing the same seed.
    FieldFromSeed,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CoinInfo {
    pub name: String,
    pub round: usize,
    pub kind: CoinKind,
}

#[derive(Clone, Debug)]
pub struct PublicInput {
    pub name: String,
    pub acc: Accessor,
}

/// Work the prover has to do on top of assigning the witness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProverAction {
    /// Assigns the multiplicity column of an inclusion query.
    InclusionMultiplicity { query: QueryId, column: ColumnId },
}

#[derive(Clone, Debug, Default)]
pub struct CompiledIop {
    columns: Vec<ColumnInfo>,
    column_index: HashMap<String, ColumnId>,
    precomputed: HashMap<ColumnId, Vec<F>>,
    coins: Vec<CoinInfo>,
    coin_index: HashMap<String, CoinId>,
    queries: Vec<QueryInfo>,
    query_index: HashMap<String, QueryId>,
    public_inputs: Vec<PublicInput>,
    prover_actions: Vec<ProverAction>,
}

impl CompiledIop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        size: usize,
        round: usize,
        status: ColumnStatus,
    ) -> ColumnId {
        let name = name.into();
        assert!(
            size.is_power_of_two(),
            "column {name} has a size of {size}, which is not a power of two"
        );
        assert!(
            !self.column_index.contains_key(&name),
            "column {name} is declared twice"
        );
        let id = ColumnId(self.columns.len());
        self.columns.push(ColumnInfo {
            name: name.clone(),
            size,
            round,
            status,
            pragmas: Pragmas::default(),
        });
        self.column_index.insert(name, id);
        id
    }

    pub fn insert_commit(&mut self, name: impl Into<String>, size: usize) -> ColumnId {
        self.insert_column(name, size, 0, ColumnStatus::Committed)
    }

    pub fn insert_proof(&mut self, round: usize, name: impl Into<String>, size: usize) -> ColumnId {
        self.insert_column(name, size, round, ColumnStatus::Proof)
    }

    pub fn insert_precomputed(&mut self, name: impl Into<String>, values: Vec<F>) -> ColumnId {
        let id = self.insert_column(name, values.len(), 0, ColumnStatus::Precomputed);
        self.precomputed.insert(id, values);
        id
    }

    pub fn set_pragmas(&mut self, id: ColumnId, pragmas: Pragmas) {
        self.columns[id.0].pragmas = pragmas;
    }

    pub fn column(&self, id: ColumnId) -> &ColumnInfo {
        &self.columns[id.0]
    }

    pub fn column_by_name(&self, name: &str) -> Option<ColumnId> {
        self.column_index.get(name).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = (ColumnId, &ColumnInfo)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, info)| (ColumnId(i), info))
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn precomputed(&self, id: ColumnId) -> Option<&[F]> {
        self.precomputed.get(&id).map(Vec::as_slice)
    }

    pub fn insert_coin(&mut self, name: impl Into<String>, round: usize, kind: CoinKind) -> CoinId {
        let name = name.into();
        assert!(
            !self.coin_index.contains_key(&name),
            "coin {name} is declared twice"
        );
        let id = CoinId(self.coins.len());
        self.coins.push(CoinInfo {
            name: name.clone(),
            round,
            kind,
        });
        self.coin_index.insert(name, id);
        id
    }

    pub fn coin(&self, id: CoinId) -> &CoinInfo {
        &self.coins[id.0]
    }

    pub fn coin_by_name(&self, name: &str) -> Option<CoinId> {
        self.coin_index.get(name).copied()
    }

    pub fn coins(&self) -> impl Iterator<Item = (CoinId, &CoinInfo)> {
        self.coins
            .iter()
            .enumerate()
            .map(|(i, info)| (CoinId(i), info))
    }

    pub fn insert_query(&mut self, name: impl Into<String>, round: usize, query: Query) -> QueryId {
        let name = name.into();
        assert!(
            !self.query_index.contains_key(&name),
            "query {name} is declared twice"
        );
        let id = QueryId(self.queries.len());
        self.queries.push(QueryInfo {
            name: name.clone(),
            round,
            query,
            ignored: false,
        });
        self.query_index.insert(name, id);
        id
    }

    pub fn query(&self, id: QueryId) -> &QueryInfo {
        &self.queries[id.0]
    }

    pub fn query_by_name(&self, name: &str) -> Option<QueryId> {
        self.query_index.get(name).copied()
    }

    pub fn queries(&self) -> impl Iterator<Item = (QueryId, &QueryInfo)> {
        self.queries
            .iter()
            .enumerate()
            .map(|(i, info)| (QueryId(i), info))
    }

    pub fn mark_as_ignored(&mut self, id: QueryId) {
        self.queries[id.0].ignored = true;
    }

    pub fn insert_public_input(&mut self, name: impl Into<String>, acc: Accessor) {
        let name = name.into();
        assert!(
            self.public_inputs.iter().all(|pi| pi.name != name),
            "public input {name} is declared twice"
        );
        self.public_inputs.push(PublicInput { name, acc });
    }

    pub fn public_inputs(&self) -> &[PublicInput] {
        &self.public_inputs
    }

    pub fn register_prover_action(&mut self, action: ProverAction) {
        self.prover_actions.push(action);
    }

    pub fn prover_actions(&self) -> &[ProverAction] {
        &self.prover_actions
    }

    pub fn num_rounds(&self) -> usize {
        let col_rounds = self.columns.iter().map(|c| c.round);
        let coin_rounds = self.coins.iter().map(|c| c.round);
        let query_rounds = self.queries.iter().map(|q| q.round);
        col_rounds
            .chain(coin_rounds)
            .chain(query_rounds)
            .max()
            .map_or(1, |r| r + 1)
    }

    /// Digest of everything the verifier knows about the protocol except the
    /// values of the precomputed columns.
    pub fn structure_digest(&self) -> Digest {
        let mut desc = String::new();
        for c in &self.columns {
            let _ = writeln!(
                desc,
                "column {} size={} round={} status={:?} pragmas={:?}",
                c.name, c.size, c.round, c.status, c.pragmas
            );
        }
        for c in &self.coins {
            let _ = writeln!(desc, "coin {} round={} kind={:?}", c.name, c.round, c.kind);
        }
        for q in &self.queries {
            let _ = writeln!(
                desc,
                "query {} round={} ignored={} {:?}",
                q.name, q.round, q.ignored, q.query
            );
        }
        for pi in &self.public_inputs {
            let _ = writeln!(desc, "public-input {} {:?}", pi.name, pi.acc);
        }
        hash_labelled(&desc, &[])
    }

    /// Binds a structure digest to the values of the precomputed columns.
    pub fn precomputed_digest(&self, structure: Digest) -> Digest {
        let mut values = Vec::new();
        for (id, _) in self.columns() {
            if let Some(v) = self.precomputed.get(&id) {
                values.extend_from_slice(v);
            }
        }
        hash_two(structure, hash_labelled("precomputed", &values))
    }
}

#[cfg(test)]
mod tests {
    use plonky2::field::types::Field;

    use super::*;

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn rejects_non_power_of_two_columns() {
        let mut comp = CompiledIop::new();
        comp.insert_commit("A", 6);
    }

    #[test]
    fn structure_digest_depends_on_the_columns() {
        let mut c1 = CompiledIop::new();
        c1.insert_commit("A", 8);
        let mut c2 = CompiledIop::new();
        c2.insert_commit("A", 16);
        assert_ne!(c1.structure_digest(), c2.structure_digest());
    }

    #[test]
    fn precomputed_values_change_the_second_digest() {
        let mut c1 = CompiledIop::new();
        c1.insert_precomputed("P", vec![F::ZERO; 4]);
        let mut c2 = CompiledIop::new();
        c2.insert_precomputed("P", vec![F::TWO; 4]);
        let s1 = c1.structure_digest();
        let s2 = c2.structure_digest();
        assert_eq!(s1, s2);
        assert_ne!(c1.precomputed_digest(s1), c2.precomputed_digest(s2));
    }
}
