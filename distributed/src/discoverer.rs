//! Clusters the columns of a compiled IOP into modules and picks the number
//! of rows each module is segmented into.
//!
//! Discovery runs in two layers. The first one groups every set of columns
//! appearing in a common query into a [`QueryBasedModule`], using a
//! union-find over the column arena. The second one buckets query-based
//! modules into [`StandardModule`]s, either following user-supplied
//! [`ModuleDiscoveryAdvice`]s or greedily so that every bucket weighs about
//! the configured target, and then shrinks the submodules of each bucket by
//! a common power-of-two factor to get even closer to the target.

use hashbrown::HashMap;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use wizard::column::{roots_of, Column, ColumnId};
use wizard::expression::Expr;
use wizard::iop::CompiledIop;
use wizard::query::Query;

use crate::union_find::UnionFind;

/// Tells the discoverer which cluster the columns whose name starts with
/// `column_prefix` belong to, and the number of rows their query-based
/// module starts from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDiscoveryAdvice {
    pub column_prefix: String,
    pub cluster: String,
    pub base_size: usize,
}

impl ModuleDiscoveryAdvice {
    fn matches(&self, column_name: &str) -> bool {
        column_name.starts_with(&self.column_prefix)
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        self.cluster != other.cluster || self.base_size != other.base_size
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub target_weight: usize,
    /// When non-empty, every query-based module must be covered by exactly
    /// one advice cluster.
    pub advices: Vec<ModuleDiscoveryAdvice>,
}

/// A set of columns that must be proved together because they appear in
/// common queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBasedModule {
    pub name: String,
    pub columns: Vec<ColumnId>,
    pub original_size: usize,
    /// Sum over the plonk-in-wizard queries of the module of their
    /// constraint counts, each padded to the next power of two.
    pub nb_constraints_of_plonk: usize,
    pub nb_instances_of_plonk: usize,
    pub nb_queries_of_plonk: usize,
    /// Set when the module holds a fixed column, whose size is part of the
    /// setup.
    pub cant_change_size: bool,
}

impl QueryBasedModule {
    pub fn num_column(&self) -> usize {
        self.columns.len()
    }

    pub const fn has_plonk(&self) -> bool {
        self.nb_queries_of_plonk > 0
    }

    /// Weight of the module if its columns had `with_num_row` rows, or their
    /// original number of rows when `with_num_row` is zero. Plonk instances
    /// scale with the number of rows.
    pub fn weight(&self, with_num_row: usize) -> usize {
        let (mut nb_instances, mut num_row) = (self.nb_instances_of_plonk, self.original_size);
        if with_num_row > 0 {
            nb_instances = nb_instances * with_num_row / self.original_size;
            num_row = with_num_row;
        }
        self.num_column() * num_row
            + (4 * nb_instances + 11 * self.nb_queries_of_plonk) * self.nb_constraints_of_plonk
    }
}

/// A group of query-based modules proved as one module. `new_sizes[i]` is
/// the number of rows of a segment of `sub_modules[i]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardModule {
    pub name: String,
    pub sub_modules: Vec<QueryBasedModule>,
    pub new_sizes: Vec<usize>,
}

impl StandardModule {
    pub fn weight(&self) -> usize {
        self.sub_modules
            .iter()
            .zip(&self.new_sizes)
            .map(|(m, &n)| m.weight(n))
            .sum()
    }

    pub fn num_column(&self) -> usize {
        self.sub_modules.iter().map(QueryBasedModule::num_column).sum()
    }

    pub fn columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.sub_modules.iter().flat_map(|m| m.columns.iter().copied())
    }
}

/// Result of [`ModuleOf`] queries over expressions and column lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleOf {
    /// No column is involved.
    AnyModule,
    Module(usize),
    /// The columns span several modules.
    NoModuleFound,
}

/// The immutable result of module discovery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Discovery {
    modules: Vec<StandardModule>,
    /// `(module, submodule)` of every column of the analyzed protocol,
    /// indexed by column id.
    column_slots: Vec<(usize, usize)>,
}

impl Discovery {
    pub fn analyze(comp: &CompiledIop, config: &DiscoveryConfig) -> Self {
        let qbms = query_based_modules(comp);
        let mut modules = if config.advices.is_empty() {
            group_greedily(qbms, config.target_weight)
        } else {
            group_with_advices(comp, qbms, &config.advices)
        };
        for module in &mut modules {
            resize(module, config.target_weight);
        }

        let mut column_slots = vec![(usize::MAX, usize::MAX); comp.num_columns()];
        for (i, module) in modules.iter().enumerate() {
            for (j, sub) in module.sub_modules.iter().enumerate() {
                for col in &sub.columns {
                    column_slots[col.0] = (i, j);
                }
            }
            info!(
                "module {} has {} columns and weighs {}",
                module.name,
                module.num_column(),
                module.weight()
            );
        }
        Self {
            modules,
            column_slots,
        }
    }

    pub fn modules(&self) -> &[StandardModule] {
        &self.modules
    }

    pub fn module(&self, index: usize) -> &StandardModule {
        &self.modules[index]
    }

    pub fn nb_modules(&self) -> usize {
        self.modules.len()
    }

    pub fn module_list(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    fn slot(&self, col: ColumnId) -> (usize, usize) {
        match self.column_slots.get(col.0) {
            Some(&slot) if slot.0 != usize::MAX => slot,
            _ => panic!("column {col} was not part of the analyzed protocol"),
        }
    }

    pub fn module_index_of(&self, col: ColumnId) -> usize {
        self.slot(col).0
    }

    pub fn module_of(&self, col: ColumnId) -> &str {
        &self.modules[self.slot(col).0].name
    }

    pub fn new_size_of(&self, col: ColumnId) -> usize {
        let (i, j) = self.slot(col);
        self.modules[i].new_sizes[j]
    }

    /// Returns the query-based module of `col` and its segment size.
    pub fn qbm_of(&self, col: ColumnId) -> (&QueryBasedModule, usize) {
        let (i, j) = self.slot(col);
        (&self.modules[i].sub_modules[j], self.modules[i].new_sizes[j])
    }

    pub fn index_of(&self, name: &str) -> usize {
        self.modules
            .iter()
            .position(|m| m.name == name)
            .unwrap_or_else(|| panic!("unknown module {name}"))
    }

    pub fn num_column_of(&self, name: &str) -> usize {
        self.modules[self.index_of(name)].num_column()
    }

    pub fn weight_of(&self, name: &str) -> usize {
        self.modules[self.index_of(name)].weight()
    }

    pub fn module_of_columns<'a, I: IntoIterator<Item = &'a Column>>(&self, cols: I) -> ModuleOf {
        let modules = cols
            .into_iter()
            .filter_map(Column::root)
            .map(|c| self.module_index_of(c))
            .dedup()
            .collect_vec();
        match modules.iter().all_equal_value() {
            Ok(&m) => ModuleOf::Module(m),
            Err(None) => ModuleOf::AnyModule,
            Err(Some(_)) => ModuleOf::NoModuleFound,
        }
    }

    /// Module of the columns of `expr`, including the columns read through
    /// cell accessors.
    pub fn module_of_expr(&self, expr: &Expr) -> ModuleOf {
        self.module_of_columns(&expr.columns_and_cells())
    }
}

/// A query-based module being built. Merged-away candidates are kept as
/// `None` so that creation indices stay stable.
#[derive(Debug)]
struct Candidate {
    /// Any column of the module, used as a handle into the union-find.
    repr: usize,
    name: String,
    nb_constraints_of_plonk: usize,
    nb_instances_of_plonk: usize,
    nb_queries_of_plonk: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct PlonkCounters {
    nb_constraints: usize,
    nb_instances: usize,
    nb_queries: usize,
}

struct Grouper<'a> {
    comp: &'a CompiledIop,
    uf: UnionFind,
    assigned: Vec<bool>,
    slot_of_root: HashMap<usize, usize>,
    candidates: Vec<Option<Candidate>>,
}

impl<'a> Grouper<'a> {
    fn new(comp: &'a CompiledIop) -> Self {
        Self {
            comp,
            uf: UnionFind::new(comp.num_columns()),
            assigned: vec![false; comp.num_columns()],
            slot_of_root: HashMap::new(),
            candidates: Vec::new(),
        }
    }

    fn slot_of(&mut self, col: usize) -> Option<usize> {
        if !self.assigned[col] {
            return None;
        }
        let root = self.uf.find(col);
        self.slot_of_root.get(&root).copied()
    }

    /// Puts `columns` in the same module, merging every module they overlap
    /// into the oldest one.
    fn group(&mut self, columns: &[ColumnId], plonk: PlonkCounters) {
        if columns.is_empty() {
            return;
        }
        let overlapping = columns
            .iter()
            .filter_map(|c| self.slot_of(c.0))
            .sorted()
            .dedup()
            .collect_vec();

        let target = match overlapping.split_first() {
            None => {
                let slot = self.candidates.len();
                let first = columns[0].0;
                self.candidates.push(Some(Candidate {
                    repr: first,
                    name: format!("Module_{slot}_{}", self.comp.column(columns[0]).name),
                    nb_constraints_of_plonk: 0,
                    nb_instances_of_plonk: 0,
                    nb_queries_of_plonk: 0,
                }));
                self.assigned[first] = true;
                slot
            }
            Some((&first, others)) => {
                for &other in others {
                    let Some(merged) = self.candidates[other].take() else {
                        unreachable!("overlapping modules are alive")
                    };
                    let Some(base) = self.candidates[first].as_mut() else {
                        unreachable!("overlapping modules are alive")
                    };
                    base.nb_constraints_of_plonk += merged.nb_constraints_of_plonk;
                    base.nb_instances_of_plonk += merged.nb_instances_of_plonk;
                    base.nb_queries_of_plonk += merged.nb_queries_of_plonk;
                    let repr = base.repr;
                    self.uf.union(repr, merged.repr);
                }
                first
            }
        };

        let Some(candidate) = self.candidates[target].as_mut() else {
            unreachable!("the target module is alive")
        };
        candidate.nb_constraints_of_plonk += plonk.nb_constraints;
        candidate.nb_instances_of_plonk += plonk.nb_instances;
        candidate.nb_queries_of_plonk += plonk.nb_queries;
        let repr = candidate.repr;
        for c in columns {
            self.assigned[c.0] = true;
            self.uf.union(repr, c.0);
        }
        let root = self.uf.find(repr);
        self.slot_of_root.insert(root, target);
    }

    fn finish(mut self) -> Vec<QueryBasedModule> {
        let unreferenced = (0..self.comp.num_columns())
            .filter(|&c| !self.assigned[c])
            .collect_vec();
        for c in unreferenced {
            self.group(&[ColumnId(c)], PlonkCounters::default());
        }

        let mut columns_of_slot: Vec<Vec<ColumnId>> = vec![Vec::new(); self.candidates.len()];
        for c in 0..self.comp.num_columns() {
            if let Some(slot) = self.slot_of(c) {
                columns_of_slot[slot].push(ColumnId(c));
            }
        }

        let comp = self.comp;
        self.candidates
            .into_iter()
            .zip(columns_of_slot)
            .filter_map(|(candidate, columns)| {
                let candidate = candidate?;
                (!columns.is_empty()).then(|| {
                    let sizes = columns.iter().map(|&c| comp.column(c).size).dedup().collect_vec();
                    let [original_size] = sizes[..] else {
                        panic!(
                            "columns of {} have inconsistent sizes: {:?}",
                            candidate.name,
                            columns
                                .iter()
                                .map(|&c| (&comp.column(c).name, comp.column(c).size))
                                .collect_vec()
                        )
                    };
                    let cant_change_size =
                        columns.iter().any(|&c| comp.column(c).status.is_fixed());
                    QueryBasedModule {
                        name: candidate.name,
                        columns,
                        original_size,
                        nb_constraints_of_plonk: candidate.nb_constraints_of_plonk,
                        nb_instances_of_plonk: candidate.nb_instances_of_plonk,
                        nb_queries_of_plonk: candidate.nb_queries_of_plonk,
                        cant_change_size,
                    }
                })
            })
            .collect()
    }
}

/// Groups columns sharing a query. Queries without parameters are scanned
/// before queries with parameters.
pub fn query_based_modules(comp: &CompiledIop) -> Vec<QueryBasedModule> {
    let mut grouper = Grouper::new(comp);
    let (no_params, params): (Vec<_>, Vec<_>) =
        comp.queries().partition(|(_, q)| !q.query.has_params());

    for (_, info) in no_params.into_iter().chain(params) {
        let mut plonk = PlonkCounters::default();
        let to_group: Vec<Vec<ColumnId>> = match &info.query {
            Query::Permutation(q) => vec![roots_of(q.a.iter().chain(&q.b))],
            _ if info.ignored => continue,
            Query::Inclusion(_) | Query::Projection(_) => panic!(
                "{} query {} must be compiled with compile_lookups before discovery",
                info.query.kind(),
                info.name
            ),
            Query::Range(_) | Query::LocalOpening(_) => continue,
            Query::Global(e) | Query::Local(e) => vec![roots_of(&e.columns_and_cells())],
            Query::PlonkInWizard(p) => {
                plonk = PlonkCounters {
                    nb_constraints: p.circuit.nb_constraints().next_power_of_two(),
                    nb_instances: p.max_nb_instances,
                    nb_queries: 1,
                };
                vec![roots_of([&p.selector, &p.data])]
            }
            Query::LogDerivativeSum(parts) | Query::GrandProduct(parts) => parts
                .iter()
                .map(|p| {
                    roots_of(&p.num.columns().into_iter().chain(p.den.columns()).collect_vec())
                })
                .collect(),
            Query::Horner(parts) => parts
                .iter()
                .map(|p| {
                    let mut cols = p.coefficient.columns();
                    cols.push(p.selector.clone());
                    roots_of(&cols)
                })
                .collect(),
        };
        for columns in to_group {
            grouper.group(&columns, plonk);
        }
    }

    let modules = grouper.finish();
    debug!("found {} query-based modules", modules.len());
    modules
}

/// Buckets modules by ascending weight, adding a module to the current
/// bucket when that brings the bucket closer to the target.
fn group_greedily(mut qbms: Vec<QueryBasedModule>, target_weight: usize) -> Vec<StandardModule> {
    qbms.sort_by(|a, b| a.weight(0).cmp(&b.weight(0)).then_with(|| a.name.cmp(&b.name)));

    let mut groups: Vec<Vec<QueryBasedModule>> = Vec::new();
    let mut current: Vec<QueryBasedModule> = Vec::new();
    let mut cum_weight = 0usize;
    for qbm in qbms {
        let w = qbm.weight(0);
        let closer = target_weight.abs_diff(cum_weight + w) < target_weight.abs_diff(cum_weight);
        if !current.is_empty() && !closer {
            groups.push(std::mem::take(&mut current));
            cum_weight = 0;
        }
        cum_weight += w;
        current.push(qbm);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(i, sub_modules)| StandardModule {
            name: format!("Std_{i}_{}", sub_modules[0].name),
            new_sizes: sub_modules.iter().map(|m| m.original_size).collect(),
            sub_modules,
        })
        .collect()
}

/// Maps every query-based module to the cluster of the first advice
/// matching one of its columns. Modules are returned sorted by cluster
/// name.
fn group_with_advices(
    comp: &CompiledIop,
    qbms: Vec<QueryBasedModule>,
    advices: &[ModuleDiscoveryAdvice],
) -> Vec<StandardModule> {
    let mut clusters: HashMap<&str, StandardModule> = HashMap::new();
    let mut errors = Vec::new();

    for qbm in qbms {
        let found = qbm
            .columns
            .iter()
            .filter_map(|&c| advices.iter().find(|a| a.matches(&comp.column(c).name)))
            .collect_vec();
        let Some(&advice) = found.first() else {
            errors.push(format!("no advice matches the columns of {}", qbm.name));
            continue;
        };
        let conflicting = found.iter().filter(|a| advice.conflicts_with(a)).collect_vec();
        if !conflicting.is_empty() {
            errors.push(format!(
                "conflicting advices for {}: {advice:?} and {conflicting:?}",
                qbm.name
            ));
            continue;
        }
        let module = clusters
            .entry(advice.cluster.as_str())
            .or_insert_with(|| StandardModule {
                name: advice.cluster.clone(),
                sub_modules: Vec::new(),
                new_sizes: Vec::new(),
            });
        module.sub_modules.push(qbm);
        module.new_sizes.push(advice.base_size);
    }

    if !errors.is_empty() {
        panic!("could not map the query-based modules to advices:\n{}", errors.join("\n"));
    }

    clusters
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(b.0))
        .map(|(_, m)| m)
        .collect()
}

/// Divides the sizes of the submodules by the power of two bringing the
/// weight of the module closest to the target. The current sizes are the
/// base sizes: fixed submodules keep their original size and plonk
/// submodules never go below their base size.
fn resize(module: &mut StandardModule, target_weight: usize) {
    let base_sizes = module.new_sizes.clone();
    let initial_weight = module.weight();
    if initial_weight < target_weight {
        return;
    }
    let min_num_rows = base_sizes.iter().copied().min().unwrap_or(0);

    let sizes_for = |reduction: usize| -> Vec<usize> {
        module
            .sub_modules
            .iter()
            .zip(&base_sizes)
            .map(|(sub, &base)| {
                if sub.cant_change_size {
                    sub.original_size
                } else if sub.has_plonk() {
                    base
                } else {
                    base / reduction
                }
            })
            .collect()
    };
    let weight_for = |sizes: &[usize]| -> usize {
        module
            .sub_modules
            .iter()
            .zip(sizes)
            .map(|(sub, &n)| sub.weight(n))
            .sum()
    };

    let mut best_reduction = 1;
    let mut best_distance = initial_weight.abs_diff(target_weight);
    let mut reduction = 2;
    while reduction < min_num_rows {
        let distance = weight_for(&sizes_for(reduction)).abs_diff(target_weight);
        if distance < best_distance {
            best_reduction = reduction;
            best_distance = distance;
        }
        reduction *= 2;
    }

    let new_sizes = sizes_for(best_reduction);
    module.new_sizes = new_sizes;
    debug!(
        "module {} resized by a factor {best_reduction}, sizes {:?}",
        module.name, module.new_sizes
    );
}

#[cfg(test)]
mod tests {
    use wizard::column::Column;
    use wizard::query::Permutation;

    use super::*;

    fn chain_protocol(groups: &[&[usize]], size: usize) -> CompiledIop {
        let max = groups.iter().flat_map(|g| g.iter()).copied().max().unwrap_or(0);
        let mut comp = CompiledIop::new();
        let ids = (0..=max)
            .map(|i| comp.insert_commit(format!("C{i:03}"), size))
            .collect_vec();
        for (k, g) in groups.iter().enumerate() {
            let expr = g
                .iter()
                .map(|&i| Expr::from(ids[i]))
                .reduce(|a, b| a * b)
                .unwrap_or_else(Expr::one);
            comp.insert_query(format!("G{k}"), 0, Query::Global(expr));
        }
        comp
    }

    fn qbm(name: &str, num_columns: usize, size: usize) -> QueryBasedModule {
        QueryBasedModule {
            name: name.to_string(),
            columns: (0..num_columns).map(ColumnId).collect(),
            original_size: size,
            nb_constraints_of_plonk: 0,
            nb_instances_of_plonk: 0,
            nb_queries_of_plonk: 0,
            cant_change_size: false,
        }
    }

    #[test]
    fn chained_queries_yield_three_modules() {
        let comp = chain_protocol(
            &[&[1, 2, 3, 4, 5], &[100], &[6, 7, 8], &[9, 10], &[3, 6, 20], &[2, 99]],
            8,
        );
        let modules = query_based_modules(&comp);
        let referenced = modules
            .iter()
            .filter(|m| m.columns.iter().any(|c| [1, 9, 100].contains(&c.0)))
            .collect_vec();
        assert_eq!(referenced.len(), 3);

        let big = referenced
            .iter()
            .find(|m| m.columns.contains(&ColumnId(1)))
            .expect("module of C001");
        for c in [1, 2, 3, 4, 5, 6, 7, 8, 20, 99] {
            assert!(big.columns.contains(&ColumnId(c)), "C{c} is missing");
        }
        assert_eq!(big.name, "Module_0_C001");
    }

    #[test]
    fn every_column_lands_in_exactly_one_module() {
        let comp = chain_protocol(&[&[0, 1], &[2], &[1, 3]], 16);
        let disc = Discovery::analyze(
            &comp,
            &DiscoveryConfig {
                target_weight: 1 << 20,
                advices: vec![],
            },
        );
        let mut seen = vec![0; comp.num_columns()];
        for m in disc.modules() {
            for c in m.columns() {
                seen[c.0] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
        assert_eq!(disc.module_of(ColumnId(0)), disc.module_of(ColumnId(3)));
        assert_eq!(disc.new_size_of(ColumnId(2)), 16);
    }

    #[test]
    fn permutation_sides_are_grouped_even_when_ignored() {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 8);
        let b = comp.insert_commit("B", 8);
        let q = comp.insert_query(
            "PERM",
            0,
            Query::Permutation(Permutation {
                a: vec![Column::Natural(a)],
                b: vec![Column::Natural(b)],
            }),
        );
        comp.mark_as_ignored(q);
        let modules = query_based_modules(&comp);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].columns, vec![a, b]);
    }

    #[test]
    #[should_panic(expected = "inconsistent sizes")]
    fn modules_must_have_a_single_size() {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 8);
        let b = comp.insert_commit("B", 16);
        comp.insert_query("G", 0, Query::Global(Expr::from(a) - Expr::from(b)));
        query_based_modules(&comp);
    }

    #[test]
    fn greedy_bucketing_picks_the_closest_grouping() {
        // 1000 and 1500 against a target of 1200: merging gives 2500 which
        // is further away than keeping them apart.
        let groups = group_greedily(vec![qbm("B", 3, 500), qbm("A", 2, 500)], 1200);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].weight(), 1000);
        assert_eq!(groups[1].weight(), 1500);
        assert_eq!(groups[0].name, "Std_0_A");

        let merged = group_greedily(vec![qbm("A", 2, 500), qbm("B", 3, 500)], 2400);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].weight(), 2500);
    }

    #[test]
    fn resizing_halves_towards_the_target() {
        let mut module = StandardModule {
            name: "M".to_string(),
            sub_modules: vec![qbm("A", 4, 64)],
            new_sizes: vec![64],
        };
        resize(&mut module, 64);
        assert_eq!(module.new_sizes, vec![16]);
        assert_eq!(module.weight(), 64);

        let mut fixed = StandardModule {
            name: "F".to_string(),
            sub_modules: vec![QueryBasedModule {
                cant_change_size: true,
                ..qbm("P", 4, 64)
            }],
            new_sizes: vec![64],
        };
        resize(&mut fixed, 64);
        assert_eq!(fixed.new_sizes, vec![64]);
    }

    #[test]
    fn plonk_submodules_keep_their_base_size() {
        let plonk = QueryBasedModule {
            nb_queries_of_plonk: 1,
            ..qbm("P", 2, 64)
        };
        let mut module = StandardModule {
            name: "M".to_string(),
            sub_modules: vec![qbm("A", 4, 64), plonk],
            new_sizes: vec![64, 32],
        };
        resize(&mut module, 64);
        assert_eq!(module.new_sizes, vec![4, 32]);
    }

    #[test]
    fn new_sizes_divide_the_original_ones_by_a_power_of_two() {
        let comp = chain_protocol(&[&[0, 1, 2], &[3], &[4, 5]], 64);
        let disc = Discovery::analyze(
            &comp,
            &DiscoveryConfig {
                target_weight: 48,
                advices: vec![],
            },
        );
        for c in (0..comp.num_columns()).map(ColumnId) {
            let (sub, _) = disc.qbm_of(c);
            let new_size = disc.new_size_of(c);
            assert_eq!(sub.original_size % new_size, 0, "C{:03}", c.0);
            assert!((sub.original_size / new_size).is_power_of_two(), "C{:03}", c.0);
        }
        assert!(disc.modules().iter().any(|m| m.new_sizes.iter().any(|&n| n < 64)));
    }

    #[test]
    fn light_modules_are_not_resized() {
        let mut module = StandardModule {
            name: "M".to_string(),
            sub_modules: vec![qbm("A", 1, 8)],
            new_sizes: vec![8],
        };
        resize(&mut module, 100);
        assert_eq!(module.new_sizes, vec![8]);
    }

    #[test]
    fn plonk_instances_scale_with_the_rows() {
        let m = QueryBasedModule {
            nb_constraints_of_plonk: 8,
            nb_instances_of_plonk: 4,
            nb_queries_of_plonk: 1,
            ..qbm("P", 2, 16)
        };
        assert_eq!(m.weight(0), 2 * 16 + (4 * 4 + 11) * 8);
        assert_eq!(m.weight(8), 2 * 8 + (4 * 2 + 11) * 8);
    }

    #[test]
    fn advices_cluster_modules() {
        let comp = chain_protocol(&[&[0], &[1, 2, 3]], 32);
        let advices = vec![
            ModuleDiscoveryAdvice {
                column_prefix: "C000".to_string(),
                cluster: "ZETA".to_string(),
                base_size: 16,
            },
            ModuleDiscoveryAdvice {
                column_prefix: "C00".to_string(),
                cluster: "ALPHA".to_string(),
                base_size: 8,
            },
        ];
        let disc = Discovery::analyze(
            &comp,
            &DiscoveryConfig {
                target_weight: 1 << 20,
                advices,
            },
        );
        assert_eq!(disc.module_list(), vec!["ALPHA", "ZETA"]);
        assert_eq!(disc.module_of(ColumnId(0)), "ZETA");
        assert_eq!(disc.new_size_of(ColumnId(0)), 16);
        assert_eq!(disc.new_size_of(ColumnId(3)), 8);
        assert_eq!(disc.index_of("ZETA"), 1);
    }

    #[test]
    #[should_panic(expected = "could not map")]
    fn modules_without_advice_are_rejected() {
        let comp = chain_protocol(&[&[0, 1]], 8);
        Discovery::analyze(
            &comp,
            &DiscoveryConfig {
                target_weight: 1,
                advices: vec![ModuleDiscoveryAdvice {
                    column_prefix: "NOPE".to_string(),
                    cluster: "X".to_string(),
                    base_size: 8,
                }],
            },
        );
    }

    #[test]
    fn module_of_expr_detects_cross_module_expressions() {
        let comp = chain_protocol(&[&[0, 1], &[2]], 8);
        let disc = Discovery::analyze(&comp, &DiscoveryConfig::default());
        let same = Expr::from(ColumnId(0)) + Expr::from(ColumnId(1));
        let cross = Expr::from(ColumnId(0)) + Expr::from(ColumnId(2));
        assert!(matches!(disc.module_of_expr(&same), ModuleOf::Module(_)));
        assert_eq!(disc.module_of_expr(&cross), ModuleOf::NoModuleFound);
        assert_eq!(disc.module_of_expr(&Expr::one()), ModuleOf::AnyModule);
    }
}
