//! Small protocols and helpers shared by the unit and integration tests of
//! `distributed`.

use env_logger::{try_init_from_env, Env, DEFAULT_FILTER_ENV};
use plonky2::field::types::Field;
use wizard::column::{Column, ColumnId};
use wizard::compiler::compile_lookups;
use wizard::expression::{Accessor, Expr};
use wizard::field::F;
use wizard::iop::CompiledIop;
use wizard::query::{Inclusion, Permutation, Projection, Query};
use wizard::runtime::Runtime;

use crate::discoverer::DiscoveryConfig;

pub fn init_logger() {
    let _ = try_init_from_env(Env::default().filter_or(DEFAULT_FILTER_ENV, "info"));
}

pub fn felts(xs: &[u64]) -> Vec<F> {
    xs.iter().copied().map(F::from_canonical_u64).collect()
}

/// A protocol with lookups compiled, and an assignment of its round-0
/// columns.
pub struct TestProtocol {
    pub comp: CompiledIop,
    pub assignment: Vec<(String, Vec<F>)>,
}

impl TestProtocol {
    fn new() -> Self {
        Self {
            comp: CompiledIop::new(),
            assignment: Vec::new(),
        }
    }

    fn commit(&mut self, name: &str, values: Vec<F>) -> Column {
        Column::Natural(self.commit_id(name, values))
    }

    fn commit_id(&mut self, name: &str, values: Vec<F>) -> ColumnId {
        let id = self.comp.insert_commit(name, values.len());
        self.assignment.push((name.to_string(), values));
        id
    }

    pub fn assign(&self, rt: &mut Runtime<'_>) {
        for (name, values) in &self.assignment {
            rt.assign_column_by_name(name, values.clone());
        }
    }

    /// Replaces the assignment of one column.
    pub fn with_column(mut self, name: &str, values: Vec<F>) -> Self {
        for (n, v) in &mut self.assignment {
            if n == name {
                *v = values.clone();
            }
        }
        self
    }

    fn compiled(mut self) -> Self {
        compile_lookups(&mut self.comp);
        self
    }
}

/// A discovery configuration splitting every module weighing 16 or more.
pub fn small_target() -> DiscoveryConfig {
    DiscoveryConfig {
        target_weight: 8,
        advices: Vec::new(),
    }
}

fn add_counter(p: &mut TestProtocol, name: &str, size: usize) {
    let a_id = p.commit_id(name, (1..=size as u64).map(F::from_canonical_u64).collect());
    let a = Column::Natural(a_id);
    p.comp.insert_query(
        format!("{name}_INCREMENTS"),
        0,
        Query::Global(Expr::from(a.shift(1)) - Expr::from(a.clone()) - Expr::one()),
    );
    p.comp.insert_query(
        format!("{name}_STARTS_AT_ONE"),
        0,
        Query::Local(Expr::from(a) - Expr::one()),
    );
    p.comp
        .insert_public_input(format!("functional.{name}_first"), Accessor::cell(a_id, 0));
}

fn add_permutation(p: &mut TestProtocol) {
    let a = p.commit("PERM_A", felts(&[1, 2, 3, 4, 5, 6, 7, 8]));
    let b = p.commit("PERM_B", felts(&[8, 3, 5, 1, 7, 2, 6, 4]));
    p.comp.insert_query(
        "PERM",
        0,
        Query::Permutation(Permutation {
            a: vec![a],
            b: vec![b],
        }),
    );
}

/// `A[i+1] = A[i] + 1` over 16 rows starting at 1, with `A[0]` exposed as a
/// functional public input.
pub fn counter_protocol() -> TestProtocol {
    let mut p = TestProtocol::new();
    add_counter(&mut p, "COUNTER", 16);
    p.compiled()
}

/// `PERM_B` is a permutation of `PERM_A`, both of size 8.
pub fn permutation_protocol() -> TestProtocol {
    let mut p = TestProtocol::new();
    add_permutation(&mut p);
    p.compiled()
}

/// The values of `LOOKUP_A` are all in `LOOKUP_T`.
pub fn lookup_protocol() -> TestProtocol {
    let mut p = TestProtocol::new();
    let a = p.commit("LOOKUP_A", felts(&[3, 3, 1, 2, 5, 5, 8, 7]));
    let t = p.commit("LOOKUP_T", felts(&[1, 2, 3, 4, 5, 6, 7, 8]));
    p.comp.insert_query(
        "LOOKUP",
        0,
        Query::Inclusion(Inclusion {
            included: vec![a],
            including: vec![t],
            filter_included: None,
            filter_including: None,
        }),
    );
    p.compiled()
}

/// The rows of `PROJ_A` selected by `PROJ_FA` are the rows of `PROJ_B`
/// selected by `PROJ_FB`, in order.
pub fn projection_protocol() -> TestProtocol {
    let mut p = TestProtocol::new();
    let a = p.commit("PROJ_A", felts(&[1, 2, 3, 4, 5, 6, 7, 8]));
    let fa = p.commit("PROJ_FA", felts(&[1, 1, 0, 1, 1, 0, 1, 0]));
    let b = p.commit("PROJ_B", felts(&[1, 9, 2, 4, 9, 5, 7, 9]));
    let fb = p.commit("PROJ_FB", felts(&[1, 0, 1, 1, 0, 1, 1, 0]));
    p.comp.insert_query(
        "PROJ",
        0,
        Query::Projection(Projection {
            a: vec![a],
            b: vec![b],
            filter_a: fa,
            filter_b: fb,
        }),
    );
    p.compiled()
}

/// A counter and a permutation, which end up in different modules.
pub fn two_module_protocol() -> TestProtocol {
    let mut p = TestProtocol::new();
    add_counter(&mut p, "COUNTER", 16);
    add_permutation(&mut p);
    p.compiled()
}
