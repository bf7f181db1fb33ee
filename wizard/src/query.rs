//! Queries (constraints and claims) of a compiled IOP.

use std::fmt;
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::expression::{Accessor, Expr};
use crate::field::F;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(pub usize);

/// A small circuit checked on every active instance of a
/// [`PlonkInWizard`] query.
pub trait PlonkCircuit: fmt::Debug + Send + Sync {
    fn nb_public_inputs(&self) -> usize;

    fn nb_constraints(&self) -> usize;

    fn check(&self, public_inputs: &[F]) -> bool;
}

/// Instance `j` of the circuit reads `data[j*k..(j+1)*k]` where `k` is the
/// number of public inputs of the circuit, and is active when
/// `selector[j*k]` is one.
#[derive(Clone, Debug)]
pub struct PlonkInWizard {
    pub data: Column,
    pub selector: Column,
    pub circuit: Arc<dyn PlonkCircuit>,
    pub max_nb_instances: usize,
}

#[derive(Clone, Debug)]
pub struct Range {
    pub column: Column,
    pub bound: u64,
}

#[derive(Clone, Debug)]
pub struct Inclusion {
    pub included: Vec<Column>,
    pub including: Vec<Column>,
    pub filter_included: Option<Column>,
    pub filter_including: Option<Column>,
}

#[derive(Clone, Debug)]
pub struct Permutation {
    pub a: Vec<Column>,
    pub b: Vec<Column>,
}

#[derive(Clone, Debug)]
pub struct Projection {
    pub a: Vec<Column>,
    pub b: Vec<Column>,
    pub filter_a: Column,
    pub filter_b: Column,
}

/// `sum_rows num / den` for a log-derivative sum, `prod num / prod den` for
/// a grand product.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FractionPart {
    pub num: Expr,
    pub den: Expr,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HornerPart {
    pub coefficient: Expr,
    pub selector: Column,
    pub x: Accessor,
    pub negative: bool,
}

#[derive(Clone, Debug, EnumAsInner)]
pub enum Query {
    Global(Expr),
    Local(Expr),
    Range(Range),
    PlonkInWizard(PlonkInWizard),
    Inclusion(Inclusion),
    Permutation(Permutation),
    Projection(Projection),
    LogDerivativeSum(Vec<FractionPart>),
    GrandProduct(Vec<FractionPart>),
    Horner(Vec<HornerPart>),
    LocalOpening(Column),
}

impl Query {
    /// Every column the query reads, in order of first appearance.
    pub fn columns(&self) -> Vec<Column> {
        let mut res: Vec<Column> = Vec::new();
        let mut push = |cols: Vec<Column>| {
            for c in cols {
                if !res.contains(&c) {
                    res.push(c);
                }
            }
        };
        match self {
            Query::Global(e) | Query::Local(e) => push(e.columns()),
            Query::Range(r) => push(vec![r.column.clone()]),
            Query::PlonkInWizard(p) => push(vec![p.data.clone(), p.selector.clone()]),
            Query::Inclusion(q) => {
                push(q.included.clone());
                push(q.including.clone());
                push(q.filter_included.iter().cloned().collect());
                push(q.filter_including.iter().cloned().collect());
            }
            Query::Permutation(q) => {
                push(q.a.clone());
                push(q.b.clone());
            }
            Query::Projection(q) => {
                push(q.a.clone());
                push(q.b.clone());
                push(vec![q.filter_a.clone(), q.filter_b.clone()]);
            }
            Query::LogDerivativeSum(parts) | Query::GrandProduct(parts) => {
                for p in parts {
                    push(p.num.columns());
                    push(p.den.columns());
                }
            }
            Query::Horner(parts) => {
                for p in parts {
                    push(p.coefficient.columns());
                    push(vec![p.selector.clone()]);
                }
            }
            Query::LocalOpening(c) => push(vec![c.clone()]),
        }
        res
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Query::Global(_) => "global",
            Query::Local(_) => "local",
            Query::Range(_) => "range",
            Query::PlonkInWizard(_) => "plonk-in-wizard",
            Query::Inclusion(_) => "inclusion",
            Query::Permutation(_) => "permutation",
            Query::Projection(_) => "projection",
            Query::LogDerivativeSum(_) => "log-derivative-sum",
            Query::GrandProduct(_) => "grand-product",
            Query::Horner(_) => "horner",
            Query::LocalOpening(_) => "local-opening",
        }
    }

    /// Queries whose claimed result is part of the transcript.
    pub const fn has_params(&self) -> bool {
        matches!(
            self,
            Query::LocalOpening(_)
                | Query::LogDerivativeSum(_)
                | Query::GrandProduct(_)
                | Query::Horner(_)
        )
    }
}

#[derive(Clone, Debug)]
pub struct QueryInfo {
    pub name: String,
    pub round: usize,
    pub query: Query,
    /// Ignored queries have been compiled into other queries and are no
    /// longer checked.
    pub ignored: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HornerPartParams {
    pub n0: usize,
    pub n1: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HornerParams {
    pub final_result: F,
    pub parts: Vec<HornerPartParams>,
}

/// The claimed result of a query with parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, EnumAsInner)]
pub enum QueryParams {
    LocalOpening(F),
    LogDerivativeSum(F),
    GrandProduct(F),
    Horner(HornerParams),
}
