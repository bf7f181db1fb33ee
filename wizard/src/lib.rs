//! A small wizard-style IOP substrate.
//!
//! A protocol is described by a [`CompiledIop`]: an arena of columns, the
//! coins sampled between rounds, the queries constraining the columns and
//! the public inputs exposed to the verifier. A [`Runtime`] holds one
//! assignment of a protocol together with its Fiat-Shamir state, and
//! [`check_all`] verifies every query against it.
//!
//! Lookups are not checked directly by the distributed prover: the
//! [`compile_lookups`] pass reduces inclusions, permutations and projections
//! to log-derivative sums, grand products and Horner queries, whose results
//! can be split across segments and added back together.

pub mod check;
pub mod column;
pub mod compiler;
pub mod error;
pub mod expression;
pub mod field;
pub mod iop;
pub mod mset;
pub mod query;
pub mod runtime;

pub use check::{check_all, check_query};
pub use column::{Column, ColumnId, ColumnInfo, ColumnStatus, Padding, Pragmas};
pub use compiler::{compile_lookups, run_prover_actions};
pub use error::QueryError;
pub use expression::{Accessor, Evaluator, Expr};
pub use field::{Digest, F};
pub use iop::{CoinId, CoinKind, CompiledIop};
pub use mset::MSetHash;
pub use query::{Query, QueryId, QueryParams};
pub use runtime::{Runtime, Transcript};
