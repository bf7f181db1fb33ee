//! Orchestrates the distributed proving of a wizard protocol: every segment
//! is proved in parallel, then the segment proofs are conglomerated
//! pairwise into a single proof.

pub mod cli;
pub mod debug_utils;
pub mod ops;
pub mod proof_types;
pub mod prover;
pub mod tracing;

pub use prover::{LimitlessProver, ProverConfig};
