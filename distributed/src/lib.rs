//! Distributed proving of wizard protocols.
//!
//! A protocol too large to be proved in one go is split in two steps:
//!
//! - **Modules.** [`discoverer::Discovery`] groups the columns that appear
//!   in common queries and picks, for every group, a segment size close to a
//!   target weight. Every module is compiled into a GL protocol, holding its
//!   global and local constraints, and an LPP protocol, holding its share of
//!   the log-derivative sums, grand products and Horner queries the lookups
//!   were compiled into.
//! - **Segments.** [`witness::segment_runtime`] cuts an assignment of the
//!   protocol into one witness per segment of every module. Consecutive GL
//!   segments exchange the values their constraints read across the cut;
//!   LPP segments compute partial results that add up to the original
//!   claim.
//!
//! Every segment is proved independently. The resulting proofs are then
//! conglomerated pairwise ([`hierarchical::Conglomerator`]), each node
//! checking that its children fit together, until a single proof covers
//! the whole protocol.
//!
//! ```no_run
//! # use distributed::{DistributedWizard, DiscoveryConfig};
//! # fn run(
//! #     comp: wizard::CompiledIop,
//! #     assign: impl FnOnce(&mut wizard::Runtime<'_>),
//! # ) -> anyhow::Result<()> {
//! let config = DiscoveryConfig {
//!     target_weight: 1 << 20,
//!     advices: vec![],
//! };
//! let dw = DistributedWizard::distribute(comp, &config);
//! let rt = dw.runtime(assign);
//! let witness = dw.segment(&rt);
//! let proofs = dw.prove_all(&witness, false)?;
//! let root = dw.conglomerate(&proofs)?;
//! # Ok(())
//! # }
//! ```

pub mod boundaries;
pub mod conglomeration;
pub mod discoverer;
pub mod distributed_wizard;
pub mod error;
pub mod filter;
pub mod hierarchical;
pub mod module_gl;
pub mod module_lpp;
pub mod proof;
pub mod public_input;
pub mod testing_utils;
pub mod translator;
pub mod union_find;
pub mod witness;

pub use discoverer::{DiscoveryConfig, ModuleDiscoveryAdvice};
pub use distributed_wizard::DistributedWizard;
pub use error::{ConglomerationError, ConglomerationErrors, SegmentError};
pub use hierarchical::{ConglomerationProof, Conglomerator};
pub use proof::{ProofType, SegmentProof, VerifyingKey};
pub use public_input::LimitlessPublicInput;
pub use witness::{ModuleWitnessGL, ModuleWitnessLPP, SegmentedWitness};
