use std::time::Instant;

use anyhow::Context;
use distributed::witness::{ModuleWitnessGL, ModuleWitnessLPP};
use distributed::{ConglomerationProof, Conglomerator, DistributedWizard, SegmentProof};
use tracing::{error, event, info_span, Level};

use crate::debug_utils::{save_inputs_to_disk, witness_file_name};

/// The witness of a segment, as handed to [`SegmentProofOp`].
#[derive(Clone, Copy, Debug)]
pub enum SegmentInput<'a> {
    Gl(&'a ModuleWitnessGL),
    Lpp(&'a ModuleWitnessLPP),
}

impl SegmentInput<'_> {
    pub fn module_name(&self) -> &str {
        match self {
            Self::Gl(w) => &w.module_name,
            Self::Lpp(w) => &w.module_name,
        }
    }

    pub fn segment_index(&self) -> usize {
        match self {
            Self::Gl(w) => w.segment_index,
            Self::Lpp(w) => w.segment_index,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Gl(_) => "gl",
            Self::Lpp(_) => "lpp",
        }
    }

    fn nb_columns(&self) -> usize {
        match self {
            Self::Gl(w) => w.columns.len(),
            Self::Lpp(w) => w.columns.len(),
        }
    }

    fn save_to_disk(&self) -> anyhow::Result<()> {
        let file_name = witness_file_name(self.module_name(), self.kind(), self.segment_index());
        match self {
            Self::Gl(w) => save_inputs_to_disk(file_name, w),
            Self::Lpp(w) => save_inputs_to_disk(file_name, w),
        }
    }
}

/// Proves a single segment.
#[derive(Clone, Copy, Debug, Default)]
pub struct SegmentProofOp {
    pub save_inputs_on_error: bool,
    pub test_only: bool,
}

impl SegmentProofOp {
    pub fn execute(
        &self,
        dw: &DistributedWizard,
        input: SegmentInput<'_>,
    ) -> anyhow::Result<SegmentProof> {
        let _span = SegmentProofSpan::new(&input);
        let proof = match input {
            SegmentInput::Gl(w) => dw.prove_segment_gl(w, self.test_only),
            SegmentInput::Lpp(w) => dw.prove_segment_lpp(w, self.test_only),
        };

        proof
            .map_err(|e| {
                if self.save_inputs_on_error {
                    if let Err(write_err) = input.save_to_disk() {
                        error!("Failed to save segment witness to disk: {:?}", write_err);
                    }
                }
                anyhow::Error::from(e)
            })
            .with_context(|| {
                format!(
                    "{} segment {} of module {}",
                    input.kind(),
                    input.segment_index(),
                    input.module_name()
                )
            })
    }
}

/// Assigns and checks one node of the conglomeration tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConglomerationOp {
    pub save_inputs_on_error: bool,
}

impl ConglomerationOp {
    pub fn execute(
        &self,
        conglomerator: &Conglomerator,
        a: &ConglomerationProof,
        b: &ConglomerationProof,
    ) -> anyhow::Result<ConglomerationProof> {
        let end = b.offset.saturating_add(b.nb_segments);
        let _span = info_span!("conglomeration", offset = a.offset, end).entered();
        conglomerator.aggregate(a, b).map_err(|e| {
            error!("conglomeration of segments {}..{end} failed: {e}", a.offset);
            if self.save_inputs_on_error {
                let file_name = format!("conglomeration_{}..{end}_input.json", a.offset);
                if let Err(write_err) = save_inputs_to_disk(file_name, (a, b)) {
                    error!("Failed to save conglomeration input to disk: {:?}", write_err);
                }
            }
            anyhow::Error::from(e)
        })
    }
}

/// RAII struct to measure the time taken by a segment proof.
///
/// - When created, it starts a span with the segment id.
/// - When dropped, it logs the time taken by the segment proof.
struct SegmentProofSpan {
    _span: tracing::span::EnteredSpan,
    start: Instant,
    descriptor: String,
}

impl SegmentProofSpan {
    fn get_id(input: &SegmentInput<'_>) -> String {
        format!("{} - {} ({})", input.module_name(), input.kind(), input.segment_index())
    }

    fn get_descriptor(input: &SegmentInput<'_>) -> String {
        format!("{} columns", input.nb_columns())
    }

    fn new(input: &SegmentInput<'_>) -> Self {
        let id = Self::get_id(input);
        let span = info_span!("p_gen", id).entered();
        let start = Instant::now();
        let descriptor = Self::get_descriptor(input);
        Self {
            _span: span,
            start,
            descriptor,
        }
    }
}

impl Drop for SegmentProofSpan {
    fn drop(&mut self) {
        event!(
            Level::INFO,
            "segment proof ({}) took {:?}",
            self.descriptor,
            self.start.elapsed()
        );
    }
}
