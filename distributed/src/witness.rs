//! Cuts the assignment of the distributed protocol into per-segment
//! witnesses.
//!
//! Witness extraction is independent per segment except for two
//! accumulators threaded through the segments of a module: the boundary
//! values a GL segment receives from its predecessor, and the Horner
//! counters an LPP segment starts from. Both are computed here, by an
//! explicit scan over the segments, so that every witness is complete
//! before any proving starts.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use log::{debug, info, warn};
use plonky2::field::types::{Field, PrimeField64};
use serde::{Deserialize, Serialize};
use wizard::column::{positive_mod, Column, ColumnId};
use wizard::field::{from_usize, hash_elements, Digest, F};
use wizard::iop::ProverAction;
use wizard::mset::MSetHash;
use wizard::query::Query;
use wizard::runtime::Runtime;

use crate::boundaries::{
    record_assignment_stats, segment_boundaries, PaddingInfo, SegmentBoundaries,
};
use crate::discoverer::Discovery;

/// Modules cut in more segments than this are reported.
const MANY_SEGMENTS: usize = 4;

/// What the segmentation needs to know about a GL module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlueprintGL {
    pub module_name: String,
    pub module_index: usize,
    /// Every column of the module, in the source protocol.
    pub columns: Vec<ColumnId>,
    /// `(root, position)` of every value a segment sends to the next one.
    /// Positions are rows of the segment.
    pub sent_values: Vec<(ColumnId, isize)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HornerSelector {
    Column(ColumnId),
    /// A constant selector over `rows` rows.
    Constant { value: F, rows: usize },
}

/// What the segmentation needs to know about an LPP module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlueprintLPP {
    pub module_name: String,
    pub module_index: usize,
    /// The columns of the module read by its lookup queries, in the source
    /// protocol.
    pub columns: Vec<ColumnId>,
    pub horner_selectors: Vec<HornerSelector>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleWitnessGL {
    pub module_name: String,
    pub module_index: usize,
    pub segment_index: usize,
    /// Number of segments of every module.
    pub total_segment_counts: Vec<usize>,
    /// Segment of every non-fixed column of the module.
    pub columns: BTreeMap<String, Vec<F>>,
    pub received_values_global: Vec<F>,
    pub vk_merkle_root: [F; 4],
}

impl ModuleWitnessGL {
    pub fn is_first(&self) -> bool {
        self.segment_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.segment_index + 1 == self.total_segment_counts[self.module_index]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleWitnessLPP {
    pub module_name: String,
    pub module_index: usize,
    pub segment_index: usize,
    pub total_segment_counts: Vec<usize>,
    /// Segment of every non-fixed LPP column of the module.
    pub columns: BTreeMap<String, Vec<F>>,
    pub initial_fiat_shamir_state: [F; 4],
    /// Horner counters of the segment, one per Horner part.
    pub n0_values: Vec<usize>,
    pub vk_merkle_root: [F; 4],
}

impl ModuleWitnessLPP {
    pub fn is_first(&self) -> bool {
        self.segment_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.segment_index + 1 == self.total_segment_counts[self.module_index]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentedWitness {
    pub gl: Vec<ModuleWitnessGL>,
    pub lpp: Vec<ModuleWitnessLPP>,
    pub shared_randomness: Digest,
}

/// Commits to the LPP columns of a segment.
pub fn lpp_commitment<'a, I: IntoIterator<Item = &'a [F]>>(columns: I) -> F {
    let values = columns.into_iter().flatten().copied().collect_vec();
    hash_elements(&values).elements[0]
}

/// The message a segment inserts in the shared-randomness multiset.
pub fn commitment_message(module_index: usize, segment_index: usize, commitment: F) -> [F; 3] {
    [from_usize(module_index), from_usize(segment_index), commitment]
}

/// Number of segments of a module: the largest number of segment-sized
/// chunks any of its query-based modules needs, and at least one.
pub fn nb_segments_of_module(
    disc: &Discovery,
    module: usize,
    boundaries: &[SegmentBoundaries],
) -> usize {
    let m = disc.module(module);
    let nb = m
        .new_sizes
        .iter()
        .zip(boundaries)
        .zip(&m.sub_modules)
        .map(|((&new_size, b), sub)| {
            assert!(
                b.len() % new_size == 0,
                "the area {:?} of {} is not a multiple of its segment size {new_size}",
                (b.start, b.stop),
                sub.name
            );
            b.len() / new_size
        })
        .max()
        .unwrap_or(0);
    if nb >= MANY_SEGMENTS {
        warn!("module {} is cut in {nb} segments", m.name);
    }
    nb.max(1)
}

/// Extracts segment `index` out of the `total` segments of a column whose
/// query-based module covers `boundaries`. Rows outside of the column are
/// padded with its first or last value, or with zero for zero-padded
/// columns. Fixed columns are passed whole.
pub fn segment_of_column(
    rt: &Runtime,
    col: ColumnId,
    boundaries: &SegmentBoundaries,
    new_size: usize,
    total: usize,
    index: usize,
) -> Vec<F> {
    let info = rt.spec().column(col);
    let values = rt.column(col);
    if info.status.is_fixed() {
        return values.to_vec();
    }

    let size = values.len() as isize;
    let new_size_i = new_size as isize;
    let mut start_seg = boundaries.start as isize;
    if boundaries.padding == PaddingInfo::LeftPadded && boundaries.len() < total * new_size {
        start_seg = boundaries.stop as isize - (total * new_size) as isize;
    }
    let start = start_seg + (index as isize) * new_size_i;
    let end = start + new_size_i;

    let zero_padded = info.pragmas.zero_padded;
    let first = if zero_padded { F::ZERO } else { values[0] };
    let last = if zero_padded {
        F::ZERO
    } else {
        values[values.len() - 1]
    };

    if start >= 0 && end <= size {
        values[start as usize..end as usize].to_vec()
    } else if start < 0 && end <= 0 {
        vec![first; new_size]
    } else if start >= size && end > size {
        vec![last; new_size]
    } else if start == 0 && end > size {
        let mut res = values.to_vec();
        res.resize(new_size, last);
        res
    } else if start < 0 && end == size {
        let mut res = vec![first; (-start) as usize];
        res.extend_from_slice(values);
        res
    } else {
        panic!(
            "cannot extract rows {start}..{end} of {} which has {size} rows",
            info.name
        )
    }
}

/// Concatenation of the segments of a possibly shifted column, shifts being
/// applied within each segment the way the segment protocols read them.
fn segmented_view(segments: &HashMap<ColumnId, Vec<Vec<F>>>, col: &Column, len: usize) -> Vec<F> {
    match col {
        Column::Constant { value, .. } => vec![*value; len],
        _ => {
            let Some(root) = col.root() else {
                unreachable!("non-constant columns have a root")
            };
            let offset = col.offset();
            segments[&root]
                .iter()
                .flat_map(|seg| {
                    (0..seg.len()).map(move |r| seg[positive_mod(r as isize + offset, seg.len())])
                })
                .collect()
        }
    }
}

/// Recomputes the multiplicity column of an inclusion over the rows the
/// segments actually hold, so that the log-derivative sums of the segments
/// telescope.
fn segmented_multiplicities(
    rt: &Runtime,
    segments: &HashMap<ColumnId, Vec<Vec<F>>>,
    query: wizard::query::QueryId,
    m: ColumnId,
) -> Vec<F> {
    let info = rt.spec().query(query);
    let Query::Inclusion(q) = &info.query else {
        panic!("{} is not an inclusion query", info.name)
    };
    let view_len = |cols: &[Column]| {
        cols.iter()
            .filter_map(Column::root)
            .map(|r| segments[&r].iter().map(Vec::len).sum::<usize>())
            .next()
            .unwrap_or(0)
    };
    let tuples = |cols: &[Column], filter: Option<&Column>| -> Vec<Option<Vec<u64>>> {
        let len = view_len(cols);
        let views = cols.iter().map(|c| segmented_view(segments, c, len)).collect_vec();
        let filter = filter.map(|f| segmented_view(segments, f, len));
        (0..len)
            .map(|i| {
                let active = filter.as_ref().map_or(true, |f| f[i].is_one());
                active.then(|| views.iter().map(|v| v[i].to_canonical_u64()).collect())
            })
            .collect()
    };

    let table = tuples(&q.including, q.filter_including.as_ref());
    let mut first_row: HashMap<Vec<u64>, usize> = HashMap::new();
    for (i, t) in table.iter().enumerate() {
        if let Some(t) = t {
            first_row.entry(t.clone()).or_insert(i);
        }
    }

    let mut res = vec![F::ZERO; segments[&m].iter().map(Vec::len).sum()];
    assert_eq!(
        res.len(),
        table.len(),
        "the multiplicity column of {} is not segmented like its table",
        info.name
    );
    for t in tuples(&q.included, q.filter_included.as_ref()).into_iter().flatten() {
        match first_row.get(&t) {
            Some(&i) => res[i] += F::ONE,
            None => panic!(
                "{}: the segmented tuple {t:?} is not in the segmented table",
                info.name
            ),
        }
    }
    res
}

/// Number of active rows of a Horner selector in one segment.
fn count_selected(selector: &HornerSelector, segment: impl Fn(ColumnId) -> usize) -> usize {
    match selector {
        HornerSelector::Column(c) => segment(*c),
        HornerSelector::Constant { value, rows } => {
            if value.is_one() {
                *rows
            } else if value.is_zero() {
                0
            } else {
                panic!("constant horner selector {value} is not binary")
            }
        }
    }
}

/// Cuts a fully assigned runtime of the distributed protocol into segment
/// witnesses. `blueprints_gl[k]` and `blueprints_lpp[k]` describe module
/// `k`.
pub fn segment_runtime(
    rt: &Runtime,
    disc: &Discovery,
    blueprints_gl: &[BlueprintGL],
    blueprints_lpp: &[BlueprintLPP],
    vk_merkle_root: [F; 4],
) -> SegmentedWitness {
    let spec = rt.spec();
    let multiplicities = spec
        .prover_actions()
        .iter()
        .map(|a| match a {
            ProverAction::InclusionMultiplicity { query, column } => (*query, *column),
        })
        .collect_vec();
    let skip: HashSet<ColumnId> = multiplicities.iter().map(|(_, m)| *m).collect();

    let boundaries = disc
        .modules()
        .iter()
        .map(|m| {
            m.sub_modules
                .iter()
                .zip(&m.new_sizes)
                .map(|(sub, &new_size)| {
                    let stats = record_assignment_stats(rt, sub, new_size, &skip);
                    debug!("{} in {}: {stats}", sub.name, m.name);
                    segment_boundaries(&stats)
                })
                .collect_vec()
        })
        .collect_vec();

    let total_segment_counts = (0..disc.nb_modules())
        .map(|k| nb_segments_of_module(disc, k, &boundaries[k]))
        .collect_vec();
    info!("segment counts: {total_segment_counts:?}");

    let mut segments: HashMap<ColumnId, Vec<Vec<F>>> = HashMap::new();
    for (k, module) in disc.modules().iter().enumerate() {
        let subs = module.sub_modules.iter().zip(&module.new_sizes);
        for ((sub, &new_size), b) in subs.zip(&boundaries[k]) {
            for &col in &sub.columns {
                let segs = (0..total_segment_counts[k])
                    .map(|i| segment_of_column(rt, col, b, new_size, total_segment_counts[k], i))
                    .collect();
                segments.insert(col, segs);
            }
        }
    }
    for (query, m) in multiplicities {
        let view = segmented_multiplicities(rt, &segments, query, m);
        let chunk = disc.new_size_of(m);
        let segs = view.chunks(chunk).map(<[F]>::to_vec).collect();
        segments.insert(m, segs);
    }

    let name_of = |c: ColumnId| spec.column(c).name.clone();
    let non_fixed = |cols: &[ColumnId], i: usize| -> BTreeMap<String, Vec<F>> {
        cols.iter()
            .filter(|&&c| !spec.column(c).status.is_fixed())
            .map(|&c| (name_of(c), segments[&c][i].clone()))
            .collect()
    };

    let mut gl = Vec::new();
    for bp in blueprints_gl {
        let total = total_segment_counts[bp.module_index];
        let mut received = vec![F::ZERO; bp.sent_values.len()];
        for i in 0..total {
            gl.push(ModuleWitnessGL {
                module_name: bp.module_name.clone(),
                module_index: bp.module_index,
                segment_index: i,
                total_segment_counts: total_segment_counts.clone(),
                columns: non_fixed(&bp.columns, i),
                received_values_global: received.clone(),
                vk_merkle_root,
            });
            received = bp
                .sent_values
                .iter()
                .map(|&(root, pos)| {
                    let seg = &segments[&root][i];
                    seg[positive_mod(pos, seg.len())]
                })
                .collect();
        }
    }

    let mut shared = MSetHash::empty();
    let mut commitments = Vec::new();
    for bp in blueprints_lpp {
        let total = total_segment_counts[bp.module_index];
        for i in 0..total {
            let c = lpp_commitment(bp.columns.iter().map(|c| segments[c][i].as_slice()));
            shared.insert(&commitment_message(bp.module_index, i, c));
            commitments.push(c);
        }
    }
    let shared_randomness = shared.shared_randomness();

    let mut lpp = Vec::new();
    for bp in blueprints_lpp {
        let total = total_segment_counts[bp.module_index];
        let mut n0s = vec![0usize; bp.horner_selectors.len()];
        for i in 0..total {
            lpp.push(ModuleWitnessLPP {
                module_name: bp.module_name.clone(),
                module_index: bp.module_index,
                segment_index: i,
                total_segment_counts: total_segment_counts.clone(),
                columns: non_fixed(&bp.columns, i),
                initial_fiat_shamir_state: shared_randomness.elements,
                n0_values: n0s.clone(),
                vk_merkle_root,
            });
            for (n0, selector) in n0s.iter_mut().zip(&bp.horner_selectors) {
                *n0 += count_selected(selector, |c| {
                    segments[&c][i].iter().filter(|v| v.is_one()).count()
                });
            }
        }
    }

    SegmentedWitness {
        gl,
        lpp,
        shared_randomness,
    }
}
