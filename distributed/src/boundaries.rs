//! Locates the meaningful rows of a query-based module in an assignment.
//!
//! Columns are rarely fully used: traces are usually padded with zeroes,
//! either after the meaningful values (right padding) or before them (left
//! padding). The segmentation only needs to cover the rows holding
//! meaningful values, rounded up to a whole number of segments.

use std::fmt;

use hashbrown::HashSet;
use itertools::Itertools;
use plonky2::field::types::Field;
use serde::{Deserialize, Serialize};
use wizard::column::{ColumnId, Padding};
use wizard::field::F;
use wizard::runtime::Runtime;

use crate::discoverer::QueryBasedModule;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaddingInfo {
    /// The whole column is meaningful.
    NoPadding,
    /// Every column of the module is constant.
    Constant,
    LeftPadded,
    RightPadded,
}

/// The rows `start..stop` of a query-based module that are cut into
/// segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentBoundaries {
    pub start: usize,
    pub stop: usize,
    pub padding: PaddingInfo,
}

impl SegmentBoundaries {
    pub const fn len(&self) -> usize {
        self.stop - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.stop == self.start
    }
}

/// Summary of how the columns of a query-based module are assigned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentStats {
    pub module_name: String,
    pub segment_size: usize,
    pub original_size: usize,
    pub nb_columns: usize,
    pub nb_precomputed: usize,
    pub nb_pragma_left_padded: usize,
    pub nb_pragma_right_padded: usize,
    pub nb_pragma_full_column: usize,
    pub nb_assigned_left_padded: usize,
    pub nb_assigned_right_padded: usize,
    pub nb_assigned_full_column: usize,
    pub nb_assigned_constant_column: usize,
    pub nb_active_rows: usize,
    pub first_column: String,
    pub last_column: String,
    pub last_left_padded: Option<String>,
    pub last_right_padded: Option<String>,
    pub errors: Vec<String>,
}

impl fmt::Display for AssignmentStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (segment size {}, {} rows, {} columns): pragmas L/R/F = {}/{}/{}, \
             assigned L/R/F/C = {}/{}/{}/{}, active rows = {}, columns {}..{}",
            self.module_name,
            self.segment_size,
            self.original_size,
            self.nb_columns,
            self.nb_pragma_left_padded,
            self.nb_pragma_right_padded,
            self.nb_pragma_full_column,
            self.nb_assigned_left_padded,
            self.nb_assigned_right_padded,
            self.nb_assigned_full_column,
            self.nb_assigned_constant_column,
            self.nb_active_rows,
            self.first_column,
            self.last_column,
        )
    }
}

/// Returns the range of rows between the first and the last non-zero value,
/// `(0, 0)` for an all-zero column.
pub fn non_zero_window(values: &[F]) -> (usize, usize) {
    match values.iter().position(|v| !v.is_zero()) {
        None => (0, 0),
        Some(start) => {
            let stop = values.iter().rposition(|v| !v.is_zero()).map_or(start, |s| s + 1);
            (start, stop)
        }
    }
}

/// Scans the assignment of the columns of `qbm`. Columns listed in `skip`,
/// and columns not assigned yet, are ignored.
pub fn record_assignment_stats(
    rt: &Runtime,
    qbm: &QueryBasedModule,
    segment_size: usize,
    skip: &HashSet<ColumnId>,
) -> AssignmentStats {
    let spec = rt.spec();
    let names = qbm
        .columns
        .iter()
        .map(|&c| spec.column(c).name.clone())
        .sorted()
        .collect_vec();
    let mut stats = AssignmentStats {
        module_name: qbm.name.clone(),
        segment_size,
        original_size: qbm.original_size,
        nb_columns: qbm.columns.len(),
        first_column: names.first().cloned().unwrap_or_default(),
        last_column: names.last().cloned().unwrap_or_default(),
        ..Default::default()
    };
    let size = qbm.original_size;

    for &col in qbm.columns.iter().sorted_by_key(|&&c| &spec.column(c).name) {
        let info = spec.column(col);
        if skip.contains(&col) || !rt.has_column(col) {
            continue;
        }
        if info.status.is_fixed() {
            stats.nb_precomputed += 1;
        }

        let (start, stop) = non_zero_window(rt.column(col));
        let density = stop - start;
        let is_right_padded = start == 0;
        let is_left_padded = stop == size;

        match info.pragmas.padding {
            Some(Padding::FullColumn) => {
                stats.nb_pragma_full_column += 1;
                stats.nb_active_rows = size;
            }
            Some(Padding::LeftPadded) => {
                if !is_left_padded && density > 0 {
                    stats.errors.push(format!(
                        "{} has a left-padded pragma but is not left padded",
                        info.name
                    ));
                    continue;
                }
                stats.nb_pragma_left_padded += 1;
                stats.last_left_padded = Some(info.name.clone());
            }
            Some(Padding::RightPadded) => {
                if !is_right_padded && density > 0 {
                    stats.errors.push(format!(
                        "{} has a right-padded pragma but is not right padded",
                        info.name
                    ));
                    continue;
                }
                stats.nb_pragma_right_padded += 1;
                stats.last_right_padded = Some(info.name.clone());
            }
            None => {}
        }

        if density == 0 {
            stats.nb_assigned_constant_column += 1;
        } else if is_right_padded && is_left_padded {
            // Full columns say nothing about the active area.
            stats.nb_assigned_full_column += 1;
            continue;
        } else if is_right_padded {
            stats.nb_assigned_right_padded += 1;
            stats.last_right_padded = Some(info.name.clone());
        } else if is_left_padded {
            stats.nb_assigned_left_padded += 1;
            stats.last_left_padded = Some(info.name.clone());
        } else {
            stats
                .errors
                .push(format!("{} is neither left nor right padded", info.name));
            continue;
        }

        stats.nb_active_rows = stats.nb_active_rows.max(density);
    }

    if stats.nb_active_rows == 0
        && stats.nb_assigned_full_column > 0
        && stats.nb_pragma_left_padded + stats.nb_pragma_right_padded == 0
    {
        stats.nb_active_rows = size;
    }
    stats
}

/// Derives the rows of the module to segment from its assignment stats.
pub fn segment_boundaries(stats: &AssignmentStats) -> SegmentBoundaries {
    if !stats.errors.is_empty() {
        panic!(
            "invalid assignment of {}:\n{}",
            stats.module_name,
            stats.errors.join("\n")
        );
    }

    let nb_pragma_kinds = [
        stats.nb_pragma_full_column,
        stats.nb_pragma_left_padded,
        stats.nb_pragma_right_padded,
    ]
    .iter()
    .filter(|&&n| n > 0)
    .count();
    if nb_pragma_kinds > 1 {
        panic!("contradictory padding pragmas in {stats}");
    }

    if stats.nb_active_rows == 0 {
        return SegmentBoundaries {
            start: 0,
            stop: 0,
            padding: PaddingInfo::Constant,
        };
    }

    let no_padding_pragma = stats.nb_pragma_left_padded + stats.nb_pragma_right_padded == 0;
    if no_padding_pragma
        && (stats.nb_assigned_left_padded + stats.nb_assigned_right_padded == 0
            || stats.nb_assigned_full_column + stats.nb_assigned_constant_column == stats.nb_columns
            || stats.nb_pragma_full_column > 0)
    {
        return SegmentBoundaries {
            start: 0,
            stop: stats.original_size,
            padding: PaddingInfo::NoPadding,
        };
    }

    if no_padding_pragma
        && stats.nb_assigned_left_padded > 0
        && stats.nb_assigned_right_padded > 0
    {
        panic!("simultaneously left and right padded columns in {stats}");
    }

    let area = stats.nb_active_rows.div_ceil(stats.segment_size) * stats.segment_size;
    if stats.nb_pragma_right_padded > 0
        || (stats.nb_assigned_right_padded > 0 && stats.nb_pragma_left_padded == 0)
    {
        SegmentBoundaries {
            start: 0,
            stop: area,
            padding: PaddingInfo::RightPadded,
        }
    } else {
        SegmentBoundaries {
            start: stats.original_size - area,
            stop: stats.original_size,
            padding: PaddingInfo::LeftPadded,
        }
    }
}

#[cfg(test)]
mod tests {
    use wizard::column::Pragmas;
    use wizard::iop::CompiledIop;

    use super::*;

    fn felts(xs: &[u64]) -> Vec<F> {
        xs.iter().copied().map(F::from_canonical_u64).collect()
    }

    fn module_of(comp: &CompiledIop) -> QueryBasedModule {
        QueryBasedModule {
            name: "M".to_string(),
            columns: comp.columns().map(|(id, _)| id).collect(),
            original_size: 8,
            nb_constraints_of_plonk: 0,
            nb_instances_of_plonk: 0,
            nb_queries_of_plonk: 0,
            cant_change_size: false,
        }
    }

    fn boundaries(comp: &CompiledIop, assignment: &[&[u64]]) -> SegmentBoundaries {
        let mut rt = Runtime::new(comp);
        for (i, values) in assignment.iter().enumerate() {
            rt.assign_column(ColumnId(i), felts(values));
        }
        let stats = record_assignment_stats(&rt, &module_of(comp), 2, &HashSet::new());
        segment_boundaries(&stats)
    }

    fn two_columns() -> CompiledIop {
        let mut comp = CompiledIop::new();
        comp.insert_commit("A", 8);
        comp.insert_commit("B", 8);
        comp
    }

    #[test]
    fn window_of_zeroes_is_empty() {
        assert_eq!(non_zero_window(&felts(&[0, 0, 0])), (0, 0));
        assert_eq!(non_zero_window(&felts(&[0, 3, 0, 4, 0])), (1, 4));
    }

    #[test]
    fn right_padded_area_is_rounded_to_segments() {
        let b = boundaries(&two_columns(), &[&[1, 2, 3, 0, 0, 0, 0, 0], &[0; 8]]);
        assert_eq!(
            b,
            SegmentBoundaries {
                start: 0,
                stop: 4,
                padding: PaddingInfo::RightPadded
            }
        );
    }

    #[test]
    fn left_padded_area_is_anchored_at_the_end() {
        let b = boundaries(&two_columns(), &[&[0, 0, 0, 0, 0, 7, 8, 9], &[1; 8]]);
        assert_eq!(
            b,
            SegmentBoundaries {
                start: 4,
                stop: 8,
                padding: PaddingInfo::LeftPadded
            }
        );
    }

    #[test]
    fn full_and_constant_columns_cover_everything() {
        let b = boundaries(&two_columns(), &[&[1; 8], &[0; 8]]);
        assert_eq!((b.start, b.stop, b.padding), (0, 8, PaddingInfo::NoPadding));

        let c = boundaries(&two_columns(), &[&[0; 8], &[0; 8]]);
        assert_eq!(c.padding, PaddingInfo::Constant);
        assert!(c.is_empty());
    }

    #[test]
    fn pragmas_override_the_inference() {
        let mut comp = two_columns();
        comp.set_pragmas(
            ColumnId(0),
            Pragmas {
                padding: Some(Padding::FullColumn),
                zero_padded: false,
            },
        );
        let b = boundaries(&comp, &[&[1, 0, 0, 0, 0, 0, 0, 0], &[1, 1, 0, 0, 0, 0, 0, 0]]);
        assert_eq!((b.start, b.stop, b.padding), (0, 8, PaddingInfo::NoPadding));
    }

    #[test]
    #[should_panic(expected = "simultaneously left and right padded")]
    fn mixed_padding_is_rejected() {
        boundaries(&two_columns(), &[&[1, 0, 0, 0, 0, 0, 0, 0], &[0, 0, 0, 0, 0, 0, 0, 1]]);
    }

    #[test]
    #[should_panic(expected = "neither left nor right padded")]
    fn floating_windows_are_rejected() {
        boundaries(&two_columns(), &[&[0, 1, 1, 0, 0, 0, 0, 0], &[0; 8]]);
    }
}
