//! Columns of a compiled IOP.
//!
//! Natural columns are owned by the [`CompiledIop`](crate::iop::CompiledIop)
//! that declares them and are referred to by their index in its column arena.
//! Shifted and constant columns are views: they have no storage of their own.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field::F;

/// Index of a natural column in the arena of its compiled IOP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(pub usize);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnStatus {
    /// Assigned by the prover and committed.
    Committed,
    /// Assigned by the prover and sent in clear to the verifier.
    Proof,
    /// Known in advance and part of the setup.
    Precomputed,
    /// Known in advance and part of the verifying key.
    VerifyingKey,
}

impl ColumnStatus {
    pub const fn is_fixed(self) -> bool {
        matches!(self, ColumnStatus::Precomputed | ColumnStatus::VerifyingKey)
    }
}

/// Hint about where the meaningful values of a column sit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Padding {
    FullColumn,
    LeftPadded,
    RightPadded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pragmas {
    pub padding: Option<Padding>,
    /// The column is padded with zeroes, whatever its boundary values are.
    pub zero_padded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub size: usize,
    pub round: usize,
    pub status: ColumnStatus,
    pub pragmas: Pragmas,
}

/// A reference to a column as it appears in expressions and queries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    Natural(ColumnId),
    /// `Shifted { parent, offset }[i] = parent[(i + offset) mod n]`.
    Shifted { parent: ColumnId, offset: isize },
    /// A column of `size` copies of `value`, derived by the verifier.
    Constant { value: F, size: usize },
}

impl Column {
    /// Returns the natural column this column is a view of, if any.
    pub const fn root(&self) -> Option<ColumnId> {
        match self {
            Column::Natural(id) => Some(*id),
            Column::Shifted { parent, .. } => Some(*parent),
            Column::Constant { .. } => None,
        }
    }

    pub const fn offset(&self) -> isize {
        match self {
            Column::Shifted { offset, .. } => *offset,
            _ => 0,
        }
    }

    pub const fn is_constant(&self) -> bool {
        matches!(self, Column::Constant { .. })
    }

    /// Shifts the column by `by` rows. Shifting a constant column is a no-op
    /// and a zero shift of a natural column collapses back to it.
    pub fn shift(&self, by: isize) -> Column {
        let (parent, offset) = match self {
            Column::Constant { .. } => return self.clone(),
            Column::Natural(id) => (*id, by),
            Column::Shifted { parent, offset } => (*parent, offset + by),
        };
        if offset == 0 {
            Column::Natural(parent)
        } else {
            Column::Shifted { parent, offset }
        }
    }
}

impl From<ColumnId> for Column {
    fn from(id: ColumnId) -> Self {
        Column::Natural(id)
    }
}

/// Returns the deduplicated list of root columns of `cols`, in order of first
/// appearance. Constant columns are filtered out.
pub fn roots_of<'a, I: IntoIterator<Item = &'a Column>>(cols: I) -> Vec<ColumnId> {
    let mut res = Vec::new();
    for id in cols.into_iter().filter_map(Column::root) {
        if !res.contains(&id) {
            res.push(id);
        }
    }
    res
}

/// Returns `x mod n` in `[0, n)`.
pub fn positive_mod(x: isize, n: usize) -> usize {
    x.rem_euclid(n as isize) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_compose_and_collapse() {
        let a = Column::Natural(ColumnId(3));
        let s = a.shift(2).shift(-1);
        assert_eq!(
            s,
            Column::Shifted {
                parent: ColumnId(3),
                offset: 1
            }
        );
        assert_eq!(s.shift(-1), a);
    }

    #[test]
    fn roots_are_deduplicated() {
        let cols = [
            Column::Natural(ColumnId(1)),
            Column::Natural(ColumnId(0)).shift(1),
            Column::Constant {
                value: F::default(),
                size: 4,
            },
            Column::Natural(ColumnId(1)).shift(-1),
        ];
        assert_eq!(roots_of(&cols), vec![ColumnId(1), ColumnId(0)]);
    }

    #[test]
    fn positive_mod_wraps_negative_positions() {
        assert_eq!(positive_mod(-1, 8), 7);
        assert_eq!(positive_mod(9, 8), 1);
    }
}
