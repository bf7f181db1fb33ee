//! Symbolic expressions over columns and verifier-visible scalars.

use std::ops::{Add, Mul, Neg, Sub};

use plonky2::field::types::Field;

use crate::column::{Column, ColumnId};
use crate::field::F;
use crate::iop::CoinId;
use crate::query::QueryId;

/// A scalar the verifier can compute without looking at a full column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Accessor {
    Constant(F),
    /// One cell of a column. Only meaningful for small public columns.
    Cell {
        column: Column,
        position: usize,
    },
    Coin(CoinId),
    LocalOpening(QueryId),
    LogDerivativeSum(QueryId),
    GrandProduct(QueryId),
    HornerFinal(QueryId),
    /// An expression built only from accessors.
    Expr(Box<Expr>),
}

impl Accessor {
    pub fn cell(column: ColumnId, position: usize) -> Self {
        Accessor::Cell {
            column: Column::Natural(column),
            position,
        }
    }

    /// Columns the accessor reads from.
    pub fn columns(&self) -> Vec<Column> {
        match self {
            Accessor::Cell { column, .. } => vec![column.clone()],
            Accessor::Expr(e) => e.columns_and_cells(),
            _ => vec![],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Constant(F),
    Column(Column),
    Accessor(Accessor),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

/// Anything able to give a value to the leaves of an [`Expr`].
pub trait Evaluator {
    fn column_value(&self, column: &Column, row: usize) -> F;
    fn accessor_value(&self, accessor: &Accessor) -> F;
}

impl Expr {
    pub fn constant(x: u64) -> Self {
        Expr::Constant(F::from_canonical_u64(x))
    }

    pub fn one() -> Self {
        Expr::Constant(F::ONE)
    }

    /// Returns the columns appearing as leaves of the expression,
    /// deduplicated and in order of first appearance. Columns only read
    /// through accessors are not included.
    pub fn columns(&self) -> Vec<Column> {
        let mut res = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Column(c) = e {
                if !res.contains(c) {
                    res.push(c.clone());
                }
            }
        });
        res
    }

    /// Like [`Expr::columns`] but also returns the columns read by cell
    /// accessors.
    pub fn columns_and_cells(&self) -> Vec<Column> {
        let mut res = Vec::new();
        self.visit(&mut |e| {
            let found = match e {
                Expr::Column(c) => vec![c.clone()],
                Expr::Accessor(a) => a.columns(),
                _ => vec![],
            };
            for c in found {
                if !res.contains(&c) {
                    res.push(c);
                }
            }
        });
        res
    }

    pub fn accessors(&self) -> Vec<Accessor> {
        let mut res = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Accessor(a) = e {
                if !res.contains(a) {
                    res.push(a.clone());
                }
            }
        });
        res
    }

    /// Returns true if no column appears as a leaf.
    pub fn is_columnless(&self) -> bool {
        self.columns().iter().all(Column::is_constant)
    }

    /// Returns the smallest and largest row offsets of the non-constant
    /// columns of the expression, `(0, 0)` if there are none.
    pub fn min_max_offset(&self) -> (isize, isize) {
        let offsets: Vec<isize> = self
            .columns()
            .iter()
            .filter(|c| !c.is_constant())
            .map(Column::offset)
            .collect();
        match (offsets.iter().min(), offsets.iter().max()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => (0, 0),
        }
    }

    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::Neg(a) => a.visit(f),
            Expr::Accessor(Accessor::Expr(inner)) => inner.visit(f),
            _ => {}
        }
    }

    /// Rebuilds the expression bottom-up, replacing every column leaf by
    /// `col(c)` and every accessor leaf by `acc(a)`.
    pub fn rebuild(
        &self,
        col: &mut impl FnMut(&Column) -> Expr,
        acc: &mut impl FnMut(&Accessor) -> Expr,
    ) -> Expr {
        match self {
            Expr::Constant(_) => self.clone(),
            Expr::Column(c) => col(c),
            Expr::Accessor(a) => acc(a),
            Expr::Add(a, b) => a.rebuild(col, acc) + b.rebuild(col, acc),
            Expr::Sub(a, b) => a.rebuild(col, acc) - b.rebuild(col, acc),
            Expr::Mul(a, b) => a.rebuild(col, acc) * b.rebuild(col, acc),
            Expr::Neg(a) => -a.rebuild(col, acc),
        }
    }

    pub fn eval_row<E: Evaluator + ?Sized>(&self, ev: &E, row: usize) -> F {
        match self {
            Expr::Constant(x) => *x,
            Expr::Column(c) => ev.column_value(c, row),
            Expr::Accessor(a) => ev.accessor_value(a),
            Expr::Add(a, b) => a.eval_row(ev, row) + b.eval_row(ev, row),
            Expr::Sub(a, b) => a.eval_row(ev, row) - b.eval_row(ev, row),
            Expr::Mul(a, b) => a.eval_row(ev, row) * b.eval_row(ev, row),
            Expr::Neg(a) => -a.eval_row(ev, row),
        }
    }

    /// Folds `cols` into `cols[0] + alpha * cols[1] + alpha^2 * cols[2] + ..`.
    pub fn linear_combination(cols: &[Column], alpha: Expr) -> Expr {
        let mut iter = cols.iter().rev();
        let Some(last) = iter.next() else {
            return Expr::Constant(F::ZERO);
        };
        iter.fold(Expr::Column(last.clone()), |acc, c| {
            Expr::Column(c.clone()) + alpha.clone() * acc
        })
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl From<F> for Expr {
    fn from(x: F) -> Self {
        Expr::Constant(x)
    }
}

impl From<Column> for Expr {
    fn from(c: Column) -> Self {
        Expr::Column(c)
    }
}

impl From<ColumnId> for Expr {
    fn from(id: ColumnId) -> Self {
        Expr::Column(Column::Natural(id))
    }
}

impl From<Accessor> for Expr {
    fn from(a: Accessor) -> Self {
        Expr::Accessor(a)
    }
}
