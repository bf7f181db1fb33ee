//! Query checks over a fully assigned runtime.

use hashbrown::HashSet;
use itertools::Itertools;
use plonky2::field::types::{Field, PrimeField64};

use crate::column::Column;
use crate::error::QueryError;
use crate::expression::{Evaluator, Expr};
use crate::field::F;
use crate::query::{Query, QueryId, QueryParams};
use crate::runtime::Runtime;

/// Checks every non-ignored query of the runtime's protocol, stopping at the
/// first failure.
pub fn check_all(rt: &Runtime) -> Result<(), QueryError> {
    for (id, info) in rt.spec().queries() {
        if info.ignored {
            continue;
        }
        check_query(rt, id)?;
    }
    Ok(())
}

pub fn check_query(rt: &Runtime, id: QueryId) -> Result<(), QueryError> {
    let info = rt.spec().query(id);
    let name = info.name.clone();
    match &info.query {
        Query::Global(expr) => check_global(rt, name, expr),
        Query::Local(expr) => {
            let value = expr.eval_row(rt, 0);
            if value.is_zero() {
                Ok(())
            } else {
                Err(QueryError::Local { name, value })
            }
        }
        Query::Range(r) => {
            for (row, v) in rt.column_values(&r.column).into_iter().enumerate() {
                let value = v.to_canonical_u64();
                if value >= r.bound {
                    return Err(QueryError::Range {
                        name,
                        row,
                        value,
                        bound: r.bound,
                    });
                }
            }
            Ok(())
        }
        Query::PlonkInWizard(p) => {
            let data = rt.column_values(&p.data);
            let selector = rt.column_values(&p.selector);
            let k = p.circuit.nb_public_inputs();
            let nb_instances = (data.len() / k).min(p.max_nb_instances);
            for instance in 0..nb_instances {
                if !selector[instance * k].is_one() {
                    continue;
                }
                if !p.circuit.check(&data[instance * k..(instance + 1) * k]) {
                    return Err(QueryError::PlonkInWizard { name, instance });
                }
            }
            Ok(())
        }
        Query::Inclusion(q) => {
            let table: HashSet<Vec<u64>> =
                filtered_rows(rt, &q.including, q.filter_including.as_ref())
                    .into_iter()
                    .map(|(_, row)| row)
                    .collect();
            for (row, tuple) in filtered_rows(rt, &q.included, q.filter_included.as_ref()) {
                if !table.contains(&tuple) {
                    return Err(QueryError::Inclusion { name, row });
                }
            }
            Ok(())
        }
        Query::Permutation(q) => {
            let a = rows_of(rt, &q.a).into_iter().sorted().collect_vec();
            let b = rows_of(rt, &q.b).into_iter().sorted().collect_vec();
            if a == b {
                Ok(())
            } else {
                Err(QueryError::Permutation { name })
            }
        }
        Query::Projection(q) => {
            let a = filtered_rows(rt, &q.a, Some(&q.filter_a));
            let b = filtered_rows(rt, &q.b, Some(&q.filter_b));
            if a.iter().map(|(_, r)| r).eq(b.iter().map(|(_, r)| r)) {
                Ok(())
            } else {
                Err(QueryError::Projection { name })
            }
        }
        Query::LocalOpening(col) => match rt.params(id) {
            Some(QueryParams::LocalOpening(claimed)) => {
                compare(name, *claimed, rt.column_value(col, 0))
            }
            _ => Err(QueryError::MissingParams { name }),
        },
        Query::LogDerivativeSum(parts) => match rt.params(id) {
            Some(QueryParams::LogDerivativeSum(claimed)) => {
                let computed = rt.compute_log_derivative_sum(&name, parts)?;
                compare(name, *claimed, computed)
            }
            _ => Err(QueryError::MissingParams { name }),
        },
        Query::GrandProduct(parts) => match rt.params(id) {
            Some(QueryParams::GrandProduct(claimed)) => {
                let computed = rt.compute_grand_product(&name, parts)?;
                compare(name, *claimed, computed)
            }
            _ => Err(QueryError::MissingParams { name }),
        },
        Query::Horner(parts) => match rt.params(id) {
            Some(QueryParams::Horner(claimed)) if claimed.parts.len() == parts.len() => {
                let n0s = claimed.parts.iter().map(|p| p.n0).collect_vec();
                let computed = rt.compute_horner(&name, parts, &n0s)?;
                for (part, (c, e)) in claimed.parts.iter().zip(&computed.parts).enumerate() {
                    if c.n1 != e.n1 {
                        return Err(QueryError::HornerCounter {
                            name,
                            part,
                            claimed: c.n1,
                            computed: e.n1,
                        });
                    }
                }
                compare(name, claimed.final_result, computed.final_result)
            }
            _ => Err(QueryError::MissingParams { name }),
        },
    }
}

fn compare(name: String, claimed: F, computed: F) -> Result<(), QueryError> {
    if claimed == computed {
        Ok(())
    } else {
        Err(QueryError::WrongParams {
            name,
            claimed,
            computed,
        })
    }
}

/// Rows where a shifted column would wrap around are not constrained.
fn check_global(rt: &Runtime, name: String, expr: &Expr) -> Result<(), QueryError> {
    let n = rt.expr_size(expr) as isize;
    let (min, max) = expr.min_max_offset();
    let start = (-min).max(0);
    let stop = n - max.max(0);
    for row in start..stop {
        let value = expr.eval_row(rt, row as usize);
        if !value.is_zero() {
            return Err(QueryError::Global {
                name,
                row: row as usize,
                value,
            });
        }
    }
    Ok(())
}

fn rows_of(rt: &Runtime, cols: &[Column]) -> Vec<Vec<u64>> {
    let values = cols.iter().map(|c| rt.column_values(c)).collect_vec();
    let n = values.first().map_or(0, Vec::len);
    (0..n)
        .map(|i| values.iter().map(|v| v[i].to_canonical_u64()).collect())
        .collect()
}

/// Returns the `(row, tuple)` pairs of the rows where the filter is one.
fn filtered_rows(rt: &Runtime, cols: &[Column], filter: Option<&Column>) -> Vec<(usize, Vec<u64>)> {
    let filter = filter.map(|f| rt.column_values(f));
    rows_of(rt, cols)
        .into_iter()
        .enumerate()
        .filter(|(i, _)| filter.as_ref().map_or(true, |f| f[*i] == F::ONE))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnId;
    use crate::iop::CompiledIop;

    fn felts(xs: &[u64]) -> Vec<F> {
        xs.iter().copied().map(F::from_canonical_u64).collect()
    }

    fn counter() -> (CompiledIop, ColumnId, QueryId) {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 4);
        let col = Column::Natural(a);
        let q = comp.insert_query(
            "COUNTER",
            0,
            Query::Global(Expr::from(col.shift(1)) - Expr::from(col) - Expr::one()),
        );
        (comp, a, q)
    }

    #[test]
    fn global_skips_the_wrapping_row() {
        let (comp, a, q) = counter();
        let mut rt = Runtime::new(&comp);
        rt.assign_column(a, felts(&[5, 6, 7, 8]));
        assert!(check_query(&rt, q).is_ok());
    }

    #[test]
    fn global_reports_the_failing_row() {
        let (comp, a, q) = counter();
        let mut rt = Runtime::new(&comp);
        rt.assign_column(a, felts(&[5, 6, 9, 10]));
        match check_query(&rt, q) {
            Err(QueryError::Global { row, .. }) => assert_eq!(row, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn permutation_is_order_insensitive() {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 4);
        let b = comp.insert_commit("B", 4);
        let q = comp.insert_query(
            "PERM",
            0,
            Query::Permutation(crate::query::Permutation {
                a: vec![Column::Natural(a)],
                b: vec![Column::Natural(b)],
            }),
        );
        let mut rt = Runtime::new(&comp);
        rt.assign_column(a, felts(&[1, 2, 3, 4]));
        rt.assign_column(b, felts(&[4, 2, 1, 3]));
        assert!(check_query(&rt, q).is_ok());

        rt.assign_column(b, felts(&[4, 2, 1, 1]));
        assert!(matches!(check_query(&rt, q), Err(QueryError::Permutation { .. })));
    }
}
