//! Reduces inclusion, permutation and projection queries to
//! log-derivative sums, grand products and Horner queries.
//!
//! The compiled queries are declared at round 1 and use `Field` coins of
//! round 1. The reduced queries stay in the protocol, marked as ignored, so
//! that later passes can still see which columns they tied together.

use hashbrown::HashMap;
use itertools::Itertools;
use log::debug;
use plonky2::field::types::{Field, PrimeField64};

use crate::column::{Column, ColumnId};
use crate::expression::{Accessor, Expr};
use crate::field::F;
use crate::iop::{CoinId, CoinKind, CompiledIop, ProverAction};
use crate::query::{FractionPart, HornerPart, Inclusion, Query, QueryId};
use crate::runtime::Runtime;

/// Suffix of the multiplicity column of an inclusion query.
pub const MULTIPLICITY_SUFFIX: &str = "_M";

pub fn compile_lookups(comp: &mut CompiledIop) {
    let to_compile: Vec<(QueryId, String, Query)> = comp
        .queries()
        .filter(|(_, q)| !q.ignored)
        .filter(|(_, q)| {
            matches!(
                q.query,
                Query::Inclusion(_) | Query::Permutation(_) | Query::Projection(_)
            )
        })
        .map(|(id, q)| (id, q.name.clone(), q.query.clone()))
        .collect();

    for (id, name, query) in to_compile {
        match query {
            Query::Inclusion(q) => compile_inclusion(comp, id, &name, &q),
            Query::Permutation(q) => {
                let (gamma, alpha) = insert_coins(comp, &name, q.a.len());
                let part = FractionPart {
                    num: Expr::linear_combination(&q.a, alpha.clone()) + gamma.clone(),
                    den: Expr::linear_combination(&q.b, alpha) + gamma,
                };
                comp.insert_query(
                    format!("{name}_GRAND_PRODUCT"),
                    1,
                    Query::GrandProduct(vec![part]),
                );
            }
            Query::Projection(q) => {
                let (gamma, alpha) = insert_coins(comp, &name, q.a.len());
                let Expr::Accessor(x) = gamma else {
                    unreachable!("gamma is always a coin accessor")
                };
                let parts = vec![
                    HornerPart {
                        coefficient: Expr::linear_combination(&q.a, alpha.clone()),
                        selector: q.filter_a.clone(),
                        x: x.clone(),
                        negative: false,
                    },
                    HornerPart {
                        coefficient: Expr::linear_combination(&q.b, alpha),
                        selector: q.filter_b.clone(),
                        x,
                        negative: true,
                    },
                ];
                comp.insert_query(format!("{name}_HORNER"), 1, Query::Horner(parts));
            }
            _ => continue,
        }
        debug!("compiled lookup query {name}");
        comp.mark_as_ignored(id);
    }
}

/// Declares the challenge of the query and, when more than one column is
/// looked up at once, the folding coin.
fn insert_coins(comp: &mut CompiledIop, name: &str, arity: usize) -> (Expr, Expr) {
    let gamma: CoinId = comp.insert_coin(format!("{name}_GAMMA"), 1, CoinKind::Field);
    let alpha = if arity > 1 {
        Expr::Accessor(Accessor::Coin(comp.insert_coin(
            format!("{name}_ALPHA"),
            1,
            CoinKind::Field,
        )))
    } else {
        Expr::one()
    };
    (Expr::Accessor(Accessor::Coin(gamma)), alpha)
}

fn compile_inclusion(comp: &mut CompiledIop, id: QueryId, name: &str, q: &Inclusion) {
    let table_size = match q.including.first() {
        Some(c) => column_size(comp, c),
        None => panic!("inclusion {name} has an empty table"),
    };
    let m = comp.insert_commit(format!("{name}{MULTIPLICITY_SUFFIX}"), table_size);
    comp.register_prover_action(ProverAction::InclusionMultiplicity {
        query: id,
        column: m,
    });

    let (gamma, alpha) = insert_coins(comp, name, q.included.len());
    let num_included = match &q.filter_included {
        Some(f) => Expr::Column(f.clone()),
        None => Expr::one(),
    };
    let parts = vec![
        FractionPart {
            num: num_included,
            den: gamma.clone() - Expr::linear_combination(&q.included, alpha.clone()),
        },
        FractionPart {
            num: -Expr::from(m),
            den: gamma - Expr::linear_combination(&q.including, alpha),
        },
    ];
    comp.insert_query(format!("{name}_LOG_DERIVATIVE"), 1, Query::LogDerivativeSum(parts));
}

fn column_size(comp: &CompiledIop, col: &Column) -> usize {
    match col {
        Column::Constant { size, .. } => *size,
        _ => col.root().map_or(1, |id| comp.column(id).size),
    }
}

/// Runs the prover actions registered by the compilation passes.
pub fn run_prover_actions(rt: &mut Runtime) {
    let spec = rt.spec();
    for action in spec.prover_actions() {
        match action {
            ProverAction::InclusionMultiplicity { query, column } => {
                let values = inclusion_multiplicities(rt, *query, *column);
                rt.assign_column(*column, values);
            }
        }
    }
}

fn inclusion_multiplicities(rt: &Runtime, query: QueryId, column: ColumnId) -> Vec<F> {
    let info = rt.spec().query(query);
    let Query::Inclusion(q) = &info.query else {
        panic!("{} is not an inclusion query", info.name)
    };

    let tuples = |cols: &[Column], filter: Option<&Column>| -> Vec<Option<Vec<u64>>> {
        let values = cols.iter().map(|c| rt.column_values(c)).collect_vec();
        let filter = filter.map(|f| rt.column_values(f));
        let n = values.first().map_or(0, Vec::len);
        (0..n)
            .map(|i| {
                let active = filter.as_ref().map_or(true, |f| f[i].is_one());
                active.then(|| values.iter().map(|v| v[i].to_canonical_u64()).collect())
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

    let mut m = vec![F::ZERO; rt.spec().column(column).size];
    for t in tuples(&q.included, q.filter_included.as_ref()).into_iter().flatten() {
        match first_row.get(&t) {
            Some(&i) => m[i] += F::ONE,
            None => panic!("{}: tuple {t:?} is not in the table", info.name),
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check_all;
    use crate::expression::Evaluator;
    use crate::query::{Permutation, Projection};

    fn felts(xs: &[u64]) -> Vec<F> {
        xs.iter().copied().map(F::from_canonical_u64).collect()
    }

    #[test]
    fn inclusion_becomes_a_vanishing_log_derivative_sum() {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 4);
        let t = comp.insert_commit("T", 4);
        comp.insert_query(
            "LOOKUP",
            0,
            Query::Inclusion(Inclusion {
                included: vec![Column::Natural(a)],
                including: vec![Column::Natural(t)],
                filter_included: None,
                filter_including: None,
            }),
        );
        compile_lookups(&mut comp);

        let lds = comp.query_by_name("LOOKUP_LOG_DERIVATIVE").expect("compiled query");
        let mut rt = Runtime::new(&comp);
        rt.assign_column(a, felts(&[3, 3, 1, 2]));
        rt.assign_column(t, felts(&[1, 2, 3, 4]));
        run_prover_actions(&mut rt);
        assert_eq!(rt.column_by_name("LOOKUP_M"), felts(&[1, 1, 2, 0]).as_slice());

        rt.go_to_round(1);
        rt.assign_all_params().expect("no zero denominator");
        assert_eq!(rt.accessor_value(&Accessor::LogDerivativeSum(lds)), F::ZERO);
        assert!(check_all(&rt).is_ok());
    }

    #[test]
    fn permutation_grand_product_is_one() {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 4);
        let b = comp.insert_commit("B", 4);
        comp.insert_query(
            "PERM",
            0,
            Query::Permutation(Permutation {
                a: vec![Column::Natural(a)],
                b: vec![Column::Natural(b)],
            }),
        );
        compile_lookups(&mut comp);
        let gp = comp.query_by_name("PERM_GRAND_PRODUCT").expect("compiled query");

        let mut rt = Runtime::new(&comp);
        rt.assign_column(a, felts(&[1, 2, 3, 4]));
        rt.assign_column(b, felts(&[2, 4, 3, 1]));
        rt.go_to_round(1);
        rt.assign_all_params().expect("no zero denominator");
        assert_eq!(rt.accessor_value(&Accessor::GrandProduct(gp)), F::ONE);
    }

    #[test]
    fn projection_horner_sum_vanishes() {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 4);
        let fa = comp.insert_commit("FA", 4);
        let b = comp.insert_commit("B", 8);
        let fb = comp.insert_commit("FB", 8);
        comp.insert_query(
            "PROJ",
            0,
            Query::Projection(Projection {
                a: vec![Column::Natural(a)],
                b: vec![Column::Natural(b)],
                filter_a: Column::Natural(fa),
                filter_b: Column::Natural(fb),
            }),
        );
        compile_lookups(&mut comp);
        let h = comp.query_by_name("PROJ_HORNER").expect("compiled query");

        let mut rt = Runtime::new(&comp);
        rt.assign_column(a, felts(&[5, 6, 7, 0]));
        rt.assign_column(fa, felts(&[1, 1, 1, 0]));
        rt.assign_column(b, felts(&[0, 5, 0, 6, 0, 7, 0, 0]));
        rt.assign_column(fb, felts(&[0, 1, 0, 1, 0, 1, 0, 0]));
        rt.go_to_round(1);
        rt.assign_all_params().expect("binary selectors");
        assert_eq!(rt.accessor_value(&Accessor::HornerFinal(h)), F::ZERO);
    }
}
