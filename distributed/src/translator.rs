//! Copies columns, coins and expressions of the source protocol into the
//! protocol of a single module.

use wizard::column::{Column, ColumnId, ColumnStatus};
use wizard::expression::{Accessor, Expr};
use wizard::iop::{CoinId, CoinKind, CompiledIop};

use crate::discoverer::Discovery;

pub struct ModuleTranslator<'a> {
    pub source: &'a CompiledIop,
    pub disc: &'a Discovery,
    pub wiop: CompiledIop,
}

impl<'a> ModuleTranslator<'a> {
    pub fn new(source: &'a CompiledIop, disc: &'a Discovery) -> Self {
        Self {
            source,
            disc,
            wiop: CompiledIop::new(),
        }
    }

    /// Declares a source column in the module protocol, at its segment size
    /// and under the same name. Inserting the same column twice returns the
    /// first declaration.
    pub fn insert_column(&mut self, col: ColumnId, round: usize) -> ColumnId {
        let info = self.source.column(col);
        if let Some(id) = self.wiop.column_by_name(&info.name) {
            return id;
        }
        let id = if info.status.is_fixed() {
            let values = match self.source.precomputed(col) {
                Some(v) => v.to_vec(),
                None => panic!("fixed column {} has no values", info.name),
            };
            self.wiop.insert_precomputed(info.name.clone(), values)
        } else {
            let status = match info.status {
                ColumnStatus::Proof => ColumnStatus::Proof,
                _ => ColumnStatus::Committed,
            };
            self.wiop
                .insert_column(info.name.clone(), self.disc.new_size_of(col), round, status)
        };
        self.wiop.set_pragmas(id, info.pragmas);
        id
    }

    /// Source coins become seeded coins of the same name and round, so that
    /// every segment sharing the seed samples the same value.
    pub fn translate_coin(&mut self, coin: CoinId) -> CoinId {
        let info = self.source.coin(coin);
        match self.wiop.coin_by_name(&info.name) {
            Some(id) => id,
            None => self
                .wiop
                .insert_coin(info.name.clone(), info.round, CoinKind::FieldFromSeed),
        }
    }

    /// Maps a source column to the module. The root must have been inserted
    /// already; constant columns take `size` rows.
    pub fn translate_column(&self, col: &Column, size: usize) -> Column {
        match col {
            Column::Constant { value, .. } => Column::Constant {
                value: *value,
                size,
            },
            _ => {
                let Some(root) = col.root() else {
                    unreachable!("non-constant columns have a root")
                };
                let name = &self.source.column(root).name;
                let Some(id) = self.wiop.column_by_name(name) else {
                    panic!("column {name} is not part of the module")
                };
                Column::Natural(id).shift(col.offset())
            }
        }
    }

    pub fn translate_accessor(&mut self, acc: &Accessor) -> Accessor {
        match acc {
            Accessor::Constant(x) => Accessor::Constant(*x),
            Accessor::Cell { column, position } => Accessor::Cell {
                column: self.translate_column(column, 1),
                position: *position,
            },
            Accessor::Coin(c) => Accessor::Coin(self.translate_coin(*c)),
            Accessor::LocalOpening(q) => {
                let name = &self.source.query(*q).name;
                match self.wiop.query_by_name(name) {
                    Some(id) => Accessor::LocalOpening(id),
                    None => panic!("local opening {name} is not part of the module"),
                }
            }
            Accessor::LogDerivativeSum(q)
            | Accessor::GrandProduct(q)
            | Accessor::HornerFinal(q) => {
                panic!(
                    "the result of {} cannot be used inside a module",
                    self.source.query(*q).name
                )
            }
            Accessor::Expr(e) => Accessor::Expr(Box::new(self.translate_expr(e))),
        }
    }

    /// Segment size of the first non-constant column of `expr`.
    pub fn size_of_expr(&self, expr: &Expr) -> usize {
        expr.columns()
            .iter()
            .find_map(Column::root)
            .map_or(1, |root| self.disc.new_size_of(root))
    }

    pub fn translate_expr(&mut self, expr: &Expr) -> Expr {
        let size = self.size_of_expr(expr);
        let mut accessors = Vec::new();
        let rebuilt = expr.rebuild(
            &mut |c| Expr::Column(self.translate_column(c, size)),
            &mut |a| {
                accessors.push(a.clone());
                Expr::Accessor(a.clone())
            },
        );
        if accessors.is_empty() {
            return rebuilt;
        }
        // Accessors may declare coins, which needs the translator mutably.
        let translated: Vec<(Accessor, Accessor)> = accessors
            .into_iter()
            .map(|a| {
                let t = self.translate_accessor(&a);
                (a, t)
            })
            .collect();
        rebuilt.rebuild(
            &mut |c| Expr::Column(c.clone()),
            &mut |a| match translated.iter().find(|(src, _)| src == a) {
                Some((_, t)) => Expr::Accessor(t.clone()),
                None => unreachable!("every accessor was translated"),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use plonky2::field::types::Field;
    use wizard::field::F;

    use super::*;
    use crate::discoverer::DiscoveryConfig;

    fn source() -> (CompiledIop, ColumnId, ColumnId, CoinId) {
        let mut comp = CompiledIop::new();
        let a = comp.insert_commit("A", 16);
        let b = comp.insert_commit("B", 16);
        let coin = comp.insert_coin("GAMMA", 1, CoinKind::Field);
        let e = Expr::from(Column::Natural(a).shift(1))
            - Expr::from(b)
            - Expr::Accessor(Accessor::Coin(coin));
        comp.insert_query("G", 1, wizard::query::Query::Global(e));
        (comp, a, b, coin)
    }

    #[test]
    fn columns_are_inserted_once_at_their_new_size() {
        let (comp, a, _, _) = source();
        let disc = Discovery::analyze(
            &comp,
            &DiscoveryConfig {
                target_weight: 8,
                advices: vec![],
            },
        );
        let mut tr = ModuleTranslator::new(&comp, &disc);
        let x = tr.insert_column(a, 1);
        let y = tr.insert_column(a, 0);
        assert_eq!(x, y);
        let info = tr.wiop.column(x);
        assert_eq!(info.name, "A");
        assert_eq!(info.size, disc.new_size_of(a));
        assert_eq!(info.round, 1);
    }

    #[test]
    fn expressions_keep_shifts_and_seed_their_coins() {
        let (comp, a, b, coin) = source();
        let disc = Discovery::analyze(&comp, &DiscoveryConfig::default());
        let mut tr = ModuleTranslator::new(&comp, &disc);
        let na = tr.insert_column(a, 1);
        let nb = tr.insert_column(b, 1);
        let e = Expr::from(Column::Natural(a).shift(1))
            - Expr::from(b)
            - Expr::Accessor(Accessor::Coin(coin));

        let t = tr.translate_expr(&e);
        assert_eq!(t.columns(), vec![Column::Natural(na).shift(1), Column::Natural(nb)]);
        assert_eq!(t.min_max_offset(), (0, 1));
        let coin_id = tr.wiop.coin_by_name("GAMMA").expect("coin is declared");
        assert_eq!(tr.wiop.coin(coin_id).kind, CoinKind::FieldFromSeed);
        assert_eq!(t.accessors(), vec![Accessor::Coin(coin_id)]);
    }

    #[test]
    fn constant_columns_take_the_segment_size() {
        let (comp, a, _, _) = source();
        let disc = Discovery::analyze(&comp, &DiscoveryConfig::default());
        let mut tr = ModuleTranslator::new(&comp, &disc);
        tr.insert_column(a, 0);
        let c = Column::Constant {
            value: F::ONE,
            size: 16,
        };
        let e = Expr::from(a) * Expr::from(c);
        let t = tr.translate_expr(&e);
        let size = disc.new_size_of(a);
        assert!(t.columns().contains(&Column::Constant { value: F::ONE, size }));
    }

    #[test]
    #[should_panic(expected = "is not part of the module")]
    fn unknown_columns_are_rejected() {
        let (comp, _, b, _) = source();
        let disc = Discovery::analyze(&comp, &DiscoveryConfig::default());
        let tr = ModuleTranslator::new(&comp, &disc);
        tr.translate_column(&Column::Natural(b), 1);
    }
}
