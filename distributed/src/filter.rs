//! Selects the part of a protocol a single module is responsible for.

use itertools::Itertools;
use log::debug;
use wizard::column::{roots_of, Column, ColumnId};
use wizard::expression::{Accessor, Expr};
use wizard::iop::CompiledIop;
use wizard::query::{FractionPart, HornerPart, PlonkInWizard, Query};

use crate::discoverer::{Discovery, ModuleOf};

/// Prefix of the public inputs computed by the protocol itself.
pub const FUNCTIONAL_PREFIX: &str = "functional.";

#[derive(Clone, Debug)]
pub struct FilteredModuleInputs {
    pub module_name: String,
    pub module_index: usize,
    /// Every column of the module, in the source protocol.
    pub columns: Vec<ColumnId>,
    /// Columns read by the lookup parts handled by the module.
    pub columns_lpp: Vec<ColumnId>,
    pub global_constraints: Vec<(String, Expr)>,
    pub local_constraints: Vec<(String, Expr)>,
    pub ranges: Vec<(String, Column, u64)>,
    pub local_openings: Vec<(String, Column)>,
    pub plonk_in_wizard: Vec<(String, PlonkInWizard)>,
    pub log_derivative_parts: Vec<FractionPart>,
    pub grand_product_parts: Vec<FractionPart>,
    pub horner_parts: Vec<HornerPart>,
    /// Every functional public input of the protocol, with whether this
    /// module computes it.
    pub functionals: Vec<FunctionalInput>,
}

#[derive(Clone, Debug)]
pub struct FunctionalInput {
    pub name: String,
    pub acc: Accessor,
    pub owned: bool,
}

impl FilteredModuleInputs {
    pub fn has_lpp(&self) -> bool {
        !self.log_derivative_parts.is_empty()
            || !self.grand_product_parts.is_empty()
            || !self.horner_parts.is_empty()
    }
}

/// Columnless items are handled by the first module.
fn owns(module_of: ModuleOf, k: usize, what: &str) -> bool {
    match module_of {
        ModuleOf::Module(m) => m == k,
        ModuleOf::AnyModule => k == 0,
        ModuleOf::NoModuleFound => panic!("{what} spans several modules"),
    }
}

fn part_columns(part: &FractionPart) -> Vec<Column> {
    part.num
        .columns()
        .into_iter()
        .chain(part.den.columns())
        .collect()
}

fn horner_columns(part: &HornerPart) -> Vec<Column> {
    let mut cols = part.coefficient.columns();
    cols.push(part.selector.clone());
    cols
}

pub fn filter_module(comp: &CompiledIop, disc: &Discovery, k: usize) -> FilteredModuleInputs {
    let module = disc.module(k);
    let mut res = FilteredModuleInputs {
        module_name: module.name.clone(),
        module_index: k,
        columns: module.columns().collect(),
        columns_lpp: Vec::new(),
        global_constraints: Vec::new(),
        local_constraints: Vec::new(),
        ranges: Vec::new(),
        local_openings: Vec::new(),
        plonk_in_wizard: Vec::new(),
        log_derivative_parts: Vec::new(),
        grand_product_parts: Vec::new(),
        horner_parts: Vec::new(),
        functionals: Vec::new(),
    };
    let mut lpp_columns: Vec<Column> = Vec::new();

    for (_, info) in comp.queries() {
        if info.ignored {
            continue;
        }
        let name = &info.name;
        match &info.query {
            Query::Global(e) => {
                if owns(disc.module_of_expr(e), k, name) {
                    res.global_constraints.push((name.clone(), e.clone()));
                }
            }
            Query::Local(e) => {
                if owns(disc.module_of_expr(e), k, name) {
                    res.local_constraints.push((name.clone(), e.clone()));
                }
            }
            Query::Range(r) => {
                if owns(disc.module_of_columns([&r.column]), k, name) {
                    res.ranges.push((name.clone(), r.column.clone(), r.bound));
                }
            }
            Query::LocalOpening(c) => {
                if owns(disc.module_of_columns([c]), k, name) {
                    res.local_openings.push((name.clone(), c.clone()));
                }
            }
            Query::PlonkInWizard(p) => {
                if owns(disc.module_of_columns([&p.data, &p.selector]), k, name) {
                    res.plonk_in_wizard.push((name.clone(), p.clone()));
                }
            }
            Query::LogDerivativeSum(parts) => {
                for part in parts {
                    let cols = part_columns(part);
                    if owns(disc.module_of_columns(&cols), k, name) {
                        lpp_columns.extend(cols);
                        res.log_derivative_parts.push(part.clone());
                    }
                }
            }
            Query::GrandProduct(parts) => {
                for part in parts {
                    let cols = part_columns(part);
                    if owns(disc.module_of_columns(&cols), k, name) {
                        lpp_columns.extend(cols);
                        res.grand_product_parts.push(part.clone());
                    }
                }
            }
            Query::Horner(parts) => {
                for part in parts {
                    let cols = horner_columns(part);
                    if owns(disc.module_of_columns(&cols), k, name) {
                        lpp_columns.extend(cols);
                        res.horner_parts.push(part.clone());
                    }
                }
            }
            Query::Inclusion(_) | Query::Permutation(_) | Query::Projection(_) => {
                panic!("{name} must be compiled with compile_lookups before distribution")
            }
        }
    }

    res.columns_lpp = roots_of(&lpp_columns);

    res.functionals = comp
        .public_inputs()
        .iter()
        .filter(|pi| pi.name.starts_with(FUNCTIONAL_PREFIX))
        .map(|pi| FunctionalInput {
            name: pi.name.clone(),
            acc: pi.acc.clone(),
            owned: owns(disc.module_of_columns(&pi.acc.columns()), k, &pi.name),
        })
        .collect_vec();

    debug!(
        "module {}: {} globals, {} locals, {} lpp columns, {} lookup parts",
        res.module_name,
        res.global_constraints.len(),
        res.local_constraints.len(),
        res.columns_lpp.len(),
        res.log_derivative_parts.len() + res.grand_product_parts.len() + res.horner_parts.len()
    );
    res
}
