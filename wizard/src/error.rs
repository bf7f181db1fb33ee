use crate::field::F;

/// A query check failed on an assignment.
#[derive(Clone, Debug, thiserror::Error)]
pub enum QueryError {
    #[error("global constraint {name} does not vanish at row {row} (got {value})")]
    Global { name: String, row: usize, value: F },

    #[error("local constraint {name} does not vanish (got {value})")]
    Local { name: String, value: F },

    #[error("range check {name} failed at row {row}: {value} is not below {bound}")]
    Range {
        name: String,
        row: usize,
        value: u64,
        bound: u64,
    },

    #[error("plonk-in-wizard {name}: instance {instance} does not satisfy the circuit")]
    PlonkInWizard { name: String, instance: usize },

    #[error("inclusion {name}: row {row} of the included columns is missing from the table")]
    Inclusion { name: String, row: usize },

    #[error("permutation {name}: the two sides are not permutations of each other")]
    Permutation { name: String },

    #[error("projection {name}: the filtered sequences differ")]
    Projection { name: String },

    #[error("{name}: claimed {claimed} but the assignment gives {computed}")]
    WrongParams {
        name: String,
        claimed: F,
        computed: F,
    },

    #[error("{name}: zero denominator at row {row} of part {part}")]
    ZeroDenominator {
        name: String,
        part: usize,
        row: usize,
    },

    #[error("horner {name}: part {part} claims n1 = {claimed} but n0 + count = {computed}")]
    HornerCounter {
        name: String,
        part: usize,
        claimed: usize,
        computed: usize,
    },

    #[error("horner {name}: selector of part {part} is not binary at row {row}")]
    NonBinarySelector {
        name: String,
        part: usize,
        row: usize,
    },

    #[error("{name}: the parameters are missing or have the wrong shape")]
    MissingParams { name: String },
}
