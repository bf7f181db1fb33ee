use clap::Args;

const HELP_HEADING: &str = "Prover options";

/// Prover configuration, as read from the command line or the environment.
#[derive(Args, Clone, PartialEq, Eq, Debug)]
pub struct CliProverConfig {
    /// The weight, in committed cells, the discoverer sizes modules for.
    #[arg(short, long, env="LIMITLESS_TARGET_WEIGHT", help_heading = HELP_HEADING, default_value_t = 1 << 24)]
    target_weight: usize,
    /// If true, prove the segments without keeping their transcripts, and
    /// skip their re-verification before conglomeration.
    #[arg(long, env="LIMITLESS_TEST_ONLY", help_heading = HELP_HEADING, default_value_t = false)]
    test_only: bool,
    /// If true, save the witness of a failing segment to disk.
    #[arg(short='i', long, env="LIMITLESS_SAVE_INPUTS_ON_ERROR", help_heading = HELP_HEADING, default_value_t = false)]
    save_inputs_on_error: bool,
    /// If true, also check the segment proofs as a flat list before
    /// conglomerating them.
    #[arg(long, env="LIMITLESS_CHECK_FLAT", help_heading = HELP_HEADING, default_value_t = false)]
    check_flat: bool,
}

impl From<CliProverConfig> for super::ProverConfig {
    fn from(cli: CliProverConfig) -> Self {
        Self {
            target_weight: cli.target_weight,
            test_only: cli.test_only,
            save_inputs_on_error: cli.save_inputs_on_error,
            check_flat: cli.check_flat,
        }
    }
}
