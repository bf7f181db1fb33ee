use clap::Parser;
use limitless_prover::cli::CliProverConfig;
use limitless_prover::ProverConfig;

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    prover_config: CliProverConfig,
}

#[test]
fn flags_map_onto_the_prover_config() {
    let cli = Cli::parse_from([
        "prover",
        "--target-weight",
        "1024",
        "--test-only",
        "-i",
        "--check-flat",
    ]);
    let config: ProverConfig = cli.prover_config.into();
    assert_eq!(
        config,
        ProverConfig {
            target_weight: 1024,
            test_only: true,
            save_inputs_on_error: true,
            check_flat: true,
        }
    );
}

#[test]
fn defaults_match_the_prover_defaults() {
    let cli = Cli::parse_from(["prover"]);
    let config: ProverConfig = cli.prover_config.into();
    assert_eq!(config, ProverConfig::default());
}
