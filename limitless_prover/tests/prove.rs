use distributed::testing_utils::{
    counter_protocol, felts, permutation_protocol, two_module_protocol,
};
use limitless_prover::debug_utils::witness_file_name;
use limitless_prover::ops::{SegmentInput, SegmentProofOp};
use limitless_prover::proof_types::AggregatableProof;
use limitless_prover::{LimitlessProver, ProverConfig};
use plonky2::field::types::Field;
use wizard::field::F;

fn init_tracing() {
    let _ = limitless_prover::tracing::init();
}

fn small_config() -> ProverConfig {
    ProverConfig {
        target_weight: 8,
        ..Default::default()
    }
}

#[test]
fn two_modules_are_proved_and_conglomerated() -> anyhow::Result<()> {
    init_tracing();

    let protocol = two_module_protocol();
    let prover = LimitlessProver::new(
        protocol.comp.clone(),
        ProverConfig {
            check_flat: true,
            ..small_config()
        },
    );
    let generated = prover.prove(|rt| protocol.assign(rt))?;

    assert_eq!(generated.nb_modules, 2);
    assert_eq!(generated.vk_merkle_root, prover.dw.conglomerator.vk_merkle_root());
    let AggregatableProof::Conglomeration(root) = &generated.proof else {
        panic!("a multi-segment protocol must be conglomerated");
    };
    assert!(root.nb_segments > 2);
    assert_eq!(generated.proof.verifying_key(), prover.dw.conglomerator.vk);
    assert_eq!(
        generated.proof.public_input().functionals["functional.COUNTER_first"],
        F::ONE
    );
    Ok(())
}

#[test]
fn a_protocol_fitting_in_one_segment_keeps_its_segment_proof() -> anyhow::Result<()> {
    init_tracing();

    let protocol = counter_protocol();
    let prover = LimitlessProver::new(protocol.comp.clone(), ProverConfig::default());
    let generated = prover.prove(|rt| protocol.assign(rt))?;
    assert!(matches!(generated.proof, AggregatableProof::Segment(_)));
    Ok(())
}

#[test]
fn broken_permutation_fails_the_conglomeration() {
    init_tracing();

    let protocol = permutation_protocol().with_column("PERM_B", felts(&[8, 3, 5, 1, 7, 2, 6, 6]));
    let prover = LimitlessProver::new(
        protocol.comp.clone(),
        ProverConfig {
            test_only: true,
            ..small_config()
        },
    );
    let err = prover
        .prove(|rt| protocol.assign(rt))
        .expect_err("the permutation does not hold");
    assert!(format!("{err:#}").contains("conglomeration error"));
}

#[test]
fn failing_segment_witness_is_saved_to_disk() -> anyhow::Result<()> {
    init_tracing();

    let mut values = (1..=16).map(F::from_canonical_u64).collect::<Vec<_>>();
    values[3] = F::from_canonical_u64(100);
    let protocol = counter_protocol().with_column("COUNTER", values);
    let prover = LimitlessProver::new(protocol.comp.clone(), small_config());
    let rt = prover.dw.runtime(|rt| protocol.assign(rt));
    let witness = prover.dw.segment(&rt);

    let op = SegmentProofOp {
        save_inputs_on_error: true,
        test_only: true,
    };
    let input = SegmentInput::Gl(&witness.gl[0]);
    let err = op.execute(&prover.dw, input).expect_err("the counter is broken");
    assert!(format!("{err:#}").contains("gl segment 0"));

    let path =
        std::path::Path::new("./debug").join(witness_file_name(input.module_name(), "gl", 0));
    assert!(path.exists());
    std::fs::remove_file(path)?;

    assert!(op.execute(&prover.dw, SegmentInput::Gl(&witness.gl[1])).is_ok());
    Ok(())
}
