use distributed::module_gl::{ModuleGL, RECEIVED_VALUES};
use distributed::testing_utils::{counter_protocol, init_logger, small_target};
use distributed::{DistributedWizard, ProofType, SegmentError};
use plonky2::field::types::Field;
use wizard::column::Column;
use wizard::expression::Expr;
use wizard::field::F;
use wizard::iop::CompiledIop;
use wizard::query::Query;

/// The counter is cut in two segments; the second one checks its first row
/// against the last value of the first one.
#[test]
fn counter_passes_its_last_value_to_the_next_segment() -> anyhow::Result<()> {
    init_logger();

    let protocol = counter_protocol();
    let dw = DistributedWizard::distribute(protocol.comp.clone(), &small_target());
    assert_eq!(dw.nb_modules(), 1);
    assert!(!dw.has_lpp()[0]);

    let rt = dw.runtime(|rt| protocol.assign(rt));
    let witness = dw.segment(&rt);
    assert_eq!(witness.gl.len(), 2);
    assert!(witness.lpp.is_empty());
    assert_eq!(witness.gl[0].received_values_global, vec![F::ZERO]);
    assert_eq!(witness.gl[1].received_values_global, vec![F::from_canonical_u64(8)]);

    let proofs = dw.prove_all(&witness, false)?;
    for proof in &proofs {
        dw.verify_segment(proof)?;
    }
    assert_eq!(
        proofs[1].public_input.global_receiver,
        proofs[0].public_input.global_provider
    );
    let first: F = proofs
        .iter()
        .map(|p| p.public_input.functionals["functional.COUNTER_first"])
        .sum();
    assert_eq!(first, F::ONE);

    dw.check_flat(&proofs)?;
    dw.conglomerate(&proofs)?;
    Ok(())
}

#[test]
fn sent_and_received_values_are_paired() {
    let protocol = counter_protocol();
    let dw = DistributedWizard::distribute(protocol.comp.clone(), &small_target());
    let boundary = dw.gls[0].boundary.as_ref().expect("the counter crosses segments");
    assert_eq!(boundary.sent_openings.len(), boundary.nb_received);
    assert_eq!(boundary.nb_received, 1);
}

#[test]
fn segment_proofs_naming_an_unknown_module_are_rejected() -> anyhow::Result<()> {
    init_logger();

    let protocol = counter_protocol();
    let dw = DistributedWizard::distribute(protocol.comp.clone(), &small_target());
    let rt = dw.runtime(|rt| protocol.assign(rt));
    let witness = dw.segment(&rt);

    let mut proof = dw.prove_segment_gl(&witness.gl[0], false)?;
    proof.module_index = 57;
    assert!(matches!(
        dw.verify_segment(&proof),
        Err(SegmentError::UnknownModule {
            proof_type: ProofType::Gl,
            module_index: 57
        })
    ));

    proof.module_index = 0;
    proof.proof_type = ProofType::Lpp;
    assert!(matches!(
        dw.verify_segment(&proof),
        Err(SegmentError::UnknownModule { module_index: 0, .. })
    ));
    Ok(())
}

#[test]
fn tampered_received_value_is_rejected() -> anyhow::Result<()> {
    init_logger();

    let protocol = counter_protocol();
    let dw = DistributedWizard::distribute(protocol.comp.clone(), &small_target());
    let rt = dw.runtime(|rt| protocol.assign(rt));
    let mut witness = dw.segment(&rt);

    let mut proof = dw.prove_segment_gl(&witness.gl[1], false)?;
    let transcript = proof.transcript.as_mut().expect("proved outside of test-only mode");
    let received = transcript
        .columns
        .get_mut(RECEIVED_VALUES)
        .expect("the counter receives a value");
    received[0] += F::ONE;
    assert!(dw.verify_segment(&proof).is_err());

    witness.gl[1].received_values_global[0] = F::from_canonical_u64(7);
    assert!(matches!(
        dw.prove_segment_gl(&witness.gl[1], false),
        Err(SegmentError::Query(_))
    ));
    Ok(())
}

#[test]
fn broken_counter_fails_inside_a_segment() {
    init_logger();

    let mut values = (1..=16).map(F::from_canonical_u64).collect::<Vec<_>>();
    values[3] = F::from_canonical_u64(100);
    let protocol = counter_protocol().with_column("COUNTER", values);
    let dw = DistributedWizard::distribute(protocol.comp.clone(), &small_target());
    let rt = dw.runtime(|rt| protocol.assign(rt));
    let witness = dw.segment(&rt);
    assert!(dw.prove_segment_gl(&witness.gl[0], true).is_err());
    assert!(dw.prove_segment_gl(&witness.gl[1], true).is_ok());
}

#[test]
#[should_panic(expected = "mixes negative and non-negative offsets")]
fn local_constraints_cannot_mix_offset_signs() {
    let mut comp = CompiledIop::new();
    let a = Column::Natural(comp.insert_commit("A", 8));
    comp.insert_query(
        "MIXED",
        0,
        Query::Local(Expr::from(a.shift(-1)) - Expr::from(a)),
    );
    let disc = distributed::discoverer::Discovery::analyze(&comp, &Default::default());
    let inputs = distributed::filter::filter_module(&comp, &disc, 0);
    ModuleGL::new(&comp, &disc, &inputs);
}
