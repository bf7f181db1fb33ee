use distributed::testing_utils::{
    felts, init_logger, lookup_protocol, permutation_protocol, projection_protocol, small_target,
    two_module_protocol, TestProtocol,
};
use distributed::{ConglomerationError, DistributedWizard, ProofType, SegmentError, SegmentProof};
use plonky2::field::types::Field;
use wizard::field::F;

fn prove(protocol: &TestProtocol) -> anyhow::Result<(DistributedWizard, Vec<SegmentProof>)> {
    let dw = DistributedWizard::distribute(protocol.comp.clone(), &small_target());
    let rt = dw.runtime(|rt| protocol.assign(rt));
    let witness = dw.segment(&rt);
    let proofs = dw.prove_all(&witness, false)?;
    for proof in &proofs {
        dw.verify_segment(proof)?;
    }
    Ok((dw, proofs))
}

#[test]
fn permutation_grand_products_multiply_to_one() -> anyhow::Result<()> {
    init_logger();

    let (dw, proofs) = prove(&permutation_protocol())?;
    assert!(dw.has_lpp()[0]);
    let nb_lpp = proofs.iter().filter(|p| p.public_input.is_lpp == F::ONE).count();
    assert!(nb_lpp >= 2, "the permutation is cut in {nb_lpp} segments");

    let product: F = proofs.iter().map(|p| p.public_input.grand_product).product();
    assert_eq!(product, F::ONE);
    let seeds = proofs
        .iter()
        .filter(|p| p.public_input.is_lpp == F::ONE)
        .map(|p| p.public_input.initial_randomness)
        .collect::<Vec<_>>();
    assert!(seeds.iter().all(|s| *s == seeds[0]));
    assert_ne!(seeds[0], [F::ZERO; 4]);

    dw.check_flat(&proofs)?;
    dw.conglomerate(&proofs)?;
    Ok(())
}

/// Swapping two values of one side breaks the permutation: every segment
/// still proves, but the grand products no longer multiply to one.
#[test]
fn broken_permutation_is_caught_by_the_conglomeration() -> anyhow::Result<()> {
    init_logger();

    let protocol = permutation_protocol().with_column("PERM_B", felts(&[8, 3, 5, 1, 7, 2, 6, 6]));
    let (dw, proofs) = prove(&protocol)?;

    let flat = dw.check_flat(&proofs).expect_err("the permutation is broken");
    assert!(flat
        .iter()
        .any(|e| matches!(e, ConglomerationError::GrandProduct { .. })));
    assert!(dw.conglomerate(&proofs).is_err());
    Ok(())
}

#[test]
fn lookup_sums_telescope() -> anyhow::Result<()> {
    init_logger();

    let (dw, proofs) = prove(&lookup_protocol())?;
    let sum: F = proofs.iter().map(|p| p.public_input.log_derivative_sum).sum();
    assert_eq!(sum, F::ZERO);
    dw.check_flat(&proofs)?;
    dw.conglomerate(&proofs)?;
    Ok(())
}

#[test]
fn projection_horner_counters_chain_across_segments() -> anyhow::Result<()> {
    init_logger();

    let (dw, proofs) = prove(&projection_protocol())?;
    let lpp = proofs
        .iter()
        .filter(|p| p.public_input.is_lpp == F::ONE)
        .collect::<Vec<_>>();
    assert!(lpp.len() >= 2);
    for pair in lpp.windows(2) {
        assert_eq!(pair[1].public_input.horner_n0_hash, pair[0].public_input.horner_n1_hash);
    }
    let horner: F = lpp.iter().map(|p| p.public_input.horner_sum).sum();
    assert_eq!(horner, F::ZERO);

    dw.check_flat(&proofs)?;
    dw.conglomerate(&proofs)?;
    Ok(())
}

#[test]
fn reordered_lpp_segments_break_the_horner_chain() -> anyhow::Result<()> {
    init_logger();

    let (dw, mut proofs) = prove(&projection_protocol())?;
    let first_lpp = proofs
        .iter()
        .position(|p| p.public_input.is_lpp == F::ONE)
        .expect("the projection has an LPP part");
    proofs.swap(first_lpp, first_lpp + 1);

    let errors = dw.check_flat(&proofs).expect_err("segments out of order");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConglomerationError::HornerContinuity { .. })));
    Ok(())
}

#[test]
fn lpp_proof_retargeted_at_a_gl_only_module_is_rejected() -> anyhow::Result<()> {
    init_logger();

    let (dw, proofs) = prove(&two_module_protocol())?;
    let gl_only = dw
        .has_lpp()
        .iter()
        .position(|has_lpp| !has_lpp)
        .expect("the counter has no LPP part");
    let mut proof = proofs
        .into_iter()
        .find(|p| p.proof_type == ProofType::Lpp)
        .expect("the permutation has an LPP part");
    proof.module_index = gl_only;

    assert!(matches!(
        dw.verify_segment(&proof),
        Err(SegmentError::UnknownModule {
            proof_type: ProofType::Lpp,
            ..
        })
    ));
    Ok(())
}
