use distributed::hierarchical::find_proof_type_and_module;
use distributed::testing_utils::{init_logger, small_target, two_module_protocol};
use distributed::{
    ConglomerationError, ConglomerationProof, DistributedWizard, ProofType, SegmentProof,
};
use plonky2::field::types::Field;
use wizard::field::F;

fn two_modules() -> anyhow::Result<(DistributedWizard, Vec<SegmentProof>)> {
    let protocol = two_module_protocol();
    let dw = DistributedWizard::distribute(protocol.comp.clone(), &small_target());
    let rt = dw.runtime(|rt| protocol.assign(rt));
    let witness = dw.segment(&rt);
    let proofs = dw.prove_all(&witness, true)?;
    Ok((dw, proofs))
}

#[test]
fn flat_and_hierarchical_checks_agree() -> anyhow::Result<()> {
    init_logger();

    let (dw, proofs) = two_modules()?;
    assert_eq!(dw.nb_modules(), 2);
    assert_eq!(dw.has_lpp().iter().filter(|b| **b).count(), 1);
    assert!(proofs.iter().all(|p| p.transcript.is_none()));

    dw.check_flat(&proofs)?;
    let root = dw.conglomerate(&proofs)?;
    assert_eq!(root.nb_segments, proofs.len());
    assert_eq!(
        find_proof_type_and_module(&root.public_input),
        Some((ProofType::Conglomeration, 0))
    );
    assert_eq!(root.verifying_key(), dw.conglomerator.vk);
    assert_eq!(
        root.public_input.functionals["functional.COUNTER_first"],
        F::ONE
    );
    Ok(())
}

#[test]
fn perturbed_log_derivative_sum_is_rejected_by_both_checks() -> anyhow::Result<()> {
    init_logger();

    let (dw, mut proofs) = two_modules()?;
    proofs[0].public_input.log_derivative_sum += F::ONE;

    let flat = dw.check_flat(&proofs).expect_err("perturbed sum");
    assert!(flat
        .iter()
        .any(|e| matches!(e, ConglomerationError::LogDerivativeSum { .. })));
    let tree = dw.conglomerate(&proofs).expect_err("perturbed sum");
    assert!(tree
        .iter()
        .any(|e| matches!(e, ConglomerationError::LogDerivativeSum { .. })));
    Ok(())
}

#[test]
fn unknown_verifying_keys_are_rejected() -> anyhow::Result<()> {
    init_logger();

    let (dw, mut proofs) = two_modules()?;
    proofs[0].public_input.verifying_key_2[0] += F::ONE;

    let errors = dw.conglomerate(&proofs).expect_err("forged verifying key");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConglomerationError::VkMembership { position: 0, .. })));
    Ok(())
}

#[test]
fn missing_segment_is_detected() -> anyhow::Result<()> {
    init_logger();

    let (dw, mut proofs) = two_modules()?;
    proofs.remove(1);

    let errors = dw.conglomerate(&proofs).expect_err("a segment is missing");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConglomerationError::SegmentCount { .. } | ConglomerationError::IsLast { .. }
    )));
    assert!(dw.check_flat(&proofs).is_err());
    Ok(())
}

#[test]
fn overflowing_segment_counts_are_an_unknown_proof_type() -> anyhow::Result<()> {
    init_logger();

    let (dw, mut proofs) = two_modules()?;
    proofs[0].public_input.gl_segment_count = vec![F::NEG_ONE, F::NEG_ONE];
    assert_eq!(find_proof_type_and_module(&proofs[0].public_input), None);

    let errors = dw.conglomerate(&proofs).expect_err("overflowing counters");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConglomerationError::UnknownProofType { position: 0 })));
    Ok(())
}

#[test]
fn every_field_of_a_forged_parent_is_checked() -> anyhow::Result<()> {
    init_logger();

    let (dw, proofs) = two_modules()?;
    let c = &dw.conglomerator;
    let leaves = c.leaves(&proofs);
    let (a, b) = (&leaves[0], &leaves[1]);
    let honest = c.assign(a, b);
    c.verify_node(a, b, &honest)?;

    let forgeries: [(&str, fn(&mut ConglomerationProof)); 12] = [
        ("offset", |p| p.offset += 1),
        ("nb_segments", |p| p.nb_segments += 1),
        ("first", |p| p.first.is_first += F::ONE),
        ("last", |p| p.last.horner_n1_hash += F::ONE),
        ("is_first", |p| p.public_input.is_first += F::ONE),
        ("is_last", |p| p.public_input.is_last += F::ONE),
        ("horner_n0", |p| p.public_input.horner_n0_hash += F::ONE),
        ("horner_n1", |p| p.public_input.horner_n1_hash += F::ONE),
        ("receiver", |p| p.public_input.global_receiver += F::ONE),
        ("provider", |p| p.public_input.global_provider += F::ONE),
        ("vk", |p| p.public_input.verifying_key[0] += F::ONE),
        ("vk_2", |p| p.public_input.verifying_key_2[3] += F::ONE),
    ];
    for (what, forge) in forgeries {
        let mut parent = honest.clone();
        forge(&mut parent);
        let errors = c
            .verify_node(a, b, &parent)
            .expect_err(&format!("forged {what} is accepted"));
        assert!(
            errors.iter().all(|e| matches!(
                e,
                ConglomerationError::ParentRange { .. }
                    | ConglomerationError::ParentEdge { .. }
                    | ConglomerationError::ParentValue { .. }
                    | ConglomerationError::ParentVerifyingKey { .. }
            )),
            "forged {what}: {errors}"
        );
    }
    Ok(())
}

#[test]
fn forged_parent_errors_name_the_field() -> anyhow::Result<()> {
    init_logger();

    let (dw, proofs) = two_modules()?;
    let c = &dw.conglomerator;
    let leaves = c.leaves(&proofs);
    let mut parent = c.assign(&leaves[0], &leaves[1]);
    parent.public_input.global_provider += F::ONE;
    parent.last.global_provider += F::ONE;
    parent.nb_segments = 7;

    let errors = c
        .verify_node(&leaves[0], &leaves[1], &parent)
        .expect_err("forged parent");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConglomerationError::ParentValue { name, .. } if name == "GLOBAL_PROVIDER"
    )));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConglomerationError::ParentEdge { side: "last", .. })));
    assert!(errors.iter().any(|e| matches!(
        e,
        ConglomerationError::ParentRange {
            expected: (0, 2),
            actual: (0, 7),
            ..
        }
    )));
    Ok(())
}

#[test]
fn swapped_children_are_rejected_without_panicking() -> anyhow::Result<()> {
    init_logger();

    let (dw, proofs) = two_modules()?;
    let c = &dw.conglomerator;
    let leaves = c.leaves(&proofs);
    let (a, b) = (&leaves[1], &leaves[0]);

    let errors = c
        .verify_node(a, b, &leaves[0])
        .expect_err("children in the wrong order");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConglomerationError::NotAdjacent {
            left_end: 2,
            right_offset: 0
        }
    )));

    let mut far = leaves[1].clone();
    far.offset = usize::MAX;
    far.nb_segments = usize::MAX;
    assert!(c.verify_node(&far, &leaves[0], &leaves[0]).is_err());
    assert!(c.aggregate(&far, &leaves[0]).is_err());
    Ok(())
}
