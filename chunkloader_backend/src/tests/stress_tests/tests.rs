use super::*;
use super::model::owner_name;
use crate::billing::Ledger;
use crate::config::LeaseConfig;
use crate::tests::stress_tests::generators::operation_sequence;
use crate::types::{CellKey, NoticeKind};
use proptest::prelude::*;
use rand::{SeedableRng, Rng};
use rand_chacha::ChaCha8Rng;

// ============================================
// CATEGORY 1: LEASE INVARIANTS UNDER RANDOM LOAD
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_invariant_holds_after_100_ops(ops in operation_sequence(100)) {
        let mut model = LeaseModel::new();

        for (i, op) in ops.into_iter().enumerate() {
            let _ = model.execute(op);

            // Check invariant after EVERY operation
            model.check_invariant()
                .map_err(|e| TestCaseError::fail(format!("Op {}: {}", i, e)))?;
        }
    }

    #[test]
    fn test_invariant_holds_with_wide_radii(ops in operation_sequence(300)) {
        let config = LeaseConfig { claim_radius: 2, enforcement_radius: 2, ..LeaseConfig::default() };
        let mut model = LeaseModel::with_config(config);

        for op in ops {
            let _ = model.execute(op);
        }

        // Check at end
        model.check_invariant().map_err(TestCaseError::fail)?;
    }

    #[test]
    fn test_no_operation_fails_once_started(ops in operation_sequence(200)) {
        let mut model = LeaseModel::new();

        for (i, op) in ops.into_iter().enumerate() {
            let desc = format!("{:?}", op);
            if model.execute(op) == OpResult::Failed {
                return Err(TestCaseError::fail(format!("Op {} failed: {}", i, desc)));
            }
        }
    }
}

// Deterministic regression test (reproducible with seed)
#[test]
fn test_deterministic_5k_operations() {
    let mut rng = ChaCha8Rng::seed_from_u64(12345);  // Fixed seed
    let mut model = LeaseModel::new();

    for i in 0..5000 {
        let op = generate_random_op(&mut rng);
        let _ = model.execute(op);

        // Check every 50 ops
        if i % 50 == 0 {
            model.check_invariant().unwrap_or_else(|e| panic!("Failed at op {}: {}", i, e));
        }
    }

    model.check_invariant().expect("Final invariant check failed");
    assert_eq!(model.operation_count, 5000);
}

// ============================================
// CATEGORY 2: EDGE CASE STRESS
// ============================================

#[test]
fn test_claim_without_funds_is_revoked_at_once() {
    let mut model = LeaseModel::new();
    model.execute(Operation::Join { owner: 0 });

    let result = model.execute(Operation::PlaceAnchor { owner: 0, x: 0, z: 0, offset: 8 });
    assert_eq!(result, OpResult::Created);

    // The first charge happens on claim and cannot be paid.
    let manager = model.loader.manager();
    assert!(manager.claims(&owner_name(0)).is_empty());
    assert!(manager.world().anchors().is_empty());
    assert!(manager.notifier().notices.iter().any(|n| matches!(n.kind, NoticeKind::LeaseRevoked { cells: 1 })));
    model.check_invariant().unwrap();
}

#[test]
fn test_exact_funds_cover_one_interval() {
    let mut model = LeaseModel::new();
    model.execute(Operation::Credit { owner: 1, amount: 30 });
    model.execute(Operation::Join { owner: 1 });
    model.execute(Operation::Claim { owner: 1, x: 0, z: 0 });

    assert_eq!(model.loader.ledger().balance(&owner_name(1)), 0);
    assert_eq!(model.loader.billing().running_count(), 1);

    assert_eq!(model.execute(Operation::Tick { owner: 1 }), OpResult::Revoked);
    assert_eq!(model.loader.billing().running_count(), 0);
    assert_eq!(model.execute(Operation::Tick { owner: 1 }), OpResult::Idle);
    model.check_invariant().unwrap();
}

#[test]
fn test_anchor_storm_in_one_cell_leaves_one_claim() {
    let mut model = LeaseModel::new();

    for owner in 0..5u8 {
        for offset in [0, 8, 15] {
            model.execute(Operation::PlaceAnchor { owner, x: 1, z: 1, offset });
            model.check_invariant().unwrap();
        }
    }

    let manager = model.loader.manager();
    assert_eq!(manager.world().anchors().len(), 1);
    assert_eq!(manager.claims(&owner_name(4)), vec![CellKey::new("world", 1, 1)]);
    for owner in 0..4u8 {
        assert!(manager.claims(&owner_name(owner)).is_empty());
    }
    assert_eq!(manager.audit_tickets(), Ok(9));
}

#[test]
fn test_claims_made_while_away_load_on_join() {
    let mut model = LeaseModel::new();
    model.execute(Operation::Credit { owner: 2, amount: 1_000 });
    model.execute(Operation::Join { owner: 2 });
    model.execute(Operation::Leave { owner: 2 });

    assert_eq!(model.execute(Operation::Claim { owner: 2, x: -3, z: 3 }), OpResult::Created);
    assert!(!model.loader.manager().is_active(&CellKey::new("world", -3, 3)));
    model.check_invariant().unwrap();

    model.execute(Operation::Join { owner: 2 });
    assert!(model.loader.manager().is_active(&CellKey::new("world", -3, 3)));
    assert_eq!(model.loader.ledger().balance(&owner_name(2)), 970);
    model.check_invariant().unwrap();
}

#[test]
fn test_restart_cycles_keep_claims_and_drop_timers() {
    let mut model = LeaseModel::new();
    for owner in 0..3u8 {
        model.execute(Operation::Credit { owner, amount: 10_000 });
        model.execute(Operation::Join { owner });
        model.execute(Operation::PlaceAnchor { owner, x: owner as i32 * 3, z: 0, offset: 8 });
    }
    assert_eq!(model.loader.billing().running_count(), 3);

    for _ in 0..10 {
        assert_eq!(model.execute(Operation::Restart), OpResult::Reconciled);
        model.check_invariant().unwrap();
    }

    assert_eq!(model.loader.billing().running_count(), 0);
    assert_eq!(model.loader.manager().audit_tickets(), Ok(27));
    for owner in 0..3u8 {
        assert_eq!(model.loader.manager().claims(&owner_name(owner)).len(), 1);
        assert_eq!(model.execute(Operation::Tick { owner }), OpResult::Idle);
    }
}

#[test]
fn test_removing_every_anchor_clears_every_ticket() {
    let mut model = LeaseModel::new();
    for (i, (x, z)) in [(-4, -4), (0, 0), (4, 4), (-4, 4)].into_iter().enumerate() {
        model.execute(Operation::PlaceAnchor { owner: i as u8, x, z, offset: 15 });
    }
    assert_eq!(model.loader.manager().world().anchors().len(), 4);

    while !model.loader.manager().world().anchors().is_empty() {
        model.execute(Operation::RemoveAnchor { actor: 0, index: 0 });
        model.check_invariant().unwrap();
    }

    assert!(model.loader.manager().loaded_cells().is_empty());
    assert!(model.loader.manager().world().forced.is_empty());
}

// Helper for deterministic test
fn generate_random_op(rng: &mut ChaCha8Rng) -> Operation {
    let op_type = rng.gen_range(0..9);
    let owner = rng.gen_range(0..5u8);
    let x = rng.gen_range(-4..=4);
    let z = rng.gen_range(-4..=4);

    match op_type {
        0 | 1 => Operation::PlaceAnchor { owner, x, z, offset: [0, 8, 15][rng.gen_range(0..3)] },
        2 => Operation::RemoveAnchor { actor: owner, index: rng.gen_range(0..16) },
        3 => Operation::Claim { owner, x, z },
        4 => Operation::Release { owner, index: rng.gen_range(0..4) },
        5 => Operation::Join { owner },
        6 => {
            if rng.gen_bool(0.5) {
                Operation::Leave { owner }
            } else {
                Operation::Credit { owner, amount: rng.gen_range(0..500u64) }
            }
        }
        7 => Operation::Tick { owner },
        8 => {
            if rng.gen_bool(0.05) {
                Operation::Restart
            } else {
                Operation::Tick { owner }
            }
        }
        _ => unreachable!(),
    }
}
