use std::collections::BTreeMap;

use super::{Operation, OpResult};
use crate::billing::{BillingState, Ledger};
use crate::claims::store;
use crate::config::LeaseConfig;
use crate::geometry::{cell_of_block, chebyshev};
use crate::testing::{loader_with, TestLoader};
use crate::types::{BlockPos, CellKey, ClaimOutcome, EventOutcome, NoticeKind, OwnerId, TickOutcome, WorldEvent};
use crate::world::break_anchor;

/// Drives a full `ChunkLoader` over the fake world and checks the lease
/// invariants against what the host would observe.
///
/// Only credits are tracked on the side; every charge must show up as a
/// `FeePaid` notice, so balances are recomputed from the notice stream.
pub struct LeaseModel {
    pub loader: TestLoader,
    pub credits: BTreeMap<OwnerId, u64>,
    pub operation_count: u64,
}

pub fn owner_name(owner: u8) -> OwnerId {
    format!("owner-{}", owner)
}

impl LeaseModel {
    pub fn new() -> Self {
        Self::with_config(LeaseConfig::default())
    }

    pub fn with_config(config: LeaseConfig) -> Self {
        let mut loader = loader_with(config);
        loader.start();
        Self { loader, credits: BTreeMap::new(), operation_count: 0 }
    }

    pub fn execute(&mut self, op: Operation) -> OpResult {
        self.operation_count += 1;
        match op {
            Operation::PlaceAnchor { owner, x, z, offset } => {
                let base = BlockPos::new("world", x * 16 + offset, 2, z * 16 + offset);
                self.loader.manager_mut().world_mut().place_anchor(&base);
                let event = WorldEvent::AnchorCreated { owner: owner_name(owner), base };
                match self.loader.dispatch(event) {
                    Ok(EventOutcome::Claim(outcome)) => claim_result(outcome),
                    _ => OpResult::Failed,
                }
            }
            Operation::RemoveAnchor { actor, index } => {
                let anchors = self.loader.manager().world().anchors();
                if anchors.is_empty() {
                    return OpResult::Idle;
                }
                let base = anchors[index % anchors.len()].clone();
                let event = WorldEvent::AnchorRemoved { actor: Some(owner_name(actor)), base: base.clone() };
                let result = match self.loader.dispatch(event) {
                    Ok(EventOutcome::Revoked(_)) => OpResult::Revoked,
                    _ => OpResult::Failed,
                };
                // The host finishes the break either way.
                break_anchor(self.loader.manager_mut().world_mut(), &base, false);
                result
            }
            Operation::Claim { owner, x, z } => {
                match self.loader.claim(&owner_name(owner), &CellKey::new("world", x, z)) {
                    Ok(outcome) => claim_result(outcome),
                    Err(_) => OpResult::Failed,
                }
            }
            Operation::Release { owner, index } => {
                let owner = owner_name(owner);
                let claims = self.loader.manager().claims(&owner);
                if claims.is_empty() {
                    return OpResult::NotHeld;
                }
                let center = claims[index % claims.len()].clone();
                match self.loader.release(&owner, &center) {
                    Ok(true) => OpResult::Released,
                    Ok(false) => OpResult::NotHeld,
                    Err(_) => OpResult::Failed,
                }
            }
            Operation::Join { owner } => {
                match self.loader.dispatch(WorldEvent::OwnerJoined { owner: owner_name(owner) }) {
                    Ok(_) => OpResult::Presence,
                    Err(_) => OpResult::Failed,
                }
            }
            Operation::Leave { owner } => {
                match self.loader.dispatch(WorldEvent::OwnerLeft { owner: owner_name(owner) }) {
                    Ok(_) => OpResult::Presence,
                    Err(_) => OpResult::Failed,
                }
            }
            Operation::Credit { owner, amount } => {
                let owner = owner_name(owner);
                match self.loader.ledger_mut().credit(&owner, amount) {
                    Ok(_) => {
                        *self.credits.entry(owner).or_insert(0) += amount;
                        OpResult::Idle
                    }
                    Err(_) => OpResult::Failed,
                }
            }
            Operation::Tick { owner } => match self.loader.billing_tick(&owner_name(owner)) {
                Ok(TickOutcome::Charged { .. }) => OpResult::Charged,
                Ok(TickOutcome::Revoked { .. }) => OpResult::Revoked,
                Ok(TickOutcome::Idle) => OpResult::Idle,
                Err(_) => OpResult::Failed,
            },
            Operation::Restart => {
                let stopped = self.loader.dispatch(WorldEvent::HostStopping);
                let started = self.loader.dispatch(WorldEvent::HostStarted);
                match (stopped, started) {
                    (Ok(_), Ok(_)) => OpResult::Reconciled,
                    _ => OpResult::Failed,
                }
            }
        }
    }

    /// Force-loaded cells are exactly the union of active claim areas.
    pub fn check_ticket_invariant(&self) -> Result<(), String> {
        let manager = self.loader.manager();
        manager.audit_tickets()?;
        if manager.world().forced != manager.loaded_cells() {
            return Err(format!(
                "TICKET VIOLATION: world holds {} force-loads, ledger holds {}",
                manager.world().forced.len(),
                manager.loaded_cells().len()
            ));
        }

        for claim in store::all_claims(manager.store()) {
            let expected_active = !manager.is_dormant(&claim.owner);
            if manager.is_active(&claim.cell) != expected_active {
                return Err(format!(
                    "ACTIVATION VIOLATION: claim {} of {} active={} dormant={}",
                    claim.cell,
                    claim.owner,
                    manager.is_active(&claim.cell),
                    manager.is_dormant(&claim.owner)
                ));
            }
        }
        Ok(())
    }

    /// No cell is claimed twice and no two anchors share a neighborhood.
    pub fn check_uniqueness_invariant(&self) -> Result<(), String> {
        let manager = self.loader.manager();
        let config = manager.config();

        let claims = store::all_claims(manager.store());
        for (i, a) in claims.iter().enumerate() {
            for b in &claims[i + 1..] {
                if chebyshev(&a.cell, &b.cell).is_some_and(|d| d <= config.claim_radius) {
                    return Err(format!(
                        "UNIQUENESS VIOLATION: {} ({}) and {} ({}) overlap",
                        a.cell, a.owner, b.cell, b.owner
                    ));
                }
            }
        }

        let anchors = manager.world().anchors();
        for (i, a) in anchors.iter().enumerate() {
            for b in &anchors[i + 1..] {
                let d = chebyshev(&cell_of_block(a), &cell_of_block(b));
                if d.is_some_and(|d| d <= config.enforcement_radius) {
                    return Err(format!("ANCHOR VIOLATION: {} and {} share a neighborhood", a, b));
                }
            }
        }
        Ok(())
    }

    /// A timer runs exactly for present owners with claims, and every
    /// balance equals credits minus announced fees.
    pub fn check_billing_invariant(&self) -> Result<(), String> {
        let billing = self.loader.billing();
        let manager = self.loader.manager();

        if billing.timers().active() != billing.running_count() {
            return Err(format!(
                "TIMER LEAK: {} timers scheduled, {} owners billed",
                billing.timers().active(),
                billing.running_count()
            ));
        }

        let mut fees: BTreeMap<OwnerId, u64> = BTreeMap::new();
        for notice in &manager.notifier().notices {
            if let NoticeKind::FeePaid { amount, .. } = notice.kind {
                *fees.entry(notice.owner.clone()).or_insert(0) += amount;
            }
        }

        for owner in (0..5u8).map(owner_name) {
            let running = matches!(billing.state(&owner), BillingState::Running(_));
            let expected = billing.is_present(&owner) && !manager.claims(&owner).is_empty();
            if running != expected {
                return Err(format!(
                    "BILLING VIOLATION: {} running={} present={} claims={}",
                    owner,
                    running,
                    billing.is_present(&owner),
                    manager.claims(&owner).len()
                ));
            }

            let credited = self.credits.get(&owner).copied().unwrap_or(0);
            let paid = fees.get(&owner).copied().unwrap_or(0);
            let balance = self.loader.ledger().balance(&owner);
            if credited.checked_sub(paid) != Some(balance) {
                return Err(format!(
                    "BALANCE VIOLATION: {} credited {} paid {} but holds {}",
                    owner, credited, paid, balance
                ));
            }
        }
        Ok(())
    }

    pub fn check_invariant(&self) -> Result<(), String> {
        self.check_ticket_invariant()?;
        self.check_uniqueness_invariant()?;
        self.check_billing_invariant()
    }
}

fn claim_result(outcome: ClaimOutcome) -> OpResult {
    match outcome {
        ClaimOutcome::Created => OpResult::Created,
        ClaimOutcome::AlreadyClaimed => OpResult::AlreadyClaimed,
        ClaimOutcome::Denied(_) => OpResult::Denied,
    }
}
