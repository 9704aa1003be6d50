use std::collections::{BTreeMap, BTreeSet};

use super::enforcer::{RemovalReport, UniquenessEnforcer};
use super::store::{self, ClaimStore};
use super::tickets::TicketLedger;
use crate::config::LeaseConfig;
use crate::error::LeaseError;
use crate::geometry::{area_keys, cell_of_block, within};
use crate::notices::Notifier;
use crate::types::{
    BlockPos, CellKey, ClaimOutcome, Cue, DenyReason, Notice, NoticeKind, OwnerId, RevokedClaim,
};
use crate::world::{break_anchor, WorldRuntime};

/// Owns the claim store, the world handle and the force-load tickets.
///
/// A claim is *active* while its area's tickets are held. Persisted claims
/// of owners who left since the last `load_all` stay inactive (dormant)
/// until the owner returns; claims in realms the world does not know are
/// picked up by `load_realm`.
pub struct LeaseManager<S, W, N> {
    config: LeaseConfig,
    store: S,
    world: W,
    notifier: N,
    enforcer: UniquenessEnforcer,
    tickets: TicketLedger,
    active: BTreeMap<CellKey, OwnerId>,
    dormant: BTreeSet<OwnerId>,
}

impl<S, W, N> LeaseManager<S, W, N>
where
    S: ClaimStore,
    W: WorldRuntime,
    N: Notifier,
{
    pub fn new(config: LeaseConfig, store: S, world: W, notifier: N) -> Self {
        Self {
            enforcer: UniquenessEnforcer::new(config.enforcement_radius),
            tickets: TicketLedger::new(config.ticket_tag.clone()),
            config,
            store,
            world,
            notifier,
            active: BTreeMap::new(),
            dormant: BTreeSet::new(),
        }
    }

    // =========================================================================
    // CLAIMS
    // =========================================================================

    pub fn claim(&mut self, owner: &str, center: &CellKey) -> Result<ClaimOutcome, LeaseError> {
        let mut cells = self.store.get(owner);
        if cells.contains(center) {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let radius = self.config.claim_radius;
        if let Some(conflict) = store::all_claims(&self.store)
            .into_iter()
            .map(|claim| claim.cell)
            .find(|cell| within(cell, center, radius))
        {
            let reason = DenyReason::Overlapping { conflict };
            self.notify(owner, NoticeKind::ClaimDenied { center: center.clone(), reason: reason.clone() }, None);
            return Ok(ClaimOutcome::Denied(reason));
        }

        cells.push(center.clone());
        self.store.set(owner, cells)?;
        if !self.dormant.contains(owner) {
            self.activate(owner, center);
        }

        log!("Claim created: {} -> {}", owner, center);
        self.notify(
            owner,
            NoticeKind::ClaimCreated { center: center.clone(), area_width: self.config.area_width() },
            Some(Cue::ClaimConfirmed),
        );
        Ok(ClaimOutcome::Created)
    }

    pub fn release(&mut self, owner: &str, center: &CellKey) -> Result<bool, LeaseError> {
        let mut cells = self.store.get(owner);
        let before = cells.len();
        cells.retain(|cell| cell != center);
        if cells.len() == before {
            return Ok(false);
        }

        self.store.set(owner, cells)?;
        self.deactivate(center);

        log!("Claim released: {} -> {}", owner, center);
        self.notify(owner, NoticeKind::ClaimReleased { center: center.clone() }, Some(Cue::ClaimReleased));
        Ok(true)
    }

    /// Forced teardown: empty the owner's set, release every ticket and
    /// break every anchor in the claimed cells with drops.
    ///
    /// The empty set is persisted first so a failed write leaves the world
    /// untouched.
    pub fn revoke_all(&mut self, owner: &str) -> Result<Vec<CellKey>, LeaseError> {
        let cells = self.store.get(owner);
        self.store.set(owner, Vec::new())?;

        for cell in &cells {
            self.deactivate(cell);
            for anchor in self.world.anchors_in_cell(cell) {
                break_anchor(&mut self.world, &anchor, true);
            }
        }

        if !cells.is_empty() {
            log!("Revoked {} claims of {}", cells.len(), owner);
        }
        Ok(cells)
    }

    // =========================================================================
    // ANCHOR EVENTS
    // =========================================================================

    pub fn on_anchor_created(
        &mut self,
        owner: &str,
        base: &BlockPos,
    ) -> Result<(ClaimOutcome, Vec<RevokedClaim>), LeaseError> {
        let center = cell_of_block(base);
        if !self.world.is_anchor(base) {
            let reason = DenyReason::NoAnchor;
            self.notify(owner, NoticeKind::ClaimDenied { center, reason: reason.clone() }, None);
            return Ok((ClaimOutcome::Denied(reason), Vec::new()));
        }

        let revoked = self.enforcer.enforce_on_create(&mut self.world, &mut self.store, base)?;
        for claim in &revoked {
            self.deactivate(&claim.cell);
        }

        let outcome = self.claim(owner, &center)?;
        Ok((outcome, revoked))
    }

    pub fn on_anchor_removed(
        &mut self,
        actor: Option<&str>,
        base: &BlockPos,
    ) -> Result<RemovalReport, LeaseError> {
        let report = self.enforcer.enforce_on_remove(&mut self.world, &mut self.store, base)?;
        for claim in &report.revoked {
            self.deactivate(&claim.cell);
        }
        // Enforcement skips unloaded realms; the anchor is still forgotten.
        if self.world.is_anchor(base) {
            break_anchor(&mut self.world, base, false);
        }

        let center = cell_of_block(base);
        if let (Some(actor), Some(owner)) = (actor, report.owner.as_deref()) {
            if actor == owner {
                self.notify(owner, NoticeKind::ClaimReleased { center }, Some(Cue::ClaimReleased));
            }
        }
        Ok(report)
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// Activate every persisted claim. Returns the number of tickets held.
    pub fn load_all(&mut self) -> usize {
        self.dormant.clear();
        for owner in self.store.list_owners() {
            for cell in self.store.get(&owner) {
                self.activate(&owner, &cell);
            }
        }
        log!("Loaded {} claims holding {} tickets", self.active.len(), self.tickets.len());
        self.tickets.len()
    }

    /// Release every ticket. Claims stay persisted.
    pub fn unload_all(&mut self) -> usize {
        let cells: Vec<CellKey> = self.active.keys().cloned().collect();
        for cell in &cells {
            self.deactivate(cell);
        }
        log!("Unloaded {} claims", cells.len());
        cells.len()
    }

    /// Re-acquire the owner's tickets. Returns the owner's active claim count.
    pub fn activate_owner(&mut self, owner: &str) -> u32 {
        self.dormant.remove(owner);
        for cell in self.store.get(owner) {
            self.activate(owner, &cell);
        }
        self.active_claims(owner)
    }

    /// Release the owner's tickets and keep them released until the owner
    /// is activated again. Returns the number of claims deactivated.
    pub fn deactivate_owner(&mut self, owner: &str) -> u32 {
        self.dormant.insert(owner.to_string());
        let cells: Vec<CellKey> = self
            .active
            .iter()
            .filter(|(_, holder)| holder.as_str() == owner)
            .map(|(cell, _)| cell.clone())
            .collect();
        for cell in &cells {
            self.deactivate(cell);
        }
        cells.len() as u32
    }

    /// A realm came online: ticket the claims that could not be before.
    pub fn load_realm(&mut self, realm: &str) -> usize {
        let before = self.active.len();
        for owner in self.store.list_owners() {
            if self.dormant.contains(&owner) {
                continue;
            }
            for cell in self.store.get(&owner) {
                if cell.realm == realm {
                    self.activate(&owner, &cell);
                }
            }
        }
        self.active.len() - before
    }

    /// A realm went away and took its force-loads with it.
    pub fn unload_realm(&mut self, realm: &str) -> usize {
        let before = self.active.len();
        self.active.retain(|cell, _| cell.realm != realm);
        self.tickets.forget_realm(realm);
        before - self.active.len()
    }

    /// Check that the ticketed cells are exactly the union of the active
    /// claim areas, with matching reference counts, and that every active
    /// claim is persisted under its holder.
    pub fn audit_tickets(&self) -> Result<usize, String> {
        let mut expected: BTreeMap<CellKey, u32> = BTreeMap::new();
        for (center, owner) in &self.active {
            if !self.store.get(owner).contains(center) {
                return Err(format!("active claim {} is not persisted for {}", center, owner));
            }
            for cell in area_keys(center, self.config.claim_radius) {
                *expected.entry(cell).or_insert(0) += 1;
            }
        }

        if expected.len() != self.tickets.len() {
            return Err(format!(
                "ticket count mismatch: expected {}, holding {}",
                expected.len(),
                self.tickets.len()
            ));
        }
        for (cell, count) in &expected {
            let held = self.tickets.references(cell);
            if held != *count {
                return Err(format!("cell {} has {} references, expected {}", cell, held, count));
            }
        }
        Ok(self.tickets.len())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn claims(&self, owner: &str) -> Vec<CellKey> {
        self.store.get(owner)
    }

    pub fn active_claims(&self, owner: &str) -> u32 {
        self.active.values().filter(|holder| holder.as_str() == owner).count() as u32
    }

    pub fn is_active(&self, cell: &CellKey) -> bool {
        self.active.contains_key(cell)
    }

    pub fn is_dormant(&self, owner: &str) -> bool {
        self.dormant.contains(owner)
    }

    pub fn loaded_cells(&self) -> BTreeSet<CellKey> {
        self.tickets.loaded_keys()
    }

    pub fn tickets(&self) -> &TicketLedger {
        &self.tickets
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    pub fn notify(&mut self, owner: &str, kind: NoticeKind, cue: Option<Cue>) {
        self.notifier.notify(Notice { owner: owner.to_string(), kind, cue });
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    fn activate(&mut self, owner: &str, center: &CellKey) {
        if self.active.contains_key(center) || !self.world.is_realm_loaded(&center.realm) {
            return;
        }
        let area = area_keys(center, self.config.claim_radius);
        self.tickets.acquire_area(&mut self.world, &area);
        self.active.insert(center.clone(), owner.to_string());
    }

    fn deactivate(&mut self, center: &CellKey) {
        if self.active.remove(center).is_some() {
            let area = area_keys(center, self.config.claim_radius);
            self.tickets.release_area(&mut self.world, &area);
        }
    }
}
