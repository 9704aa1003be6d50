use super::store::{self, ClaimStore, StoreError};
use crate::geometry::{area_keys, cell_of_block, within};
use crate::types::{BlockPos, OwnerId, RevokedClaim};
use crate::world::{break_anchor, WorldRuntime};

/// What a removal pass found and undid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Owner of the removed anchor's cell, if it was claimed.
    pub owner: Option<OwnerId>,
    pub revoked: Vec<RevokedClaim>,
}

/// Keeps at most one anchor per neighborhood and the store in step with the
/// anchors that physically exist.
///
/// Every pass re-reads the store; nothing is cached between calls.
#[derive(Debug, Clone, Copy)]
pub struct UniquenessEnforcer {
    radius: u32,
}

impl UniquenessEnforcer {
    pub fn new(radius: u32) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// An anchor now stands at `base`; it wins against every other anchor in
    /// its neighborhood.
    pub fn enforce_on_create<W, S>(
        &self,
        world: &mut W,
        store: &mut S,
        base: &BlockPos,
    ) -> Result<Vec<RevokedClaim>, StoreError>
    where
        W: WorldRuntime + ?Sized,
        S: ClaimStore + ?Sized,
    {
        if !world.is_realm_loaded(&base.realm) {
            return Ok(Vec::new());
        }

        let center = cell_of_block(base);
        let mut revoked = Vec::new();

        for cell in area_keys(&center, self.radius) {
            for other in world.anchors_in_cell(&cell) {
                if &other == base {
                    continue;
                }
                log!("Breaking duplicate anchor at {} in favour of {}", other, base);
                break_anchor(world, &other, true);
                revoked.extend(store::strip_cell(store, &cell)?);
            }
        }

        revoked.extend(store::strip_neighborhood(store, &center, self.radius, Some(&center))?);
        revoked.sort();
        revoked.dedup();
        Ok(revoked)
    }

    /// The anchor at `base` is going away; drop its claim, clear any strays
    /// and repair claims that lost their anchor.
    ///
    /// The removed anchor is cleared without drops: the host's own break of
    /// it supplies the items, claimed or not.
    pub fn enforce_on_remove<W, S>(
        &self,
        world: &mut W,
        store: &mut S,
        base: &BlockPos,
    ) -> Result<RemovalReport, StoreError>
    where
        W: WorldRuntime + ?Sized,
        S: ClaimStore + ?Sized,
    {
        if !world.is_realm_loaded(&base.realm) {
            return Ok(RemovalReport::default());
        }

        let center = cell_of_block(base);
        let mut report = RemovalReport { owner: store::owner_of(store, &center), revoked: Vec::new() };

        if world.is_anchor(base) {
            break_anchor(world, base, false);
        }
        if report.owner.is_some() {
            report.revoked.extend(store::strip_cell(store, &center)?);
        }

        for cell in area_keys(&center, self.radius) {
            for stray in world.anchors_in_cell(&cell) {
                if &stray == base {
                    continue;
                }
                log!("Clearing stray anchor at {}", stray);
                break_anchor(world, &stray, false);
                report.revoked.extend(store::strip_cell(store, &cell)?);
            }
        }

        let radius = self.radius;
        let orphaned = store::strip_where(store, |cell| {
            within(cell, &center, radius) && world.anchors_in_cell(cell).is_empty()
        })?;
        for claim in &orphaned {
            log!("Repairing claim {} of {}: no anchor present", claim.cell, claim.owner);
        }
        report.revoked.extend(orphaned);

        report.revoked.sort();
        report.revoked.dedup();
        Ok(report)
    }
}
