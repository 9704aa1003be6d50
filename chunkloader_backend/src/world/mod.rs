//! The world-runtime seam.
//!
//! The lease core never simulates the world; it asks a `WorldRuntime` for
//! blocks and realm bounds and tells it which cells to force-load. The
//! canister implementation is `MirroredWorld`, which answers from state the
//! host reported and queues the resulting `WorldCommand`s for the host.

mod mirror;

pub use mirror::{AnchorList, MirroredWorld, RealmBounds};

use crate::geometry;
use crate::types::{BlockKind, BlockPos, CellKey, WorldEvent, CELL_WIDTH};

pub trait WorldRuntime {
    fn is_realm_loaded(&self, realm: &str) -> bool;

    /// Block y range `[min_y, max_y)` of a realm, `None` if the realm is unknown.
    fn height_range(&self, realm: &str) -> Option<(i32, i32)>;

    fn force_load(&mut self, cell: &CellKey, tag: &str);

    fn release_force_load(&mut self, cell: &CellKey, tag: &str);

    fn block_at(&self, pos: &BlockPos) -> BlockKind;

    fn set_block(&mut self, pos: &BlockPos, kind: BlockKind);

    /// Drop one item of `kind` at `pos` as a natural break would.
    fn drop_item(&mut self, pos: &BlockPos, kind: BlockKind);

    /// Hook for runtimes that track world state from host events.
    fn observe(&mut self, _event: &WorldEvent) {}

    /// Commands queued for the host and not yet taken.
    fn pending_commands(&self) -> u64 {
        0
    }

    fn is_anchor(&self, base: &BlockPos) -> bool {
        self.block_at(base) == BlockKind::AnchorBase
            && base
                .above()
                .is_some_and(|top| self.block_at(&top) == BlockKind::AnchorTop)
    }

    /// Every anchor base inside `cell`.
    ///
    /// The default walks the whole column range of the cell, which costs
    /// 16 x 16 x height block reads. Runtimes with an anchor index override it.
    fn anchors_in_cell(&self, cell: &CellKey) -> Vec<BlockPos> {
        let Some((min_y, max_y)) = self.height_range(&cell.realm) else {
            return Vec::new();
        };
        let Some((origin_x, origin_z)) = geometry::cell_origin(cell) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        // The top half needs one block of headroom.
        for y in min_y..max_y.saturating_sub(1) {
            for dx in 0..CELL_WIDTH {
                for dz in 0..CELL_WIDTH {
                    let base = BlockPos::new(cell.realm.clone(), origin_x + dx, y, origin_z + dz);
                    if self.is_anchor(&base) {
                        found.push(base);
                    }
                }
            }
        }
        found
    }
}

/// Clear both halves of the anchor at `base`.
///
/// With `drop_items` each cleared half also drops its item; logical cleanup
/// of duplicate strays passes `false`.
pub fn break_anchor<W: WorldRuntime + ?Sized>(world: &mut W, base: &BlockPos, drop_items: bool) {
    // Read both halves first: a runtime may derive one half from the other.
    let top = base.above().filter(|top| world.block_at(top) == BlockKind::AnchorTop);
    let halves = [
        (world.block_at(base) == BlockKind::AnchorBase).then(|| (base.clone(), BlockKind::AnchorBase)),
        top.map(|top| (top, BlockKind::AnchorTop)),
    ];

    for (pos, kind) in halves.into_iter().flatten() {
        if drop_items {
            world.drop_item(&pos, kind);
        }
        world.set_block(&pos, BlockKind::Air);
    }
}
