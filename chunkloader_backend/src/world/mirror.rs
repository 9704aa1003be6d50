use candid::{CandidType, Deserialize};
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{Memory, StableBTreeMap, Storable};
use std::borrow::Cow;

use super::WorldRuntime;
use crate::geometry::cell_of_block;
use crate::types::{BlockKind, BlockPos, CellKey, WorldCommand, WorldEvent};

/// Anchor bases known to stand inside one cell.
#[derive(CandidType, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AnchorList(pub Vec<BlockPos>);

impl Storable for AnchorList {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(candid::encode_one(self).expect(
            "CRITICAL: Failed to encode AnchorList. \
             This should never happen unless there's a bug in candid serialization."
        ))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<'_, [u8]>) -> Self {
        candid::decode_one(&bytes).expect(
            "CRITICAL: Failed to decode AnchorList from stable storage. \
             This indicates storage corruption or an incompatible canister upgrade."
        )
    }

    const BOUND: Bound = Bound::Unbounded;
}

/// Packed as two little-endian i32s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RealmBounds {
    pub min_y: i32,
    pub max_y: i32,
}

impl Storable for RealmBounds {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        let mut bytes = Vec::with_capacity(8);
        bytes.extend_from_slice(&self.min_y.to_le_bytes());
        bytes.extend_from_slice(&self.max_y.to_le_bytes());
        Cow::Owned(bytes)
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<'_, [u8]>) -> Self {
        if bytes.len() < 8 {
            return RealmBounds { min_y: 0, max_y: 0 };
        }
        RealmBounds {
            min_y: i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            max_y: i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    const BOUND: Bound = Bound::Bounded {
        max_size: 8,
        is_fixed_size: true,
    };
}

impl Storable for WorldCommand {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(candid::encode_one(self).expect(
            "CRITICAL: Failed to encode WorldCommand. \
             This should never happen unless there's a bug in candid serialization."
        ))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<'_, [u8]>) -> Self {
        candid::decode_one(&bytes).expect(
            "CRITICAL: Failed to decode WorldCommand from stable storage. \
             The host command outbox is corrupted."
        )
    }

    const BOUND: Bound = Bound::Unbounded;
}

/// Canister-side view of the host's world.
///
/// Anchors and realms are learned from `WorldEvent`s; every side effect is
/// appended to an outbox that the host drains in order with `take_commands`.
/// All three maps live in stable memory so the view survives upgrades.
pub struct MirroredWorld<M: Memory> {
    anchors: StableBTreeMap<String, AnchorList, M>,
    realms: StableBTreeMap<String, RealmBounds, M>,
    outbox: StableBTreeMap<u64, WorldCommand, M>,
}

impl<M: Memory> MirroredWorld<M> {
    pub fn init(anchors: M, realms: M, outbox: M) -> Self {
        Self {
            anchors: StableBTreeMap::init(anchors),
            realms: StableBTreeMap::init(realms),
            outbox: StableBTreeMap::init(outbox),
        }
    }

    /// Pop up to `limit` queued commands, oldest first.
    pub fn take_commands(&mut self, limit: usize) -> Vec<WorldCommand> {
        let mut taken = Vec::new();
        while taken.len() < limit {
            match self.outbox.pop_first() {
                Some((_, command)) => taken.push(command),
                None => break,
            }
        }
        taken
    }

    pub fn anchor_count(&self) -> u64 {
        self.anchors.iter().map(|entry| entry.value().0.len() as u64).sum()
    }

    fn push(&mut self, command: WorldCommand) {
        let next = self.outbox.last_key_value().map(|(id, _)| id + 1).unwrap_or(0);
        self.outbox.insert(next, command);
    }

    fn record_anchor(&mut self, base: &BlockPos) {
        let key = cell_of_block(base).to_string();
        let mut list = self.anchors.get(&key).unwrap_or_default();
        if !list.0.contains(base) {
            list.0.push(base.clone());
            self.anchors.insert(key, list);
        }
    }

    fn forget_anchor(&mut self, base: &BlockPos) -> bool {
        let key = cell_of_block(base).to_string();
        let Some(mut list) = self.anchors.get(&key) else {
            return false;
        };
        let before = list.0.len();
        list.0.retain(|b| b != base);
        if list.0.len() == before {
            return false;
        }
        if list.0.is_empty() {
            self.anchors.remove(&key);
        } else {
            self.anchors.insert(key, list);
        }
        true
    }

    fn has_base(&self, pos: &BlockPos) -> bool {
        self.anchors
            .get(&cell_of_block(pos).to_string())
            .is_some_and(|list| list.0.contains(pos))
    }
}

impl<M: Memory> WorldRuntime for MirroredWorld<M> {
    fn is_realm_loaded(&self, realm: &str) -> bool {
        self.realms.contains_key(&realm.to_string())
    }

    fn height_range(&self, realm: &str) -> Option<(i32, i32)> {
        self.realms
            .get(&realm.to_string())
            .map(|bounds| (bounds.min_y, bounds.max_y))
    }

    fn force_load(&mut self, cell: &CellKey, tag: &str) {
        self.push(WorldCommand::ForceLoad { cell: cell.clone(), tag: tag.to_string() });
    }

    fn release_force_load(&mut self, cell: &CellKey, tag: &str) {
        self.push(WorldCommand::ReleaseForceLoad { cell: cell.clone(), tag: tag.to_string() });
    }

    fn block_at(&self, pos: &BlockPos) -> BlockKind {
        if self.has_base(pos) {
            return BlockKind::AnchorBase;
        }
        match pos.below() {
            Some(below) if self.has_base(&below) => BlockKind::AnchorTop,
            _ => BlockKind::Air,
        }
    }

    fn set_block(&mut self, pos: &BlockPos, kind: BlockKind) {
        if kind == BlockKind::Air && !self.forget_anchor(pos) {
            // Clearing the top half also removes the structure.
            if let Some(below) = pos.below() {
                self.forget_anchor(&below);
            }
        }
        self.push(WorldCommand::SetBlock { pos: pos.clone(), kind });
    }

    fn drop_item(&mut self, pos: &BlockPos, kind: BlockKind) {
        self.push(WorldCommand::DropItem { pos: pos.clone(), kind });
    }

    fn observe(&mut self, event: &WorldEvent) {
        match event {
            WorldEvent::AnchorCreated { base, .. } => self.record_anchor(base),
            WorldEvent::RealmLoaded { realm, min_y, max_y } => {
                self.realms.insert(
                    realm.clone(),
                    RealmBounds { min_y: *min_y, max_y: *max_y },
                );
            }
            WorldEvent::RealmUnloaded { realm } => {
                self.realms.remove(realm);
            }
            _ => {}
        }
    }

    fn pending_commands(&self) -> u64 {
        self.outbox.len()
    }

    fn anchors_in_cell(&self, cell: &CellKey) -> Vec<BlockPos> {
        if !self.is_realm_loaded(&cell.realm) {
            return Vec::new();
        }
        self.anchors
            .get(&cell.to_string())
            .map(|list| list.0)
            .unwrap_or_default()
    }
}
