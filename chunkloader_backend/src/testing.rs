//! In-memory collaborators for unit and scenario tests.

use ic_stable_structures::DefaultMemoryImpl;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::billing::{StableLedger, TimerHost};
use crate::claims::{ClaimStore, LeaseManager, StableClaimStore, StoreError};
use crate::config::LeaseConfig;
use crate::loader::ChunkLoader;
use crate::notices::Notifier;
use crate::types::{BlockKind, BlockPos, CellKey, Notice, OwnerId};
use crate::world::WorldRuntime;

// =============================================================================
// WORLD
// =============================================================================

/// Block-level world with a physical column scan. Realm "world" spans y 0..8.
#[derive(Debug)]
pub struct FakeWorld {
    realms: BTreeMap<String, (i32, i32)>,
    blocks: BTreeMap<BlockPos, BlockKind>,
    pub forced: BTreeSet<CellKey>,
    pub released: Vec<CellKey>,
    pub drops: Vec<(BlockPos, BlockKind)>,
    /// Reported as the host's unapplied command count.
    pub backlog: u64,
}

impl FakeWorld {
    pub fn new() -> Self {
        let mut realms = BTreeMap::new();
        realms.insert("world".to_string(), (0, 8));
        Self {
            realms,
            blocks: BTreeMap::new(),
            forced: BTreeSet::new(),
            released: Vec::new(),
            drops: Vec::new(),
            backlog: 0,
        }
    }

    pub fn place_anchor(&mut self, base: &BlockPos) {
        self.blocks.insert(base.clone(), BlockKind::AnchorBase);
        if let Some(top) = base.above() {
            self.blocks.insert(top, BlockKind::AnchorTop);
        }
    }

    /// Every complete anchor, in block order.
    pub fn anchors(&self) -> Vec<BlockPos> {
        self.blocks
            .keys()
            .filter(|pos| self.is_anchor(pos))
            .cloned()
            .collect()
    }

    pub fn add_realm(&mut self, realm: &str, min_y: i32, max_y: i32) {
        self.realms.insert(realm.to_string(), (min_y, max_y));
    }

    /// Unloading a realm drops its force-loads.
    pub fn remove_realm(&mut self, realm: &str) {
        self.realms.remove(realm);
        self.forced.retain(|cell| cell.realm != realm);
    }
}

impl WorldRuntime for FakeWorld {
    fn is_realm_loaded(&self, realm: &str) -> bool {
        self.realms.contains_key(realm)
    }

    fn height_range(&self, realm: &str) -> Option<(i32, i32)> {
        self.realms.get(realm).copied()
    }

    fn force_load(&mut self, cell: &CellKey, _tag: &str) {
        assert!(self.forced.insert(cell.clone()), "cell {} force-loaded twice", cell);
    }

    fn release_force_load(&mut self, cell: &CellKey, _tag: &str) {
        assert!(self.forced.remove(cell), "cell {} released without a ticket", cell);
        self.released.push(cell.clone());
    }

    fn block_at(&self, pos: &BlockPos) -> BlockKind {
        self.blocks.get(pos).copied().unwrap_or(BlockKind::Air)
    }

    fn set_block(&mut self, pos: &BlockPos, kind: BlockKind) {
        if kind == BlockKind::Air {
            self.blocks.remove(pos);
        } else {
            self.blocks.insert(pos.clone(), kind);
        }
    }

    fn pending_commands(&self) -> u64 {
        self.backlog
    }

    fn drop_item(&mut self, pos: &BlockPos, kind: BlockKind) {
        self.drops.push((pos.clone(), kind));
    }
}

// =============================================================================
// STORE
// =============================================================================

pub fn memory_store() -> StableClaimStore<DefaultMemoryImpl> {
    StableClaimStore::init(DefaultMemoryImpl::default())
}

/// Stable store whose writes can be made to fail.
pub struct TestStore {
    inner: StableClaimStore<DefaultMemoryImpl>,
    fail: bool,
}

impl TestStore {
    pub fn new() -> Self {
        Self { inner: memory_store(), fail: false }
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail = fail;
    }
}

impl ClaimStore for TestStore {
    fn get(&self, owner: &str) -> Vec<CellKey> {
        self.inner.get(owner)
    }

    fn set(&mut self, owner: &str, cells: Vec<CellKey>) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Encode {
                owner: owner.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        self.inner.set(owner, cells)
    }

    fn list_owners(&self) -> Vec<OwnerId> {
        self.inner.list_owners()
    }
}

// =============================================================================
// NOTICES & TIMERS
// =============================================================================

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub notices: Vec<Notice>,
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

/// Timers that never fire on their own; tests call `tick` directly.
#[derive(Debug, Default)]
pub struct ManualTimers {
    next: u64,
    scheduled: BTreeMap<u64, (OwnerId, Duration)>,
}

impl ManualTimers {
    pub fn active(&self) -> usize {
        self.scheduled.len()
    }

    pub fn owners(&self) -> Vec<OwnerId> {
        self.scheduled.values().map(|(owner, _)| owner.clone()).collect()
    }
}

impl TimerHost for ManualTimers {
    type Handle = u64;

    fn start(&mut self, owner: &str, interval: Duration) -> u64 {
        let id = self.next;
        self.next += 1;
        self.scheduled.insert(id, (owner.to_string(), interval));
        id
    }

    fn cancel(&mut self, handle: u64) {
        self.scheduled.remove(&handle);
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

pub type TestManager = LeaseManager<TestStore, FakeWorld, RecordingNotifier>;

pub type TestLedger = StableLedger<DefaultMemoryImpl>;

pub type TestLoader = ChunkLoader<TestStore, FakeWorld, RecordingNotifier, TestLedger, ManualTimers>;

pub fn manager(config: LeaseConfig) -> TestManager {
    LeaseManager::new(config, TestStore::new(), FakeWorld::new(), RecordingNotifier::default())
}

pub fn ledger() -> TestLedger {
    StableLedger::init(DefaultMemoryImpl::default(), DefaultMemoryImpl::default(), || 0)
}

pub fn loader() -> TestLoader {
    loader_with(LeaseConfig::default())
}

pub fn loader_with(config: LeaseConfig) -> TestLoader {
    ChunkLoader::new(
        config,
        TestStore::new(),
        FakeWorld::new(),
        RecordingNotifier::default(),
        ledger(),
        ManualTimers::default(),
    )
}
