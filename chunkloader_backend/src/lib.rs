use ic_cdk::{init, post_upgrade, pre_upgrade, query, update};
use ic_stable_structures::memory_manager::{MemoryId, MemoryManager, VirtualMemory};
use ic_stable_structures::{DefaultMemoryImpl, StableCell};
use std::cell::RefCell;

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

#[macro_use]
mod logging;

mod admin_query;
pub mod billing;
pub mod claims;
pub mod config;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod memory_ids;
pub mod notices;
pub mod types;
pub mod world;

#[cfg(test)]
mod testing;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use billing::{AuditEntry, BillingScheduler, IcTimers, Ledger, StableLedger, TimerHost};
pub use claims::{ClaimStore, LeaseManager, StableClaimStore, UniquenessEnforcer};
pub use config::{InitArgs, LeaseConfig};
pub use error::LeaseError;
pub use loader::ChunkLoader;
pub use notices::{NoticeQueue, Notifier};
pub use types::{
    BillingStatus, BlockKind, BlockPos, CellKey, ClaimOutcome, EventOutcome, Notice, OwnerId,
    TickOutcome, WorldCommand, WorldEvent,
};
pub use world::{MirroredWorld, WorldRuntime};

use admin_query::LoaderStats;
use billing::PresenceList;
use memory_ids::*;

// =============================================================================
// MEMORY MANAGEMENT
// =============================================================================

pub type Memory = VirtualMemory<DefaultMemoryImpl>;

type CanisterLoader =
    ChunkLoader<StableClaimStore<Memory>, MirroredWorld<Memory>, NoticeQueue, StableLedger<Memory>, IcTimers>;

/// Largest batch a single drain call returns.
const MAX_DRAIN_BATCH: u32 = 1_000;

thread_local! {
    static MEMORY_MANAGER: RefCell<MemoryManager<DefaultMemoryImpl>> =
        RefCell::new(MemoryManager::init(DefaultMemoryImpl::default()));

    static CONFIG: RefCell<StableCell<LeaseConfig, Memory>> = RefCell::new(
        StableCell::init(memory(CONFIG_MEMORY_ID), LeaseConfig::default())
    );

    // Owners present at the last upgrade; timers do not survive one.
    static PRESENCE: RefCell<StableCell<PresenceList, Memory>> = RefCell::new(
        StableCell::init(memory(PRESENCE_MEMORY_ID), PresenceList::default())
    );

    // Built on first use, after init/post_upgrade have stored the config.
    static LOADER: RefCell<CanisterLoader> = RefCell::new(build_loader());
}

fn memory(id: u8) -> Memory {
    MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(id)))
}

fn now() -> u64 {
    ic_cdk::api::time()
}

fn build_loader() -> CanisterLoader {
    let config = CONFIG.with(|c| c.borrow().get().clone());
    ChunkLoader::new(
        config,
        StableClaimStore::init(memory(CLAIMS_MEMORY_ID)),
        MirroredWorld::init(
            memory(ANCHORS_MEMORY_ID),
            memory(REALMS_MEMORY_ID),
            memory(OUTBOX_MEMORY_ID),
        ),
        NoticeQueue::new(),
        StableLedger::init(memory(BALANCES_MEMORY_ID), memory(AUDIT_LOG_MAP_MEMORY_ID), now),
        IcTimers::new(on_billing_tick),
    )
}

pub(crate) fn with_loader<R>(f: impl FnOnce(&mut CanisterLoader) -> R) -> R {
    LOADER.with(|l| f(&mut l.borrow_mut()))
}

pub(crate) fn read_loader<R>(f: impl FnOnce(&CanisterLoader) -> R) -> R {
    LOADER.with(|l| f(&l.borrow()))
}

fn on_billing_tick(owner: OwnerId) {
    match with_loader(|l| l.billing_tick(&owner)) {
        Ok(TickOutcome::Revoked { cells }) => {
            ic_cdk::println!("Billing: {} could not pay, {} claims revoked", owner, cells.len());
        }
        Ok(_) => {}
        Err(e) => ic_cdk::println!("Billing tick for {} failed: {}", owner, e),
    }
}

fn apply_config(args: Option<InitArgs>) {
    let Some(config) = args.and_then(|a| a.config) else {
        return;
    };
    if let Err(e) = config.validate() {
        ic_cdk::trap(format!("Invalid lease config: {}", e));
    }
    CONFIG.with(|c| c.borrow_mut().set(config));
}

// =============================================================================
// LIFECYCLE HOOKS
// =============================================================================

#[init]
fn init(args: Option<InitArgs>) {
    apply_config(args);
    let tickets = with_loader(|l| l.start());
    ic_cdk::println!("Chunk Loader Backend Initialized ({} tickets)", tickets);
}

#[pre_upgrade]
fn pre_upgrade() {
    // Claims, balances and the world mirror are stable already; only the
    // presence set and the tickets need handling.
    with_loader(|l| {
        let present = l.billing().present_owners();
        PRESENCE.with(|p| p.borrow_mut().set(PresenceList(present)));
        let released = l.stop();
        ic_cdk::println!("Pre-upgrade: released {} claims", released);
    });
}

#[post_upgrade]
fn post_upgrade(args: Option<InitArgs>) {
    apply_config(args);
    with_loader(|l| {
        let tickets = l.start();
        let owners = PRESENCE.with(|p| p.borrow().get().0.clone());
        let resumed = l.resume_billing(&owners);
        ic_cdk::println!("Post-upgrade: {} tickets, billing resumed for {} owners", tickets, resumed);
    });
}

// =============================================================================
// ACCESS CONTROL
// =============================================================================

/// The game server runs under a controller identity.
fn require_host() -> Result<(), String> {
    let caller = ic_cdk::api::msg_caller();
    if !ic_cdk::api::is_controller(&caller) {
        return Err("Unauthorized: host only".to_string());
    }
    Ok(())
}

// =============================================================================
// HOST ENDPOINTS
// =============================================================================

#[update]
fn submit_event(event: WorldEvent) -> Result<EventOutcome, String> {
    require_host()?;
    with_loader(|l| l.dispatch(event)).map_err(String::from)
}

/// Apply events in order; one failing event does not stop the batch.
#[update]
fn submit_events(events: Vec<WorldEvent>) -> Result<Vec<Result<EventOutcome, String>>, String> {
    require_host()?;
    Ok(with_loader(|l| {
        events
            .into_iter()
            .map(|event| l.dispatch(event).map_err(String::from))
            .collect()
    }))
}

#[update]
fn claim(owner: OwnerId, center: CellKey) -> Result<ClaimOutcome, String> {
    require_host()?;
    with_loader(|l| l.claim(&owner, &center)).map_err(String::from)
}

#[update]
fn release(owner: OwnerId, center: CellKey) -> Result<bool, String> {
    require_host()?;
    with_loader(|l| l.release(&owner, &center)).map_err(String::from)
}

#[update]
fn take_world_commands(limit: u32) -> Result<Vec<WorldCommand>, String> {
    require_host()?;
    let limit = limit.min(MAX_DRAIN_BATCH) as usize;
    Ok(with_loader(|l| l.manager_mut().world_mut().take_commands(limit)))
}

#[update]
fn take_notices(limit: u32) -> Result<Vec<Notice>, String> {
    require_host()?;
    let limit = limit.min(MAX_DRAIN_BATCH) as usize;
    Ok(with_loader(|l| l.manager_mut().notifier_mut().take(limit)))
}

#[update]
fn credit_funds(owner: OwnerId, amount: u64) -> Result<u64, String> {
    require_host()?;
    with_loader(|l| l.ledger_mut().credit(&owner, amount)).map_err(|e| e.to_string())
}

/// Manual retry of an owner's charge, e.g. right after crediting funds.
#[update]
fn billing_tick(owner: OwnerId) -> Result<TickOutcome, String> {
    require_host()?;
    with_loader(|l| l.billing_tick(&owner)).map_err(String::from)
}

// =============================================================================
// QUERIES
// =============================================================================

#[query]
fn get_claims(owner: OwnerId) -> Vec<CellKey> {
    read_loader(|l| l.manager().claims(&owner))
}

#[query]
fn list_owners() -> Vec<OwnerId> {
    read_loader(|l| l.manager().store().list_owners())
}

#[query]
fn get_balance(owner: OwnerId) -> u64 {
    read_loader(|l| l.ledger().balance(&owner))
}

#[query]
fn get_billing_status(owner: OwnerId) -> BillingStatus {
    read_loader(|l| l.billing_status(&owner))
}

#[query]
fn get_loaded_cells() -> Vec<CellKey> {
    read_loader(|l| l.manager().loaded_cells().into_iter().collect())
}

#[query]
fn get_config() -> LeaseConfig {
    CONFIG.with(|c| c.borrow().get().clone())
}

// =============================================================================
// ADMIN DIAGNOSTIC ENDPOINTS
// =============================================================================

#[query]
fn admin_audit_tickets() -> Result<u64, String> {
    admin_query::audit_tickets()
}

#[query]
fn admin_export_claims() -> Result<String, String> {
    admin_query::export_claims()
}

#[query]
fn admin_get_audit_log(offset: u64, limit: u64) -> Result<Vec<AuditEntry>, String> {
    admin_query::get_audit_log(offset, limit)
}

#[query]
fn admin_get_stats() -> Result<LoaderStats, String> {
    admin_query::get_stats()
}

ic_cdk::export_candid!();
