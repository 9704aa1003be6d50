use candid::{CandidType, Deserialize};
use serde::Serialize;

use crate::billing::AuditEntry;
use crate::claims::store;
use crate::world::WorldRuntime;
use crate::{read_loader, require_host};

const MAX_PAGINATION_LIMIT: u64 = 100;

#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct LoaderStats {
    pub ready: bool,
    pub owners: u64,
    pub claims: u64,
    pub loaded_cells: u64,
    pub anchors: u64,
    pub running_timers: u64,
    pub pending_commands: u64,
    pub pending_notices: u64,
    pub dropped_notices: u64,
    pub total_balances: u64,
    pub audit_entries: u64,
}

/// Verify that the held tickets match the active claim areas.
///
/// # Returns
/// - `Ok(u64)`: number of tickets held.
/// - `Err(String)`: the first inconsistency found, or "Unauthorized: host only".
pub fn audit_tickets() -> Result<u64, String> {
    require_host()?;
    read_loader(|l| l.manager().audit_tickets()).map(|n| n as u64)
}

/// Every owner's claims as `{owner: ["realm:x:z", ...]}`.
pub fn export_claims() -> Result<String, String> {
    require_host()?;
    read_loader(|l| store::export_json(l.manager().store())).map_err(|e| e.to_string())
}

pub fn get_audit_log(offset: u64, limit: u64) -> Result<Vec<AuditEntry>, String> {
    require_host()?;
    let limit = limit.min(MAX_PAGINATION_LIMIT) as usize;
    Ok(read_loader(|l| l.ledger().audit_log(offset as usize, limit)))
}

pub fn get_stats() -> Result<LoaderStats, String> {
    require_host()?;
    Ok(read_loader(|l| {
        let manager = l.manager();
        let world = manager.world();
        let notices = manager.notifier();
        LoaderStats {
            ready: l.is_ready(),
            owners: manager.store().owner_count(),
            claims: store::all_claims(manager.store()).len() as u64,
            loaded_cells: manager.tickets().len() as u64,
            anchors: world.anchor_count(),
            running_timers: l.billing().running_count() as u64,
            pending_commands: world.pending_commands(),
            pending_notices: notices.len() as u64,
            dropped_notices: notices.dropped(),
            total_balances: l.ledger().total_balances(),
            audit_entries: l.ledger().audit_len(),
        }
    }))
}
