use candid::{CandidType, Deserialize};
use serde::Serialize;
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{Memory, StableBTreeMap, Storable};
use std::borrow::Cow;
use thiserror::Error;

use crate::types::OwnerId;

/// Oldest audit entries are pruned beyond this many.
pub const MAX_AUDIT_ENTRIES: u64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{owner} has {available} but {needed} is due")]
    InsufficientFunds { owner: OwnerId, available: u64, needed: u64 },
    #[error("crediting {amount} to {owner} would overflow the balance")]
    Overflow { owner: OwnerId, amount: u64 },
}

/// Funds the duty is paid from.
pub trait Ledger {
    fn balance(&self, owner: &str) -> u64;

    fn has_funds(&self, owner: &str, amount: u64) -> bool {
        self.balance(owner) >= amount
    }

    /// Take exactly `amount`; nothing is taken on error. Returns the new balance.
    fn withdraw(&mut self, owner: &str, amount: u64) -> Result<u64, LedgerError>;

    /// Called after an owner's leases were torn down for non-payment.
    fn on_revoked(&mut self, _owner: &str, _cells: u32) {}
}

// =============================================================================
// AUDIT LOG
// =============================================================================

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub enum AuditEvent {
    FundsCredited { owner: OwnerId, amount: u64 },
    FeeCharged { owner: OwnerId, amount: u64 },
    LeaseRevoked { owner: OwnerId, cells: u32 },
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: u64,
    pub event: AuditEvent,
}

impl Storable for AuditEntry {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(candid::encode_one(self).expect(
            "CRITICAL: Failed to encode AuditEntry. \
             This should never happen unless there's a bug in candid serialization. \
             Audit logging is failing - system integrity may be compromised."
        ))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<'_, [u8]>) -> Self {
        candid::decode_one(&bytes).expect(
            "CRITICAL: Failed to decode AuditEntry from stable storage. \
             This indicates audit log corruption or an incompatible upgrade. \
             Audit trail integrity cannot be guaranteed."
        )
    }

    const BOUND: Bound = Bound::Unbounded;
}

// =============================================================================
// STABLE LEDGER
// =============================================================================

/// Balances and their audit trail, both in stable memory.
pub struct StableLedger<M: Memory> {
    balances: StableBTreeMap<OwnerId, u64, M>,
    audit: StableBTreeMap<u64, AuditEntry, M>,
    clock: fn() -> u64,
}

impl<M: Memory> StableLedger<M> {
    /// `clock` supplies audit timestamps (`ic_cdk::api::time` in the canister).
    pub fn init(balances: M, audit: M, clock: fn() -> u64) -> Self {
        Self {
            balances: StableBTreeMap::init(balances),
            audit: StableBTreeMap::init(audit),
            clock,
        }
    }

    pub fn credit(&mut self, owner: &str, amount: u64) -> Result<u64, LedgerError> {
        let new_balance = self
            .balance(owner)
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow { owner: owner.to_string(), amount })?;
        self.balances.insert(owner.to_string(), new_balance);
        self.log_audit(AuditEvent::FundsCredited { owner: owner.to_string(), amount });
        Ok(new_balance)
    }

    pub fn audit_log(&self, offset: usize, limit: usize) -> Vec<AuditEntry> {
        self.audit.iter().skip(offset).take(limit).map(|entry| entry.value()).collect()
    }

    pub fn audit_len(&self) -> u64 {
        self.audit.len()
    }

    pub fn total_balances(&self) -> u64 {
        self.balances.iter().map(|entry| entry.value()).fold(0u64, u64::saturating_add)
    }

    fn log_audit(&mut self, event: AuditEvent) {
        let id = self.audit.last_key_value().map(|(id, _)| id + 1).unwrap_or(0);
        let entry = AuditEntry { id, timestamp: (self.clock)(), event };
        self.audit.insert(id, entry);
        while self.audit.len() > MAX_AUDIT_ENTRIES {
            self.audit.pop_first();
        }
    }
}

impl<M: Memory> Ledger for StableLedger<M> {
    fn balance(&self, owner: &str) -> u64 {
        self.balances.get(&owner.to_string()).unwrap_or(0)
    }

    fn withdraw(&mut self, owner: &str, amount: u64) -> Result<u64, LedgerError> {
        let available = self.balance(owner);
        let remaining = available.checked_sub(amount).ok_or_else(|| {
            LedgerError::InsufficientFunds { owner: owner.to_string(), available, needed: amount }
        })?;
        self.balances.insert(owner.to_string(), remaining);
        self.log_audit(AuditEvent::FeeCharged { owner: owner.to_string(), amount });
        Ok(remaining)
    }

    fn on_revoked(&mut self, owner: &str, cells: u32) {
        self.log_audit(AuditEvent::LeaseRevoked { owner: owner.to_string(), cells });
    }
}
