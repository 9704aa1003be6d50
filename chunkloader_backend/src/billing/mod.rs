//! Recurring duty charges for leased cells.

pub mod ledger;
pub mod scheduler;
pub mod timers;

pub use ledger::{AuditEntry, AuditEvent, Ledger, LedgerError, StableLedger};
pub use scheduler::{BillingScheduler, BillingState};
pub use timers::{IcTimers, PresenceList, TimerHost};
