//! Claims: who leases which cell, and the tickets that keep leased areas loaded.

pub mod enforcer;
pub mod manager;
pub mod store;
pub mod tickets;

pub use enforcer::{RemovalReport, UniquenessEnforcer};
pub use manager::LeaseManager;
pub use store::{ClaimBlob, ClaimStore, StableClaimStore, StoreError};
pub use tickets::TicketLedger;
