//! Central registry for stable memory IDs.
//!
//! IMPORTANT: All memory IDs must be unique across the entire canister.
//! Run `cargo test` to verify no collisions exist.
//!
//! Allocation strategy:
//! - 0-9: Configuration and presence
//! - 10-19: Claims and balances
//! - 20-29: World mirror (anchors, realms, command outbox)
//! - 30-39: Billing audit log

// Configuration and presence (0-9)
pub const CONFIG_MEMORY_ID: u8 = 0;
pub const PRESENCE_MEMORY_ID: u8 = 1;

// Claims and balances (10-19)
pub const CLAIMS_MEMORY_ID: u8 = 10;
pub const BALANCES_MEMORY_ID: u8 = 11;

// World mirror (20-29)
pub const ANCHORS_MEMORY_ID: u8 = 20;
pub const REALMS_MEMORY_ID: u8 = 21;
pub const OUTBOX_MEMORY_ID: u8 = 22;

// Billing audit (30-39)
pub const AUDIT_LOG_MAP_MEMORY_ID: u8 = 30;
