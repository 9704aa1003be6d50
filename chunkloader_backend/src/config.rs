use candid::{CandidType, Deserialize};
use ic_stable_structures::storable::Bound;
use ic_stable_structures::Storable;
use std::borrow::Cow;
use thiserror::Error;

// =============================================================================
// DEFAULTS
// =============================================================================

/// 3x3 force-loaded area around each claimed center.
pub const DEFAULT_CLAIM_RADIUS: u32 = 1;
/// 3x3 neighborhood scanned for duplicate anchors.
pub const DEFAULT_ENFORCEMENT_RADIUS: u32 = 1;
/// 30 minutes between duty charges.
pub const DEFAULT_BILLING_INTERVAL_SECS: u64 = 30 * 60;
pub const DEFAULT_DUTY_PER_CELL: u64 = 30;
pub const DEFAULT_TICKET_TAG: &str = "chunkloader";

/// Enforcement scans are proportional to the neighborhood area times column height.
pub const MAX_ENFORCEMENT_RADIUS: u32 = 4;
pub const MAX_CLAIM_RADIUS: u32 = 16;

/// Unapplied world commands at which new claims are refused until the host drains.
pub const MAX_PENDING_COMMANDS: u64 = 50_000;

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LeaseConfig {
    pub claim_radius: u32,
    pub enforcement_radius: u32,
    pub billing_interval_secs: u64,
    pub duty_per_cell: u64,
    pub ticket_tag: String,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            claim_radius: DEFAULT_CLAIM_RADIUS,
            enforcement_radius: DEFAULT_ENFORCEMENT_RADIUS,
            billing_interval_secs: DEFAULT_BILLING_INTERVAL_SECS,
            duty_per_cell: DEFAULT_DUTY_PER_CELL,
            ticket_tag: DEFAULT_TICKET_TAG.to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("billing interval must be at least one second")]
    ZeroInterval,
    #[error("enforcement radius {0} exceeds the maximum of {max}", max = MAX_ENFORCEMENT_RADIUS)]
    EnforcementRadiusTooLarge(u32),
    #[error("claim radius {0} exceeds the maximum of {max}", max = MAX_CLAIM_RADIUS)]
    ClaimRadiusTooLarge(u32),
    #[error("ticket tag must not be empty")]
    EmptyTicketTag,
}

impl LeaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.billing_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.enforcement_radius > MAX_ENFORCEMENT_RADIUS {
            return Err(ConfigError::EnforcementRadiusTooLarge(self.enforcement_radius));
        }
        if self.claim_radius > MAX_CLAIM_RADIUS {
            return Err(ConfigError::ClaimRadiusTooLarge(self.claim_radius));
        }
        if self.ticket_tag.is_empty() {
            return Err(ConfigError::EmptyTicketTag);
        }
        Ok(())
    }

    /// Side length of a claim area in cells.
    pub fn area_width(&self) -> u32 {
        self.claim_radius * 2 + 1
    }
}

/// Optional install argument.
#[derive(CandidType, Deserialize, Clone, Debug, Default)]
pub struct InitArgs {
    pub config: Option<LeaseConfig>,
}

impl Storable for LeaseConfig {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(candid::encode_one(self).expect(
            "CRITICAL: Failed to encode LeaseConfig. \
             This should never happen unless there's a bug in candid serialization."
        ))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<'_, [u8]>) -> Self {
        candid::decode_one(&bytes).expect(
            "CRITICAL: Failed to decode LeaseConfig from stable storage. \
             This indicates storage corruption or an incompatible canister upgrade."
        )
    }

    const BOUND: Bound = Bound::Unbounded;
}
