use candid::{CandidType, Deserialize};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Stable opaque owner identifier (the player's UUID string).
pub type OwnerId = String;

/// Width of one cell in blocks along x and z.
pub const CELL_WIDTH: i32 = 16;

// =============================================================================
// CELL KEYS
// =============================================================================

/// Grid cell identity, formatted as `"realm:x:z"`.
///
/// The realm may itself contain `:` (namespaced worlds such as
/// `minecraft:overworld`); keys are parsed from the right.
#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub realm: String,
    pub x: i32,
    pub z: i32,
}

impl CellKey {
    pub fn new(realm: impl Into<String>, x: i32, z: i32) -> Self {
        Self { realm: realm.into(), x, z }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.realm, self.x, self.z)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CellKeyError {
    #[error("cell key '{key}' must have the form 'realm:x:z'")]
    SegmentCount { key: String },
    #[error("cell key '{key}' has an empty realm")]
    EmptyRealm { key: String },
    #[error("cell key '{key}' has a non-numeric coordinate '{segment}'")]
    Coordinate { key: String, segment: String },
}

impl FromStr for CellKey {
    type Err = CellKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let (Some(z), Some(x), Some(realm)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CellKeyError::SegmentCount { key: s.to_string() });
        };

        if realm.is_empty() {
            return Err(CellKeyError::EmptyRealm { key: s.to_string() });
        }

        let coordinate = |segment: &str| {
            segment.parse::<i32>().map_err(|_| CellKeyError::Coordinate {
                key: s.to_string(),
                segment: segment.to_string(),
            })
        };

        Ok(CellKey::new(realm, coordinate(x)?, coordinate(z)?))
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

/// Absolute block coordinate inside a realm.
#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub realm: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(realm: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self { realm: realm.into(), x, y, z }
    }

    /// The block directly above, or `None` at the top of the coordinate space.
    pub fn above(&self) -> Option<BlockPos> {
        let y = self.y.checked_add(1)?;
        Some(BlockPos { y, ..self.clone() })
    }

    pub fn below(&self) -> Option<BlockPos> {
        let y = self.y.checked_sub(1)?;
        Some(BlockPos { y, ..self.clone() })
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{},{},{}", self.realm, self.x, self.y, self.z)
    }
}

/// The block kinds the lease core cares about. Everything else is `Other`.
#[derive(CandidType, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Air,
    /// Lower half of an anchor (lodestone).
    AnchorBase,
    /// Upper half of an anchor (lightning rod), directly above the base.
    AnchorTop,
    Other,
}

// =============================================================================
// EVENTS & OUTCOMES
// =============================================================================

/// Everything the host reports to the canister goes through this enum.
#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// A complete anchor now stands at `base` (reported for either half being placed).
    AnchorCreated { owner: OwnerId, base: BlockPos },
    /// An anchor at `base` is being broken. Reported before the host clears the blocks.
    ///
    /// The host's own break drops the anchor items; handling this event only
    /// clears the blocks and never queues drops for the removed anchor.
    AnchorRemoved { actor: Option<OwnerId>, base: BlockPos },
    OwnerJoined { owner: OwnerId },
    OwnerLeft { owner: OwnerId },
    RealmLoaded { realm: String, min_y: i32, max_y: i32 },
    RealmUnloaded { realm: String },
    HostStarted,
    HostStopping,
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// Another claimed center sits inside the requested claim area.
    Overlapping { conflict: CellKey },
    /// The base block is not topped by an anchor top.
    NoAnchor,
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Created,
    AlreadyClaimed,
    Denied(DenyReason),
}

impl ClaimOutcome {
    pub fn created(&self) -> bool {
        matches!(self, ClaimOutcome::Created)
    }
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RevokedClaim {
    pub owner: OwnerId,
    pub cell: CellKey,
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Claim(ClaimOutcome),
    Revoked(Vec<RevokedClaim>),
    Presence { owner: OwnerId, active_claims: u32 },
    /// The owner went offline; `released` claims stopped being force-loaded.
    Left { owner: OwnerId, released: u32 },
    Reconciled { tickets: u64 },
    Observed,
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Charged { amount: u64, cells: u32 },
    Revoked { cells: Vec<CellKey> },
    Idle,
}

// =============================================================================
// HOST-BOUND OUTPUT
// =============================================================================

/// Side effects the host must apply to the real world, in order.
#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum WorldCommand {
    ForceLoad { cell: CellKey, tag: String },
    ReleaseForceLoad { cell: CellKey, tag: String },
    SetBlock { pos: BlockPos, kind: BlockKind },
    DropItem { pos: BlockPos, kind: BlockKind },
}

/// Audio cue accompanying a notice.
#[derive(CandidType, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cue {
    ClaimConfirmed,
    ClaimReleased,
    LeaseRevoked,
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    ClaimCreated { center: CellKey, area_width: u32 },
    ClaimDenied { center: CellKey, reason: DenyReason },
    ClaimReleased { center: CellKey },
    ClaimsLoaded { count: u32, interval_secs: u64 },
    FeePaid { amount: u64, cells: u32 },
    LeaseRevoked { cells: u32 },
}

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub owner: OwnerId,
    pub kind: NoticeKind,
    pub cue: Option<Cue>,
}

// =============================================================================
// QUERY TYPES
// =============================================================================

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BillingStatus {
    pub owner: OwnerId,
    pub present: bool,
    pub running: bool,
    pub claims: u32,
    pub duty_per_tick: u64,
    pub balance: u64,
}
