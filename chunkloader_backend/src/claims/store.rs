use ic_stable_structures::storable::Bound;
use ic_stable_structures::{Memory, StableBTreeMap, Storable};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::geometry;
use crate::types::{CellKey, OwnerId, RevokedClaim};

/// Upper bound on one owner's serialized claim list.
pub const MAX_CLAIM_BLOB_BYTES: usize = 64 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to encode claims of {owner}: {reason}")]
    Encode { owner: OwnerId, reason: String },
    #[error("claims of {owner} encode to {len} bytes, above the limit of {max}")]
    TooLarge { owner: OwnerId, len: usize, max: usize },
    #[error("claim {key} of {owner} would not read back")]
    Unreadable { owner: OwnerId, key: String },
}

/// Durable owner -> claimed cells mapping.
pub trait ClaimStore {
    /// Claimed cells of `owner` in insertion order. Unknown owners have none.
    fn get(&self, owner: &str) -> Vec<CellKey>;

    /// Replace the owner's whole claim set. Persisted before returning.
    fn set(&mut self, owner: &str, cells: Vec<CellKey>) -> Result<(), StoreError>;

    /// Every owner ever written, including those whose set is now empty.
    fn list_owners(&self) -> Vec<OwnerId>;
}

// =============================================================================
// STABLE STORE
// =============================================================================

/// JSON array of `"realm:x:z"` strings, kept as raw bytes so a corrupt
/// entry degrades to an empty claim set instead of trapping the canister.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimBlob(pub Vec<u8>);

impl Storable for ClaimBlob {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.0)
    }

    fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    fn from_bytes(bytes: Cow<'_, [u8]>) -> Self {
        ClaimBlob(bytes.into_owned())
    }

    const BOUND: Bound = Bound::Unbounded;
}

pub struct StableClaimStore<M: Memory> {
    claims: StableBTreeMap<OwnerId, ClaimBlob, M>,
}

impl<M: Memory> StableClaimStore<M> {
    pub fn init(memory: M) -> Self {
        Self { claims: StableBTreeMap::init(memory) }
    }

    pub fn owner_count(&self) -> u64 {
        self.claims.len()
    }
}

impl<M: Memory> ClaimStore for StableClaimStore<M> {
    fn get(&self, owner: &str) -> Vec<CellKey> {
        let Some(blob) = self.claims.get(&owner.to_string()) else {
            return Vec::new();
        };

        let raw: Vec<String> = match serde_json::from_slice(&blob.0) {
            Ok(raw) => raw,
            Err(e) => {
                log!("Discarding unreadable claim list of {}: {}", owner, e);
                return Vec::new();
            }
        };

        let mut seen = BTreeSet::new();
        let mut cells = Vec::with_capacity(raw.len());
        for entry in raw {
            match entry.parse::<CellKey>() {
                Ok(cell) => {
                    if seen.insert(cell.clone()) {
                        cells.push(cell);
                    }
                }
                Err(e) => log!("Discarding malformed claim of {}: {}", owner, e),
            }
        }
        cells
    }

    fn set(&mut self, owner: &str, cells: Vec<CellKey>) -> Result<(), StoreError> {
        let mut seen = BTreeSet::new();
        let keys: Vec<String> = cells
            .into_iter()
            .filter(|cell| seen.insert(cell.clone()))
            .map(|cell| cell.to_string())
            .collect();

        // A key that cannot be parsed back would be dropped on the next read.
        if let Some(key) = keys.iter().find(|key| key.parse::<CellKey>().is_err()) {
            return Err(StoreError::Unreadable { owner: owner.to_string(), key: key.clone() });
        }

        let bytes = serde_json::to_vec(&keys).map_err(|e| StoreError::Encode {
            owner: owner.to_string(),
            reason: e.to_string(),
        })?;
        if bytes.len() > MAX_CLAIM_BLOB_BYTES {
            return Err(StoreError::TooLarge {
                owner: owner.to_string(),
                len: bytes.len(),
                max: MAX_CLAIM_BLOB_BYTES,
            });
        }

        self.claims.insert(owner.to_string(), ClaimBlob(bytes));
        Ok(())
    }

    fn list_owners(&self) -> Vec<OwnerId> {
        self.claims.iter().map(|entry| entry.key().clone()).collect()
    }
}

// =============================================================================
// QUERIES OVER ANY STORE
// =============================================================================

/// The owner holding `cell`, from a fresh scan of the store.
pub fn owner_of<S: ClaimStore + ?Sized>(store: &S, cell: &CellKey) -> Option<OwnerId> {
    store
        .list_owners()
        .into_iter()
        .find(|owner| store.get(owner).contains(cell))
}

/// Every (owner, cell) pair in the store.
pub fn all_claims<S: ClaimStore + ?Sized>(store: &S) -> Vec<RevokedClaim> {
    let mut all = Vec::new();
    for owner in store.list_owners() {
        for cell in store.get(&owner) {
            all.push(RevokedClaim { owner: owner.clone(), cell });
        }
    }
    all
}

/// Remove every claim matching `revoke` from every owner.
///
/// Only owners whose set actually changed are rewritten.
pub fn strip_where<S, F>(store: &mut S, revoke: F) -> Result<Vec<RevokedClaim>, StoreError>
where
    S: ClaimStore + ?Sized,
    F: Fn(&CellKey) -> bool,
{
    let mut revoked = Vec::new();
    for owner in store.list_owners() {
        let cells = store.get(&owner);
        let (gone, kept): (Vec<CellKey>, Vec<CellKey>) = cells.into_iter().partition(|c| revoke(c));
        if gone.is_empty() {
            continue;
        }
        store.set(&owner, kept)?;
        revoked.extend(gone.into_iter().map(|cell| RevokedClaim { owner: owner.clone(), cell }));
    }
    Ok(revoked)
}

pub fn strip_cell<S: ClaimStore + ?Sized>(
    store: &mut S,
    cell: &CellKey,
) -> Result<Vec<RevokedClaim>, StoreError> {
    strip_where(store, |c| c == cell)
}

/// Strip every claim within `radius` of `center`, sparing `keep`.
pub fn strip_neighborhood<S: ClaimStore + ?Sized>(
    store: &mut S,
    center: &CellKey,
    radius: u32,
    keep: Option<&CellKey>,
) -> Result<Vec<RevokedClaim>, StoreError> {
    strip_where(store, |c| geometry::within(c, center, radius) && Some(c) != keep)
}

/// `{owner: ["realm:x:z", ...]}` for every owner, sorted by owner.
pub fn export_json<S: ClaimStore + ?Sized>(store: &S) -> Result<String, StoreError> {
    let snapshot: BTreeMap<OwnerId, Vec<String>> = store
        .list_owners()
        .into_iter()
        .map(|owner| {
            let keys = store.get(&owner).iter().map(|c| c.to_string()).collect();
            (owner, keys)
        })
        .collect();

    serde_json::to_string(&snapshot).map_err(|e| StoreError::Encode {
        owner: "*".to_string(),
        reason: e.to_string(),
    })
}
