use std::collections::{BTreeMap, BTreeSet};

use crate::types::CellKey;
use crate::world::WorldRuntime;

/// Reference-counted force-load tickets.
///
/// Overlapping claim areas share cells; the world is only asked to load a
/// cell on its first reference and to release it on its last.
#[derive(Debug, Default)]
pub struct TicketLedger {
    tag: String,
    counts: BTreeMap<CellKey, u32>,
}

impl TicketLedger {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), counts: BTreeMap::new() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn acquire_area<W: WorldRuntime + ?Sized>(&mut self, world: &mut W, area: &BTreeSet<CellKey>) {
        for cell in area {
            let count = self.counts.entry(cell.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                world.force_load(cell, &self.tag);
            }
        }
    }

    pub fn release_area<W: WorldRuntime + ?Sized>(&mut self, world: &mut W, area: &BTreeSet<CellKey>) {
        for cell in area {
            let Some(count) = self.counts.get_mut(cell) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                self.counts.remove(cell);
                // An unloaded realm already dropped its tickets.
                if world.is_realm_loaded(&cell.realm) {
                    world.release_force_load(cell, &self.tag);
                }
            }
        }
    }

    /// Forget every ticket of `realm` without calling the world.
    pub fn forget_realm(&mut self, realm: &str) {
        self.counts.retain(|cell, _| cell.realm != realm);
    }

    pub fn is_loaded(&self, cell: &CellKey) -> bool {
        self.counts.contains_key(cell)
    }

    pub fn loaded_keys(&self) -> BTreeSet<CellKey> {
        self.counts.keys().cloned().collect()
    }

    pub fn references(&self, cell: &CellKey) -> u32 {
        self.counts.get(cell).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
