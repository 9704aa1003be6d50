//! Pure cell arithmetic: keys, square areas and block-to-cell mapping.

use std::collections::BTreeSet;

use crate::types::{BlockPos, CellKey, CELL_WIDTH};

pub fn cell_key(realm: &str, x: i32, z: i32) -> CellKey {
    CellKey::new(realm, x, z)
}

/// All cells of the (2·radius+1)² square centered on `center`, inclusive.
///
/// Cells whose coordinates would overflow `i32` are left out.
pub fn area_keys(center: &CellKey, radius: u32) -> BTreeSet<CellKey> {
    let r = radius as i64;
    let mut area = BTreeSet::new();
    for dz in -r..=r {
        for dx in -r..=r {
            let (Ok(x), Ok(z)) = (
                i32::try_from(center.x as i64 + dx),
                i32::try_from(center.z as i64 + dz),
            ) else {
                continue;
            };
            area.insert(CellKey::new(center.realm.clone(), x, z));
        }
    }
    area
}

/// Chessboard distance between two cells, `None` across realms.
pub fn chebyshev(a: &CellKey, b: &CellKey) -> Option<u32> {
    if a.realm != b.realm {
        return None;
    }
    let dx = (a.x as i64 - b.x as i64).unsigned_abs();
    let dz = (a.z as i64 - b.z as i64).unsigned_abs();
    u32::try_from(dx.max(dz)).ok()
}

/// True when `cell` lies in `area_keys(center, radius)`.
pub fn within(cell: &CellKey, center: &CellKey, radius: u32) -> bool {
    chebyshev(cell, center).is_some_and(|d| d <= radius)
}

pub fn cell_of_block(pos: &BlockPos) -> CellKey {
    CellKey::new(
        pos.realm.clone(),
        pos.x.div_euclid(CELL_WIDTH),
        pos.z.div_euclid(CELL_WIDTH),
    )
}

/// Lowest block x/z of a cell, `None` if the cell lies outside block space.
pub fn cell_origin(cell: &CellKey) -> Option<(i32, i32)> {
    Some((cell.x.checked_mul(CELL_WIDTH)?, cell.z.checked_mul(CELL_WIDTH)?))
}
