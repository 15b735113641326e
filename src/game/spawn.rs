//! Spawn locator

use rand::seq::SliceRandom;
use rand::Rng;

use super::map::MapGrid;

/// Pick a spawn point in the safe zone away from every live player
///
/// `occupied` holds the positions of alive players and `min_separation` is
/// a center-to-center distance in world units. If every cell is too crowded
/// the zone's first walkable cell is returned anyway.
pub fn find_safe_spawn<R: Rng>(
    map: &MapGrid,
    occupied: &[(f64, f64)],
    min_separation: f64,
    rng: &mut R,
) -> (f64, f64) {
    let mut cells = map.safe_zone_cells();
    let Some(&fallback) = cells.first() else {
        let (min, _) = map.safe_zone();
        return map.tile_center(min);
    };

    cells.shuffle(rng);
    cells
        .into_iter()
        .map(|cell| map.tile_center(cell))
        .find(|&(px, py)| {
            occupied
                .iter()
                .all(|&(ox, oy)| (px - ox).hypot(py - oy) >= min_separation)
        })
        .unwrap_or_else(|| map.tile_center(fallback))
}
