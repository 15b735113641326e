//! Tile map: walkability grid, world/tile conversions and the generator

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Half-width of the square spawn zone around the map center
const SAFE_ZONE_RADIUS: usize = 2;

/// One grid cell; serialized as `0`, `1` or `2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tile {
    Walkable = 0,
    Water = 1,
    Rock = 2,
}

impl Tile {
    pub fn is_walkable(self) -> bool {
        self == Tile::Walkable
    }
}

impl Serialize for Tile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Tile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(Tile::Walkable),
            1 => Ok(Tile::Water),
            2 => Ok(Tile::Rock),
            other => Err(serde::de::Error::custom(format!("unknown tile {}", other))),
        }
    }
}

/// Tile coordinate (column, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePos {
    pub x: i64,
    pub y: i64,
}

impl TilePos {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: TilePos) -> i64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// True for the eight surrounding cells, false for the cell itself
    pub fn is_neighbor(self, other: TilePos) -> bool {
        let (dx, dy) = ((self.x - other.x).abs(), (self.y - other.y).abs());
        dx <= 1 && dy <= 1 && (dx, dy) != (0, 0)
    }
}

/// Static per-session walkability grid
///
/// Immutable after generation and shared without a lock.
#[derive(Debug, Clone)]
pub struct MapGrid {
    width: usize,
    height: usize,
    tile_size: f64,
    tiles: Vec<Vec<Tile>>,
}

impl MapGrid {
    /// An all-walkable grid
    pub fn open(width: usize, height: usize, tile_size: f64) -> Self {
        Self {
            width,
            height,
            tile_size,
            tiles: vec![vec![Tile::Walkable; width]; height],
        }
    }

    /// Generate lakes and rock clusters, keeping the center safe zone clear
    pub fn generate<R: Rng>(rng: &mut R, width: usize, height: usize, tile_size: f64) -> Self {
        let mut map = Self::open(width, height, tile_size);

        // Feature placement needs margin; tiny maps stay open
        if width > 24 && height > 24 {
            let lakes = rng.gen_range(5..10);
            for _ in 0..lakes {
                map.place_lake(rng);
            }
            let rocks = rng.gen_range(10..20);
            for _ in 0..rocks {
                map.place_rock(rng);
            }
        }

        map
    }

    fn place_lake<R: Rng>(&mut self, rng: &mut R) {
        for _ in 0..100 {
            let cx = rng.gen_range(10..self.width - 10) as i64;
            let cy = rng.gen_range(10..self.height - 10) as i64;
            if self.in_safe_zone(TilePos::new(cx, cy)) {
                continue;
            }
            let rx: i64 = rng.gen_range(4..10);
            let ry: i64 = rng.gen_range(4..10);
            for dy in -ry..=ry {
                for dx in -rx..=rx {
                    // Inside the ellipse (dx/rx)^2 + (dy/ry)^2 <= 1
                    if dx * dx * ry * ry + dy * dy * rx * rx <= rx * rx * ry * ry {
                        let pos = TilePos::new(cx + dx, cy + dy);
                        if self.in_bounds(pos) && !self.in_safe_zone(pos) {
                            self.set(pos, Tile::Water);
                        }
                    }
                }
            }
            return;
        }
    }

    fn place_rock<R: Rng>(&mut self, rng: &mut R) {
        for _ in 0..100 {
            let cx = rng.gen_range(6..self.width - 6) as i64;
            let cy = rng.gen_range(6..self.height - 6) as i64;
            let seed = TilePos::new(cx, cy);
            if self.in_safe_zone(seed) {
                continue;
            }
            let size = rng.gen_range(5..13);
            self.grow_rock(rng, seed, size);
            return;
        }
    }

    /// Grow a rock cluster from `seed` by random walk over open neighbors
    fn grow_rock<R: Rng>(&mut self, rng: &mut R, seed: TilePos, size: usize) {
        const DIRS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
        let mut cells = vec![seed];
        self.set(seed, Tile::Rock);

        let max_attempts = size * 10;
        let mut attempts = 0;
        while cells.len() < size && attempts < max_attempts {
            let Some(&parent) = cells.choose(rng) else {
                break;
            };
            let open: Vec<TilePos> = DIRS
                .iter()
                .map(|(dx, dy)| TilePos::new(parent.x + dx, parent.y + dy))
                .filter(|p| self.tile(*p) == Some(Tile::Walkable) && !self.in_safe_zone(*p))
                .collect();
            match open.choose(rng) {
                Some(&next) => {
                    self.set(next, Tile::Rock);
                    cells.push(next);
                    attempts = 0;
                }
                None => attempts += 1,
            }
        }
    }

    fn set(&mut self, pos: TilePos, tile: Tile) {
        if self.in_bounds(pos) {
            self.tiles[pos.y as usize][pos.x as usize] = tile;
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Rows of tiles, as sent to clients
    pub fn rows(&self) -> &[Vec<Tile>] {
        &self.tiles
    }

    pub fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    pub fn tile(&self, pos: TilePos) -> Option<Tile> {
        self.in_bounds(pos)
            .then(|| self.tiles[pos.y as usize][pos.x as usize])
    }

    pub fn is_walkable(&self, pos: TilePos) -> bool {
        self.tile(pos).is_some_and(Tile::is_walkable)
    }

    /// Tile containing a world position
    pub fn tile_at(&self, x: f64, y: f64) -> TilePos {
        TilePos::new(
            (x / self.tile_size).floor() as i64,
            (y / self.tile_size).floor() as i64,
        )
    }

    /// World position of a tile's center
    pub fn tile_center(&self, pos: TilePos) -> (f64, f64) {
        (
            pos.x as f64 * self.tile_size + self.tile_size / 2.0,
            pos.y as f64 * self.tile_size + self.tile_size / 2.0,
        )
    }

    /// Footprint test: the point plus eight offsets a third of a tile away must all be walkable
    pub fn is_position_valid(&self, x: f64, y: f64) -> bool {
        if !(x.is_finite() && y.is_finite()) {
            return false;
        }
        let r = self.tile_size / 3.0;
        [
            (0.0, 0.0),
            (-r, -r),
            (r, -r),
            (-r, r),
            (r, r),
            (-r, 0.0),
            (r, 0.0),
            (0.0, -r),
            (0.0, r),
        ]
        .iter()
        .all(|(dx, dy)| self.is_walkable(self.tile_at(x + dx, y + dy)))
    }

    /// Inclusive tile bounds of the center spawn zone
    pub fn safe_zone(&self) -> (TilePos, TilePos) {
        let (cx, cy) = ((self.width / 2) as i64, (self.height / 2) as i64);
        let r = SAFE_ZONE_RADIUS as i64;
        (TilePos::new(cx - r, cy - r), TilePos::new(cx + r, cy + r))
    }

    pub fn in_safe_zone(&self, pos: TilePos) -> bool {
        let (min, max) = self.safe_zone();
        pos.x >= min.x && pos.x <= max.x && pos.y >= min.y && pos.y <= max.y
    }

    /// Walkable cells of the safe zone in row-major order
    pub fn safe_zone_cells(&self) -> Vec<TilePos> {
        let (min, max) = self.safe_zone();
        (min.y..=max.y)
            .flat_map(|y| (min.x..=max.x).map(move |x| TilePos::new(x, y)))
            .filter(|p| self.is_walkable(*p))
            .collect()
    }

    /// Test helper: overwrite a single tile
    #[cfg(test)]
    pub fn with_tile(mut self, pos: TilePos, tile: Tile) -> Self {
        self.set(pos, tile);
        self
    }
}
