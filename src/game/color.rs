//! Player colors and the uniqueness allocator

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::player::SessionId;

/// Random colors are drawn per channel from this range
const CHANNEL_MIN: u8 = 30;
const CHANNEL_MAX: u8 = 230;

/// Attempts before giving up on uniqueness
const MAX_COLOR_ATTEMPTS: usize = 100;

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Author color of system chat lines
    pub const SYSTEM: Color = Color::new(173, 216, 230, 255);
    /// Author color of death announcements
    pub const DEATH: Color = Color::new(255, 100, 100, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Packed `0xRRGGBBAA` key
    pub fn key(self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    pub fn from_key(key: u32) -> Self {
        let [r, g, b, a] = key.to_be_bytes();
        Self { r, g, b, a }
    }

    fn random<R: Rng>(rng: &mut R) -> Self {
        Self::new(
            rng.gen_range(CHANNEL_MIN..CHANNEL_MAX),
            rng.gen_range(CHANNEL_MIN..CHANNEL_MAX),
            rng.gen_range(CHANNEL_MIN..CHANNEL_MAX),
            255,
        )
    }
}

/// Colors currently reserved, keyed to their owning session
#[derive(Debug, Default)]
pub struct ColorAllocator {
    in_use: HashMap<u32, SessionId>,
}

impl ColorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_taken(&self, color: Color) -> bool {
        self.in_use.contains_key(&color.key())
    }

    /// Reserve a specific color; false if someone already holds it
    pub fn reserve(&mut self, color: Color, owner: SessionId) -> bool {
        if self.is_taken(color) {
            return false;
        }
        self.in_use.insert(color.key(), owner);
        true
    }

    /// Draw a random unused color and reserve it
    ///
    /// After the retry budget is spent an unchecked random color is returned
    /// unreserved, so duplicates are possible on a crowded palette.
    pub fn allocate<R: Rng>(&mut self, rng: &mut R, owner: SessionId) -> Color {
        for _ in 0..MAX_COLOR_ATTEMPTS {
            let color = Color::random(rng);
            if self.reserve(color, owner) {
                return color;
            }
        }
        tracing::warn!(session_id = %owner, "Color space exhausted, handing out a possibly duplicate color");
        Color::random(rng)
    }

    /// Release a color, but only if `owner` still holds it
    pub fn release(&mut self, color: Color, owner: SessionId) {
        if self.in_use.get(&color.key()) == Some(&owner) {
            self.in_use.remove(&color.key());
        }
    }

    pub fn in_use(&self) -> Vec<Color> {
        self.in_use.keys().copied().map(Color::from_key).collect()
    }

    pub fn len(&self) -> usize {
        self.in_use.len()
    }
}
