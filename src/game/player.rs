//! Player record, identity tags and weapon stats

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::color::Color;
use crate::util::time::unix_millis;

/// Server-assigned id of one connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cosmetic race tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Race {
    #[default]
    Human,
    Cat,
}

impl Race {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "human" => Some(Self::Human),
            "cat" => Some(Self::Cat),
            _ => None,
        }
    }
}

/// Weapon tag, decides attack range and damage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weapon {
    /// Short range, high damage
    #[default]
    Sword,
    /// Long range, low damage
    Spear,
}

impl Weapon {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sword" => Some(Self::Sword),
            "spear" => Some(Self::Spear),
            _ => None,
        }
    }

    pub fn stats(self) -> WeaponStats {
        WeaponStats::for_weapon(self)
    }
}

/// Attack parameters per weapon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaponStats {
    /// Hit points removed per hit
    pub damage: i32,
    /// Maximum Manhattan distance in tiles
    pub range: i64,
}

impl WeaponStats {
    pub fn for_weapon(weapon: Weapon) -> Self {
        match weapon {
            Weapon::Sword => Self { damage: 4, range: 1 },
            Weapon::Spear => Self { damage: 2, range: 2 },
        }
    }
}

/// Authoritative player state, owned by the registry
#[derive(Debug, Clone)]
pub struct Player {
    pub id: SessionId,
    pub name: String,
    pub race: Race,
    pub weapon: Weapon,

    // Position and last commanded destination
    pub x: f64,
    pub y: f64,
    pub target_x: f64,
    pub target_y: f64,

    pub hp: i32,
    pub color: Color,

    /// Unix millis of the last accepted continuous move
    pub last_move: u64,
    pub death_time: Option<Instant>,
}

impl Player {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SessionId,
        name: String,
        race: Race,
        weapon: Weapon,
        x: f64,
        y: f64,
        hp: i32,
        color: Color,
    ) -> Self {
        Self {
            id,
            name,
            race,
            weapon,
            x,
            y,
            target_x: x,
            target_y: y,
            hp,
            color,
            last_move: unix_millis(),
            death_time: None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.death_time.is_some()
    }

    /// Jump to a position with no interpolation on the server side
    pub fn place(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.target_x = x;
        self.target_y = y;
    }

    /// Subtract damage, clamping at zero
    ///
    /// Returns true exactly once: on the hit that flips the player to dead.
    pub fn take_damage(&mut self, damage: i32, now: Instant) -> bool {
        self.hp = (self.hp - damage).max(0);
        if self.hp == 0 && !self.is_dead() {
            self.death_time = Some(now);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(hp: i32) -> Player {
        Player::new(
            SessionId::new(),
            "Alice".into(),
            Race::Human,
            Weapon::Sword,
            16.0,
            16.0,
            hp,
            Color::new(1, 1, 1, 255),
        )
    }

    #[test]
    fn death_flips_once_and_hp_stays_clamped() {
        let now = Instant::now();
        let mut p = player(5);
        assert!(!p.take_damage(4, now));
        assert_eq!(p.hp, 1);
        assert!(p.take_damage(4, now));
        assert_eq!(p.hp, 0);
        assert!(p.is_dead());
        assert!(!p.take_damage(4, now));
        assert_eq!(p.hp, 0);
    }

    #[test]
    fn weapon_tradeoff() {
        let sword = Weapon::Sword.stats();
        let spear = Weapon::Spear.stats();
        assert!(sword.damage > spear.damage);
        assert!(spear.range > sword.range);
    }

    #[test]
    fn session_id_parses_its_display_form() {
        let id = SessionId::new();
        assert_eq!(SessionId::parse(&id.to_string()), Some(id));
        assert_eq!(SessionId::parse("nope"), None);
    }
}
