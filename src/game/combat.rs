//! Combat system - turn moves, attack range and damage

use std::time::Instant;

use super::map::MapGrid;
use super::player::{Player, SessionId, WeaponStats};

/// Why a turn move was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveRejection {
    #[error("missing destination")]
    MissingTarget,
    #[error("destination is not an adjacent cell")]
    NotAdjacent,
    #[error("destination is not walkable")]
    Blocked,
    #[error("destination is occupied")]
    Occupied,
}

/// Why an attack was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AttackRejection {
    #[error("missing or unknown target")]
    UnknownTarget,
    #[error("cannot attack yourself")]
    SelfTarget,
    #[error("target is already dead")]
    TargetDead,
    #[error("target out of range")]
    OutOfRange,
}

/// Result of an accepted attack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    Hit {
        target: SessionId,
        damage: i32,
        remaining_hp: i32,
    },
    Killed {
        target: SessionId,
        name: String,
    },
}

/// Combat rules; stateless, operates on player records
pub struct CombatSystem;

impl CombatSystem {
    /// Validate a one-cell step and return the cell-centered destination
    ///
    /// `others` are the positions of every other living player.
    pub fn check_turn_move(
        map: &MapGrid,
        mover: &Player,
        target: (Option<f64>, Option<f64>),
        others: &[(f64, f64)],
    ) -> Result<(f64, f64), MoveRejection> {
        let (Some(tx), Some(ty)) = target else {
            return Err(MoveRejection::MissingTarget);
        };
        if !(tx.is_finite() && ty.is_finite()) {
            return Err(MoveRejection::MissingTarget);
        }

        let from = map.tile_at(mover.x, mover.y);
        let to = map.tile_at(tx, ty);
        if !from.is_neighbor(to) {
            return Err(MoveRejection::NotAdjacent);
        }

        let (dest_x, dest_y) = map.tile_center(to);
        if !map.is_walkable(to) || !map.is_position_valid(dest_x, dest_y) {
            return Err(MoveRejection::Blocked);
        }

        if others.iter().any(|&(ox, oy)| map.tile_at(ox, oy) == to) {
            return Err(MoveRejection::Occupied);
        }

        Ok((dest_x, dest_y))
    }

    /// Check an attack and return the attacker's weapon stats if it lands
    pub fn check_attack(
        map: &MapGrid,
        attacker: &Player,
        target: &Player,
    ) -> Result<WeaponStats, AttackRejection> {
        if attacker.id == target.id {
            return Err(AttackRejection::SelfTarget);
        }
        if target.is_dead() {
            return Err(AttackRejection::TargetDead);
        }

        let stats = attacker.weapon.stats();
        let distance = map
            .tile_at(attacker.x, attacker.y)
            .manhattan(map.tile_at(target.x, target.y));
        if distance == 0 || distance > stats.range {
            return Err(AttackRejection::OutOfRange);
        }
        Ok(stats)
    }

    /// Apply a landed hit to the target
    pub fn apply_hit(target: &mut Player, stats: WeaponStats, now: Instant) -> AttackOutcome {
        if target.take_damage(stats.damage, now) {
            AttackOutcome::Killed {
                target: target.id,
                name: target.name.clone(),
            }
        } else {
            AttackOutcome::Hit {
                target: target.id,
                damage: stats.damage,
                remaining_hp: target.hp,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::color::Color;
    use crate::game::map::{Tile, TilePos};
    use crate::game::player::{Race, Weapon};

    fn map() -> MapGrid {
        MapGrid::open(10, 10, 32.0)
    }

    fn player_at(map: &MapGrid, tile: (i64, i64), weapon: Weapon) -> Player {
        let (x, y) = map.tile_center(TilePos::new(tile.0, tile.1));
        Player::new(
            SessionId::new(),
            "P".into(),
            Race::Human,
            weapon,
            x,
            y,
            10,
            Color::new(1, 1, 1, 255),
        )
    }

    #[test]
    fn sword_hits_adjacent_only() {
        let map = map();
        let bob = player_at(&map, (4, 4), Weapon::Sword);
        let near = player_at(&map, (5, 4), Weapon::Sword);
        let diagonal = player_at(&map, (5, 5), Weapon::Sword);
        assert_eq!(
            CombatSystem::check_attack(&map, &bob, &near),
            Ok(WeaponStats { damage: 4, range: 1 })
        );
        assert_eq!(
            CombatSystem::check_attack(&map, &bob, &diagonal),
            Err(AttackRejection::OutOfRange)
        );
    }

    #[test]
    fn spear_reaches_two_tiles() {
        let map = map();
        let bob = player_at(&map, (4, 4), Weapon::Spear);
        let two = player_at(&map, (5, 5), Weapon::Sword);
        let three = player_at(&map, (6, 5), Weapon::Sword);
        assert_eq!(CombatSystem::check_attack(&map, &bob, &two).map(|s| s.damage), Ok(2));
        assert_eq!(
            CombatSystem::check_attack(&map, &bob, &three),
            Err(AttackRejection::OutOfRange)
        );
    }

    #[test]
    fn same_tile_and_self_attacks_fail() {
        let map = map();
        let bob = player_at(&map, (4, 4), Weapon::Sword);
        let stacked = player_at(&map, (4, 4), Weapon::Sword);
        assert_eq!(
            CombatSystem::check_attack(&map, &bob, &stacked),
            Err(AttackRejection::OutOfRange)
        );
        assert_eq!(
            CombatSystem::check_attack(&map, &bob, &bob),
            Err(AttackRejection::SelfTarget)
        );
    }

    #[test]
    fn hits_until_death() {
        let map = map();
        let bob = player_at(&map, (4, 4), Weapon::Sword);
        let mut alice = player_at(&map, (4, 5), Weapon::Sword);
        let now = Instant::now();
        let stats = CombatSystem::check_attack(&map, &bob, &alice).unwrap();

        assert!(matches!(
            CombatSystem::apply_hit(&mut alice, stats, now),
            AttackOutcome::Hit { remaining_hp: 6, .. }
        ));
        CombatSystem::apply_hit(&mut alice, stats, now);
        assert!(matches!(
            CombatSystem::apply_hit(&mut alice, stats, now),
            AttackOutcome::Killed { .. }
        ));
        assert_eq!(alice.hp, 0);
        assert_eq!(
            CombatSystem::check_attack(&map, &bob, &alice),
            Err(AttackRejection::TargetDead)
        );
    }

    #[test]
    fn turn_move_rules() {
        let map = map().with_tile(TilePos::new(5, 4), Tile::Water);
        let bob = player_at(&map, (4, 4), Weapon::Sword);

        // Diagonal step lands on the cell center
        assert_eq!(
            CombatSystem::check_turn_move(&map, &bob, (Some(170.0), Some(170.0)), &[]),
            Ok((176.0, 176.0))
        );
        assert_eq!(
            CombatSystem::check_turn_move(&map, &bob, (Some(144.0), Some(144.0)), &[]),
            Err(MoveRejection::NotAdjacent)
        );
        assert_eq!(
            CombatSystem::check_turn_move(&map, &bob, (Some(208.0), Some(144.0)), &[]),
            Err(MoveRejection::NotAdjacent)
        );
        assert_eq!(
            CombatSystem::check_turn_move(&map, &bob, (Some(176.0), Some(144.0)), &[]),
            Err(MoveRejection::Blocked)
        );
        assert_eq!(
            CombatSystem::check_turn_move(&map, &bob, (Some(144.0), Some(176.0)), &[(150.0, 180.0)]),
            Err(MoveRejection::Occupied)
        );
        assert_eq!(
            CombatSystem::check_turn_move(&map, &bob, (None, Some(176.0)), &[]),
            Err(MoveRejection::MissingTarget)
        );
    }
}
