//! Continuous movement validation for the non-turn position channel

use super::map::MapGrid;

/// Limits applied to continuous movement
#[derive(Debug, Clone, Copy)]
pub struct MovementRules {
    /// Per-axis velocity clamp
    pub max_speed: f64,
    /// How far a claimed position may sit from the predicted one
    pub max_drift: f64,
    /// Minimum center-to-center distance to any other living player
    pub min_separation: f64,
}

/// What to do with a velocity intent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveVerdict {
    /// Non-finite input, dropped without a reply
    Invalid,
    /// Position the server ends up with; equal to the current one on rejection
    Settled { x: f64, y: f64, accepted: bool },
}

/// Movement system for checking claimed positions against the map
pub struct MovementSystem;

impl MovementSystem {
    /// Clamp a velocity component, rejecting NaN and infinities
    pub fn clamp_velocity(v: f64, max_speed: f64) -> Option<f64> {
        v.is_finite().then(|| v.clamp(-max_speed, max_speed))
    }

    /// Check a velocity intent with the client-claimed resulting position
    ///
    /// `current` is the authoritative position and `target` the last commanded
    /// one. The claim must land near `target + (dx, dy)`.
    pub fn check_move(
        map: &MapGrid,
        rules: &MovementRules,
        current: (f64, f64),
        target: (f64, f64),
        velocity: (f64, f64),
        claimed: (f64, f64),
        others: &[(f64, f64)],
    ) -> MoveVerdict {
        let (Some(dx), Some(dy)) = (
            Self::clamp_velocity(velocity.0, rules.max_speed),
            Self::clamp_velocity(velocity.1, rules.max_speed),
        ) else {
            return MoveVerdict::Invalid;
        };
        if !(claimed.0.is_finite() && claimed.1.is_finite()) {
            return MoveVerdict::Invalid;
        }

        let predicted = (target.0 + dx, target.1 + dy);
        let drifted = (claimed.0 - predicted.0).abs() > rules.max_drift
            || (claimed.1 - predicted.1).abs() > rules.max_drift;

        if !drifted && Self::is_free(map, rules, claimed, others) {
            MoveVerdict::Settled {
                x: claimed.0,
                y: claimed.1,
                accepted: true,
            }
        } else {
            MoveVerdict::Settled {
                x: current.0,
                y: current.1,
                accepted: false,
            }
        }
    }

    /// Check an idle resync position
    pub fn check_position(
        map: &MapGrid,
        rules: &MovementRules,
        claimed: (f64, f64),
        others: &[(f64, f64)],
    ) -> bool {
        Self::is_free(map, rules, claimed, others)
    }

    /// Footprint is walkable and nobody else stands too close
    fn is_free(map: &MapGrid, rules: &MovementRules, at: (f64, f64), others: &[(f64, f64)]) -> bool {
        map.is_position_valid(at.0, at.1)
            && others
                .iter()
                .all(|&(ox, oy)| (at.0 - ox).hypot(at.1 - oy) >= rules.min_separation)
    }
}
