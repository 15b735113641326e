//! Snapshot building

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::util::time::unix_millis;
use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

use super::player::SessionId;

/// Builds state snapshots with non-decreasing timestamps
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    last_ts: AtomicU64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall-clock millis, never earlier than a previously issued stamp
    pub fn next_ts(&self) -> u64 {
        let now = unix_millis();
        let prev = self.last_ts.fetch_max(now, Ordering::AcqRel);
        prev.max(now)
    }

    /// Build a state message
    pub fn build(
        &self,
        players: Vec<PlayerSnapshot>,
        turn: Option<(SessionId, Duration)>,
    ) -> ServerMsg {
        ServerMsg::State {
            ts: self.next_ts(),
            data: players,
            current_turn: turn.map(|(holder, _)| holder),
            turn_time_left: turn.map(|(_, left)| left.as_secs_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_never_go_backwards() {
        let builder = SnapshotBuilder::new();
        // Pretend a stamp from the future was already issued
        builder.last_ts.store(unix_millis() + 60_000, Ordering::Release);
        let a = builder.next_ts();
        let b = builder.next_ts();
        assert!(b >= a);
        assert!(a >= unix_millis() + 59_000);
    }

    #[test]
    fn carries_turn_info_when_active() {
        let builder = SnapshotBuilder::new();
        let holder = SessionId::new();
        match builder.build(vec![], Some((holder, Duration::from_millis(1500)))) {
            ServerMsg::State {
                current_turn,
                turn_time_left,
                ..
            } => {
                assert_eq!(current_turn, Some(holder));
                assert_eq!(turn_time_left, Some(1.5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
