//! Turn engine: round-robin turn order with deadline-driven advancement
//!
//! Time is passed in explicitly so every transition can be driven from tests
//! without a clock or a network.

use std::time::{Duration, Instant};

use super::player::SessionId;

/// Observable state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Turn order is empty
    Idle,
    /// `holder` may act until `deadline`
    Active {
        holder: SessionId,
        deadline: Instant,
    },
}

/// Where a removed session sat relative to the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    NotPresent,
    BeforeCurrent,
    /// The holder left; the turn passed on and the timer was reset
    Current,
    AfterCurrent,
}

#[derive(Debug)]
pub struct TurnEngine {
    /// Join order, preserved across removals
    order: Vec<SessionId>,
    /// Always in `[0, order.len())` while `order` is non-empty
    current: usize,
    started_at: Instant,
    timeout: Duration,
}

impl TurnEngine {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            order: Vec::new(),
            current: 0,
            started_at: now,
            timeout,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        match self.order.get(self.current) {
            Some(&holder) => TurnPhase::Active {
                holder,
                deadline: self.started_at + self.timeout,
            },
            None => TurnPhase::Idle,
        }
    }

    pub fn holder(&self) -> Option<SessionId> {
        self.order.get(self.current).copied()
    }

    pub fn is_holder(&self, id: SessionId) -> bool {
        self.holder() == Some(id)
    }

    pub fn order(&self) -> &[SessionId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append a session; the first one becomes the holder immediately
    pub fn join(&mut self, id: SessionId, now: Instant) {
        if self.order.contains(&id) {
            return;
        }
        self.order.push(id);
        if self.order.len() == 1 {
            self.current = 0;
            self.restart(now);
        }
    }

    /// Drop a session from the order, keeping `current` on the same logical holder
    pub fn remove(&mut self, id: SessionId, now: Instant) -> Removal {
        let Some(idx) = self.order.iter().position(|&s| s == id) else {
            return Removal::NotPresent;
        };
        self.order.remove(idx);

        if self.order.is_empty() {
            self.current = 0;
            return Removal::Current;
        }

        match idx.cmp(&self.current) {
            std::cmp::Ordering::Less => {
                self.current -= 1;
                Removal::BeforeCurrent
            }
            std::cmp::Ordering::Equal => {
                // The follower slid into this slot; wrap if the holder was last
                if self.current >= self.order.len() {
                    self.current = 0;
                }
                self.restart(now);
                Removal::Current
            }
            std::cmp::Ordering::Greater => Removal::AfterCurrent,
        }
    }

    /// Pass the turn to the next session for which `is_alive` holds
    ///
    /// Returns the new holder, or `None` when idle.
    pub fn advance(&mut self, now: Instant, is_alive: impl Fn(SessionId) -> bool) -> Option<SessionId> {
        let len = self.order.len();
        if len == 0 {
            return None;
        }
        let next = (1..=len)
            .map(|step| (self.current + step) % len)
            .find(|&idx| is_alive(self.order[idx]))
            .unwrap_or((self.current + 1) % len);
        self.current = next;
        self.restart(now);
        self.holder()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        !self.order.is_empty() && now.saturating_duration_since(self.started_at) > self.timeout
    }

    /// Remaining budget of the current turn, floored at zero
    pub fn time_left(&self, now: Instant) -> Duration {
        self.timeout
            .saturating_sub(now.saturating_duration_since(self.started_at))
    }

    fn restart(&mut self, now: Instant) {
        self.started_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(20);

    fn engine_with(n: usize) -> (TurnEngine, Vec<SessionId>, Instant) {
        let now = Instant::now();
        let mut engine = TurnEngine::new(BUDGET, now);
        let ids: Vec<SessionId> = (0..n).map(|_| SessionId::new()).collect();
        for &id in &ids {
            engine.join(id, now);
        }
        (engine, ids, now)
    }

    #[test]
    fn idle_until_first_join() {
        let now = Instant::now();
        let mut engine = TurnEngine::new(BUDGET, now);
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert!(!engine.is_expired(now + BUDGET * 2));

        let alice = SessionId::new();
        engine.join(alice, now);
        assert_eq!(
            engine.phase(),
            TurnPhase::Active {
                holder: alice,
                deadline: now + BUDGET
            }
        );
    }

    #[test]
    fn later_joins_do_not_steal_the_turn() {
        let (engine, ids, _) = engine_with(3);
        assert_eq!(engine.holder(), Some(ids[0]));
        assert_eq!(engine.order(), &ids[..]);
    }

    #[test]
    fn advance_wraps_and_resets_timer() {
        let (mut engine, ids, now) = engine_with(2);
        let later = now + Duration::from_secs(15);
        assert_eq!(engine.advance(later, |_| true), Some(ids[1]));
        assert_eq!(engine.time_left(later), BUDGET);
        assert_eq!(engine.advance(later, |_| true), Some(ids[0]));
    }

    #[test]
    fn advance_skips_dead_sessions() {
        let (mut engine, ids, now) = engine_with(4);
        let dead = [ids[1], ids[2]];
        assert_eq!(engine.advance(now, |id| !dead.contains(&id)), Some(ids[3]));
        assert_eq!(engine.advance(now, |id| !dead.contains(&id)), Some(ids[0]));
    }

    #[test]
    fn removal_before_current_keeps_holder() {
        let (mut engine, ids, now) = engine_with(3);
        engine.advance(now, |_| true);
        engine.advance(now, |_| true);
        assert_eq!(engine.holder(), Some(ids[2]));

        let later = now + Duration::from_secs(5);
        assert_eq!(engine.remove(ids[0], later), Removal::BeforeCurrent);
        assert_eq!(engine.holder(), Some(ids[2]));
        // Timer keeps running for the same holder
        assert_eq!(engine.time_left(later), BUDGET - Duration::from_secs(5));
    }

    #[test]
    fn removal_after_current_is_untouched() {
        let (mut engine, ids, now) = engine_with(3);
        assert_eq!(engine.remove(ids[2], now), Removal::AfterCurrent);
        assert_eq!(engine.holder(), Some(ids[0]));
    }

    #[test]
    fn removing_holder_passes_turn_and_resets_timer() {
        let (mut engine, ids, now) = engine_with(3);
        let later = now + Duration::from_secs(12);
        assert_eq!(engine.remove(ids[0], later), Removal::Current);
        assert_eq!(engine.holder(), Some(ids[1]));
        assert_eq!(engine.time_left(later), BUDGET);
    }

    #[test]
    fn removing_last_holder_wraps_to_front() {
        let (mut engine, ids, now) = engine_with(3);
        engine.advance(now, |_| true);
        engine.advance(now, |_| true);
        assert_eq!(engine.remove(ids[2], now), Removal::Current);
        assert_eq!(engine.holder(), Some(ids[0]));
    }

    #[test]
    fn removing_everyone_goes_idle() {
        let (mut engine, ids, now) = engine_with(1);
        assert_eq!(engine.remove(ids[0], now), Removal::Current);
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert_eq!(engine.remove(ids[0], now), Removal::NotPresent);
        assert_eq!(engine.advance(now, |_| true), None);
    }

    #[test]
    fn expiry_and_time_left() {
        let (engine, _, now) = engine_with(2);
        assert!(!engine.is_expired(now + BUDGET));
        assert!(engine.is_expired(now + BUDGET + Duration::from_millis(1)));
        assert_eq!(engine.time_left(now + BUDGET * 2), Duration::ZERO);
    }

    #[test]
    fn index_always_in_bounds_under_churn() {
        let (mut engine, mut ids, now) = engine_with(5);
        for round in 0..20 {
            if round % 3 == 0 && !ids.is_empty() {
                let victim = ids.remove(round % ids.len());
                engine.remove(victim, now);
            } else {
                let id = SessionId::new();
                ids.push(id);
                engine.join(id, now);
            }
            engine.advance(now, |_| true);
            if engine.is_empty() {
                assert_eq!(engine.phase(), TurnPhase::Idle);
            } else {
                assert!(engine.holder().is_some());
            }
        }
    }
}
