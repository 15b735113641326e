//! Player registry: players, connections, names and colors behind one lock

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::color::{Color, ColorAllocator};
use super::combat::{AttackOutcome, AttackRejection, CombatSystem, MoveRejection};
use super::map::MapGrid;
use super::movement::{MoveVerdict, MovementRules, MovementSystem};
use super::player::{Player, Race, SessionId, Weapon};
use super::spawn::find_safe_spawn;
use crate::util::time::unix_millis;
use crate::ws::connection::Connection;
use crate::ws::protocol::PlayerSnapshot;

/// Handshake rejections; the message is shown to the client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Malformed handshake: {0}")]
    Malformed(String),

    #[error("Name is required")]
    EmptyName,

    #[error("Name '{0}' is already taken")]
    NameTaken(String),

    #[error("Server is full (max {0} players)")]
    ServerFull(usize),

    #[error("Selected color is already taken")]
    ColorTaken,
}

/// A validated join request
#[derive(Debug, Clone)]
pub struct Admission {
    pub name: String,
    pub race: Race,
    pub weapon: Weapon,
    pub color: Option<Color>,
}

/// What was torn down when a session left the registry
pub struct Departed {
    pub id: SessionId,
    pub player: Option<Player>,
    pub connection: Option<Arc<Connection>>,
}

/// Registry limits, taken from the server config
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub max_players: usize,
    pub max_hp: i32,
    pub spawn_separation: f64,
}

/// The registry's tables, reachable only through the registry lock
#[derive(Default)]
pub struct RegistryTables {
    players: HashMap<SessionId, Player>,
    connections: HashMap<SessionId, Arc<Connection>>,
    names: HashMap<String, SessionId>,
    colors: ColorAllocator,
}

impl RegistryTables {
    fn live_positions_except(&self, id: SessionId) -> Vec<(f64, f64)> {
        self.players
            .values()
            .filter(|p| p.id != id && !p.is_dead())
            .map(|p| (p.x, p.y))
            .collect()
    }

    /// Free a player's name and color, if it still owns them
    fn release_identity(&mut self, player: &Player) {
        if self.names.get(&player.name) == Some(&player.id) {
            self.names.remove(&player.name);
        }
        self.colors.release(player.color, player.id);
    }

    pub fn is_alive(&self, id: SessionId) -> bool {
        self.players.get(&id).is_some_and(|p| !p.is_dead())
    }

    /// Step a living player one cell as its turn action
    pub fn apply_turn_move(
        &mut self,
        id: SessionId,
        map: &MapGrid,
        target: (Option<f64>, Option<f64>),
    ) -> Result<(f64, f64), MoveRejection> {
        let others = self.live_positions_except(id);
        let Some(mover) = self.players.get_mut(&id).filter(|p| !p.is_dead()) else {
            return Err(MoveRejection::MissingTarget);
        };
        let (x, y) = CombatSystem::check_turn_move(map, mover, target, &others)?;
        mover.place(x, y);
        Ok((x, y))
    }

    /// Resolve an attack; a kill frees the victim's name and color
    pub fn apply_attack(
        &mut self,
        attacker_id: SessionId,
        target_id: SessionId,
        map: &MapGrid,
        now: Instant,
    ) -> Result<AttackOutcome, AttackRejection> {
        let attacker = self
            .players
            .get(&attacker_id)
            .filter(|p| !p.is_dead())
            .cloned()
            .ok_or(AttackRejection::UnknownTarget)?;
        let target = self
            .players
            .get_mut(&target_id)
            .ok_or(AttackRejection::UnknownTarget)?;

        let stats = CombatSystem::check_attack(map, &attacker, target)?;
        let outcome = CombatSystem::apply_hit(target, stats, now);

        if let AttackOutcome::Killed { .. } = outcome {
            let victim = target.clone();
            self.release_identity(&victim);
            info!(
                session_id = %victim.id,
                name = %victim.name,
                killer = %attacker.name,
                "Player killed"
            );
        }
        Ok(outcome)
    }

    fn remove(&mut self, id: SessionId) -> Option<Departed> {
        let player = self.players.remove(&id);
        if let Some(p) = &player {
            self.release_identity(p);
        }
        let connection = self.connections.remove(&id);
        if player.is_none() && connection.is_none() {
            return None;
        }
        Some(Departed {
            id,
            player,
            connection,
        })
    }
}

/// Authoritative player and connection state
///
/// Every read or write happens under one short, non-async lock. The turn lock
/// is only ever taken while this one is held or after it is released.
pub struct PlayerRegistry {
    tables: Mutex<RegistryTables>,
    limits: RegistryLimits,
}

impl PlayerRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            tables: Mutex::new(RegistryTables::default()),
            limits,
        }
    }

    /// Reserve identity, spawn the player and register its connection
    ///
    /// Every rejection is decided before anything changes. Dead players holding
    /// the same name are then purged; their connections come back in the
    /// second tuple field so the caller can close them.
    pub fn admit(
        &self,
        req: Admission,
        connection: Arc<Connection>,
        map: &MapGrid,
    ) -> Result<(Player, Vec<Arc<Connection>>), JoinError> {
        let mut rng = rand::thread_rng();
        let mut tables = self.tables.lock();

        if let Some(owner) = tables.names.get(&req.name) {
            let owner_alive = tables.players.get(owner).is_some_and(|p| !p.is_dead());
            if owner_alive {
                return Err(JoinError::NameTaken(req.name));
            }
        }

        let live = tables.players.values().filter(|p| !p.is_dead()).count();
        if live >= self.limits.max_players {
            return Err(JoinError::ServerFull(self.limits.max_players));
        }
        if req.color.is_some_and(|c| tables.colors.is_taken(c)) {
            return Err(JoinError::ColorTaken);
        }

        // Past this point the join cannot fail
        let stale: Vec<SessionId> = tables
            .players
            .values()
            .filter(|p| p.is_dead() && p.name == req.name)
            .map(|p| p.id)
            .collect();
        let mut stale_connections = Vec::new();
        for old in stale {
            if let Some(departed) = tables.remove(old) {
                debug!(session_id = %old, name = %req.name, "Purged dead holder of reused name");
                stale_connections.extend(departed.connection);
            }
        }
        // A name entry whose owner vanished is stale too
        tables.names.remove(&req.name);

        let id = SessionId::new();
        let color = match req.color {
            Some(color) => {
                tables.colors.reserve(color, id);
                color
            }
            None => tables.colors.allocate(&mut rng, id),
        };

        let occupied = tables.live_positions_except(id);
        let (x, y) = find_safe_spawn(map, &occupied, self.limits.spawn_separation, &mut rng);

        let player = Player::new(
            id,
            req.name,
            req.race,
            req.weapon,
            x,
            y,
            self.limits.max_hp,
            color,
        );
        tables.names.insert(player.name.clone(), id);
        tables.players.insert(id, player.clone());
        tables.connections.insert(id, connection);

        Ok((player, stale_connections))
    }

    /// Remove a session's player, connection, name and color
    pub fn remove(&self, id: SessionId) -> Option<Departed> {
        self.tables.lock().remove(id)
    }

    pub fn is_alive(&self, id: SessionId) -> bool {
        self.tables.lock().is_alive(id)
    }

    /// Hold the registry lock across several steps
    ///
    /// Another lock (the turn engine) may be taken while this guard is held,
    /// never the other way around.
    pub fn lock(&self) -> MutexGuard<'_, RegistryTables> {
        self.tables.lock()
    }

    /// Name and color of a registered player
    pub fn identity(&self, id: SessionId) -> Option<(String, Color)> {
        self.tables
            .lock()
            .players
            .get(&id)
            .map(|p| (p.name.clone(), p.color))
    }

    pub fn position(&self, id: SessionId) -> Option<(f64, f64)> {
        self.tables.lock().players.get(&id).map(|p| (p.x, p.y))
    }

    pub fn player(&self, id: SessionId) -> Option<Player> {
        self.tables.lock().players.get(&id).cloned()
    }

    pub fn connection(&self, id: SessionId) -> Option<Arc<Connection>> {
        self.tables.lock().connections.get(&id).cloned()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.tables.lock().connections.values().cloned().collect()
    }

    /// Registered player records, dead ones included
    pub fn player_count(&self) -> usize {
        self.tables.lock().players.len()
    }

    pub fn connection_count(&self) -> usize {
        self.tables.lock().connections.len()
    }

    pub fn used_colors(&self) -> Vec<Color> {
        self.tables.lock().colors.in_use()
    }

    /// Snapshot rows for every living player, or `None` when nobody is registered
    pub fn snapshot(&self) -> Option<Vec<PlayerSnapshot>> {
        let tables = self.tables.lock();
        if tables.players.is_empty() {
            return None;
        }
        Some(
            tables
                .players
                .values()
                .filter(|p| !p.is_dead())
                .map(|p| PlayerSnapshot {
                    id: p.id,
                    name: p.name.clone(),
                    race: p.race,
                    x: p.x,
                    y: p.y,
                    tx: p.target_x,
                    ty: p.target_y,
                    hp: p.hp,
                    color: p.color,
                })
                .collect(),
        )
    }

    /// Step a living player one cell as its turn action
    pub fn apply_turn_move(
        &self,
        id: SessionId,
        map: &MapGrid,
        target: (Option<f64>, Option<f64>),
    ) -> Result<(f64, f64), MoveRejection> {
        self.tables.lock().apply_turn_move(id, map, target)
    }

    /// Resolve an attack; a kill frees the victim's name and color
    pub fn apply_attack(
        &self,
        attacker_id: SessionId,
        target_id: SessionId,
        map: &MapGrid,
        now: Instant,
    ) -> Result<AttackOutcome, AttackRejection> {
        self.tables.lock().apply_attack(attacker_id, target_id, map, now)
    }

    /// Apply a continuous velocity intent
    pub fn apply_free_move(
        &self,
        id: SessionId,
        map: &MapGrid,
        rules: &MovementRules,
        velocity: (f64, f64),
        claimed: (f64, f64),
    ) -> Option<MoveVerdict> {
        let mut tables = self.tables.lock();
        let others = tables.live_positions_except(id);
        let player = tables.players.get_mut(&id).filter(|p| !p.is_dead())?;

        let verdict = MovementSystem::check_move(
            map,
            rules,
            (player.x, player.y),
            (player.target_x, player.target_y),
            velocity,
            claimed,
            &others,
        );
        if let MoveVerdict::Settled {
            x,
            y,
            accepted: true,
        } = verdict
        {
            player.place(x, y);
            player.last_move = unix_millis();
        }
        Some(verdict)
    }

    /// Apply an idle position resync; returns whether it was accepted
    pub fn apply_position(
        &self,
        id: SessionId,
        map: &MapGrid,
        rules: &MovementRules,
        claimed: (f64, f64),
    ) -> bool {
        let mut tables = self.tables.lock();
        let others = tables.live_positions_except(id);
        let Some(player) = tables.players.get_mut(&id).filter(|p| !p.is_dead()) else {
            return false;
        };
        if !MovementSystem::check_position(map, rules, claimed, &others) {
            return false;
        }
        player.place(claimed.0, claimed.1);
        player.last_move = unix_millis();
        true
    }

    /// Move a player without any validation
    #[cfg(test)]
    pub(crate) fn teleport(&self, id: SessionId, x: f64, y: f64) {
        if let Some(p) = self.tables.lock().players.get_mut(&id) {
            p.place(x, y);
        }
    }

    /// Remove every session whose connection is flagged closed
    pub fn sweep_closed(&self) -> Vec<Departed> {
        let mut tables = self.tables.lock();
        let closed: Vec<SessionId> = tables
            .connections
            .iter()
            .filter(|(_, c)| c.is_closed())
            .map(|(id, _)| *id)
            .collect();
        closed
            .into_iter()
            .filter_map(|id| tables.remove(id))
            .collect()
    }

    /// Remove corpses older than `retention`
    pub fn sweep_corpses(&self, now: Instant, retention: Duration) -> Vec<Departed> {
        let mut tables = self.tables.lock();
        let expired: Vec<SessionId> = tables
            .players
            .values()
            .filter(|p| {
                p.death_time
                    .is_some_and(|t| now.saturating_duration_since(t) > retention)
            })
            .map(|p| p.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| tables.remove(id))
            .collect()
    }
}
