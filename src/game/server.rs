//! The authoritative game server: join/leave, intents and the timer loops

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{Config, MovementMode};
use crate::util::time::{format_uptime, unix_millis, uptime_secs};
use crate::ws::connection::Connection;
use crate::ws::protocol::{ClientMsg, Handshake, ServerMsg, TurnAction};

use super::chat::{truncate_chars, ChatLog, ChatMessage, SYSTEM_SENDER};
use super::color::Color;
use super::combat::AttackOutcome;
use super::map::MapGrid;
use super::movement::{MoveVerdict, MovementRules};
use super::player::SessionId;
use super::registry::{
    Admission, Departed, JoinError, PlayerRegistry, RegistryLimits, RegistryTables,
};
use super::snapshot::SnapshotBuilder;
use super::turn::{Removal, TurnEngine};

/// Running counters for the stats endpoint and log
#[derive(Debug, Default)]
pub struct ServerStats {
    pub messages_sent: AtomicU64,
    pub chat_messages: AtomicU64,
    /// Unix millis of the last state broadcast
    pub last_update: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub players: usize,
    pub connections: usize,
    pub messages_sent: u64,
    pub chat_messages: u64,
    pub uptime: String,
    pub last_update: u64,
    pub map_size: String,
}

/// Shared game state
///
/// Lock order is fixed: registry, then turns. Turn actions and the timeout
/// check hold both for their whole step. Chat is never held together with
/// either. No lock is held across an await.
pub struct GameServer {
    config: Arc<Config>,
    map: MapGrid,
    registry: PlayerRegistry,
    turns: Mutex<TurnEngine>,
    chat: Mutex<ChatLog>,
    snapshots: SnapshotBuilder,
    stats: ServerStats,
    movement: MovementRules,
}

impl GameServer {
    /// Create a server with a freshly generated map
    pub fn new(config: Arc<Config>) -> Self {
        let mut rng = match config.map_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let map = MapGrid::generate(&mut rng, config.map_width, config.map_height, config.tile_size);
        info!(
            width = map.width(),
            height = map.height(),
            "Map generated with a 5x5 safe zone at the center"
        );
        Self::with_map(config, map)
    }

    pub fn with_map(config: Arc<Config>, map: MapGrid) -> Self {
        let tile = config.tile_size;
        Self {
            registry: PlayerRegistry::new(RegistryLimits {
                max_players: config.max_players,
                max_hp: config.max_hp,
                spawn_separation: tile * 1.5,
            }),
            turns: Mutex::new(TurnEngine::new(config.turn_timeout, Instant::now())),
            chat: Mutex::new(ChatLog::new(config.chat_history_cap)),
            snapshots: SnapshotBuilder::new(),
            stats: ServerStats::default(),
            movement: MovementRules {
                max_speed: config.max_speed,
                max_drift: config.max_position_drift,
                min_separation: tile * 0.7,
            },
            map,
            config,
        }
    }

    pub fn map(&self) -> &MapGrid {
        &self.map
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn turn_holder(&self) -> Option<SessionId> {
        self.turns.lock().holder()
    }

    pub fn used_colors(&self) -> Vec<Color> {
        self.registry.used_colors()
    }

    // ========================================================================
    // Join / leave
    // ========================================================================

    /// Register a new session from its handshake
    ///
    /// On success the joiner has received chat history, `init` and `map`, and
    /// everyone has seen the join announcement and a fresh snapshot.
    pub async fn join(
        &self,
        handshake: Handshake,
        connection: Arc<Connection>,
    ) -> Result<SessionId, JoinError> {
        let name = handshake.name.trim();
        if name.is_empty() {
            return Err(JoinError::EmptyName);
        }
        let admission = Admission {
            name: truncate_chars(name, self.config.max_name_len).to_string(),
            race: handshake.race,
            weapon: handshake.weapon,
            color: handshake.color.map(Color::from),
        };

        let (player, stale) = self
            .registry
            .admit(admission, Arc::clone(&connection), &self.map)?;
        for old in stale {
            old.close().await;
        }

        let now = Instant::now();
        self.turns.lock().join(player.id, now);

        info!(
            session_id = %player.id,
            name = %player.name,
            race = ?player.race,
            weapon = ?player.weapon,
            x = player.x,
            y = player.y,
            "Player joined"
        );

        let history = self.chat.lock().recent(self.config.chat_replay);
        for msg in &history {
            if let Err(e) = connection.send(&msg.to_server_msg()).await {
                debug!(session_id = %player.id, error = %e, "Chat replay failed");
                break;
            }
        }

        let init = ServerMsg::Init {
            id: player.id,
            x: player.x,
            y: player.y,
            color: player.color,
            race: player.race,
        };
        let map = ServerMsg::Map {
            data: self.map.rows().to_vec(),
        };
        for msg in [init, map] {
            if let Err(e) = connection.send(&msg).await {
                debug!(session_id = %player.id, error = %e, "Failed to send join payload");
            }
        }

        self.broadcast_chat(ChatMessage::system(format!("{} joined the game", player.name)))
            .await;
        self.broadcast_state().await;

        Ok(player.id)
    }

    /// Tear down a session after its socket ended
    pub async fn leave(&self, id: SessionId) {
        let Some(departed) = self.registry.remove(id) else {
            return;
        };
        self.finish_departure(departed, true).await;
        self.broadcast_state().await;
    }

    /// Close what's left of a removed session and fix the turn order
    async fn finish_departure(&self, departed: Departed, announce: bool) {
        if let Some(conn) = &departed.connection {
            conn.close().await;
        }

        let removal = self.turns.lock().remove(departed.id, Instant::now());
        if removal == Removal::Current {
            debug!(session_id = %departed.id, "Turn holder left, turn passed on");
        }

        if let Some(player) = departed.player {
            info!(session_id = %player.id, name = %player.name, "Player left");
            if announce {
                self.broadcast_chat(ChatMessage::system(format!("{} left the game", player.name)))
                    .await;
            }
        }
    }

    // ========================================================================
    // Intents
    // ========================================================================

    /// Dispatch one decoded client message
    pub async fn handle_message(&self, id: SessionId, msg: ClientMsg) {
        match msg {
            ClientMsg::Move { dx, dy, x, y } => self.handle_move(id, (dx, dy), (x, y)).await,
            ClientMsg::Position { x, y } => self.handle_position(id, (x, y)),
            ClientMsg::Chat { text } => self.handle_chat(id, text).await,
            ClientMsg::TurnAction(action) => self.handle_turn_action(id, action).await,
        }
    }

    /// Apply a turn action from the current holder; anyone else is ignored
    ///
    /// Any recognised action ends the turn, legal or not. The holder check,
    /// the action and the advance happen under one hold of both locks, so the
    /// timer cannot hand the turn on in between.
    pub async fn handle_turn_action(&self, id: SessionId, action: TurnAction) {
        let now = Instant::now();
        let victim = {
            let mut players = self.registry.lock();
            let mut turns = self.turns.lock();
            if !turns.is_holder(id) {
                debug!(session_id = %id, "Out-of-turn action ignored");
                return;
            }

            let expired = turns.is_expired(now);
            let victim = if expired || !players.is_alive(id) {
                debug!(session_id = %id, expired, "Turn action not applied");
                None
            } else {
                self.apply_turn_action(&mut players, id, action, now)
            };
            if let Some((target, _)) = &victim {
                turns.remove(*target, now);
            }
            if let Some(next) = turns.advance(now, |s| players.is_alive(s)) {
                debug!(next = %next, "Turn advanced");
            }
            victim
        };

        if let Some((_, name)) = victim {
            self.broadcast_chat(ChatMessage::new(
                SYSTEM_SENDER,
                format!("{} was killed", name),
                Color::DEATH,
            ))
            .await;
        }
        self.broadcast_state().await;
    }

    /// Resolve one holder action; returns the victim's id and name on a kill
    fn apply_turn_action(
        &self,
        players: &mut RegistryTables,
        id: SessionId,
        action: TurnAction,
        now: Instant,
    ) -> Option<(SessionId, String)> {
        match action {
            TurnAction::Skip => debug!(session_id = %id, "Turn skipped"),
            TurnAction::Move { target_x, target_y } => {
                match players.apply_turn_move(id, &self.map, (target_x, target_y)) {
                    Ok((x, y)) => debug!(session_id = %id, x, y, "Turn move"),
                    Err(e) => debug!(session_id = %id, reason = %e, "Turn move rejected"),
                }
            }
            TurnAction::Attack { target_id } => {
                let Some(target) = target_id.as_deref().and_then(SessionId::parse) else {
                    debug!(session_id = %id, "Attack without a valid target");
                    return None;
                };
                match players.apply_attack(id, target, &self.map, now) {
                    Ok(AttackOutcome::Hit {
                        damage,
                        remaining_hp,
                        ..
                    }) => {
                        debug!(session_id = %id, target = %target, damage, remaining_hp, "Attack hit");
                    }
                    Ok(AttackOutcome::Killed { target, name }) => return Some((target, name)),
                    Err(e) => {
                        debug!(session_id = %id, target = %target, reason = %e, "Attack rejected")
                    }
                }
            }
        }
        None
    }

    /// Continuous movement intent; always answered unless the input is garbage
    pub async fn handle_move(&self, id: SessionId, velocity: (f64, f64), claimed: (f64, f64)) {
        let verdict = match self.config.movement_mode {
            MovementMode::Free => {
                self.registry
                    .apply_free_move(id, &self.map, &self.movement, velocity, claimed)
            }
            MovementMode::Turns => {
                if !(velocity.0.is_finite() && velocity.1.is_finite()) {
                    return;
                }
                self.registry.position(id).map(|(x, y)| MoveVerdict::Settled {
                    x,
                    y,
                    accepted: false,
                })
            }
        };

        let Some(MoveVerdict::Settled { x, y, accepted }) = verdict else {
            debug!(session_id = %id, "Invalid move intent dropped");
            return;
        };
        if !accepted {
            debug!(session_id = %id, x, y, "Move rejected, snapping back");
        }

        if let Some(conn) = self.registry.connection(id) {
            let ack = ServerMsg::MoveAck {
                x,
                y,
                ts: unix_millis(),
            };
            if conn.send(&ack).await.is_ok() {
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Idle position resync, only honored in free movement mode
    pub fn handle_position(&self, id: SessionId, claimed: (f64, f64)) {
        if self.config.movement_mode != MovementMode::Free {
            return;
        }
        if !self
            .registry
            .apply_position(id, &self.map, &self.movement, claimed)
        {
            debug!(session_id = %id, "Position resync rejected");
        }
    }

    pub async fn handle_chat(&self, id: SessionId, text: String) {
        let Some((name, color)) = self.registry.identity(id) else {
            return;
        };
        if text.is_empty() {
            return;
        }
        let text = truncate_chars(&text, self.config.max_chat_len);
        self.stats.chat_messages.fetch_add(1, Ordering::Relaxed);
        self.broadcast_chat(ChatMessage::new(name, text, color)).await;
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Force the turn on if its holder timed out, died or vanished
    pub fn check_turn_timeout(&self, now: Instant) -> Option<SessionId> {
        let players = self.registry.lock();
        let mut turns = self.turns.lock();
        let holder = turns.holder()?;
        if players.is_alive(holder) && !turns.is_expired(now) {
            return None;
        }
        let next = turns.advance(now, |id| players.is_alive(id));
        info!(
            session_id = %holder,
            next = ?next.map(|n| n.to_string()),
            "Turn timed out"
        );
        next
    }

    // ========================================================================
    // Broadcast
    // ========================================================================

    fn build_snapshot(&self, now: Instant) -> Option<ServerMsg> {
        let players = self.registry.snapshot()?;
        let turn = {
            let turns = self.turns.lock();
            turns.holder().map(|holder| (holder, turns.time_left(now)))
        };
        Some(self.snapshots.build(players, turn))
    }

    /// Push one snapshot to every connection; skipped when nobody is registered
    ///
    /// A connection still busy with an earlier frame misses this one.
    pub async fn broadcast_state(&self) {
        let Some(snapshot) = self.build_snapshot(Instant::now()) else {
            return;
        };
        let payload = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode snapshot");
                return;
            }
        };

        fan_out_latest(&self.registry.connections(), &payload).await;
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.stats.last_update.store(unix_millis(), Ordering::Relaxed);
    }

    /// Record a chat line and push it to everyone right away
    pub async fn broadcast_chat(&self, msg: ChatMessage) {
        self.chat.lock().push(msg.clone());
        let payload = match serde_json::to_string(&msg.to_server_msg()) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode chat message");
                return;
            }
        };
        fan_out(&self.registry.connections(), &payload).await;
    }

    // ========================================================================
    // Cleanup and stats
    // ========================================================================

    /// Reap closed connections and expired corpses
    pub async fn cleanup(&self, now: Instant) {
        let closed = self.registry.sweep_closed();
        let corpses = self
            .registry
            .sweep_corpses(now, self.config.corpse_retention);
        if closed.is_empty() && corpses.is_empty() {
            return;
        }

        for departed in closed {
            debug!(session_id = %departed.id, "Reaped closed connection");
            self.finish_departure(departed, true).await;
        }
        for departed in corpses {
            debug!(session_id = %departed.id, "Purged corpse");
            self.finish_departure(departed, false).await;
        }
        self.broadcast_state().await;
    }

    pub fn stats_report(&self) -> StatsReport {
        StatsReport {
            players: self.registry.player_count(),
            connections: self.registry.connection_count(),
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            chat_messages: self.stats.chat_messages.load(Ordering::Relaxed),
            uptime: format_uptime(uptime_secs()),
            last_update: self.stats.last_update.load(Ordering::Relaxed),
            map_size: format!("{}x{}", self.map.width(), self.map.height()),
        }
    }

    // ========================================================================
    // Timer loops
    // ========================================================================

    /// Push snapshots at a fixed cadence
    ///
    /// Each tick's fan-out runs detached. It never queues behind a slow
    /// socket, so at most one snapshot per connection is in flight.
    pub async fn run_broadcast_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.broadcast_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let server = Arc::clone(&self);
            tokio::spawn(async move { server.broadcast_state().await });
        }
    }

    pub async fn run_turn_timer(self: Arc<Self>) {
        let mut ticker = interval(self.config.turn_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.check_turn_timeout(Instant::now());
        }
    }

    pub async fn run_cleanup_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.cleanup(Instant::now()).await;
        }
    }

    pub async fn run_stats_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.stats_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = self.stats_report();
            info!(
                players = report.players,
                connections = report.connections,
                messages_sent = report.messages_sent,
                chat_messages = report.chat_messages,
                uptime = %report.uptime,
                "Server stats"
            );
        }
    }
}

/// Send one payload to many connections concurrently
///
/// Each send carries its own write deadline; a failure closes only that
/// connection.
async fn fan_out(connections: &[Arc<Connection>], payload: &str) {
    let sends = connections
        .iter()
        .map(|conn| conn.send_text(payload.to_owned()));
    for result in join_all(sends).await {
        if let Err(e) = result {
            debug!(error = %e, "Dropped frame for a connection");
        }
    }
}

/// Send a state frame to every connection that is not mid-write
async fn fan_out_latest(connections: &[Arc<Connection>], payload: &str) {
    let sends = connections
        .iter()
        .map(|conn| conn.send_latest(payload.to_owned()));
    let mut skipped = 0usize;
    for result in join_all(sends).await {
        match result {
            Ok(true) => {}
            Ok(false) => skipped += 1,
            Err(e) => debug!(error = %e, "Dropped frame for a connection"),
        }
    }
    if skipped > 0 {
        debug!(skipped, "Snapshot skipped for busy connections");
    }
}
