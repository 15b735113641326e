//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// How continuous movement intents are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementMode {
    /// Positions only change through turn actions
    Turns,
    /// Continuous `move`/`position` intents are applied as well
    Free,
}

impl FromStr for MovementMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "turns" => Ok(Self::Turns),
            "free" => Ok(Self::Free),
            _ => Err(ConfigError::Invalid("MOVEMENT_MODE")),
        }
    }
}

/// Application configuration, fixed at process start
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of text
    pub log_json: bool,
    /// Allowed client origins for CORS, `None` allows any
    pub client_origin: Option<String>,

    /// Seed for the map generator, random when unset
    pub map_seed: Option<u64>,
    /// Map width in tiles
    pub map_width: usize,
    /// Map height in tiles
    pub map_height: usize,
    /// World units per tile
    pub tile_size: f64,

    /// Live player cap
    pub max_players: usize,
    /// Starting (and maximum) health
    pub max_hp: i32,
    /// Maximum display name length in characters
    pub max_name_len: usize,

    /// Per-turn budget
    pub turn_timeout: Duration,
    /// How often the turn timeout is checked
    pub turn_check_interval: Duration,

    /// Per-axis clamp for continuous velocity intents
    pub max_speed: f64,
    /// Continuous or turn-only movement
    pub movement_mode: MovementMode,
    /// Maximum distance a claimed position may stray from the predicted one
    pub max_position_drift: f64,
    /// Continuous movement intents allowed per second per connection
    pub movement_rate_limit: u32,

    /// How long a dead player's record lingers
    pub corpse_retention: Duration,
    /// Chat ring capacity
    pub chat_history_cap: usize,
    /// Messages replayed to a joining session
    pub chat_replay: usize,
    /// Maximum chat text length in characters
    pub max_chat_len: usize,

    /// Snapshot push cadence
    pub broadcast_interval: Duration,
    /// Reaper cadence
    pub cleanup_interval: Duration,
    /// Stats log cadence
    pub stats_interval: Duration,
    /// Per-frame write deadline
    pub write_timeout: Duration,
    /// Time a new socket has to send its handshake
    pub handshake_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            log_json: false,
            client_origin: None,
            map_seed: None,
            map_width: 100,
            map_height: 100,
            tile_size: 32.0,
            max_players: 10,
            max_hp: 10,
            max_name_len: 20,
            turn_timeout: Duration::from_secs(20),
            turn_check_interval: Duration::from_secs(1),
            max_speed: 8.0,
            movement_mode: MovementMode::Turns,
            max_position_drift: 50.0,
            movement_rate_limit: 30,
            corpse_retention: Duration::from_secs(30),
            chat_history_cap: 1000,
            chat_replay: 50,
            max_chat_len: 200,
            broadcast_interval: Duration::from_millis(33),
            cleanup_interval: Duration::from_secs(5),
            stats_interval: Duration::from_secs(10),
            write_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // PORT wins over SERVER_ADDR so container platforms work unchanged
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| defaults.server_addr.to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
            map_seed: optional("MAP_SEED")?,
            map_width: optional("MAP_WIDTH")?.unwrap_or(defaults.map_width),
            map_height: optional("MAP_HEIGHT")?.unwrap_or(defaults.map_height),
            tile_size: optional("TILE_SIZE")?.unwrap_or(defaults.tile_size),
            max_players: optional("MAX_PLAYERS")?.unwrap_or(defaults.max_players),
            turn_timeout: optional("TURN_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.turn_timeout),
            max_speed: optional("MAX_SPEED")?.unwrap_or(defaults.max_speed),
            corpse_retention: optional("CORPSE_RETENTION_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.corpse_retention),
            chat_history_cap: optional("CHAT_HISTORY_CAP")?.unwrap_or(defaults.chat_history_cap),
            movement_mode: optional("MOVEMENT_MODE")?.unwrap_or(defaults.movement_mode),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // The 5x5 safe zone must fit inside the map
        if self.map_width < 5 || self.map_height < 5 {
            return Err(ConfigError::Invalid("MAP_WIDTH/MAP_HEIGHT"));
        }
        if !(self.tile_size.is_finite() && self.tile_size > 0.0) {
            return Err(ConfigError::Invalid("TILE_SIZE"));
        }
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("MAX_PLAYERS"));
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(ConfigError::Invalid("MAX_SPEED"));
        }
        if self.chat_history_cap == 0 {
            return Err(ConfigError::Invalid("CHAT_HISTORY_CAP"));
        }
        Ok(())
    }
}

/// Parse an optional environment variable
fn optional<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_mode_parses_case_insensitively() {
        assert_eq!("Turns".parse::<MovementMode>().unwrap(), MovementMode::Turns);
        assert_eq!(" free ".parse::<MovementMode>().unwrap(), MovementMode::Free);
        assert!("teleport".parse::<MovementMode>().is_err());
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.turn_timeout, Duration::from_secs(20));
        assert_eq!(config.max_players, 10);
    }

    #[test]
    fn rejects_tiny_map() {
        let config = Config {
            map_width: 3,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
