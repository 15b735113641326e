//! Game rules and shared game state

pub mod chat;
pub mod color;
pub mod combat;
pub mod map;
pub mod movement;
pub mod player;
pub mod registry;
pub mod server;
pub mod snapshot;
pub mod spawn;
pub mod turn;

pub use color::Color;
pub use map::{MapGrid, Tile, TilePos};
pub use player::{Player, Race, SessionId, Weapon};
pub use registry::JoinError;
pub use server::{GameServer, StatsReport};
