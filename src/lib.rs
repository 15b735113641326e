//! Arena Server - authoritative turn-based multiplayer arena
//!
//! Players join over WebSocket, take turns moving and fighting on a shared
//! tile map, and chat. The server owns all game state and pushes snapshots
//! to every client.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;

pub use app::AppState;
pub use config::Config;
pub use http::build_router;
