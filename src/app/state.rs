//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::GameServer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub server: Arc<GameServer>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Generates the map
        let server = Arc::new(GameServer::new(Arc::clone(&config)));

        Self { config, server }
    }

    /// Spawn the broadcast, turn timer, cleanup and stats loops
    pub fn spawn_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(&self.server).run_broadcast_loop()),
            tokio::spawn(Arc::clone(&self.server).run_turn_timer()),
            tokio::spawn(Arc::clone(&self.server).run_cleanup_loop()),
            tokio::spawn(Arc::clone(&self.server).run_stats_loop()),
        ]
    }
}
