//! Application state module
//!
//! Contains the shared state used across all server connections.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::crypto::ServerKeyPair;
use crate::error::Result;
use crate::game::player::PlayerRegistry;
use crate::game::{BasicPlayHandler, PlayHandler};
use crate::net::session::{SessionId, SessionRegistry};

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Every connected session
    pub sessions: SessionRegistry,
    /// Sessions that finished login, by name
    pub players: PlayerRegistry,
    /// Key pair used for the encryption handshake
    pub key_pair: Arc<ServerKeyPair>,
    /// Game logic for PLAY sessions
    pub play_handler: Arc<dyn PlayHandler>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create the state, generating a fresh key pair
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Result<Self> {
        let key_pair = ServerKeyPair::generate(config.rsa_key_bits)?;
        info!(
            "RSA key pair generated (key size: {} bits)",
            key_pair.key_size_bits()
        );
        Ok(Self::with_key_pair(config, shutdown_tx, Arc::new(key_pair)))
    }

    /// Create the state around an existing key pair
    pub fn with_key_pair(
        config: ServerConfig,
        shutdown_tx: broadcast::Sender<()>,
        key_pair: Arc<ServerKeyPair>,
    ) -> Self {
        if config.debug {
            info!("Debug mode - encryption handshake is skipped");
        }

        Self {
            sessions: SessionRegistry::with_limit(config.max_connections_per_ip),
            players: PlayerRegistry::new(),
            key_pair,
            play_handler: Arc::new(BasicPlayHandler::new()),
            shutdown_tx,
            config,
        }
    }

    /// Replace the game handler
    pub fn with_play_handler(mut self, handler: Arc<dyn PlayHandler>) -> Self {
        self.play_handler = handler;
        self
    }

    /// Whether `name` is taken by a player or by another session mid-login
    pub fn is_player_online(&self, name: &str, except: SessionId) -> bool {
        self.players.contains(name) || self.sessions.is_name_claimed(name, except)
    }
}
