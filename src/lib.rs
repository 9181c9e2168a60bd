//! Cinder Game Server Library
//!
//! This library provides the session and protocol engine for a block game
//! server speaking protocol 578 (game version 1.15.2).
//!
//! ## Modules
//!
//! - `auth` - Login flow, offline identities and the encryption handshake
//! - `config` - Server configuration management
//! - `crypto` - RSA key exchange and the AES/CFB8 stream cipher
//! - `error` - Error types and result definitions
//! - `game` - Game handler seam, player registry and the tick scheduler
//! - `net` - Connection handling, pipeline and sessions
//! - `protocol` - Phases, message catalogue and codec sets

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use protocol::{GAME_VERSION, PROTOCOL_VERSION};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
