//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Message of the day shown in the server list
    #[serde(default = "default_motd")]
    pub motd: String,

    /// Address to bind the listener to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Game port (TCP)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of players, as advertised in the status response
    #[serde(default = "default_max_players")]
    pub max_players: u32,

    /// Tick rate in milliseconds
    #[serde(default = "default_tick_rate")]
    pub tick_rate_ms: u64,

    /// Messages at least this large are compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    /// Skip the encryption handshake
    #[serde(default)]
    pub debug: bool,

    /// Size of the generated RSA key
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,

    /// Maximum concurrent connections from one IP
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: usize,
}

// Default value functions
fn default_motd() -> String {
    "A Cinder Server".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    25565
}

fn default_max_players() -> u32 {
    20
}

fn default_tick_rate() -> u64 {
    50 // 20 ticks per second
}

fn default_compression_threshold() -> usize {
    256
}

fn default_rsa_key_bits() -> usize {
    1024
}

fn default_max_connections_per_ip() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            motd: default_motd(),
            bind_address: default_bind_address(),
            port: default_port(),
            max_players: default_max_players(),
            tick_rate_ms: default_tick_rate(),
            compression_threshold: default_compression_threshold(),
            debug: false,
            rsa_key_bits: default_rsa_key_bits(),
            max_connections_per_ip: default_max_connections_per_ip(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("CINDER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides(|key| env::var(key).ok());

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document, filling in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `CINDER_*` overrides looked up through `lookup`
    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CINDER_MOTD") {
            self.motd = val;
        }
        if let Some(val) = lookup("CINDER_BIND_ADDRESS") {
            self.bind_address = val;
        }
        if let Some(val) = lookup("CINDER_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }
        if let Some(val) = lookup("CINDER_MAX_PLAYERS") {
            if let Ok(max) = val.parse() {
                self.max_players = max;
            }
        }
        if let Some(val) = lookup("CINDER_TICK_RATE_MS") {
            if let Ok(rate) = val.parse() {
                self.tick_rate_ms = rate;
            }
        }
        if let Some(val) = lookup("CINDER_COMPRESSION_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.compression_threshold = threshold;
            }
        }
        if let Some(val) = lookup("CINDER_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(val) = lookup("CINDER_RSA_KEY_BITS") {
            if let Ok(bits) = val.parse() {
                self.rsa_key_bits = bits;
            }
        }
        if let Some(val) = lookup("CINDER_MAX_CONNECTIONS_PER_IP") {
            if let Ok(max) = val.parse() {
                self.max_connections_per_ip = max;
            }
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.bind_socket_addr().is_err() {
            anyhow::bail!("Invalid bind address: {}", self.bind_address);
        }

        if self.max_players == 0 || self.max_players > 10000 {
            anyhow::bail!("Max players must be between 1 and 10000");
        }

        if self.tick_rate_ms < 10 || self.tick_rate_ms > 1000 {
            anyhow::bail!("Tick rate must be between 10ms and 1000ms");
        }

        if self.rsa_key_bits < 1024 || self.rsa_key_bits > 4096 {
            anyhow::bail!("RSA key size must be between 1024 and 4096 bits");
        }

        if self.compression_threshold > i32::MAX as usize {
            anyhow::bail!("Compression threshold must fit in a VarInt");
        }

        if self.max_connections_per_ip == 0 {
            anyhow::bail!("At least one connection per IP must be allowed");
        }

        Ok(())
    }

    /// Socket address the listener binds to
    pub fn bind_socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.bind_address))
    }
}
