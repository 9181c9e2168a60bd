//! Networking module
//!
//! This module handles all network-related functionality for the Cinder server:
//! - TCP connection handling
//! - The per-connection pipeline (framing, compression, encryption, codec)
//! - Session management and the protocol state machine
//! - Message dispatch by phase

pub mod buffer;
pub mod dispatch;
pub mod handler;
pub mod pipeline;
pub mod session;
pub mod transport;
