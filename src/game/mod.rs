//! Game module
//!
//! The session engine does not implement game logic. It hands decoded PLAY
//! messages to a [`PlayHandler`] and tells it when players join and leave.
//! This module holds that seam together with:
//! - The player registry
//! - The world tick scheduler
//! - [`BasicPlayHandler`], a minimal chat relay used by the server binary

pub mod player;
pub mod world;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, trace, warn};

use crate::auth::Identity;
use crate::error::{GameError, Result};
use crate::net::session::{Session, SessionId};
use crate::protocol::play::ChatBroadcast;
use crate::protocol::ServerboundMessage;
use crate::state::AppState;

/// Game side of a PLAY session
pub trait PlayHandler: Send + Sync {
    /// A session finished login and is now in PLAY
    fn on_join(&self, _ctx: &AppState, _session: &Arc<Session>, _identity: &Identity) {}

    /// A PLAY message arrived. Errors are logged and do not end the session.
    fn on_message(
        &self,
        ctx: &AppState,
        session: &Arc<Session>,
        message: ServerboundMessage,
    ) -> Result<()>;

    /// A PLAY session was torn down
    fn on_leave(&self, _ctx: &AppState, _session: &Arc<Session>, _reason: &str) {}
}

/// Last known position and look of a player
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

/// Relays chat between players and remembers where they are
#[derive(Default)]
pub struct BasicPlayHandler {
    poses: DashMap<SessionId, PlayerPose>,
}

impl BasicPlayHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last pose reported by `session_id`
    pub fn pose(&self, session_id: SessionId) -> Option<PlayerPose> {
        self.poses.get(&session_id).map(|p| *p)
    }

    fn broadcast(&self, ctx: &AppState, line: ChatBroadcast) {
        for session in ctx.players.sessions() {
            if let Err(e) = session.send(line.clone()) {
                debug!(session_id = session.id, error = %e, "Chat line not delivered");
            }
        }
    }

    fn update_pose(&self, session_id: SessionId, update: impl FnOnce(&mut PlayerPose)) {
        let mut pose = self.poses.entry(session_id).or_default();
        update(&mut pose);
        trace!(session_id, pose = ?*pose, "Player moved");
    }
}

impl PlayHandler for BasicPlayHandler {
    fn on_join(&self, ctx: &AppState, session: &Arc<Session>, identity: &Identity) {
        self.poses.insert(session.id, PlayerPose::default());
        self.broadcast(
            ctx,
            ChatBroadcast::system(&format!("{} joined the game", identity.name)),
        );
    }

    fn on_message(
        &self,
        ctx: &AppState,
        session: &Arc<Session>,
        message: ServerboundMessage,
    ) -> Result<()> {
        match message {
            ServerboundMessage::ChatMessage(chat) => {
                let name = session
                    .identity()
                    .map(|i| i.name.clone())
                    .ok_or_else(|| GameError::PlayerNotFound(session.id.to_string()))?;
                if chat.message.starts_with('/') {
                    return Err(GameError::InvalidAction(format!(
                        "unknown command: {}",
                        chat.message
                    ))
                    .into());
                }

                info!(name = %name, message = %chat.message, "Chat");
                self.broadcast(ctx, ChatBroadcast::chat(&format!("<{}> {}", name, chat.message)));
                Ok(())
            }
            ServerboundMessage::PlayerPosition(m) => {
                self.update_pose(session.id, |pose| {
                    pose.x = m.x;
                    pose.y = m.y;
                    pose.z = m.z;
                    pose.on_ground = m.on_ground;
                });
                Ok(())
            }
            ServerboundMessage::PlayerPositionAndRotation(m) => {
                self.update_pose(session.id, |pose| {
                    pose.x = m.x;
                    pose.y = m.y;
                    pose.z = m.z;
                    pose.yaw = m.yaw;
                    pose.pitch = m.pitch;
                    pose.on_ground = m.on_ground;
                });
                Ok(())
            }
            ServerboundMessage::PlayerRotation(m) => {
                self.update_pose(session.id, |pose| {
                    pose.yaw = m.yaw;
                    pose.pitch = m.pitch;
                    pose.on_ground = m.on_ground;
                });
                Ok(())
            }
            ServerboundMessage::PlayerMovement(m) => {
                self.update_pose(session.id, |pose| pose.on_ground = m.on_ground);
                Ok(())
            }
            other => {
                warn!(
                    session_id = session.id,
                    message = other.name(),
                    "No game handler for message"
                );
                Ok(())
            }
        }
    }

    fn on_leave(&self, ctx: &AppState, session: &Arc<Session>, _reason: &str) {
        self.poses.remove(&session.id);
        if let Some(identity) = session.identity() {
            self.broadcast(
                ctx,
                ChatBroadcast::system(&format!("{} left the game", identity.name)),
            );
        }
    }
}
