//! Message dispatch
//!
//! Routes a decoded message to the code that handles it. HANDSHAKE and STATUS
//! are handled here, LOGIN goes to the security flow and PLAY to the game.

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth;
use crate::error::{ProtocolError, Result};
use crate::net::session::Session;
use crate::protocol::handshake::Handshake;
use crate::protocol::status::{ServerStatus, StatusPong};
use crate::protocol::{ProtocolPhase, ServerboundMessage, PROTOCOL_VERSION};
use crate::state::AppState;

/// Handle one message for `session`
pub fn dispatch(session: &Arc<Session>, ctx: &AppState, message: ServerboundMessage) -> Result<()> {
    let phase = session.phase();
    if message.phase() != phase {
        return Err(ProtocolError::UnexpectedMessage {
            phase,
            message: message.name(),
        }
        .into());
    }

    match message {
        ServerboundMessage::Handshake(handshake) => handle_handshake(session, handshake),
        ServerboundMessage::StatusRequest(_) => {
            let status = ServerStatus::new(
                &ctx.config.motd,
                ctx.config.max_players,
                ctx.players.count(),
            );
            let response = status
                .into_response()
                .map_err(|e| crate::error::ServerError::Internal(e.to_string()))?;
            session.send(response)
        }
        ServerboundMessage::StatusPing(ping) => {
            session.send(StatusPong {
                payload: ping.payload,
            })?;
            session.request_disconnect("Status complete");
            Ok(())
        }
        ServerboundMessage::LoginStart(start) => auth::handle_login_start(session, ctx, start),
        ServerboundMessage::EncryptionResponse(response) => {
            auth::handle_encryption_response(session, ctx, response)
        }
        ServerboundMessage::KeepAlive(reply) => {
            session.handle_keep_alive(reply.id);
            Ok(())
        }
        other => ctx.play_handler.on_message(ctx, session, other),
    }
}

fn handle_handshake(session: &Arc<Session>, handshake: Handshake) -> Result<()> {
    let phase = handshake
        .requested_phase()
        .ok_or(ProtocolError::UnknownIntent(handshake.intent))?;

    debug!(
        session_id = session.id,
        protocol = handshake.protocol_version,
        address = %handshake.server_address,
        port = handshake.server_port,
        next = %phase,
        "Handshake"
    );
    session.set_phase(phase)?;

    if phase == ProtocolPhase::Login && handshake.protocol_version != PROTOCOL_VERSION {
        let reason = if handshake.protocol_version < PROTOCOL_VERSION {
            "multiplayer.disconnect.outdated_client"
        } else {
            "multiplayer.disconnect.outdated_server"
        };
        info!(
            session_id = session.id,
            protocol = handshake.protocol_version,
            "Rejecting client with another protocol version"
        );
        session.request_disconnect(reason);
    }
    Ok(())
}
