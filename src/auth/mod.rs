//! Login and security flow
//!
//! Drives a session through the LOGIN sub-states:
//!
//! ```text
//! HELLO --LoginStart--> KEY --EncryptionResponse--> READY_TO_ACCEPT --tick--> PLAY
//!   \____________________(debug mode)_____________________/
//! ```
//!
//! Remote account verification is not performed. Sessions without a complete
//! identity get a deterministic offline one derived from their display name.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::SHARED_SECRET_LEN;
use crate::error::{ProtocolError, Result};
use crate::net::session::Session;
use crate::protocol::login::{EncryptionRequest, EncryptionResponse, LoginStart, LoginSuccess};
use crate::state::AppState;

/// Disconnect reason for a second session with the same name
pub const ALREADY_ONLINE: &str = "Already online!";

/// Login sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginState {
    /// Waiting for the login start
    Hello,
    /// Waiting for the encryption response
    Key,
    /// Ready to be finalized on the next tick
    ReadyToAccept,
    /// Acceptance deferred; nothing moves the session out of it yet
    DelayAccept,
}

impl LoginState {
    pub fn name(&self) -> &'static str {
        match self {
            LoginState::Hello => "HELLO",
            LoginState::Key => "KEY",
            LoginState::ReadyToAccept => "READY_TO_ACCEPT",
            LoginState::DelayAccept => "DELAY_ACCEPT",
        }
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Player profile attached to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Unique id, unknown until login is finalized for offline players
    pub id: Option<Uuid>,
    /// Display name
    pub name: String,
}

impl Identity {
    /// Identity as named by the client, without an id
    pub fn claimed(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Deterministic identity for a player that was not verified remotely
    pub fn offline(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Some(offline_uuid(&name)),
            name,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.id.is_some() && !self.name.is_empty()
    }

    /// Registry key for this identity
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Normalize a display name for lookups
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

/// Name based (MD5, version 3) UUID of `"OfflinePlayer:" + lowercase(name)`
pub fn offline_uuid(name: &str) -> Uuid {
    let digest = md5::compute(format!("OfflinePlayer:{}", normalize_name(name)));
    uuid::Builder::from_md5_bytes(digest.0).into_uuid()
}

/// Handle the login start
pub fn handle_login_start(session: &Arc<Session>, ctx: &AppState, message: LoginStart) -> Result<()> {
    session.expect_login_state(LoginState::Hello, "LoginStart")?;

    let name = message.name;
    info!(session_id = session.id, name = %name, "Login started");
    session.set_claimed_identity(Identity::claimed(name.clone()));

    if !session.transport().is_active() {
        session.on_transport_closed();
        return Ok(());
    }

    if ctx.is_player_online(&name, session.id) {
        warn!(session_id = session.id, name = %name, "Name already online");
        session.disconnect(ctx, ALREADY_ONLINE);
        return Ok(());
    }

    if ctx.config.debug {
        session.set_login_state(LoginState::ReadyToAccept);
        return Ok(());
    }

    session.set_login_state(LoginState::Key);
    session.send(EncryptionRequest {
        server_id: String::new(),
        public_key: ctx.key_pair.public_der().to_vec(),
        verify_token: session.verify_token().to_vec(),
    })
}

/// Handle the encryption response: check the token and switch on encryption
pub fn handle_encryption_response(
    session: &Arc<Session>,
    ctx: &AppState,
    message: EncryptionResponse,
) -> Result<()> {
    session.expect_login_state(LoginState::Key, "EncryptionResponse")?;

    let token = ctx
        .key_pair
        .decrypt(&message.verify_token)
        .map_err(|_| ProtocolError::InvalidVerifyToken)?;
    if token != session.verify_token() {
        return Err(ProtocolError::InvalidVerifyToken.into());
    }

    let secret = ctx
        .key_pair
        .decrypt(&message.shared_secret)
        .map_err(|_| ProtocolError::InvalidSharedSecret(message.shared_secret.len()))?;
    if secret.len() != SHARED_SECRET_LEN {
        return Err(ProtocolError::InvalidSharedSecret(secret.len()).into());
    }

    session.enable_encryption(&secret)?;
    session.set_login_state(LoginState::ReadyToAccept);
    Ok(())
}

/// Finalize the login and promote the session to PLAY
pub fn try_login(session: &Arc<Session>, ctx: &AppState) -> Result<()> {
    let claimed = session
        .claimed_identity()
        .ok_or(ProtocolError::MissingIdentity)?;
    let identity = if claimed.is_complete() {
        claimed
    } else {
        Identity::offline(claimed.name)
    };

    session.assign_identity(identity.clone())?;

    if let Err(e) = ctx.players.initialize(session.clone(), &identity) {
        warn!(session_id = session.id, error = %e, "Player registration failed");
        session.disconnect(ctx, ALREADY_ONLINE);
        return Ok(());
    }

    session.enable_compression(ctx.config.compression_threshold)?;

    let uuid = identity.id.unwrap_or_else(|| offline_uuid(&identity.name));
    session.accept_login(LoginSuccess {
        uuid: uuid.hyphenated().to_string(),
        username: identity.name.clone(),
    })?;

    info!(
        session_id = session.id,
        name = %identity.name,
        uuid = %uuid,
        encrypted = session.is_encrypted(),
        "Player logged in"
    );
    debug!(session_id = session.id, stages = ?session.pipeline_stages(), "Pipeline after login");

    ctx.play_handler.on_join(ctx, session, &identity);
    Ok(())
}
