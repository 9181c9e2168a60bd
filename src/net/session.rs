//! Session management module
//!
//! Manages client sessions including:
//! - Session lifecycle (creation, ticking, teardown)
//! - Protocol phase state machine (handshake -> status | login -> play)
//! - The per-connection pipeline and its runtime reconfiguration
//! - The inbound queue between the I/O tasks and the tick loop
//! - Thread-safe session registry
//!
//! Two threads touch a session. The connection's I/O task feeds bytes through
//! the pipeline and either handles a decoded message right away (the few that
//! are safe to run out of band) or queues it. The tick loop drains the queue in
//! arrival order and runs the phase bookkeeping. Teardown only ever runs on the
//! tick loop; other threads ask for it through the queue.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use bytes::BytesMut;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::auth::{self, Identity, LoginState};
use crate::crypto::CipherPair;
use crate::error::{CodecError, NetworkError, ProtocolError, Result, ServerError};
use crate::net::dispatch;
use crate::net::pipeline::{
    CompressionStage, EncryptionStage, Pipeline, COMPRESSION, ENCRYPTION, FRAMING,
};
use crate::net::transport::Transport;
use crate::protocol::{codec_set, login, play, ClientboundMessage, ProtocolPhase, ServerboundMessage};
use crate::state::AppState;

/// Unique session identifier
pub type SessionId = u64;

/// Ticks a client may spend in LOGIN before it is dropped
pub const SLOW_LOGIN_TICKS: u32 = 600;

/// Ticks between keep-alive probes
pub const KEEP_ALIVE_INTERVAL_TICKS: u64 = 40;

/// Length of the verify token sent in the encryption request
pub const VERIFY_TOKEN_LEN: usize = 4;

/// Reason used when a player's connection goes away in PLAY
pub const EXIT_REASON: &str = "Exit the game";

/// Reason used when the transport closed outside of PLAY
pub const CONNECTION_CLOSED_REASON: &str = "Connection closed";

/// Entry in the inbound queue
#[derive(Debug)]
pub enum Inbound {
    /// A decoded message waiting for the tick loop
    Message(ServerboundMessage),
    /// Teardown requested from another thread
    Disconnect(String),
}

/// Tick driven bookkeeping
#[derive(Debug, Default)]
struct SessionTimers {
    /// Ticks spent in PLAY
    tick_count: u64,
    /// Ticks spent in LOGIN
    connection_timer: u32,
    /// Id of the outstanding keep-alive probe
    keep_alive_id: i64,
    /// Tick the last probe went out on
    last_sent_keep_alive: u64,
    /// Wall clock time of the last probe in milliseconds
    last_ping_time: i64,
    /// Smoothed round trip estimate in milliseconds
    ping: i64,
}

/// A connected client session
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Time of session creation
    pub created_at: Instant,
    transport: Arc<dyn Transport>,
    pipeline: Mutex<Pipeline>,
    phase: RwLock<ProtocolPhase>,
    login_state: RwLock<LoginState>,
    verify_token: [u8; VERIFY_TOKEN_LEN],
    timers: Mutex<SessionTimers>,
    /// Identity named in the login start, before it is finalized
    claimed_identity: RwLock<Option<Identity>>,
    /// Identity assigned at login finalization
    identity: OnceLock<Identity>,
    encrypted: AtomicBool,
    compression_sent: AtomicBool,
    disconnected: AtomicBool,
    torn_down: AtomicBool,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
}

impl Session {
    /// Create a new session in the HANDSHAKE phase
    pub fn new(id: SessionId, transport: Arc<dyn Transport>) -> Result<Self> {
        let codec = codec_set(ProtocolPhase::Handshake)
            .ok_or(ProtocolError::UnregisteredPhase(ProtocolPhase::Handshake))?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            id,
            address: transport.remote_address(),
            created_at: Instant::now(),
            transport,
            pipeline: Mutex::new(Pipeline::new(codec)),
            phase: RwLock::new(ProtocolPhase::Handshake),
            login_state: RwLock::new(LoginState::Hello),
            verify_token: rand::random(),
            timers: Mutex::new(SessionTimers::default()),
            claimed_identity: RwLock::new(None),
            identity: OnceLock::new(),
            encrypted: AtomicBool::new(false),
            compression_sent: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
        })
    }

    // ============ Accessors ============

    /// Get the IP address as a string (without port)
    pub fn ip(&self) -> String {
        self.address.ip().to_string()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Get the current protocol phase
    pub fn phase(&self) -> ProtocolPhase {
        *self.phase.read()
    }

    /// Get the login sub-state
    pub fn login_state(&self) -> LoginState {
        *self.login_state.read()
    }

    pub fn set_login_state(&self, state: LoginState) {
        let old = std::mem::replace(&mut *self.login_state.write(), state);
        debug!(
            session_id = self.id,
            old_state = %old,
            new_state = %state,
            "Login state changed"
        );
    }

    /// Fail with a protocol violation unless the login sub-state is `expected`
    pub fn expect_login_state(&self, expected: LoginState, message: &'static str) -> Result<()> {
        let actual = self.login_state();
        if actual != expected {
            return Err(ProtocolError::UnexpectedLoginState {
                message,
                expected: expected.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn verify_token(&self) -> [u8; VERIFY_TOKEN_LEN] {
        self.verify_token
    }

    pub fn claimed_identity(&self) -> Option<Identity> {
        self.claimed_identity.read().clone()
    }

    pub fn set_claimed_identity(&self, identity: Identity) {
        *self.claimed_identity.write() = Some(identity);
    }

    /// Display name this session has claimed, finalized or not
    pub fn claimed_name(&self) -> Option<String> {
        match self.identity.get() {
            Some(identity) => Some(identity.name.clone()),
            None => self.claimed_identity.read().as_ref().map(|i| i.name.clone()),
        }
    }

    /// Identity assigned at login, if login has finished
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    /// Assign the identity. Only the first call succeeds.
    pub fn assign_identity(&self, identity: Identity) -> Result<()> {
        self.identity
            .set(identity)
            .map_err(|_| ProtocolError::IdentityAlreadyAssigned.into())
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted.load(Ordering::SeqCst)
    }

    pub fn is_compression_sent(&self) -> bool {
        self.compression_sent.load(Ordering::SeqCst)
    }

    /// Whether the session was flagged for teardown
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Whether teardown already ran
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Smoothed round trip time in milliseconds
    pub fn ping(&self) -> i64 {
        self.timers.lock().ping
    }

    /// Ticks spent in PLAY
    pub fn tick_count(&self) -> u64 {
        self.timers.lock().tick_count
    }

    /// Ticks spent in LOGIN
    pub fn connection_timer(&self) -> u32 {
        self.timers.lock().connection_timer
    }

    /// Stage names of the pipeline, for diagnostics
    pub fn pipeline_stages(&self) -> Vec<&'static str> {
        self.pipeline.lock().names()
    }

    // ============ State machine ============

    /// Move to `phase`, swapping the codec and nothing else
    pub fn set_phase(&self, phase: ProtocolPhase) -> Result<()> {
        let mut pipeline = self.pipeline.lock();
        self.check_transition(phase)?;
        self.set_phase_locked(&mut pipeline, phase)
    }

    fn check_transition(&self, phase: ProtocolPhase) -> Result<()> {
        let from = self.phase();
        if !from.can_advance_to(phase) {
            return Err(ProtocolError::IllegalPhaseTransition { from, to: phase }.into());
        }
        Ok(())
    }

    /// Caller holds the pipeline lock and has checked the transition
    fn set_phase_locked(&self, pipeline: &mut Pipeline, phase: ProtocolPhase) -> Result<()> {
        let codec = codec_set(phase).ok_or(ProtocolError::UnregisteredPhase(phase))?;

        let mut current = self.phase.write();
        let from = *current;
        pipeline.set_codec(codec);
        *current = phase;
        drop(current);

        debug!(
            session_id = self.id,
            from = %from,
            to = %phase,
            "Protocol phase changed"
        );
        Ok(())
    }

    /// Called once per tick by the world scheduler
    pub fn tick(self: &Arc<Self>, ctx: &AppState) {
        if self.is_torn_down() {
            return;
        }

        match self.phase() {
            ProtocolPhase::Play => {
                self.timers.lock().tick_count += 1;

                if self.is_disconnected() {
                    self.disconnect(ctx, EXIT_REASON);
                    return;
                }

                self.keep_alive_tick();
            }
            _ if self.is_disconnected() => {
                self.disconnect(ctx, CONNECTION_CLOSED_REASON);
                return;
            }
            ProtocolPhase::Login => {
                match self.login_state() {
                    LoginState::ReadyToAccept => {
                        if let Err(e) = auth::try_login(self, ctx) {
                            self.handle_error(ctx, "login finalization", e);
                        }
                    }
                    LoginState::DelayAccept => {
                        debug!(session_id = self.id, "Login accept is delayed");
                    }
                    LoginState::Hello | LoginState::Key => {}
                }

                let timer = {
                    let mut timers = self.timers.lock();
                    timers.connection_timer += 1;
                    timers.connection_timer
                };
                if timer > SLOW_LOGIN_TICKS && self.phase() == ProtocolPhase::Login {
                    self.disconnect(ctx, "multiplayer.disconnect.slow_login");
                    return;
                }
            }
            ProtocolPhase::Handshake | ProtocolPhase::Status => {}
        }

        self.drain_inbound(ctx);
    }

    fn keep_alive_tick(&self) {
        let probe = {
            let mut timers = self.timers.lock();
            if timers.tick_count - timers.last_sent_keep_alive >= KEEP_ALIVE_INTERVAL_TICKS {
                let id = chrono::Utc::now().timestamp_millis();
                timers.last_sent_keep_alive = timers.tick_count;
                timers.keep_alive_id = id;
                timers.last_ping_time = id;
                Some(id)
            } else {
                None
            }
        };

        if let Some(id) = probe {
            trace!(session_id = self.id, id, "Sending keep-alive");
            if let Err(e) = self.send(play::KeepAlive { id }) {
                debug!(session_id = self.id, error = %e, "Keep-alive not sent");
            }
        }
    }

    /// Handle a keep-alive reply
    pub fn handle_keep_alive(&self, id: i64) {
        self.handle_keep_alive_at(id, chrono::Utc::now().timestamp_millis());
    }

    fn handle_keep_alive_at(&self, id: i64, now_ms: i64) {
        let mut timers = self.timers.lock();
        if id != timers.keep_alive_id {
            debug!(
                session_id = self.id,
                id,
                expected = timers.keep_alive_id,
                "Ignoring keep-alive with unknown id"
            );
            return;
        }

        let sample = now_ms - timers.last_ping_time;
        timers.ping = smoothed_ping(timers.ping, sample);
        trace!(session_id = self.id, sample, ping = timers.ping, "Keep-alive answered");
    }

    fn drain_inbound(self: &Arc<Self>, ctx: &AppState) {
        loop {
            if self.is_disconnected() || self.is_torn_down() {
                break;
            }

            let next = self.inbound_rx.lock().try_recv();
            let Ok(item) = next else {
                break;
            };

            match item {
                Inbound::Message(message) => {
                    let name = message.name();
                    if let Err(e) = dispatch::dispatch(self, ctx, message) {
                        self.handle_error(ctx, name, e);
                    }
                }
                Inbound::Disconnect(reason) => {
                    self.disconnect(ctx, &reason);
                    break;
                }
            }
        }
    }

    /// Protocol and codec errors end the session; anything else is logged
    fn handle_error(self: &Arc<Self>, ctx: &AppState, context: &str, e: ServerError) {
        if e.is_fatal() {
            warn!(
                session_id = self.id,
                phase = %self.phase(),
                context,
                error = %e,
                "Fatal session error"
            );
            self.disconnect(ctx, &e.to_string());
        } else {
            error!(
                session_id = self.id,
                phase = %self.phase(),
                context,
                error = %e,
                "Error handling message"
            );
        }
    }

    // ============ Inbound ============

    /// Feed bytes read from the socket through the pipeline.
    ///
    /// Decoded messages go to [`Session::receive`] one at a time, so a phase
    /// change made by one message applies to the frames behind it. An error
    /// means the connection can no longer be read.
    pub fn inbound(self: &Arc<Self>, ctx: &AppState, chunk: BytesMut) -> Result<()> {
        let pushed = self.pipeline.lock().push_inbound(chunk);
        pushed?;

        loop {
            let next = self.pipeline.lock().next_message();
            match next {
                None => return Ok(()),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(message)) => self.receive(ctx, message)?,
            }
        }
    }

    /// Handle an async-safe message now, queue everything else
    pub fn receive(self: &Arc<Self>, ctx: &AppState, message: ServerboundMessage) -> Result<()> {
        if !message.is_keep_alive() {
            debug!(
                session_id = self.id,
                phase = %self.phase(),
                message = message.name(),
                "Received message"
            );
        }

        if !message.is_async() {
            self.enqueue(Inbound::Message(message));
            return Ok(());
        }

        let name = message.name();
        match dispatch::dispatch(self, ctx, message) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(
                    session_id = self.id,
                    message = name,
                    error = %e,
                    "Error handling message"
                );
                Ok(())
            }
        }
    }

    fn enqueue(&self, item: Inbound) {
        // The receiver lives as long as the session
        if self.inbound_tx.send(item).is_err() {
            warn!(session_id = self.id, "Inbound queue closed");
        }
    }

    /// Ask the tick loop to tear this session down
    pub fn request_disconnect(&self, reason: impl Into<String>) {
        self.enqueue(Inbound::Disconnect(reason.into()));
    }

    /// The transport went away. Teardown happens on the next tick.
    pub fn on_transport_closed(&self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            debug!(session_id = self.id, phase = %self.phase(), "Transport closed");
        }
    }

    // ============ Outbound ============

    fn write_locked(&self, pipeline: &mut Pipeline, message: &ClientboundMessage) -> Result<()> {
        self.write_locked_with(pipeline, message, None)
    }

    fn write_locked_with(
        &self,
        pipeline: &mut Pipeline,
        message: &ClientboundMessage,
        completion: Option<oneshot::Sender<()>>,
    ) -> Result<()> {
        if !message.is_keep_alive() {
            debug!(
                session_id = self.id,
                phase = %pipeline.codec().phase(),
                message = message.name(),
                "Sending message"
            );
        }
        let bytes = pipeline.encode(message)?;
        self.transport.write(bytes, completion)?;
        Ok(())
    }

    /// Encode and queue a message for the client
    pub fn send(&self, message: impl Into<ClientboundMessage>) -> Result<()> {
        let message = message.into();
        let mut pipeline = self.pipeline.lock();
        self.write_locked(&mut pipeline, &message)
    }

    /// Like [`Session::send`] but returns a receiver that fires once the
    /// bytes were written. Returns `None` without sending if the transport is
    /// already inactive.
    pub fn send_and_get_completion(
        &self,
        message: impl Into<ClientboundMessage>,
    ) -> Result<Option<oneshot::Receiver<()>>> {
        if !self.transport.is_active() {
            return Ok(None);
        }

        let message = message.into();
        let (tx, rx) = oneshot::channel();
        let mut pipeline = self.pipeline.lock();
        self.write_locked_with(&mut pipeline, &message, Some(tx))?;
        Ok(Some(rx))
    }

    /// Send the login success and switch to PLAY under one pipeline lock
    pub fn accept_login(&self, success: login::LoginSuccess) -> Result<()> {
        let mut pipeline = self.pipeline.lock();
        self.check_transition(ProtocolPhase::Play)?;

        let message: ClientboundMessage = success.into();
        self.write_locked(&mut pipeline, &message)?;
        self.set_phase_locked(&mut pipeline, ProtocolPhase::Play)
    }

    // ============ Pipeline reconfiguration ============

    /// Send the set-compression notice and install compression, once
    pub fn enable_compression(&self, threshold: usize) -> Result<()> {
        let wire_threshold = i32::try_from(threshold).map_err(|_| CodecError::InvalidValue {
            field: "threshold",
            value: threshold.to_string(),
        })?;

        if self
            .compression_sent
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        // Both under one lock so nothing slips out uncompressed in between
        let mut pipeline = self.pipeline.lock();
        let notice: ClientboundMessage = login::SetCompression {
            threshold: wire_threshold,
        }
        .into();
        self.write_locked(&mut pipeline, &notice)?;
        pipeline.add_after(
            FRAMING,
            COMPRESSION,
            Box::new(CompressionStage::new(threshold)),
        )?;

        debug!(session_id = self.id, threshold, "Compression enabled");
        Ok(())
    }

    /// Install AES/CFB8 with the agreed shared secret
    pub fn enable_encryption(&self, secret: &[u8]) -> Result<()> {
        let ciphers = CipherPair::new(secret)?;
        self.pipeline
            .lock()
            .add_first(ENCRYPTION, Box::new(EncryptionStage::new(ciphers)))?;
        self.encrypted.store(true, Ordering::SeqCst);

        debug!(session_id = self.id, "Encryption enabled");
        Ok(())
    }

    // ============ Teardown ============

    /// Tear the session down. Safe to call any number of times.
    pub fn disconnect(self: &Arc<Self>, ctx: &AppState, reason: &str) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disconnected.store(true, Ordering::SeqCst);

        let phase = self.phase();
        info!(
            session_id = self.id,
            address = %self.address,
            phase = %phase,
            reason,
            "Disconnecting session"
        );

        // Registration happens before PLAY, so drop it in any phase
        if let Some(identity) = self.identity() {
            ctx.players.remove(&identity.name, self.id);
            if phase == ProtocolPhase::Play {
                ctx.play_handler.on_leave(ctx, self, reason);
            }
        }

        if phase.has_disconnect_message() && self.transport.is_active() {
            let notice: ClientboundMessage = match phase {
                ProtocolPhase::Login => login::LoginDisconnect::new(reason).into(),
                _ => play::Disconnect::new(reason).into(),
            };
            if let Err(e) = self.send(notice) {
                debug!(session_id = self.id, error = %e, "Disconnect notice not sent");
            }
        }

        // Queued behind the notice, so it flushes first
        self.transport.close();
        ctx.sessions.remove(self.id);
    }
}

/// Round trip smoothing: `(previous * 3 + sample) / 4`
pub fn smoothed_ping(previous: i64, sample: i64) -> i64 {
    (previous * 3 + sample) / 4
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("phase", &self.phase())
            .field("login_state", &self.login_state())
            .field("name", &self.claimed_name())
            .field("encrypted", &self.is_encrypted())
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}

/// Thread-safe session registry
pub struct SessionRegistry {
    /// Map of session ID to session
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Map of IP address to list of session IDs (for connection limiting)
    ip_to_sessions: DashMap<String, Vec<SessionId>>,
    /// Next session ID to assign
    next_id: AtomicU64,
    /// Maximum sessions per IP
    max_per_ip: usize,
}

impl SessionRegistry {
    /// Create a new session registry
    pub fn new() -> Self {
        Self::with_limit(10)
    }

    /// Create a registry with a custom per-IP limit
    pub fn with_limit(max_per_ip: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ip_to_sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_per_ip,
        }
    }

    /// Create a new session for a transport and register it
    pub fn create_session(&self, transport: Arc<dyn Transport>) -> Result<Arc<Session>> {
        let address = transport.remote_address();
        let ip = address.ip().to_string();

        // Check connection limit per IP
        let current_count = self.ip_to_sessions.get(&ip).map(|v| v.len()).unwrap_or(0);
        if current_count >= self.max_per_ip {
            warn!(
                ip = %ip,
                count = current_count,
                max = self.max_per_ip,
                "Connection limit exceeded for IP"
            );
            return Err(NetworkError::TooManyConnections(ip).into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::new(id, transport)?);

        self.sessions.insert(id, session.clone());
        self.ip_to_sessions.entry(ip).or_default().push(id);

        info!(session_id = id, address = %address, "Session created");
        Ok(session)
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Remove a session. Removing an absent session is a no-op.
    pub fn remove(&self, id: SessionId) -> bool {
        let Some((_, session)) = self.sessions.remove(&id) else {
            return false;
        };

        let ip = session.ip();
        if let Some(mut sessions) = self.ip_to_sessions.get_mut(&ip) {
            sessions.retain(|&sid| sid != id);
        }
        self.ip_to_sessions.retain(|_, v| !v.is_empty());

        debug!(session_id = id, "Session removed");
        true
    }

    /// Sessions registered right now
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|r| r.value().clone()).collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Get the count of registered sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether another live session has claimed `name` (case-insensitive)
    pub fn is_name_claimed(&self, name: &str, except: SessionId) -> bool {
        self.sessions.iter().any(|entry| {
            let session = entry.value();
            session.id != except
                && !session.is_torn_down()
                && session
                    .claimed_name()
                    .map_or(false, |claimed| claimed.eq_ignore_ascii_case(name))
        })
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
