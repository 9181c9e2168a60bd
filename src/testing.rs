//! Test helpers: shared state, a recording game handler and an in-memory
//! client that talks to a real session through its pipeline.

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::auth::Identity;
use crate::config::ServerConfig;
use crate::crypto::{CipherPair, ServerKeyPair};
use crate::error::{GameError, Result};
use crate::game::PlayHandler;
use crate::net::pipeline::{
    CompressionStage, EncryptionStage, Pipeline, COMPRESSION, ENCRYPTION, FRAMING,
};
use crate::net::session::Session;
use crate::net::transport::{ChannelTransport, Outbound, OutboundReceiver, Transport};
use crate::protocol::{
    codec_set, handshake, login, ClientboundMessage, ProtocolPhase, ServerboundMessage,
};
use crate::state::AppState;

/// Key pairs are slow to generate, share one across tests
fn shared_key_pair() -> Arc<ServerKeyPair> {
    static KEY: OnceLock<Arc<ServerKeyPair>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(ServerKeyPair::generate(512).unwrap()))
        .clone()
}

/// Records what the session engine hands to the game
#[derive(Default)]
pub struct RecordingHandler {
    chat: Mutex<Vec<String>>,
    departures: Mutex<Vec<(String, String)>>,
    messages: AtomicUsize,
}

impl RecordingHandler {
    pub fn chat_log(&self) -> Vec<String> {
        self.chat.lock().clone()
    }

    pub fn departures(&self) -> Vec<(String, String)> {
        self.departures.lock().clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages.load(Ordering::SeqCst)
    }
}

impl PlayHandler for RecordingHandler {
    fn on_message(
        &self,
        _ctx: &AppState,
        _session: &Arc<Session>,
        message: ServerboundMessage,
    ) -> Result<()> {
        self.messages.fetch_add(1, Ordering::SeqCst);
        if let ServerboundMessage::ChatMessage(chat) = message {
            if chat.message.starts_with('/') {
                return Err(GameError::InvalidAction(chat.message).into());
            }
            self.chat.lock().push(chat.message);
        }
        Ok(())
    }

    fn on_leave(&self, _ctx: &AppState, session: &Arc<Session>, reason: &str) {
        let name = session
            .identity()
            .map(|i| i.name.clone())
            .unwrap_or_default();
        self.departures.lock().push((name, reason.to_string()));
    }
}

/// Shared state for a test
pub struct TestState {
    app: Arc<AppState>,
    recorder: Option<Arc<RecordingHandler>>,
}

impl TestState {
    pub fn app(&self) -> Arc<AppState> {
        self.app.clone()
    }

    /// The recording handler installed by [`test_state`]
    pub fn test_handler(&self) -> &RecordingHandler {
        self.recorder
            .as_deref()
            .expect("state was built with another handler")
    }
}

impl Deref for TestState {
    type Target = AppState;

    fn deref(&self) -> &AppState {
        &self.app
    }
}

fn test_config(debug: bool) -> ServerConfig {
    ServerConfig {
        debug,
        ..ServerConfig::default()
    }
}

fn build_state(debug: bool, handler: Arc<dyn PlayHandler>) -> Arc<AppState> {
    let (shutdown_tx, _) = broadcast::channel(1);
    Arc::new(
        AppState::with_key_pair(test_config(debug), shutdown_tx, shared_key_pair())
            .with_play_handler(handler),
    )
}

/// State with a [`RecordingHandler`]. `debug` skips encryption.
pub fn test_state(debug: bool) -> TestState {
    let recorder = Arc::new(RecordingHandler::default());
    TestState {
        app: build_state(debug, recorder.clone()),
        recorder: Some(recorder),
    }
}

/// Debug mode state with a custom game handler
pub fn test_state_with_handler(handler: Arc<dyn PlayHandler>) -> TestState {
    TestState {
        app: build_state(true, handler),
        recorder: None,
    }
}

fn next_address() -> SocketAddr {
    static PORT: AtomicU16 = AtomicU16::new(40000);
    SocketAddr::from(([127, 0, 0, 1], PORT.fetch_add(1, Ordering::SeqCst)))
}

/// Client end of an in-memory connection
pub struct TestClient {
    state: Arc<AppState>,
    pub session: Arc<Session>,
    receiver: OutboundReceiver,
    pipeline: Pipeline,
    closed: bool,
}

impl TestClient {
    /// Open a session on `state`
    pub fn connect(state: &TestState) -> Self {
        let (transport, receiver) = ChannelTransport::new(next_address());
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let session = state.sessions.create_session(transport).unwrap();
        let codec = codec_set(ProtocolPhase::Handshake).unwrap();

        Self {
            state: state.app(),
            session,
            receiver,
            pipeline: Pipeline::new(codec),
            closed: false,
        }
    }

    /// Encode `message` like a client would and feed it to the session
    pub fn send(&mut self, message: impl Into<ServerboundMessage>) -> Result<()> {
        let message = message.into();
        let body = self.pipeline.codec().encode_serverbound(&message)?;
        let bytes = self.pipeline.encode_frame(body)?;

        if let ServerboundMessage::Handshake(handshake) = &message {
            if let Some(phase) = handshake.requested_phase() {
                self.pipeline.set_codec(codec_set(phase).unwrap());
            }
        }

        self.session
            .inbound(&self.state, BytesMut::from(&bytes[..]))
    }

    /// Decode everything the server wrote so far
    pub fn receive(&mut self) -> Vec<ClientboundMessage> {
        let mut received = Vec::new();
        while let Some(command) = self.receiver.try_recv() {
            match command {
                Outbound::Frame { data, completion } => {
                    if let Some(completion) = completion {
                        let _ = completion.send(());
                    }
                    self.pipeline
                        .push_inbound(BytesMut::from(&data[..]))
                        .unwrap();
                    while let Some(frame) = self.pipeline.next_frame() {
                        let message = self.pipeline.codec().decode_clientbound(&frame).unwrap();
                        self.observe(&message);
                        received.push(message);
                    }
                }
                Outbound::Close => self.closed = true,
            }
        }
        received
    }

    /// Mirror the pipeline changes the server announces
    fn observe(&mut self, message: &ClientboundMessage) {
        match message {
            ClientboundMessage::SetCompression(notice) => {
                self.pipeline
                    .add_after(
                        FRAMING,
                        COMPRESSION,
                        Box::new(CompressionStage::new(notice.threshold as usize)),
                    )
                    .unwrap();
            }
            ClientboundMessage::LoginSuccess(_) => {
                self.pipeline
                    .set_codec(codec_set(ProtocolPhase::Play).unwrap());
            }
            _ => {}
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handshake into LOGIN
    pub fn login_phase(&mut self) {
        self.send(handshake::Handshake {
            protocol_version: crate::protocol::PROTOCOL_VERSION,
            server_address: "localhost".into(),
            server_port: 25565,
            intent: handshake::INTENT_LOGIN,
        })
        .unwrap();
    }

    /// Full login on a debug mode state, returning what the server sent
    pub fn login(&mut self, state: &TestState, name: &str) -> Vec<ClientboundMessage> {
        self.login_phase();
        self.send(login::LoginStart { name: name.into() })
            .unwrap();
        self.session.tick(state);
        self.session.tick(state);

        assert_eq!(self.session.phase(), ProtocolPhase::Play);
        assert_eq!(
            self.session.identity(),
            Some(&Identity::offline(name.to_string()))
        );
        self.receive()
    }

    /// Switch on encryption on the client side
    pub fn enable_encryption(&mut self, secret: &[u8]) {
        let ciphers = CipherPair::new(secret).unwrap();
        self.pipeline
            .add_first(ENCRYPTION, Box::new(EncryptionStage::new(ciphers)))
            .unwrap();
    }
}
