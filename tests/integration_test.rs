//! Integration tests for the connection lifecycle
//!
//! These tests run a real listener, connection handlers and the world tick on
//! a loopback socket and verify the end-to-end behavior of:
//! - The status exchange
//! - Offline (debug mode) login and chat
//! - The encrypted login handshake
//! - Duplicate name rejection

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

use cinder_server::auth::{offline_uuid, ALREADY_ONLINE};
use cinder_server::config::ServerConfig;
use cinder_server::crypto::rsa::encrypt_for;
use cinder_server::crypto::{CipherPair, ServerKeyPair};
use cinder_server::game::world::World;
use cinder_server::net::handler::ConnectionHandler;
use cinder_server::net::pipeline::{CompressionStage, EncryptionStage, Pipeline, Stage, ENCRYPTION};
use cinder_server::protocol::{
    codec_set, handshake, login, play, status, ClientboundMessage, ProtocolPhase,
    ServerboundMessage, PROTOCOL_VERSION,
};
use cinder_server::state::AppState;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn start_server(debug: bool) -> TestServer {
    let config = ServerConfig {
        debug,
        tick_rate_ms: 10,
        ..ServerConfig::default()
    };
    let (shutdown_tx, _) = broadcast::channel(1);
    let key_pair = Arc::new(ServerKeyPair::generate(512).unwrap());
    let state = Arc::new(AppState::with_key_pair(config, shutdown_tx.clone(), key_pair));

    let world = World::new(state.clone());
    let mut world_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move { world.run(&mut world_shutdown).await });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept_state = state.clone();
    let mut accept_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = result.unwrap();
                    let handler = ConnectionHandler::new(accept_state.clone());
                    tokio::spawn(async move {
                        let _ = handler.handle_tcp(stream, peer).await;
                    });
                }
                _ = accept_shutdown.recv() => break,
            }
        }
    });

    TestServer {
        addr,
        state,
        shutdown_tx,
    }
}

/// Minimal protocol client
struct Client {
    stream: TcpStream,
    pipeline: Pipeline,
    /// Applied per frame so frames read ahead of the notice stay intact
    compression: Option<CompressionStage>,
}

impl Client {
    async fn connect(server: &TestServer) -> Self {
        Self {
            stream: TcpStream::connect(server.addr).await.unwrap(),
            pipeline: Pipeline::new(codec_set(ProtocolPhase::Handshake).unwrap()),
            compression: None,
        }
    }

    async fn send(&mut self, message: impl Into<ServerboundMessage>) {
        let message = message.into();
        let mut body = self.pipeline.codec().encode_serverbound(&message).unwrap();
        if let Some(compression) = self.compression.as_mut() {
            body = compression.encode(body).unwrap();
        }
        let bytes = self.pipeline.encode_frame(body).unwrap();
        self.stream.write_all(&bytes).await.unwrap();

        if let ServerboundMessage::Handshake(handshake) = &message {
            let phase = handshake.requested_phase().unwrap();
            self.pipeline.set_codec(codec_set(phase).unwrap());
        }
    }

    fn next_message(&mut self) -> Option<ClientboundMessage> {
        let frame = self.pipeline.next_frame()?;
        let body = match self.compression.as_mut() {
            Some(compression) => {
                let mut out = Vec::new();
                compression.decode(frame, &mut out).unwrap();
                out.pop().unwrap()
            }
            None => frame,
        };
        let message = self.pipeline.codec().decode_clientbound(&body).unwrap();

        match &message {
            ClientboundMessage::SetCompression(notice) => {
                self.compression = Some(CompressionStage::new(notice.threshold as usize));
            }
            ClientboundMessage::LoginSuccess(_) => {
                self.pipeline
                    .set_codec(codec_set(ProtocolPhase::Play).unwrap());
            }
            _ => {}
        }
        Some(message)
    }

    /// Next message that is not a keep-alive probe
    async fn recv(&mut self) -> ClientboundMessage {
        loop {
            if let Some(message) = self.next_message() {
                if message.is_keep_alive() {
                    continue;
                }
                return message;
            }

            let mut buffer = BytesMut::with_capacity(4096);
            let n = timeout(IO_TIMEOUT, self.stream.read_buf(&mut buffer))
                .await
                .expect("timed out waiting for the server")
                .unwrap();
            assert!(n > 0, "connection closed while waiting for a message");
            self.pipeline.push_inbound(buffer).unwrap();
        }
    }

    /// Wait for the server to close the connection
    async fn expect_closed(&mut self) {
        let mut buffer = [0u8; 1024];
        loop {
            match timeout(IO_TIMEOUT, self.stream.read(&mut buffer))
                .await
                .expect("timed out waiting for close")
            {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }

    fn enable_encryption(&mut self, secret: &[u8]) {
        let ciphers = CipherPair::new(secret).unwrap();
        self.pipeline
            .add_first(ENCRYPTION, Box::new(EncryptionStage::new(ciphers)))
            .unwrap();
    }

    async fn handshake(&mut self, intent: i32) {
        self.send(handshake::Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_address: "localhost".into(),
            server_port: 25565,
            intent,
        })
        .await;
    }

    /// Debug mode login, returns the login success
    async fn login(&mut self, name: &str) -> login::LoginSuccess {
        self.handshake(handshake::INTENT_LOGIN).await;
        self.send(login::LoginStart { name: name.into() }).await;

        assert_eq!(
            self.recv().await,
            ClientboundMessage::SetCompression(login::SetCompression { threshold: 256 })
        );
        match self.recv().await {
            ClientboundMessage::LoginSuccess(success) => success,
            other => panic!("expected login success, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_status_exchange() {
    let server = start_server(true).await;
    let mut client = Client::connect(&server).await;

    client.handshake(handshake::INTENT_STATUS).await;
    client.send(status::StatusRequest).await;

    let ClientboundMessage::StatusResponse(response) = client.recv().await else {
        panic!("expected status response");
    };
    let json: serde_json::Value = serde_json::from_str(&response.json).unwrap();
    assert_eq!(json["version"]["protocol"], 578);
    assert_eq!(json["version"]["name"], "1.15.2");
    assert_eq!(json["players"]["max"], 20);
    assert_eq!(json["players"]["online"], 0);

    client.send(status::StatusPing { payload: 42 }).await;
    assert_eq!(
        client.recv().await,
        ClientboundMessage::StatusPong(status::StatusPong { payload: 42 })
    );
    client.expect_closed().await;
}

#[tokio::test]
async fn test_offline_login_and_chat() {
    let server = start_server(true).await;
    let mut client = Client::connect(&server).await;

    let success = client.login("Alice").await;
    assert_eq!(success.username, "Alice");
    assert_eq!(success.uuid, offline_uuid("Alice").hyphenated().to_string());
    assert_eq!(
        client.recv().await,
        ClientboundMessage::ChatBroadcast(play::ChatBroadcast::system("Alice joined the game"))
    );
    assert!(server.state.players.contains("alice"));

    client
        .send(play::ChatMessage {
            message: "hello world".into(),
        })
        .await;
    assert_eq!(
        client.recv().await,
        ClientboundMessage::ChatBroadcast(play::ChatBroadcast::chat("<Alice> hello world"))
    );
}

#[tokio::test]
async fn test_encrypted_login() {
    let server = start_server(false).await;
    let mut client = Client::connect(&server).await;

    client.handshake(handshake::INTENT_LOGIN).await;
    client
        .send(login::LoginStart {
            name: "Bob".into(),
        })
        .await;

    let ClientboundMessage::EncryptionRequest(request) = client.recv().await else {
        panic!("expected encryption request");
    };
    assert_eq!(request.server_id, "");
    assert_eq!(request.verify_token.len(), 4);

    let secret: [u8; 16] = rand::random();
    client
        .send(login::EncryptionResponse {
            shared_secret: encrypt_for(&request.public_key, &secret).unwrap(),
            verify_token: encrypt_for(&request.public_key, &request.verify_token).unwrap(),
        })
        .await;
    client.enable_encryption(&secret);

    assert_eq!(
        client.recv().await,
        ClientboundMessage::SetCompression(login::SetCompression { threshold: 256 })
    );
    let ClientboundMessage::LoginSuccess(success) = client.recv().await else {
        panic!("expected login success");
    };
    assert_eq!(success.username, "Bob");

    // The relayed line is over the threshold, so it comes back compressed
    client
        .send(play::ChatMessage {
            message: "x".repeat(250),
        })
        .await;
    loop {
        if let ClientboundMessage::ChatBroadcast(line) = client.recv().await {
            if line.position == play::CHAT_POSITION_CHAT {
                assert!(line.json.contains(&"x".repeat(250)));
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let server = start_server(true).await;
    let mut first = Client::connect(&server).await;
    first.login("Carol").await;

    let mut second = Client::connect(&server).await;
    second.handshake(handshake::INTENT_LOGIN).await;
    second
        .send(login::LoginStart {
            name: "CAROL".into(),
        })
        .await;

    assert_eq!(
        second.recv().await,
        ClientboundMessage::LoginDisconnect(login::LoginDisconnect::new(ALREADY_ONLINE))
    );
    second.expect_closed().await;
    assert_eq!(server.state.players.count(), 1);
}
