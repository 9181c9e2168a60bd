//! Connection handler module
//!
//! Handles the lifecycle of client connections including:
//! - Initial connection setup and the per-IP limit
//! - The writer task that owns the socket's write half
//! - The read loop feeding bytes into the session pipeline
//! - Reporting closed or broken connections to the session

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, ServerError};
use crate::net::session::Session;
use crate::net::transport::{ChannelTransport, Transport};
use crate::state::AppState;

/// Initial read buffer size
const READ_BUFFER_SIZE: usize = 4096;

/// Read timeout in seconds
const READ_TIMEOUT_SECS: u64 = 30;

/// Connection handler for processing client connections
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a TCP connection
    pub async fn handle_tcp(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling TCP connection");

        // Set TCP options
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let (transport, outbound) = ChannelTransport::new(addr);
        let transport = Arc::new(transport);

        // Refused connections just drop the socket
        let session = self
            .state
            .sessions
            .create_session(transport.clone() as Arc<dyn Transport>)?;

        tokio::spawn(outbound.run_writer(writer));

        self.read_loop(&session, &transport, reader).await;

        debug!(session_id = session.id, "Connection handler ending");
        Ok(())
    }

    /// Read until the peer goes away or the stream can no longer be trusted
    async fn read_loop(
        &self,
        session: &Arc<Session>,
        transport: &ChannelTransport,
        mut reader: OwnedReadHalf,
    ) {
        let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

        loop {
            if session.is_disconnected() {
                break;
            }

            buffer.reserve(READ_BUFFER_SIZE);
            let read = timeout(
                Duration::from_secs(READ_TIMEOUT_SECS),
                reader.read_buf(&mut buffer),
            )
            .await;

            match read {
                Ok(Ok(0)) => {
                    debug!(session_id = session.id, "Connection closed by peer");
                    break;
                }
                Ok(Ok(n)) => {
                    trace!(session_id = session.id, bytes = n, "Read from socket");
                    let chunk = buffer.split();
                    if let Err(e) = session.inbound(&self.state, chunk) {
                        let reason = match &e {
                            ServerError::Codec(detail) => format!("decode error: {}", detail),
                            other => other.to_string(),
                        };
                        warn!(
                            session_id = session.id,
                            phase = %session.phase(),
                            error = %e,
                            "Closing connection after inbound error"
                        );
                        // Teardown runs on the tick loop
                        session.request_disconnect(reason);
                        return;
                    }
                }
                Ok(Err(e)) => {
                    info!(session_id = session.id, error = %e, "Read error");
                    break;
                }
                Err(_) => {
                    info!(
                        session_id = session.id,
                        timeout_secs = READ_TIMEOUT_SECS,
                        "Read timed out"
                    );
                    break;
                }
            }
        }

        transport.mark_inactive();
        session.on_transport_closed();
    }
}
