//! Transport abstraction module
//!
//! The session engine only needs four things from a connection: whether it is
//! still open, a way to queue bytes for writing (optionally learning when they
//! were flushed), a close that lets queued bytes go out first, and the peer
//! address. [`ChannelTransport`] provides these over an unbounded channel
//! drained by a writer task that owns the socket's write half.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::NetworkError;

/// Byte-oriented, ordered connection to one client
pub trait Transport: Send + Sync + fmt::Debug {
    /// Whether the connection can still take writes
    fn is_active(&self) -> bool;

    /// Queue bytes for writing. `completion` fires once they hit the socket.
    fn write(&self, data: Bytes, completion: Option<oneshot::Sender<()>>)
        -> Result<(), NetworkError>;

    /// Close once everything queued so far has been written
    fn close(&self);

    /// Address of the peer
    fn remote_address(&self) -> SocketAddr;
}

/// Commands for the writer task
#[derive(Debug)]
pub enum Outbound {
    Frame {
        data: Bytes,
        completion: Option<oneshot::Sender<()>>,
    },
    Close,
}

/// Transport backed by an unbounded channel
pub struct ChannelTransport {
    address: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
    /// Shared with the writer task
    active: Arc<AtomicBool>,
    /// Set once a close was queued
    closing: AtomicBool,
}

impl ChannelTransport {
    /// Create a transport and the receiving end its writer drains
    pub fn new(address: SocketAddr) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));
        let transport = Self {
            address,
            tx,
            active: active.clone(),
            closing: AtomicBool::new(false),
        };
        (transport, OutboundReceiver { rx, active })
    }

    /// Mark the connection dead (peer hung up)
    pub fn mark_inactive(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl Transport for ChannelTransport {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.closing.load(Ordering::SeqCst)
    }

    fn write(
        &self,
        data: Bytes,
        completion: Option<oneshot::Sender<()>>,
    ) -> Result<(), NetworkError> {
        if !self.is_active() {
            return Err(NetworkError::ConnectionClosed);
        }
        self.tx
            .send(Outbound::Frame { data, completion })
            .map_err(|_| {
                self.mark_inactive();
                NetworkError::ConnectionClosed
            })
    }

    fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        // The writer may already be gone
        let _ = self.tx.send(Outbound::Close);
    }

    fn remote_address(&self) -> SocketAddr {
        self.address
    }
}

impl fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("address", &self.address)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Receiving half of a [`ChannelTransport`]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<Outbound>,
    active: Arc<AtomicBool>,
}

impl OutboundReceiver {
    /// Next command, waiting for one
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Next command if one is queued
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Drain commands into `writer` until closed
    pub async fn run_writer<W>(mut self, mut writer: W)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(command) = self.rx.recv().await {
            match command {
                Outbound::Frame { data, completion } => {
                    if let Err(e) = writer.write_all(&data).await {
                        warn!(error = %e, "Write failed, closing transport");
                        break;
                    }
                    trace!(bytes = data.len(), "Wrote frame");
                    if let Some(completion) = completion {
                        let _ = completion.send(());
                    }
                }
                Outbound::Close => {
                    debug!("Close requested, shutting down writer");
                    break;
                }
            }
        }

        self.active.store(false, Ordering::SeqCst);
        let _ = writer.flush().await;
        let _ = writer.shutdown().await;
    }
}
