//! Phase-scoped codec sets
//!
//! Every protocol phase has its own message universe. A [`CodecSet`] maps the
//! wire ids of one phase to decode functions and is swapped wholesale when the
//! session changes phase.

use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::BytesMut;

use super::{
    handshake, login, play, status, ClientboundMessage, ProtocolPhase, ServerboundMessage,
};
use crate::error::CodecError;
use crate::net::buffer::PacketBuffer;

/// A single message type with a fixed binary layout
pub trait Packet: Sized {
    /// Wire id within the phase
    const ID: i32;

    /// Phase whose catalogue contains the message
    const PHASE: ProtocolPhase;

    /// Name used in logs
    const NAME: &'static str;

    /// Decode the fields (the id has already been consumed)
    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError>;

    /// Encode the fields (without the id)
    fn encode(&self, buffer: &mut PacketBuffer);
}

type Decoder<M> = fn(&mut PacketBuffer) -> Result<M, CodecError>;

fn decode_as<P, M>(buffer: &mut PacketBuffer) -> Result<M, CodecError>
where
    P: Packet + Into<M>,
{
    P::decode(buffer).map(Into::into)
}

/// The messages of one phase, in both directions
pub struct CodecSet {
    phase: ProtocolPhase,
    serverbound: HashMap<i32, Decoder<ServerboundMessage>>,
    clientbound: HashMap<i32, Decoder<ClientboundMessage>>,
}

impl std::fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecSet")
            .field("phase", &self.phase)
            .field("serverbound", &self.serverbound.len())
            .field("clientbound", &self.clientbound.len())
            .finish()
    }
}

impl CodecSet {
    fn new(phase: ProtocolPhase) -> Self {
        Self {
            phase,
            serverbound: HashMap::new(),
            clientbound: HashMap::new(),
        }
    }

    fn serverbound<P>(mut self) -> Self
    where
        P: Packet + Into<ServerboundMessage>,
    {
        debug_assert_eq!(P::PHASE, self.phase);
        self.serverbound
            .insert(P::ID, decode_as::<P, ServerboundMessage>);
        self
    }

    fn clientbound<P>(mut self) -> Self
    where
        P: Packet + Into<ClientboundMessage>,
    {
        debug_assert_eq!(P::PHASE, self.phase);
        self.clientbound
            .insert(P::ID, decode_as::<P, ClientboundMessage>);
        self
    }

    /// Phase this set belongs to
    pub fn phase(&self) -> ProtocolPhase {
        self.phase
    }

    /// Decode one uncompressed, unframed body sent by a client
    pub fn decode_serverbound(&self, body: &[u8]) -> Result<ServerboundMessage, CodecError> {
        decode_with(self.phase, &self.serverbound, body)
    }

    /// Decode one body sent by the server
    pub fn decode_clientbound(&self, body: &[u8]) -> Result<ClientboundMessage, CodecError> {
        decode_with(self.phase, &self.clientbound, body)
    }

    /// Encode a server message, refusing messages from another phase
    pub fn encode_clientbound(&self, message: &ClientboundMessage) -> Result<BytesMut, CodecError> {
        if message.phase() != self.phase {
            return Err(CodecError::WrongPhase {
                phase: self.phase,
                message: message.name(),
            });
        }
        Ok(message.encode_body())
    }

    /// Encode a client message, refusing messages from another phase
    pub fn encode_serverbound(&self, message: &ServerboundMessage) -> Result<BytesMut, CodecError> {
        if message.phase() != self.phase {
            return Err(CodecError::WrongPhase {
                phase: self.phase,
                message: message.name(),
            });
        }
        Ok(message.encode_body())
    }
}

fn decode_with<M>(
    phase: ProtocolPhase,
    decoders: &HashMap<i32, Decoder<M>>,
    body: &[u8],
) -> Result<M, CodecError> {
    let mut buffer = PacketBuffer::from_bytes(body);
    let id = buffer.read_varint()?;
    let decode = decoders
        .get(&id)
        .ok_or(CodecError::UnknownMessage { phase, id })?;

    let message = decode(&mut buffer)?;
    if buffer.has_remaining() {
        return Err(CodecError::TrailingBytes {
            id,
            trailing: buffer.remaining(),
        });
    }
    Ok(message)
}

static CODEC_SETS: OnceLock<HashMap<ProtocolPhase, CodecSet>> = OnceLock::new();

/// Get the codec set registered for a phase
pub fn codec_set(phase: ProtocolPhase) -> Option<&'static CodecSet> {
    CODEC_SETS
        .get_or_init(|| {
            let sets = [
                CodecSet::new(ProtocolPhase::Handshake).serverbound::<handshake::Handshake>(),
                CodecSet::new(ProtocolPhase::Status)
                    .serverbound::<status::StatusRequest>()
                    .serverbound::<status::StatusPing>()
                    .clientbound::<status::StatusResponse>()
                    .clientbound::<status::StatusPong>(),
                CodecSet::new(ProtocolPhase::Login)
                    .serverbound::<login::LoginStart>()
                    .serverbound::<login::EncryptionResponse>()
                    .clientbound::<login::LoginDisconnect>()
                    .clientbound::<login::EncryptionRequest>()
                    .clientbound::<login::LoginSuccess>()
                    .clientbound::<login::SetCompression>(),
                CodecSet::new(ProtocolPhase::Play)
                    .serverbound::<play::ChatMessage>()
                    .serverbound::<play::KeepAliveResponse>()
                    .serverbound::<play::PlayerPosition>()
                    .serverbound::<play::PlayerPositionAndRotation>()
                    .serverbound::<play::PlayerRotation>()
                    .serverbound::<play::PlayerMovement>()
                    .clientbound::<play::ChatBroadcast>()
                    .clientbound::<play::Disconnect>()
                    .clientbound::<play::KeepAlive>(),
            ];

            sets.into_iter().map(|set| (set.phase, set)).collect()
        })
        .get(&phase)
}
