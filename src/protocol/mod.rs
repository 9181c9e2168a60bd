//! Protocol module
//!
//! This module contains the wire protocol spoken by the Cinder server:
//! - Protocol phases and the transitions allowed between them
//! - The message catalogue of each phase (handshake, status, login, play)
//! - Phase-scoped codec sets used by the session pipeline
//! - Chat JSON helpers for disconnect reasons

use std::fmt;

use bytes::BytesMut;

use crate::net::buffer::PacketBuffer;

pub mod chat;
pub mod codec;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

pub use codec::{codec_set, CodecSet, Packet};

/// The single protocol version this server speaks
pub const PROTOCOL_VERSION: i32 = 578;

/// Human readable game version matching [`PROTOCOL_VERSION`]
pub const GAME_VERSION: &str = "1.15.2";

/// Top-level protocol phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolPhase {
    Handshake,
    Status,
    Login,
    Play,
}

impl ProtocolPhase {
    /// Phases only move forward: HANDSHAKE -> {STATUS | LOGIN} -> PLAY
    pub fn can_advance_to(self, next: ProtocolPhase) -> bool {
        matches!(
            (self, next),
            (ProtocolPhase::Handshake, ProtocolPhase::Status)
                | (ProtocolPhase::Handshake, ProtocolPhase::Login)
                | (ProtocolPhase::Login, ProtocolPhase::Play)
        )
    }

    /// Map a handshake intent to the phase it requests
    pub fn from_intent(intent: i32) -> Option<ProtocolPhase> {
        match intent {
            1 => Some(ProtocolPhase::Status),
            2 => Some(ProtocolPhase::Login),
            _ => None,
        }
    }

    /// Whether this phase has a disconnect message in its catalogue
    pub fn has_disconnect_message(self) -> bool {
        matches!(self, ProtocolPhase::Login | ProtocolPhase::Play)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolPhase::Handshake => "HANDSHAKE",
            ProtocolPhase::Status => "STATUS",
            ProtocolPhase::Login => "LOGIN",
            ProtocolPhase::Play => "PLAY",
        }
    }
}

impl fmt::Display for ProtocolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declares a message enum over a set of [`Packet`] types.
///
/// Each variant carries the packet of the same name and gets a `From` impl,
/// so handlers can build messages with `.into()`.
macro_rules! message_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident($packet:ty)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $name {
            $($variant($packet)),+
        }

        impl $name {
            /// Wire id of the message within its phase
            pub fn id(&self) -> i32 {
                match self {
                    $($name::$variant(_) => <$packet as Packet>::ID),+
                }
            }

            /// Phase whose catalogue contains this message
            pub fn phase(&self) -> ProtocolPhase {
                match self {
                    $($name::$variant(_) => <$packet as Packet>::PHASE),+
                }
            }

            /// Short name used in logs and errors
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant(_) => <$packet as Packet>::NAME),+
                }
            }

            /// Encode as `varint id ++ fields`
            pub fn encode_body(&self) -> BytesMut {
                let mut buffer = PacketBuffer::with_capacity(64);
                buffer.write_varint(self.id());
                match self {
                    $($name::$variant(packet) => packet.encode(&mut buffer)),+
                }
                buffer.into_inner()
            }
        }

        $(
            impl From<$packet> for $name {
                fn from(packet: $packet) -> Self {
                    $name::$variant(packet)
                }
            }
        )+
    };
}

message_enum! {
    /// Messages sent by the client
    pub enum ServerboundMessage {
        Handshake(handshake::Handshake),
        StatusRequest(status::StatusRequest),
        StatusPing(status::StatusPing),
        LoginStart(login::LoginStart),
        EncryptionResponse(login::EncryptionResponse),
        ChatMessage(play::ChatMessage),
        KeepAlive(play::KeepAliveResponse),
        PlayerPosition(play::PlayerPosition),
        PlayerPositionAndRotation(play::PlayerPositionAndRotation),
        PlayerRotation(play::PlayerRotation),
        PlayerMovement(play::PlayerMovement),
    }
}

message_enum! {
    /// Messages sent by the server
    pub enum ClientboundMessage {
        StatusResponse(status::StatusResponse),
        StatusPong(status::StatusPong),
        LoginDisconnect(login::LoginDisconnect),
        EncryptionRequest(login::EncryptionRequest),
        LoginSuccess(login::LoginSuccess),
        SetCompression(login::SetCompression),
        ChatBroadcast(play::ChatBroadcast),
        Disconnect(play::Disconnect),
        KeepAlive(play::KeepAlive),
    }
}

impl ServerboundMessage {
    /// Whether the message may be handled on the I/O thread instead of
    /// waiting for the next tick
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            ServerboundMessage::Handshake(_)
                | ServerboundMessage::StatusRequest(_)
                | ServerboundMessage::StatusPing(_)
                | ServerboundMessage::KeepAlive(_)
        )
    }

    pub fn is_keep_alive(&self) -> bool {
        matches!(self, ServerboundMessage::KeepAlive(_))
    }
}

impl ClientboundMessage {
    pub fn is_keep_alive(&self) -> bool {
        matches!(self, ClientboundMessage::KeepAlive(_))
    }
}
