//! Handshake phase messages
//!
//! The first frame of every connection. It names the protocol version the
//! client speaks and whether it wants the server list status or to log in.

use super::{Packet, ProtocolPhase};
use crate::error::CodecError;
use crate::net::buffer::PacketBuffer;

/// Intent value requesting the STATUS phase
pub const INTENT_STATUS: i32 = 1;

/// Intent value requesting the LOGIN phase
pub const INTENT_LOGIN: i32 = 2;

/// Handshake (serverbound 0x00)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub intent: i32,
}

impl Packet for Handshake {
    const ID: i32 = 0x00;
    const PHASE: ProtocolPhase = ProtocolPhase::Handshake;
    const NAME: &'static str = "Handshake";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            protocol_version: buffer.read_varint()?,
            server_address: buffer.read_string(255)?,
            server_port: buffer.read_u16()?,
            intent: buffer.read_varint()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_varint(self.protocol_version);
        buffer.write_string(&self.server_address);
        buffer.write_u16(self.server_port);
        buffer.write_varint(self.intent);
    }
}

impl Handshake {
    /// Phase requested by the intent field, if it names one
    pub fn requested_phase(&self) -> Option<ProtocolPhase> {
        ProtocolPhase::from_intent(self.intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_round_trip() {
        let handshake = Handshake {
            protocol_version: 578,
            server_address: "play.example.net".to_string(),
            server_port: 25565,
            intent: INTENT_LOGIN,
        };

        let mut buffer = PacketBuffer::new();
        handshake.encode(&mut buffer);
        let decoded = Handshake::decode(&mut buffer).unwrap();

        assert_eq!(decoded, handshake);
        assert_eq!(decoded.requested_phase(), Some(ProtocolPhase::Login));
    }

    #[test]
    fn test_truncated_handshake() {
        let handshake = Handshake {
            protocol_version: 578,
            server_address: "localhost".to_string(),
            server_port: 25565,
            intent: INTENT_STATUS,
        };

        let mut buffer = PacketBuffer::new();
        handshake.encode(&mut buffer);
        let bytes = buffer.as_bytes();

        // Every strict prefix must fail cleanly
        for cut in 0..bytes.len() {
            let mut truncated = PacketBuffer::from_bytes(&bytes[..cut]);
            assert!(Handshake::decode(&mut truncated).is_err(), "prefix {}", cut);
        }
    }
}
