//! Login phase messages
//!
//! The login exchange runs as:
//! 1. Client sends `LoginStart` with its display name
//! 2. Server answers with `EncryptionRequest` (skipped in debug mode)
//! 3. Client sends `EncryptionResponse`; both sides switch on AES/CFB8
//! 4. Server sends `SetCompression` followed by `LoginSuccess`

use super::chat::ChatComponent;
use super::{Packet, ProtocolPhase};
use crate::error::CodecError;
use crate::net::buffer::PacketBuffer;

/// Maximum length of a display name
pub const MAX_NAME_LENGTH: usize = 16;

/// Maximum length of a chat JSON document
pub const MAX_CHAT_JSON_LENGTH: usize = 262144;

/// Login start (serverbound 0x00)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub name: String,
}

impl Packet for LoginStart {
    const ID: i32 = 0x00;
    const PHASE: ProtocolPhase = ProtocolPhase::Login;
    const NAME: &'static str = "LoginStart";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            name: buffer.read_string(MAX_NAME_LENGTH)?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.name);
    }
}

/// Encryption response (serverbound 0x01)
///
/// Both fields are encrypted with the server's RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    pub shared_secret: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl Packet for EncryptionResponse {
    const ID: i32 = 0x01;
    const PHASE: ProtocolPhase = ProtocolPhase::Login;
    const NAME: &'static str = "EncryptionResponse";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            shared_secret: buffer.read_byte_array()?,
            verify_token: buffer.read_byte_array()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_byte_array(&self.shared_secret);
        buffer.write_byte_array(&self.verify_token);
    }
}

/// Login disconnect (clientbound 0x00)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDisconnect {
    pub reason: String,
}

impl LoginDisconnect {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: ChatComponent::reason(reason).to_json(),
        }
    }
}

impl Packet for LoginDisconnect {
    const ID: i32 = 0x00;
    const PHASE: ProtocolPhase = ProtocolPhase::Login;
    const NAME: &'static str = "LoginDisconnect";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            reason: buffer.read_string(MAX_CHAT_JSON_LENGTH)?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.reason);
    }
}

/// Encryption request (clientbound 0x01)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    pub server_id: String,
    /// DER encoded SubjectPublicKeyInfo
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl Packet for EncryptionRequest {
    const ID: i32 = 0x01;
    const PHASE: ProtocolPhase = ProtocolPhase::Login;
    const NAME: &'static str = "EncryptionRequest";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            server_id: buffer.read_string(20)?,
            public_key: buffer.read_byte_array()?,
            verify_token: buffer.read_byte_array()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.server_id);
        buffer.write_byte_array(&self.public_key);
        buffer.write_byte_array(&self.verify_token);
    }
}

/// Login success (clientbound 0x02)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    /// Hyphenated UUID string
    pub uuid: String,
    pub username: String,
}

impl Packet for LoginSuccess {
    const ID: i32 = 0x02;
    const PHASE: ProtocolPhase = ProtocolPhase::Login;
    const NAME: &'static str = "LoginSuccess";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            uuid: buffer.read_string(36)?,
            username: buffer.read_string(MAX_NAME_LENGTH)?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.uuid);
        buffer.write_string(&self.username);
    }
}

/// Set compression (clientbound 0x03)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCompression {
    pub threshold: i32,
}

impl Packet for SetCompression {
    const ID: i32 = 0x03;
    const PHASE: ProtocolPhase = ProtocolPhase::Login;
    const NAME: &'static str = "SetCompression";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            threshold: buffer.read_varint()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_varint(self.threshold);
    }
}
