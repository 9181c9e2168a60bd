//! Play phase messages
//!
//! Only the messages the session engine itself needs plus the movement
//! family that gameplay code builds on.

use super::chat::ChatComponent;
use super::login::MAX_CHAT_JSON_LENGTH;
use super::{Packet, ProtocolPhase};
use crate::error::CodecError;
use crate::net::buffer::PacketBuffer;

// ============ Serverbound ============

/// Chat message (serverbound 0x03)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message: String,
}

impl Packet for ChatMessage {
    const ID: i32 = 0x03;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "ChatMessage";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            message: buffer.read_string(256)?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.message);
    }
}

/// Keep-alive reply (serverbound 0x0F)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveResponse {
    pub id: i64,
}

impl Packet for KeepAliveResponse {
    const ID: i32 = 0x0F;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "KeepAliveResponse";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            id: buffer.read_i64()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_i64(self.id);
    }
}

/// Player position (serverbound 0x11)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub on_ground: bool,
}

impl Packet for PlayerPosition {
    const ID: i32 = 0x11;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "PlayerPosition";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            x: buffer.read_f64()?,
            y: buffer.read_f64()?,
            z: buffer.read_f64()?,
            on_ground: buffer.read_bool()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_f64(self.x);
        buffer.write_f64(self.y);
        buffer.write_f64(self.z);
        buffer.write_bool(self.on_ground);
    }
}

/// Player position and rotation (serverbound 0x12)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPositionAndRotation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

impl Packet for PlayerPositionAndRotation {
    const ID: i32 = 0x12;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "PlayerPositionAndRotation";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            x: buffer.read_f64()?,
            y: buffer.read_f64()?,
            z: buffer.read_f64()?,
            yaw: buffer.read_f32()?,
            pitch: buffer.read_f32()?,
            on_ground: buffer.read_bool()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_f64(self.x);
        buffer.write_f64(self.y);
        buffer.write_f64(self.z);
        buffer.write_f32(self.yaw);
        buffer.write_f32(self.pitch);
        buffer.write_bool(self.on_ground);
    }
}

/// Look update (serverbound 0x13)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerRotation {
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

impl Packet for PlayerRotation {
    const ID: i32 = 0x13;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "PlayerRotation";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            yaw: buffer.read_f32()?,
            pitch: buffer.read_f32()?,
            on_ground: buffer.read_bool()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_f32(self.yaw);
        buffer.write_f32(self.pitch);
        buffer.write_bool(self.on_ground);
    }
}

/// Player movement, ground flag only (serverbound 0x14)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerMovement {
    pub on_ground: bool,
}

impl Packet for PlayerMovement {
    const ID: i32 = 0x14;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "PlayerMovement";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            on_ground: buffer.read_bool()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_bool(self.on_ground);
    }
}

// ============ Clientbound ============

/// Chat position byte values
pub const CHAT_POSITION_CHAT: u8 = 0;
pub const CHAT_POSITION_SYSTEM: u8 = 1;

/// Chat line sent to the client (clientbound 0x0F)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatBroadcast {
    pub json: String,
    pub position: u8,
}

impl ChatBroadcast {
    pub fn system(text: &str) -> Self {
        Self {
            json: ChatComponent::text(text).to_json(),
            position: CHAT_POSITION_SYSTEM,
        }
    }

    /// Line from a player, shown in the chat box
    pub fn chat(text: &str) -> Self {
        Self {
            json: ChatComponent::text(text).to_json(),
            position: CHAT_POSITION_CHAT,
        }
    }
}

impl Packet for ChatBroadcast {
    const ID: i32 = 0x0F;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "ChatBroadcast";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            json: buffer.read_string(MAX_CHAT_JSON_LENGTH)?,
            position: buffer.read_u8()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.json);
        buffer.write_u8(self.position);
    }
}

/// Disconnect (clientbound 0x1B)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: String,
}

impl Disconnect {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: ChatComponent::reason(reason).to_json(),
        }
    }
}

impl Packet for Disconnect {
    const ID: i32 = 0x1B;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "Disconnect";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            reason: buffer.read_string(MAX_CHAT_JSON_LENGTH)?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.reason);
    }
}

/// Keep-alive probe (clientbound 0x21)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

impl Packet for KeepAlive {
    const ID: i32 = 0x21;
    const PHASE: ProtocolPhase = ProtocolPhase::Play;
    const NAME: &'static str = "KeepAlive";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            id: buffer.read_i64()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_i64(self.id);
    }
}
