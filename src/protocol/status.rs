//! Status phase messages (server list ping)

use serde::{Deserialize, Serialize};

use super::chat::ChatComponent;
use super::{Packet, ProtocolPhase, GAME_VERSION, PROTOCOL_VERSION};
use crate::error::CodecError;
use crate::net::buffer::PacketBuffer;

/// Status request (serverbound 0x00)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusRequest;

impl Packet for StatusRequest {
    const ID: i32 = 0x00;
    const PHASE: ProtocolPhase = ProtocolPhase::Status;
    const NAME: &'static str = "StatusRequest";

    fn decode(_buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self)
    }

    fn encode(&self, _buffer: &mut PacketBuffer) {}
}

/// Status ping (serverbound 0x01)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPing {
    pub payload: i64,
}

impl Packet for StatusPing {
    const ID: i32 = 0x01;
    const PHASE: ProtocolPhase = ProtocolPhase::Status;
    const NAME: &'static str = "StatusPing";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            payload: buffer.read_i64()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_i64(self.payload);
    }
}

/// Status response (clientbound 0x00)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

impl Packet for StatusResponse {
    const ID: i32 = 0x00;
    const PHASE: ProtocolPhase = ProtocolPhase::Status;
    const NAME: &'static str = "StatusResponse";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            json: buffer.read_string(32767)?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.json);
    }
}

/// Status pong (clientbound 0x01)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPong {
    pub payload: i64,
}

impl Packet for StatusPong {
    const ID: i32 = 0x01;
    const PHASE: ProtocolPhase = ProtocolPhase::Status;
    const NAME: &'static str = "StatusPong";

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, CodecError> {
        Ok(Self {
            payload: buffer.read_i64()?,
        })
    }

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_i64(self.payload);
    }
}

/// JSON document carried by [`StatusResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub version: StatusVersion,
    pub players: StatusPlayers,
    pub description: ChatComponent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPlayers {
    pub max: u32,
    pub online: usize,
    #[serde(default)]
    pub sample: Vec<StatusSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSample {
    pub name: String,
    pub id: String,
}

impl ServerStatus {
    pub fn new(motd: &str, max_players: u32, online: usize) -> Self {
        Self {
            version: StatusVersion {
                name: GAME_VERSION.to_string(),
                protocol: PROTOCOL_VERSION,
            },
            players: StatusPlayers {
                max: max_players,
                online,
                sample: Vec::new(),
            },
            description: ChatComponent::text(motd),
        }
    }

    pub fn into_response(self) -> Result<StatusResponse, serde_json::Error> {
        Ok(StatusResponse {
            json: serde_json::to_string(&self)?,
        })
    }
}
