//! Per-connection processing pipeline
//!
//! An ordered list of named byte stages followed by the message codec of the
//! current phase. Inbound bytes run through the stages front to back; outbound
//! messages are encoded by the codec and then run through the stages back to
//! front. With everything enabled the order is:
//!
//! ```text
//! inbound:  encryption -> framing -> compression -> codec
//! outbound: codec -> compression -> framing -> encryption
//! ```
//!
//! Stages can be inserted or replaced by name at any time. Frames that were
//! already split off stay queued and are decoded lazily, so a codec swap
//! applies to every frame not yet decoded, while a byte stage only ever sees
//! bytes that reach it after it was installed.

use std::collections::VecDeque;
use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::{CodecError, PipelineError};
use crate::protocol::{ClientboundMessage, CodecSet, ServerboundMessage};

pub mod compression;
pub mod encryption;
pub mod framing;

pub use compression::CompressionStage;
pub use encryption::EncryptionStage;
pub use framing::FramingStage;

/// Stage names
pub const FRAMING: &str = "framing";
pub const COMPRESSION: &str = "compression";
pub const ENCRYPTION: &str = "encryption";

/// A byte transform in the pipeline
pub trait Stage: Send + fmt::Debug {
    /// Transform one inbound buffer, pushing zero or more buffers downstream
    fn decode(&mut self, input: BytesMut, out: &mut Vec<BytesMut>) -> Result<(), CodecError>;

    /// Transform one outbound buffer
    fn encode(&mut self, input: BytesMut) -> Result<BytesMut, CodecError>;
}

#[derive(Debug)]
struct NamedStage {
    name: &'static str,
    stage: Box<dyn Stage>,
}

/// The pipeline of one connection
pub struct Pipeline {
    stages: Vec<NamedStage>,
    codec: &'static CodecSet,
    /// Frames that passed every byte stage but are not decoded yet
    pending: VecDeque<BytesMut>,
}

impl Pipeline {
    /// A pipeline with only framing installed
    pub fn new(codec: &'static CodecSet) -> Self {
        Self {
            stages: vec![NamedStage {
                name: FRAMING,
                stage: Box::new(FramingStage::new()),
            }],
            codec,
            pending: VecDeque::new(),
        }
    }

    // ============ Stage management ============

    /// Names of the installed stages in inbound order
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    fn insert(
        &mut self,
        index: usize,
        name: &'static str,
        stage: Box<dyn Stage>,
    ) -> Result<(), PipelineError> {
        if self.contains(name) {
            return Err(PipelineError::DuplicateStage(name.to_string()));
        }
        self.stages.insert(index, NamedStage { name, stage });
        Ok(())
    }

    /// Install a stage in front of every other stage
    pub fn add_first(&mut self, name: &'static str, stage: Box<dyn Stage>) -> Result<(), PipelineError> {
        self.insert(0, name, stage)
    }

    /// Install a stage right behind `anchor`
    pub fn add_after(
        &mut self,
        anchor: &str,
        name: &'static str,
        stage: Box<dyn Stage>,
    ) -> Result<(), PipelineError> {
        let index = self
            .position(anchor)
            .ok_or_else(|| PipelineError::UnknownStage(anchor.to_string()))?;
        self.insert(index + 1, name, stage)
    }

    /// Swap the stage called `name`, returning the old one
    pub fn replace_stage(
        &mut self,
        name: &str,
        stage: Box<dyn Stage>,
    ) -> Result<Box<dyn Stage>, PipelineError> {
        let index = self
            .position(name)
            .ok_or_else(|| PipelineError::UnknownStage(name.to_string()))?;
        Ok(std::mem::replace(&mut self.stages[index].stage, stage))
    }

    /// Codec set currently in effect
    pub fn codec(&self) -> &'static CodecSet {
        self.codec
    }

    /// Swap the codec, returning the previous one. Byte stages are untouched.
    pub fn set_codec(&mut self, codec: &'static CodecSet) -> &'static CodecSet {
        std::mem::replace(&mut self.codec, codec)
    }

    // ============ Inbound ============

    /// Run freshly received bytes through the byte stages
    pub fn push_inbound(&mut self, chunk: BytesMut) -> Result<(), CodecError> {
        let mut batch = vec![chunk];
        for named in self.stages.iter_mut() {
            let mut next = Vec::with_capacity(batch.len());
            for buffer in batch.drain(..) {
                named.stage.decode(buffer, &mut next)?;
            }
            batch = next;
            if batch.is_empty() {
                return Ok(());
            }
        }
        self.pending.extend(batch);
        Ok(())
    }

    /// Number of frames waiting to be decoded
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Take the next complete frame body
    pub fn next_frame(&mut self) -> Option<BytesMut> {
        self.pending.pop_front()
    }

    /// Decode the next complete frame with the current codec
    pub fn next_message(&mut self) -> Option<Result<ServerboundMessage, CodecError>> {
        let frame = self.pending.pop_front()?;
        Some(self.codec.decode_serverbound(&frame))
    }

    // ============ Outbound ============

    /// Encode a message with the current codec and every byte stage
    pub fn encode(&mut self, message: &ClientboundMessage) -> Result<Bytes, CodecError> {
        let body = self.codec.encode_clientbound(message)?;
        self.encode_frame(body)
    }

    /// Run an already encoded body through the byte stages
    pub fn encode_frame(&mut self, body: BytesMut) -> Result<Bytes, CodecError> {
        let mut data = body;
        for named in self.stages.iter_mut().rev() {
            data = named.stage.encode(data)?;
        }
        Ok(data.freeze())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.names())
            .field("phase", &self.codec.phase())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CipherPair;
    use crate::protocol::{codec_set, login, play, status, ProtocolPhase};

    fn pipeline(phase: ProtocolPhase) -> Pipeline {
        Pipeline::new(codec_set(phase).unwrap())
    }

    /// Client side encoding of a serverbound message
    fn client_frame(client: &mut Pipeline, message: ServerboundMessage) -> Bytes {
        let body = client.codec().encode_serverbound(&message).unwrap();
        client.encode_frame(body).unwrap()
    }

    #[test]
    fn test_stage_order() {
        let mut p = pipeline(ProtocolPhase::Login);
        assert_eq!(p.names(), vec![FRAMING]);

        p.add_after(FRAMING, COMPRESSION, Box::new(CompressionStage::new(64)))
            .unwrap();
        let ciphers = CipherPair::new(&[1; 16]).unwrap();
        p.add_first(ENCRYPTION, Box::new(EncryptionStage::new(ciphers)))
            .unwrap();

        assert_eq!(p.names(), vec![ENCRYPTION, FRAMING, COMPRESSION]);
    }

    #[test]
    fn test_duplicate_and_unknown_stage() {
        let mut p = pipeline(ProtocolPhase::Login);
        assert_eq!(
            p.add_after("codec", COMPRESSION, Box::new(CompressionStage::new(1))),
            Err(PipelineError::UnknownStage("codec".into()))
        );
        assert_eq!(
            p.add_first(FRAMING, Box::new(FramingStage::new())),
            Err(PipelineError::DuplicateStage(FRAMING.into()))
        );
    }

    #[test]
    fn test_replace_keeps_siblings() {
        let mut p = pipeline(ProtocolPhase::Login);
        p.add_after(FRAMING, COMPRESSION, Box::new(CompressionStage::new(64)))
            .unwrap();

        let old = p
            .replace_stage(COMPRESSION, Box::new(CompressionStage::new(128)))
            .unwrap();
        assert!(format!("{:?}", old).contains("64"));
        assert_eq!(p.names(), vec![FRAMING, COMPRESSION]);
    }

    #[test]
    fn test_partial_frame_survives_replacement() {
        let mut server = pipeline(ProtocolPhase::Status);
        let mut client = pipeline(ProtocolPhase::Status);
        for p in [&mut server, &mut client] {
            p.add_after(FRAMING, COMPRESSION, Box::new(CompressionStage::new(64)))
                .unwrap();
        }
        let bytes = client_frame(&mut client, status::StatusPing { payload: 99 }.into());

        let (head, tail) = bytes.split_at(4);
        server.push_inbound(BytesMut::from(head)).unwrap();
        assert_eq!(server.pending_frames(), 0);

        // Swapping a sibling stage does not lose the buffered half
        server
            .replace_stage(COMPRESSION, Box::new(CompressionStage::new(64)))
            .unwrap();

        server.push_inbound(BytesMut::from(tail)).unwrap();
        assert_eq!(
            server.next_message().unwrap().unwrap(),
            ServerboundMessage::StatusPing(status::StatusPing { payload: 99 })
        );
    }

    #[test]
    fn test_codec_swap_applies_to_queued_frames() {
        let mut server = pipeline(ProtocolPhase::Handshake);
        let mut handshake_client = pipeline(ProtocolPhase::Handshake);
        let mut login_client = pipeline(ProtocolPhase::Login);

        let mut chunk = BytesMut::new();
        chunk.extend_from_slice(&client_frame(
            &mut handshake_client,
            crate::protocol::handshake::Handshake {
                protocol_version: 578,
                server_address: "localhost".into(),
                server_port: 25565,
                intent: 2,
            }
            .into(),
        ));
        chunk.extend_from_slice(&client_frame(
            &mut login_client,
            login::LoginStart {
                name: "Alice".into(),
            }
            .into(),
        ));

        server.push_inbound(chunk).unwrap();
        assert_eq!(server.pending_frames(), 2);

        let first = server.next_message().unwrap().unwrap();
        assert!(matches!(first, ServerboundMessage::Handshake(_)));

        server.set_codec(codec_set(ProtocolPhase::Login).unwrap());
        let second = server.next_message().unwrap().unwrap();
        assert_eq!(
            second,
            ServerboundMessage::LoginStart(login::LoginStart {
                name: "Alice".into()
            })
        );
        assert!(server.next_message().is_none());
    }

    #[test]
    fn test_encryption_only_applies_after_install() {
        let secret = [5u8; 16];
        let mut server = pipeline(ProtocolPhase::Play);
        let mut client = pipeline(ProtocolPhase::Play);

        let plain = client_frame(&mut client, play::KeepAliveResponse { id: 1 }.into());
        server.push_inbound(BytesMut::from(&plain[..])).unwrap();

        server
            .add_first(
                ENCRYPTION,
                Box::new(EncryptionStage::new(CipherPair::new(&secret).unwrap())),
            )
            .unwrap();
        client
            .add_first(
                ENCRYPTION,
                Box::new(EncryptionStage::new(CipherPair::new(&secret).unwrap())),
            )
            .unwrap();

        let encrypted = client_frame(&mut client, play::KeepAliveResponse { id: 2 }.into());
        assert_ne!(&encrypted[1..], &plain[1..]);
        server.push_inbound(BytesMut::from(&encrypted[..])).unwrap();

        let ids: Vec<ServerboundMessage> = std::iter::from_fn(|| server.next_message())
            .map(|m| m.unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                ServerboundMessage::KeepAlive(play::KeepAliveResponse { id: 1 }),
                ServerboundMessage::KeepAlive(play::KeepAliveResponse { id: 2 }),
            ]
        );
    }

    #[test]
    fn test_full_stack_round_trip() {
        let secret = [7u8; 16];
        let mut server = pipeline(ProtocolPhase::Play);
        let mut client = pipeline(ProtocolPhase::Play);
        for p in [&mut server, &mut client] {
            p.add_after(FRAMING, COMPRESSION, Box::new(CompressionStage::new(16)))
                .unwrap();
            p.add_first(
                ENCRYPTION,
                Box::new(EncryptionStage::new(CipherPair::new(&secret).unwrap())),
            )
            .unwrap();
        }

        let chat = play::ChatMessage {
            message: "a fairly long chat line that will be compressed".into(),
        };
        let bytes = client_frame(&mut client, chat.clone().into());
        server.push_inbound(BytesMut::from(&bytes[..])).unwrap();
        assert_eq!(
            server.next_message().unwrap().unwrap(),
            ServerboundMessage::ChatMessage(chat)
        );

        // And back the other way
        let outbound = server
            .encode(&play::Disconnect::new("Exit the game").into())
            .unwrap();
        client.push_inbound(BytesMut::from(&outbound[..])).unwrap();
        let frame = client.next_frame().unwrap();
        assert_eq!(
            client.codec().decode_clientbound(&frame).unwrap(),
            ClientboundMessage::Disconnect(play::Disconnect::new("Exit the game"))
        );
    }

    #[test]
    fn test_encode_rejects_wrong_phase() {
        let mut p = pipeline(ProtocolPhase::Status);
        assert!(matches!(
            p.encode(&play::KeepAlive { id: 1 }.into()),
            Err(CodecError::WrongPhase { .. })
        ));
    }
}
