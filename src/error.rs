//! Error handling module
//!
//! Defines custom error types for the Cinder server.

use std::io;

use thiserror::Error;

use crate::protocol::ProtocolPhase;

/// Main error type for the Cinder server
#[derive(Error, Debug)]
pub enum ServerError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Wire codec errors (framing, compression, message layout)
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Pipeline mutation errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Cryptography errors
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Whether this error leaves the session in a state that cannot be trusted.
    ///
    /// Protocol violations and codec failures tear the session down; anything
    /// else raised while handling a well-formed message is isolated to that
    /// message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::Protocol(_) | ServerError::Codec(_) | ServerError::Pipeline(_)
        )
    }
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Too many connections from {0}")]
    TooManyConnections(String),
}

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Illegal phase transition from {from} to {to}")]
    IllegalPhaseTransition {
        from: ProtocolPhase,
        to: ProtocolPhase,
    },

    #[error("No codec set registered for phase {0}")]
    UnregisteredPhase(ProtocolPhase),

    #[error("Unknown handshake intent: {0}")]
    UnknownIntent(i32),

    #[error("Unexpected {message} in login state {actual} (expected {expected})")]
    UnexpectedLoginState {
        message: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Unexpected message in phase {phase}: {message}")]
    UnexpectedMessage {
        phase: ProtocolPhase,
        message: &'static str,
    },

    #[error("Invalid verify token")]
    InvalidVerifyToken,

    #[error("Invalid shared secret length: {0}")]
    InvalidSharedSecret(usize),

    #[error("Identity already assigned")]
    IdentityAlreadyAssigned,

    #[error("No login has been started")]
    MissingIdentity,
}

/// Errors raised while framing, inflating or decoding wire data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("VarInt is too big")]
    VarIntTooLong,

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Unknown message id {id:#04x} in phase {phase}")]
    UnknownMessage { phase: ProtocolPhase, id: i32 },

    #[error("{trailing} trailing bytes after message id {id:#04x}")]
    TrailingBytes { id: i32, trailing: usize },

    #[error("String too long: {actual} characters (max: {max})")]
    StringTooLong { max: usize, actual: usize },

    #[error("Invalid string encoding")]
    InvalidStringEncoding,

    #[error("Invalid value for field '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Badly compressed message: {0}")]
    Compression(String),

    #[error("Cannot encode {message} while in phase {phase}")]
    WrongPhase {
        phase: ProtocolPhase,
        message: &'static str,
    },
}

/// Pipeline mutation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No stage named '{0}'")]
    UnknownStage(String),

    #[error("Stage '{0}' is already installed")]
    DuplicateStage(String),
}

/// Cryptography errors
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("Public key encoding failed: {0}")]
    KeyEncoding(String),

    #[error("Invalid cipher key length: {0}")]
    InvalidKeyLength(usize),
}

/// Game collaborator errors
#[derive(Error, Debug)]
pub enum GameError {
    #[error("Player already online: {0}")]
    AlreadyOnline(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

/// Result type alias for Cinder operations
pub type Result<T> = std::result::Result<T, ServerError>;
