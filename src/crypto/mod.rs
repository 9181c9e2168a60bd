//! Cryptography module
//!
//! This module provides the cryptographic primitives used during login:
//! - RSA for exchanging the shared secret
//! - AES-128/CFB8 for encrypting the connection afterwards

pub mod cipher;
pub mod rsa;

// Re-export commonly used types
pub use self::cipher::{CipherPair, StreamCipher, SHARED_SECRET_LEN};
pub use self::rsa::ServerKeyPair;
