//! RSA key exchange
//!
//! The server owns one RSA key pair for its lifetime. The public half is sent
//! to clients in the encryption request as a DER encoded SubjectPublicKeyInfo;
//! clients answer with the shared secret and the verify token, both encrypted
//! with PKCS#1 v1.5 padding.

use std::fmt;

use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::CryptoError;

/// Server RSA key pair
pub struct ServerKeyPair {
    private_key: RsaPrivateKey,
    /// Cached DER encoding of the public key
    public_der: Vec<u8>,
}

impl ServerKeyPair {
    /// Generate a fresh key pair
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, bits)?;
        Self::from_private_key(private_key)
    }

    /// Wrap an existing private key
    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, CryptoError> {
        let public_der = RsaPublicKey::from(&private_key)
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?
            .as_bytes()
            .to_vec();

        Ok(Self {
            private_key,
            public_der,
        })
    }

    /// DER encoded public key as sent to clients
    pub fn public_der(&self) -> &[u8] {
        &self.public_der
    }

    /// Key size in bits
    pub fn key_size_bits(&self) -> usize {
        self.private_key.size() * 8
    }

    /// Decrypt a PKCS#1 v1.5 block encrypted with our public key
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.private_key.decrypt(Pkcs1v15Encrypt, ciphertext)?)
    }
}

impl fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("key_size_bits", &self.key_size_bits())
            // Don't log the private key!
            .finish()
    }
}

/// Encrypt `data` for the holder of a DER encoded public key.
///
/// This is the client's half of the exchange.
pub fn encrypt_for(public_der: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let public_key = RsaPublicKey::from_public_key_der(public_der)
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
    let mut rng = rand::thread_rng();
    Ok(public_key.encrypt(&mut rng, Pkcs1v15Encrypt, data)?)
}
