//! AES-128/CFB8 stream cipher
//!
//! Once the shared secret is agreed both directions of the connection are
//! encrypted with AES-128 in CFB8 mode. The secret doubles as the IV. Each
//! direction keeps its own running state, so bytes must be processed in the
//! exact order they travel on the wire.

use aes::Aes128;
use cfb8::cipher::generic_array::GenericArray;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::CryptoError;

/// Length of the shared secret in bytes
pub const SHARED_SECRET_LEN: usize = 16;

type Encryptor = cfb8::Encryptor<Aes128>;
type Decryptor = cfb8::Decryptor<Aes128>;

/// Cipher for one direction of traffic
pub struct StreamCipher {
    inner: CipherState,
}

enum CipherState {
    Encrypt(Encryptor),
    Decrypt(Decryptor),
}

impl StreamCipher {
    /// Cipher for bytes we send
    pub fn encryptor(secret: &[u8]) -> Result<Self, CryptoError> {
        let encryptor = Encryptor::new_from_slices(secret, secret)
            .map_err(|_| CryptoError::InvalidKeyLength(secret.len()))?;
        Ok(Self {
            inner: CipherState::Encrypt(encryptor),
        })
    }

    /// Cipher for bytes we receive
    pub fn decryptor(secret: &[u8]) -> Result<Self, CryptoError> {
        let decryptor = Decryptor::new_from_slices(secret, secret)
            .map_err(|_| CryptoError::InvalidKeyLength(secret.len()))?;
        Ok(Self {
            inner: CipherState::Decrypt(decryptor),
        })
    }

    /// Transform `data` in place, advancing the stream state
    pub fn apply(&mut self, data: &mut [u8]) {
        match &mut self.inner {
            CipherState::Encrypt(cipher) => {
                for byte in data.chunks_mut(1) {
                    cipher.encrypt_block_mut(GenericArray::from_mut_slice(byte));
                }
            }
            CipherState::Decrypt(cipher) => {
                for byte in data.chunks_mut(1) {
                    cipher.decrypt_block_mut(GenericArray::from_mut_slice(byte));
                }
            }
        }
    }
}

impl std::fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.inner {
            CipherState::Encrypt(_) => "encrypt",
            CipherState::Decrypt(_) => "decrypt",
        };
        f.debug_struct("StreamCipher").field("mode", &mode).finish()
    }
}

/// Encrypt and decrypt halves built from the same secret
#[derive(Debug)]
pub struct CipherPair {
    pub encrypt: StreamCipher,
    pub decrypt: StreamCipher,
}

impl CipherPair {
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.len() != SHARED_SECRET_LEN {
            return Err(CryptoError::InvalidKeyLength(secret.len()));
        }
        Ok(Self {
            encrypt: StreamCipher::encryptor(secret)?,
            decrypt: StreamCipher::decryptor(secret)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 16] = *b"0123456789abcdef";

    #[test]
    fn test_stream_is_chunking_independent() {
        let plain: Vec<u8> = (0..=255u8).collect();

        let mut whole = plain.clone();
        StreamCipher::encryptor(&SECRET).unwrap().apply(&mut whole);
        assert_ne!(whole, plain);

        // Same bytes in uneven pieces produce the same ciphertext
        let mut pieces = plain.clone();
        let mut cipher = StreamCipher::encryptor(&SECRET).unwrap();
        let (a, rest) = pieces.split_at_mut(3);
        let (b, c) = rest.split_at_mut(100);
        cipher.apply(a);
        cipher.apply(b);
        cipher.apply(c);
        assert_eq!(pieces, whole);

        let mut decrypt = StreamCipher::decryptor(&SECRET).unwrap();
        decrypt.apply(&mut pieces[..50]);
        decrypt.apply(&mut pieces[50..]);
        assert_eq!(pieces, plain);
    }

    #[test]
    fn test_pair_talks_to_itself() {
        let mut server = CipherPair::new(&SECRET).unwrap();
        let mut client = CipherPair::new(&SECRET).unwrap();

        let mut data = b"hello over the wire".to_vec();
        server.encrypt.apply(&mut data);
        client.decrypt.apply(&mut data);
        assert_eq!(data, b"hello over the wire");
    }

    #[test]
    fn test_bad_secret_length() {
        assert!(matches!(
            CipherPair::new(&[1, 2, 3]),
            Err(CryptoError::InvalidKeyLength(3))
        ));
    }
}
