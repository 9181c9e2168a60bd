//! Encryption stage
//!
//! Sits in front of framing: inbound bytes are decrypted before they are
//! split into frames and outbound frames are encrypted last.

use bytes::BytesMut;

use super::Stage;
use crate::crypto::CipherPair;
use crate::error::CodecError;

#[derive(Debug)]
pub struct EncryptionStage {
    ciphers: CipherPair,
}

impl EncryptionStage {
    pub fn new(ciphers: CipherPair) -> Self {
        Self { ciphers }
    }
}

impl Stage for EncryptionStage {
    fn decode(&mut self, mut input: BytesMut, out: &mut Vec<BytesMut>) -> Result<(), CodecError> {
        self.ciphers.decrypt.apply(&mut input);
        out.push(input);
        Ok(())
    }

    fn encode(&mut self, mut input: BytesMut) -> Result<BytesMut, CodecError> {
        self.ciphers.encrypt.apply(&mut input);
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_directions() {
        let secret = [9u8; 16];
        let mut server = EncryptionStage::new(CipherPair::new(&secret).unwrap());
        let mut client = EncryptionStage::new(CipherPair::new(&secret).unwrap());

        let sent = server.encode(BytesMut::from(&b"to the client"[..])).unwrap();
        assert_ne!(&sent[..], b"to the client");

        let mut out = Vec::new();
        client.decode(sent, &mut out).unwrap();
        assert_eq!(&out[0][..], b"to the client");
    }
}
