//! AES-128-CTR stream ciphers for established sessions.
//!
//! obfs3 carries no framing or authentication after the handshake: each
//! direction is a single AES-CTR keystream XORed over the byte stream, so
//! ciphertext length always equals plaintext length.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use ctr::Ctr128BE;

use crate::crypto::{DirectionKeys, SessionKeys};

type Aes128Ctr = Ctr128BE<Aes128>;

/// One direction's keystream.
pub struct CtrCipher(Aes128Ctr);

impl CtrCipher {
    /// Create a cipher positioned at the start of the keystream.
    pub fn new(keys: &DirectionKeys) -> Self {
        Self(Aes128Ctr::new(keys.key().into(), keys.counter().into()))
    }

    /// XOR the next `buf.len()` keystream bytes into `buf`.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.0.apply_keystream(buf);
    }
}

/// The pair of ciphers installed once the handshake completes.
///
/// `send` encrypts outbound bytes, `recv` decrypts inbound bytes. Which
/// derived key feeds which side depends on the role.
pub struct DirectionalCiphers {
    send: CtrCipher,
    recv: CtrCipher,
}

impl DirectionalCiphers {
    /// Ciphers for the connecting side (client).
    pub fn initiator(keys: &SessionKeys) -> Self {
        Self {
            send: CtrCipher::new(keys.initiator_keys()),
            recv: CtrCipher::new(keys.responder_keys()),
        }
    }

    /// Ciphers for the accepting side (bridge).
    pub fn responder(keys: &SessionKeys) -> Self {
        Self {
            send: CtrCipher::new(keys.responder_keys()),
            recv: CtrCipher::new(keys.initiator_keys()),
        }
    }

    /// Encrypt outbound application bytes in place.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        self.send.apply(buf);
    }

    /// Decrypt inbound bytes in place.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.recv.apply(buf);
    }
}
