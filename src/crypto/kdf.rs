//! Session key derivation.
//!
//! obfs3 keys every output with HMAC-SHA256 over the UniformDH shared secret
//! and a fixed label. The 32-byte outputs for the two data directions are
//! split into an AES-128 key and a 128-bit initial counter; the two magic
//! tags are used whole.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{SharedSecret, CIPHER_KEY_SIZE, COUNTER_SIZE, MAGIC_LENGTH};

type HmacSha256 = Hmac<Sha256>;

const INITIATOR_DATA_LABEL: &[u8] = b"Initiator obfuscated data";
const RESPONDER_DATA_LABEL: &[u8] = b"Responder obfuscated data";
const INITIATOR_MAGIC_LABEL: &[u8] = b"Initiator magic";
const RESPONDER_MAGIC_LABEL: &[u8] = b"Responder magic";

/// HMAC-SHA256(shared_secret, label)
fn prf(shared_secret: &SharedSecret, label: &[u8]) -> [u8; MAGIC_LENGTH] {
    let mut mac = HmacSha256::new_from_slice(shared_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(label);
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; MAGIC_LENGTH];
    out.copy_from_slice(&result);
    out
}

/// AES-CTR key and initial counter for one traffic direction.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DirectionKeys {
    key: [u8; CIPHER_KEY_SIZE],
    counter: [u8; COUNTER_SIZE],
}

impl DirectionKeys {
    fn from_secret(mut secret: [u8; CIPHER_KEY_SIZE + COUNTER_SIZE]) -> Self {
        let mut key = [0u8; CIPHER_KEY_SIZE];
        let mut counter = [0u8; COUNTER_SIZE];
        key.copy_from_slice(&secret[..CIPHER_KEY_SIZE]);
        counter.copy_from_slice(&secret[CIPHER_KEY_SIZE..]);
        secret.zeroize();
        Self { key, counter }
    }

    /// Get the AES-128 key.
    pub fn key(&self) -> &[u8; CIPHER_KEY_SIZE] {
        &self.key
    }

    /// Get the initial counter block (big-endian).
    pub fn counter(&self) -> &[u8; COUNTER_SIZE] {
        &self.counter
    }
}

/// Session keys derived from a UniformDH shared secret.
///
/// Contains separate cipher keys for the initiator (client) and responder
/// (server) directions, plus the magic tag each side emits after its padding.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    initiator: DirectionKeys,
    responder: DirectionKeys,
    initiator_magic: [u8; MAGIC_LENGTH],
    responder_magic: [u8; MAGIC_LENGTH],
}

impl SessionKeys {
    /// Derive session keys from a shared secret.
    ///
    /// Deterministic: the same secret always yields the same keys.
    pub fn derive(shared_secret: &SharedSecret) -> Self {
        Self {
            initiator: DirectionKeys::from_secret(prf(shared_secret, INITIATOR_DATA_LABEL)),
            responder: DirectionKeys::from_secret(prf(shared_secret, RESPONDER_DATA_LABEL)),
            initiator_magic: prf(shared_secret, INITIATOR_MAGIC_LABEL),
            responder_magic: prf(shared_secret, RESPONDER_MAGIC_LABEL),
        }
    }

    /// Keys for client-to-server data.
    pub fn initiator_keys(&self) -> &DirectionKeys {
        &self.initiator
    }

    /// Keys for server-to-client data.
    pub fn responder_keys(&self) -> &DirectionKeys {
        &self.responder
    }

    /// Tag the client sends right before its first ciphertext byte.
    pub fn initiator_magic(&self) -> &[u8; MAGIC_LENGTH] {
        &self.initiator_magic
    }

    /// Tag the server sends right before its first ciphertext byte.
    pub fn responder_magic(&self) -> &[u8; MAGIC_LENGTH] {
        &self.responder_magic
    }
}
