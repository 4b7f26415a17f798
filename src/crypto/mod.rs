//! Cryptographic primitives for obfs3.
//!
//! This module provides:
//! - UniformDH key exchange over the RFC 3526 1536-bit MODP group
//! - HMAC-SHA256 session key and magic tag derivation
//! - AES-128-CTR stream ciphers, one per traffic direction
//! - Secure random number generation
//!
//! All secret material is zeroized on drop to prevent memory leakage.

mod cipher;
mod kdf;
mod keys;
mod random;

pub use cipher::{CtrCipher, DirectionalCiphers};
pub use kdf::{DirectionKeys, SessionKeys};
pub use keys::{PublicValue, SharedSecret, UniformDh};
pub use random::{random_padding, SecureRandom};

/// Size of UniformDH public values and shared secrets in bytes (1536 bits)
pub const KEY_LENGTH: usize = 1536 / 8;

/// Size of AES-128 keys in bytes
pub const CIPHER_KEY_SIZE: usize = 16;

/// Size of the AES-CTR initial counter block in bytes
pub const COUNTER_SIZE: usize = 16;

/// Size of the magic tags marking the end of padding (HMAC-SHA256 output)
pub const MAGIC_LENGTH: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_key_exchange_and_encryption() {
        // Each side generates a fresh UniformDH keypair
        let mut client = UniformDh::random();
        let mut server = UniformDh::random();
        let client_public = client.public_value().clone();
        let server_public = server.public_value().clone();

        // Both sides compute the shared secret
        let client_shared = client.compute_shared_secret(server_public.as_ref()).unwrap();
        let server_shared = server.compute_shared_secret(client_public.as_ref()).unwrap();
        assert_eq!(client_shared.as_bytes(), server_shared.as_bytes());

        // Derive session keys
        let client_keys = SessionKeys::derive(&client_shared);
        let server_keys = SessionKeys::derive(&server_shared);
        assert_eq!(client_keys.initiator_magic(), server_keys.initiator_magic());
        assert_eq!(client_keys.responder_magic(), server_keys.responder_magic());

        // Client encrypts with the initiator cipher, server recovers it
        let plaintext = b"Hello, obfuscated world!";
        let mut client_ciphers = DirectionalCiphers::initiator(&client_keys);
        let mut server_ciphers = DirectionalCiphers::responder(&server_keys);

        let mut buf = plaintext.to_vec();
        client_ciphers.encrypt(&mut buf);
        assert_ne!(buf.as_slice(), plaintext.as_slice());
        server_ciphers.decrypt(&mut buf);
        assert_eq!(buf.as_slice(), plaintext.as_slice());

        // And the other direction
        let reply = b"reply from the bridge";
        let mut buf = reply.to_vec();
        server_ciphers.encrypt(&mut buf);
        client_ciphers.decrypt(&mut buf);
        assert_eq!(buf.as_slice(), reply.as_slice());
    }
}
