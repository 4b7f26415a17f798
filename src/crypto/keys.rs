//! UniformDH key exchange primitives.
//!
//! UniformDH is plain Diffie-Hellman over the RFC 3526 1536-bit MODP group
//! with one twist: the published value is either `X = g^x` or `p - X`,
//! picked by the low bit of the random scalar before it is cleared. Because
//! the scalar itself is always even, `(p - X)^y = X^y (mod p)` and both
//! peers agree no matter which form was sent, while the published values are
//! spread over `[0, p)` instead of the quadratic residues.
//!
//! Public values and shared secrets are always exactly [`KEY_LENGTH`] bytes,
//! left-padded with zeros.

use std::fmt;
use std::sync::OnceLock;

use num_bigint_dig::BigUint;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{SecureRandom, KEY_LENGTH};
use crate::error::{Error, Result};

/// The RFC 3526 1536-bit MODP Group ("Group 5") prime.
const RFC3526_GROUP5_P: [u8; KEY_LENGTH] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xC9, 0x0F, 0xDA, 0xA2,
    0x21, 0x68, 0xC2, 0x34, 0xC4, 0xC6, 0x62, 0x8B, 0x80, 0xDC, 0x1C, 0xD1,
    0x29, 0x02, 0x4E, 0x08, 0x8A, 0x67, 0xCC, 0x74, 0x02, 0x0B, 0xBE, 0xA6,
    0x3B, 0x13, 0x9B, 0x22, 0x51, 0x4A, 0x08, 0x79, 0x8E, 0x34, 0x04, 0xDD,
    0xEF, 0x95, 0x19, 0xB3, 0xCD, 0x3A, 0x43, 0x1B, 0x30, 0x2B, 0x0A, 0x6D,
    0xF2, 0x5F, 0x14, 0x37, 0x4F, 0xE1, 0x35, 0x6D, 0x6D, 0x51, 0xC2, 0x45,
    0xE4, 0x85, 0xB5, 0x76, 0x62, 0x5E, 0x7E, 0xC6, 0xF4, 0x4C, 0x42, 0xE9,
    0xA6, 0x37, 0xED, 0x6B, 0x0B, 0xFF, 0x5C, 0xB6, 0xF4, 0x06, 0xB7, 0xED,
    0xEE, 0x38, 0x6B, 0xFB, 0x5A, 0x89, 0x9F, 0xA5, 0xAE, 0x9F, 0x24, 0x11,
    0x7C, 0x4B, 0x1F, 0xE6, 0x49, 0x28, 0x66, 0x51, 0xEC, 0xE4, 0x5B, 0x3D,
    0xC2, 0x00, 0x7C, 0xB8, 0xA1, 0x63, 0xBF, 0x05, 0x98, 0xDA, 0x48, 0x36,
    0x1C, 0x55, 0xD3, 0x9A, 0x69, 0x16, 0x3F, 0xA8, 0xFD, 0x24, 0xCF, 0x5F,
    0x83, 0x65, 0x5D, 0x23, 0xDC, 0xA3, 0xAD, 0x96, 0x1C, 0x62, 0xF3, 0x56,
    0x20, 0x85, 0x52, 0xBB, 0x9E, 0xD5, 0x29, 0x07, 0x70, 0x96, 0x96, 0x6D,
    0x67, 0x0C, 0x35, 0x4E, 0x4A, 0xBC, 0x98, 0x04, 0xF1, 0x74, 0x6C, 0x08,
    0xCA, 0x23, 0x73, 0x27, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// The group generator.
const GENERATOR: u32 = 2;

/// Fixed group parameters, parsed once per process.
struct Group {
    p: BigUint,
    g: BigUint,
    /// Largest acceptable peer value, `p - 2`.
    max_peer: BigUint,
}

fn group() -> &'static Group {
    static GROUP: OnceLock<Group> = OnceLock::new();
    GROUP.get_or_init(|| {
        let p = BigUint::from_bytes_be(&RFC3526_GROUP5_P);
        let max_peer = &p - &BigUint::from(2u32);
        Group {
            p,
            g: BigUint::from(GENERATOR),
            max_peer,
        }
    })
}

/// Serialize `value` right-aligned into a zeroed `KEY_LENGTH` buffer.
///
/// The output width never depends on the magnitude of `value`.
fn to_fixed_width(value: &BigUint) -> Zeroizing<[u8; KEY_LENGTH]> {
    let bytes = Zeroizing::new(value.to_bytes_be());
    assert!(
        bytes.len() <= KEY_LENGTH,
        "group element wider than the modulus"
    );

    let mut out = Zeroizing::new([0u8; KEY_LENGTH]);
    out[KEY_LENGTH - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// A camouflaged UniformDH public value.
///
/// Safe to send on the wire; indistinguishable from uniform random bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicValue([u8; KEY_LENGTH]);

impl PublicValue {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of this public value.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl AsRef<[u8]> for PublicValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PublicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicValue(")?;
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

/// The result of a UniformDH key exchange.
///
/// Always `KEY_LENGTH` bytes. Automatically zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; KEY_LENGTH]);

impl SharedSecret {
    /// Wrap raw shared secret bytes, e.g. from a peer implementation.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw shared secret bytes.
    ///
    /// # Security
    ///
    /// This should be fed into [`SessionKeys::derive`](crate::crypto::SessionKeys::derive)
    /// and dropped, never used as a key directly.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([redacted])")
    }
}

/// The even private scalar. Zeroized when dropped.
struct PrivateKey(BigUint);

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

enum ExchangeState {
    Fresh(PrivateKey),
    Consumed,
}

/// A single-use UniformDH keypair.
///
/// After [`compute_shared_secret`](Self::compute_shared_secret) succeeds the
/// private scalar is gone; further calls fail with
/// [`Error::KeyExchangeAlreadyConsumed`].
pub struct UniformDh {
    public: PublicValue,
    state: ExchangeState,
}

impl UniformDh {
    /// Generate a new keypair from a random 1536-bit scalar.
    pub fn random() -> Self {
        let mut scalar = Zeroizing::new([0u8; KEY_LENGTH]);
        SecureRandom::fill(&mut scalar[..]);
        Self::from_private_key(&scalar)
    }

    /// Create a keypair from an explicit big-endian scalar.
    ///
    /// # Security
    ///
    /// Only for deterministic tests. Real sessions must use [`random`](Self::random).
    pub fn from_private_key(bytes: &[u8; KEY_LENGTH]) -> Self {
        let mut scalar = Zeroizing::new(*bytes);
        let is_odd = scalar[KEY_LENGTH - 1] & 1 == 1;
        scalar[KEY_LENGTH - 1] &= 0xfe;

        let group = group();
        let x = PrivateKey(BigUint::from_bytes_be(&scalar[..]));
        let raw_public = group.g.modpow(&x.0, &group.p);

        let published = if is_odd {
            &group.p - &raw_public
        } else {
            raw_public
        };

        Self {
            public: PublicValue(*to_fixed_width(&published)),
            state: ExchangeState::Fresh(x),
        }
    }

    /// Get the camouflaged public value to send to the peer.
    pub fn public_value(&self) -> &PublicValue {
        &self.public
    }

    /// Whether the shared secret has already been computed.
    pub fn is_consumed(&self) -> bool {
        matches!(self.state, ExchangeState::Consumed)
    }

    /// Raise the peer's public value to the local private scalar.
    ///
    /// A wrong-length value is rejected before parsing and leaves the
    /// instance usable. On success the private scalar is destroyed.
    pub fn compute_shared_secret(&mut self, peer_public: &[u8]) -> Result<SharedSecret> {
        if peer_public.len() != KEY_LENGTH {
            return Err(Error::InvalidPeerKeyLength {
                expected: KEY_LENGTH,
                actual: peer_public.len(),
            });
        }

        let private = match &self.state {
            ExchangeState::Fresh(private) => private,
            ExchangeState::Consumed => return Err(Error::KeyExchangeAlreadyConsumed),
        };

        let group = group();
        let peer = BigUint::from_bytes_be(peer_public);
        if peer < BigUint::from(2u32) || peer > group.max_peer {
            return Err(Error::MalformedPublicValue);
        }

        let mut agreed = peer.modpow(&private.0, &group.p);
        let shared = SharedSecret(*to_fixed_width(&agreed));
        agreed.zeroize();

        self.state = ExchangeState::Consumed;
        Ok(shared)
    }
}
