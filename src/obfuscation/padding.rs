//! Handshake padding for length-fingerprint resistance.
//!
//! obfs3 hides the handshake size by appending a random number of random
//! bytes after the public value. The padding carries no length field and is
//! never validated; the peer skips it by searching for the magic tag.

use crate::crypto::{random_padding, SecureRandom};

/// obfs3 `MAX_PADDING`.
pub const MAX_PADDING: usize = 8194;

/// Chooses how much padding follows the local public value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingPolicy {
    max_padding: usize,
}

impl Default for PaddingPolicy {
    fn default() -> Self {
        Self {
            max_padding: MAX_PADDING,
        }
    }
}

impl PaddingPolicy {
    /// Create a policy with a custom `MAX_PADDING`.
    pub fn with_max_padding(max_padding: usize) -> Self {
        Self { max_padding }
    }

    /// Largest length [`choose_padding_length`](Self::choose_padding_length) can return.
    pub fn upper_bound(&self) -> usize {
        self.max_padding / 2
    }

    /// Draw a padding length uniformly from `[0, MAX_PADDING / 2]`.
    ///
    /// The handshake calls this once and keeps the result.
    pub fn choose_padding_length(&self) -> usize {
        SecureRandom::uniform_inclusive(self.upper_bound())
    }

    /// Random padding bytes of the given length.
    pub fn padding_bytes(&self, len: usize) -> Vec<u8> {
        random_padding(len)
    }
}
