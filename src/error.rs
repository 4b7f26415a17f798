//! Error types for the obfs3 client.

use thiserror::Error;

/// Result type alias for obfs3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during obfs3 operations.
///
/// Every variant is terminal for the session it came from. Conditions that
/// only mean "wait for more bytes" are reported through
/// [`ScanProgress`](crate::obfs3::ScanProgress) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Peer public value has the wrong length
    #[error("invalid peer public key length: expected {expected} bytes, got {actual}")]
    InvalidPeerKeyLength {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// The UniformDH instance already produced its shared secret
    #[error("key exchange already consumed")]
    KeyExchangeAlreadyConsumed,

    /// Peer public value is not a usable group element
    #[error("malformed peer public value")]
    MalformedPublicValue,

    /// Peer did not follow the obfs3 framing rules
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Handshake did not complete in time
    #[error("handshake timeout after {0}ms")]
    HandshakeTimeout(u64),

    /// Connection timeout
    #[error("connection timeout after {0}ms")]
    Timeout(u64),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::ProtocolViolation(msg.into())
    }

    /// Create a new cryptographic error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this error is recoverable by retrying with fresh keys.
    ///
    /// The failed session itself is never reused.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::HandshakeTimeout(_) | Error::Network(_)
        )
    }

    /// Check if this error came from the UniformDH exchange
    pub fn is_key_exchange_failure(&self) -> bool {
        matches!(
            self,
            Error::InvalidPeerKeyLength { .. }
                | Error::KeyExchangeAlreadyConsumed
                | Error::MalformedPublicValue
        )
    }
}
