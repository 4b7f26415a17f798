//! obfs3 ("the threebfuscator") client.
//!
//! obfs3 makes a TCP stream look like uniformly random bytes from its first
//! byte onward. Both sides publish a UniformDH public value that is itself
//! indistinguishable from random, pad it with a random amount of random
//! bytes, and mark the end of the padding with a keyed magic tag only the
//! other side can recognise.
//!
//! ## Protocol Flow
//!
//! ```text
//! Client                                           Bridge
//!   |                                                |
//!   |  X (192 bytes) || random padding               |
//!   |----------------------------------------------->|
//!   |                Y (192 bytes) || random padding |
//!   |<-----------------------------------------------|
//!   |                                                |
//!   |  [Both: S = UniformDH(x, Y), derive keys]      |
//!   |                                                |
//!   |  padding || initiator magic || AES-CTR data    |
//!   |----------------------------------------------->|
//!   |              responder magic || AES-CTR data   |
//!   |<-----------------------------------------------|
//!   |                                                |
//!   |============ Encrypted Application Data ========|
//! ```
//!
//! [`Obfs3Client`] is the sans-I/O state machine. With the `client` feature,
//! [`Obfs3Connector`] drives it over a tokio TCP connection.

#[cfg(feature = "client")]
pub mod client;
mod config;
mod handshake;

#[cfg(feature = "client")]
pub use client::{Obfs3Connector, Obfs3Stream};
pub use config::Obfs3Config;
pub use handshake::{HandshakePhase, Obfs3Client, ScanProgress, SessionHandler, MAX_SCAN_LENGTH};
