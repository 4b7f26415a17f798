//! # obfs3 client
//!
//! Client side of the obfs3 pluggable transport. Every byte obfs3 puts on
//! the wire, handshake included, is indistinguishable from uniform random
//! data to an observer that does not take part in the key exchange.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                     │
//! ├─────────────────────────────────────────────────────────┤
//! │  Async driver (Obfs3Connector, Obfs3Stream over tokio)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Handshake state machine (Obfs3Client, sans-I/O)        │
//! ├─────────────────────────────────────────────────────────┤
//! │  Obfuscation (random handshake padding)                 │
//! ├─────────────────────────────────────────────────────────┤
//! │  Crypto Layer (UniformDH, HMAC-SHA256, AES-128-CTR)     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> obfs3::Result<()> {
//! use obfs3::obfs3::{Obfs3Config, Obfs3Connector};
//!
//! let connector = Obfs3Connector::new(Obfs3Config::new("192.0.2.10", 443))?;
//! let mut stream = connector.connect().await?;
//! stream.send(b"hello").await?;
//! let reply = stream.recv().await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crypto;
pub mod error;
pub mod obfs3;
pub mod obfuscation;

pub use error::{Error, Result};

/// Default timeout for handshake operations (milliseconds)
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
