//! Traffic obfuscation policy.
//!
//! obfs3 has a single countermeasure beyond encryption: random-length random
//! padding after each side's public value, so the handshake has no fixed
//! size for a classifier to key on.

mod padding;

pub use padding::{PaddingPolicy, MAX_PADDING};
