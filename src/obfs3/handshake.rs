//! obfs3 client handshake state machine.
//!
//! The state machine is sans-I/O: the caller feeds it transport events and
//! moves bytes in and out of its buffers. Nothing here blocks or touches a
//! socket, but [`Obfs3Client::connect`] and the first [`Obfs3Client::receive`]
//! that completes the peer's public value each perform a 1536-bit modular
//! exponentiation. Drivers on a cooperative runtime should run those on a
//! blocking thread (see [`Obfs3Client::needs_key_exchange`]).
//!
//! ```text
//!   Idle ──connect──▶ SendingLocalFrame ──frame flushed──▶ AwaitingPeerMagic
//!                                                              │
//!                         responder magic found ◀──────────────┘
//!                                  │
//!                                  ▼
//!                             Established            (any error ──▶ Failed)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crypto::{DirectionalCiphers, SessionKeys, UniformDh, KEY_LENGTH, MAGIC_LENGTH};
use crate::error::{Error, Result};
use crate::obfuscation::{PaddingPolicy, MAX_PADDING};

/// Most bytes that may follow the peer's public value before its magic ends.
pub const MAX_SCAN_LENGTH: usize = MAX_PADDING + MAGIC_LENGTH;

/// Handshake lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Transport not connected yet
    Idle,
    /// Public value and padding queued, not fully written
    SendingLocalFrame,
    /// Waiting for the peer's public value and responder magic
    AwaitingPeerMagic,
    /// Ciphers installed; all traffic is encrypted
    Established,
    /// Terminal; the connection must be closed
    Failed,
}

/// Outcome of feeding peer bytes to the handshake.
///
/// The first two variants are wait conditions, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanProgress {
    /// Peer bytes are buffered but the public value cannot be processed yet
    ShortRead {
        /// Bytes held so far
        buffered: usize,
    },
    /// Keys are derived but the responder magic has not shown up
    MagicNotFoundYet {
        /// Bytes searched past the peer's public value
        scanned: usize,
    },
    /// The session is established
    Established,
}

/// Per-handshake bookkeeping, dropped once the session is established.
#[derive(Default)]
struct HandshakeState {
    sent_own_frame: bool,
    found_peer_magic: bool,
    /// Everything the peer sent so far, public value first.
    receive_buffer: BytesMut,
    /// Offset into the tail where the next magic search starts.
    scan_cursor: usize,
    padding_length: Option<usize>,
}

impl HandshakeState {
    /// Search the bytes after the public value for `magic`.
    ///
    /// Returns the offset of the magic within that tail. Positions already
    /// ruled out are never searched again; the cursor stops
    /// `MAGIC_LENGTH - 1` bytes short of the end so a tag split across
    /// reads is still found.
    fn find_magic(&mut self, magic: &[u8; MAGIC_LENGTH]) -> Option<usize> {
        let tail = &self.receive_buffer[KEY_LENGTH..];
        if tail.len() < MAGIC_LENGTH {
            return None;
        }

        let start = self.scan_cursor;
        let found = tail[start..]
            .windows(MAGIC_LENGTH)
            .position(|window| window == &magic[..])
            .map(|i| start + i);

        if found.is_none() {
            self.scan_cursor = tail.len() - (MAGIC_LENGTH - 1);
        }
        found
    }
}

/// Client side of one obfs3 connection.
///
/// Outbound wire bytes accumulate in a transmit buffer read with
/// [`pending_transmit`](Self::pending_transmit) and released with
/// [`advance_transmitted`](Self::advance_transmitted). Decrypted peer data
/// is collected with [`take_plaintext`](Self::take_plaintext).
pub struct Obfs3Client {
    phase: HandshakePhase,
    padding: PaddingPolicy,
    key_exchange: Option<UniformDh>,
    session_keys: Option<SessionKeys>,
    ciphers: Option<DirectionalCiphers>,
    /// `None` once established or failed.
    state: Option<HandshakeState>,
    /// Wire bytes for the peer.
    transmit: BytesMut,
    /// Unflushed bytes of the public value and padding.
    frame_remaining: usize,
    /// Application bytes written before the initiator cipher exists.
    queued: BytesMut,
    /// Decrypted bytes for the local side.
    plaintext: BytesMut,
}

impl Default for Obfs3Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Obfs3Client {
    /// Create a client with the standard obfs3 padding policy.
    pub fn new() -> Self {
        Self::with_padding(PaddingPolicy::default())
    }

    /// Create a client with a custom padding policy.
    pub fn with_padding(padding: PaddingPolicy) -> Self {
        Self {
            phase: HandshakePhase::Idle,
            padding,
            key_exchange: None,
            session_keys: None,
            ciphers: None,
            state: Some(HandshakeState::default()),
            transmit: BytesMut::new(),
            frame_remaining: 0,
            queued: BytesMut::new(),
            plaintext: BytesMut::new(),
        }
    }

    /// Use a pre-generated keypair instead of drawing one on connect.
    pub fn with_key_exchange(mut self, key_exchange: UniformDh) -> Self {
        self.key_exchange = Some(key_exchange);
        self
    }

    /// Current phase.
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Whether the local frame is out and the responder magic was found.
    pub fn is_established(&self) -> bool {
        self.phase == HandshakePhase::Established
    }

    /// Padding length chosen for this handshake, once connected.
    ///
    /// `None` again after the handshake state is released.
    pub fn padding_length(&self) -> Option<usize> {
        self.state.as_ref().and_then(|state| state.padding_length)
    }

    /// Whether the next step may perform a modular exponentiation.
    pub fn needs_key_exchange(&self) -> bool {
        self.ciphers.is_none() && self.phase != HandshakePhase::Failed
    }

    /// Wire bytes waiting to be written to the peer.
    pub fn pending_transmit(&self) -> &[u8] {
        &self.transmit
    }

    /// Take all decrypted bytes received so far.
    pub fn take_plaintext(&mut self) -> Bytes {
        self.plaintext.split().freeze()
    }

    /// Transport connected: generate keys and queue `public_value || padding`.
    pub fn connect(&mut self) -> Result<()> {
        let result = self.start();
        self.check(result)
    }

    /// Report that the first `n` bytes of [`pending_transmit`](Self::pending_transmit)
    /// were written.
    ///
    /// Completing the local frame moves the handshake to
    /// [`HandshakePhase::AwaitingPeerMagic`] and processes any peer bytes
    /// that arrived meanwhile.
    pub fn advance_transmitted(&mut self, n: usize) -> Result<()> {
        if self.phase == HandshakePhase::Failed {
            return Err(Error::protocol("session already failed"));
        }
        assert!(n <= self.transmit.len(), "advanced past queued bytes");
        self.transmit.advance(n);

        if self.phase != HandshakePhase::SendingLocalFrame {
            return Ok(());
        }

        self.frame_remaining = self.frame_remaining.saturating_sub(n);
        if self.frame_remaining > 0 {
            return Ok(());
        }

        self.state_mut().sent_own_frame = true;
        self.phase = HandshakePhase::AwaitingPeerMagic;
        tracing::debug!("obfs3 local frame flushed");

        let result = self.advance_handshake().map(|_| ());
        self.check(result)
    }

    /// Feed bytes received from the peer.
    pub fn receive(&mut self, data: &[u8]) -> Result<ScanProgress> {
        let result = self.receive_inner(data);
        self.check(result)
    }

    /// Queue application bytes for the peer.
    ///
    /// Bytes written before the session keys exist are held back and sent,
    /// encrypted, right after the initiator magic.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.phase == HandshakePhase::Failed {
            return Err(Error::protocol("session already failed"));
        }

        match self.ciphers.as_mut() {
            Some(ciphers) => {
                let start = self.transmit.len();
                self.transmit.extend_from_slice(data);
                ciphers.encrypt(&mut self.transmit[start..]);
            }
            None => self.queued.extend_from_slice(data),
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.phase != HandshakePhase::Idle {
            return Err(Error::protocol(format!(
                "transport connected while {:?}",
                self.phase
            )));
        }

        let padding_length = self.padding.choose_padding_length();
        self.state_mut().padding_length = Some(padding_length);
        let key_exchange = self.key_exchange.get_or_insert_with(UniformDh::random);

        self.transmit.reserve(KEY_LENGTH + padding_length);
        self.transmit.put_slice(key_exchange.public_value().as_ref());
        self.transmit
            .put_slice(&self.padding.padding_bytes(padding_length));
        self.frame_remaining = KEY_LENGTH + padding_length;

        self.phase = HandshakePhase::SendingLocalFrame;
        tracing::debug!("obfs3 queued public value with {} bytes of padding", padding_length);
        Ok(())
    }

    fn receive_inner(&mut self, data: &[u8]) -> Result<ScanProgress> {
        match self.phase {
            HandshakePhase::Idle => Err(Error::protocol("peer data before transport connected")),
            HandshakePhase::Failed => Err(Error::protocol("session already failed")),
            HandshakePhase::SendingLocalFrame => {
                let state = self.state_mut();
                let buffered = state.receive_buffer.len() + data.len();
                if buffered > KEY_LENGTH + MAX_SCAN_LENGTH {
                    return Err(Error::protocol(format!(
                        "{} peer bytes before local frame was sent",
                        buffered
                    )));
                }
                state.receive_buffer.extend_from_slice(data);
                Ok(ScanProgress::ShortRead { buffered })
            }
            HandshakePhase::AwaitingPeerMagic => {
                self.state_mut().receive_buffer.extend_from_slice(data);
                self.advance_handshake()
            }
            HandshakePhase::Established => {
                let ciphers = self
                    .ciphers
                    .as_mut()
                    .expect("established session has ciphers");
                let start = self.plaintext.len();
                self.plaintext.extend_from_slice(data);
                ciphers.decrypt(&mut self.plaintext[start..]);
                Ok(ScanProgress::Established)
            }
        }
    }

    fn advance_handshake(&mut self) -> Result<ScanProgress> {
        let buffered = self.state_mut().receive_buffer.len();
        if buffered < KEY_LENGTH {
            return Ok(ScanProgress::ShortRead { buffered });
        }

        if self.session_keys.is_none() {
            self.install_session_keys()?;
        }

        let keys = self
            .session_keys
            .as_ref()
            .expect("session keys derived before scanning");
        let state = self
            .state
            .as_mut()
            .expect("handshake state lives until established");
        match state.find_magic(keys.responder_magic()) {
            Some(offset) if offset <= MAX_PADDING => {
                state.found_peer_magic = true;
                self.finish(offset);
                Ok(ScanProgress::Established)
            }
            Some(offset) => Err(Error::protocol(format!(
                "responder magic after {} bytes of padding",
                offset
            ))),
            None => {
                let scanned = buffered - KEY_LENGTH;
                if scanned > MAX_SCAN_LENGTH {
                    return Err(Error::protocol(format!(
                        "no responder magic in {} bytes",
                        scanned
                    )));
                }
                Ok(ScanProgress::MagicNotFoundYet { scanned })
            }
        }
    }

    /// Compute the shared secret from the buffered public value, derive
    /// keys, and queue `padding || initiator_magic` plus any held-back data.
    fn install_session_keys(&mut self) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .expect("handshake state lives until established");
        let padding_length = state.padding_length.unwrap_or(0);
        let key_exchange = self
            .key_exchange
            .as_mut()
            .ok_or(Error::KeyExchangeAlreadyConsumed)?;
        let shared = key_exchange.compute_shared_secret(&state.receive_buffer[..KEY_LENGTH])?;
        let keys = SessionKeys::derive(&shared);
        drop(shared);
        self.key_exchange = None;

        // The magic never leaves as a bare short segment
        let mut ciphers = DirectionalCiphers::initiator(&keys);
        self.transmit.reserve(padding_length + MAGIC_LENGTH + self.queued.len());
        self.transmit
            .put_slice(&self.padding.padding_bytes(padding_length));
        self.transmit.put_slice(keys.initiator_magic());
        if !self.queued.is_empty() {
            let mut data = self.queued.split();
            ciphers.encrypt(&mut data);
            self.transmit.extend_from_slice(&data);
        }

        self.ciphers = Some(ciphers);
        self.session_keys = Some(keys);
        tracing::debug!("obfs3 derived session keys, initiator magic queued");
        Ok(())
    }

    fn finish(&mut self, magic_offset: usize) {
        let mut state = self
            .state
            .take()
            .expect("handshake state lives until established");
        debug_assert!(state.sent_own_frame && state.found_peer_magic);

        let data_start = KEY_LENGTH + magic_offset + MAGIC_LENGTH;
        let mut data = state.receive_buffer.split_off(data_start);

        let ciphers = self
            .ciphers
            .as_mut()
            .expect("ciphers installed before magic is found");
        ciphers.decrypt(&mut data);
        self.plaintext.extend_from_slice(&data);

        self.session_keys = None;
        self.phase = HandshakePhase::Established;

        tracing::info!(
            "obfs3 session established ({} bytes of peer padding)",
            magic_offset
        );
    }

    fn state_mut(&mut self) -> &mut HandshakeState {
        self.state
            .as_mut()
            .expect("handshake state lives until established")
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.phase != HandshakePhase::Failed {
                tracing::warn!("obfs3 handshake failed: {}", e);
                self.abort();
            }
        }
        result
    }

    /// Enter `Failed` and drop every secret.
    fn abort(&mut self) {
        self.phase = HandshakePhase::Failed;
        self.key_exchange = None;
        self.session_keys = None;
        self.ciphers = None;
        self.state = None;
        self.transmit.clear();
        self.frame_remaining = 0;
        self.queued.clear();
    }
}

/// Callbacks an enclosing proxy framework drives a session with.
///
/// Each returns whether the connection should stay open.
pub trait SessionHandler {
    /// The outbound transport connected.
    fn on_transport_connected(&mut self) -> bool;

    /// Bytes arrived from the peer.
    fn on_inbound_bytes(&mut self, buffer: &[u8]) -> bool;

    /// Application bytes are ready before the session is established.
    fn on_outbound_ready_while_connecting(&mut self, buffer: &[u8]) -> bool;

    /// Application bytes are ready on an established session.
    fn on_outbound_ready(&mut self, buffer: &[u8]) -> bool;
}

impl SessionHandler for Obfs3Client {
    fn on_transport_connected(&mut self) -> bool {
        self.connect().is_ok()
    }

    fn on_inbound_bytes(&mut self, buffer: &[u8]) -> bool {
        self.receive(buffer).is_ok()
    }

    fn on_outbound_ready_while_connecting(&mut self, buffer: &[u8]) -> bool {
        self.send(buffer).is_ok()
    }

    fn on_outbound_ready(&mut self, buffer: &[u8]) -> bool {
        if !self.is_established() {
            let result = Err(Error::protocol("outbound data on unestablished session"));
            return self.check::<()>(result).is_ok();
        }
        self.send(buffer).is_ok()
    }
}
