//! obfs3 client over tokio.
//!
//! Drives [`Obfs3Client`] across an async byte stream. Key generation and
//! the peer-key exponentiation run on the blocking pool so a slow bignum
//! step never stalls the runtime.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::obfs3::config::Obfs3Config;
use crate::obfs3::handshake::Obfs3Client;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Opens obfs3 connections to a bridge.
pub struct Obfs3Connector {
    config: Obfs3Config,
}

impl Obfs3Connector {
    /// Create a new connector with the given configuration.
    pub fn new(config: Obfs3Config) -> Result<Self> {
        config.validate().map_err(Error::config)?;
        Ok(Self { config })
    }

    /// Get the connector configuration.
    pub fn config(&self) -> &Obfs3Config {
        &self.config
    }

    /// Connect to the bridge and run the obfs3 handshake.
    pub async fn connect(&self) -> Result<Obfs3Stream> {
        let addr = (self.config.server_addr.as_str(), self.config.server_port);
        let stream = timeout(self.config.connect_timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(self.config.connect_timeout_ms))?
            .map_err(Error::Network)?;

        stream.set_nodelay(true)?;
        tracing::debug!("obfs3 TCP connected to {}", self.config.display_addr());

        let stream = timeout(
            self.config.handshake_timeout(),
            handshake(stream, Obfs3Client::new()),
        )
        .await
        .map_err(|_| Error::HandshakeTimeout(self.config.handshake_timeout_ms))??;

        tracing::info!("obfs3 session to {} ready", self.config.display_addr());
        Ok(stream)
    }
}

/// Run the client handshake over an already connected stream.
pub async fn handshake<S>(mut stream: S, client: Obfs3Client) -> Result<Obfs3Stream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut client = offload(client, |client| client.connect()).await?;
    let mut read_buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        flush(&mut stream, &mut client).await?;
        if client.is_established() {
            break;
        }

        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            return Err(Error::protocol("connection closed during handshake"));
        }

        if client.needs_key_exchange() {
            let chunk = read_buf[..n].to_vec();
            client = offload(client, move |client| client.receive(&chunk).map(|_| ())).await?;
        } else {
            client.receive(&read_buf[..n])?;
        }
    }

    Ok(Obfs3Stream {
        stream,
        client,
        read_buf,
    })
}

/// Run one state machine step on the blocking pool.
async fn offload<F>(mut client: Obfs3Client, step: F) -> Result<Obfs3Client>
where
    F: FnOnce(&mut Obfs3Client) -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || step(&mut client).map(|_| client))
        .await
        .map_err(|e| Error::crypto(format!("key exchange task failed: {}", e)))?
}

/// Write everything the state machine has queued for the peer.
async fn flush<S>(stream: &mut S, client: &mut Obfs3Client) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let pending = client.pending_transmit();
    if pending.is_empty() {
        return Ok(());
    }

    let n = pending.len();
    stream.write_all(pending).await?;
    stream.flush().await?;
    client.advance_transmitted(n)
}

/// An established obfs3 connection.
///
/// Bytes are encrypted with AES-CTR and carry no framing, so `recv` returns
/// whatever has arrived rather than message-sized chunks.
pub struct Obfs3Stream<S = TcpStream> {
    stream: S,
    client: Obfs3Client,
    read_buf: Vec<u8>,
}

impl<S> Obfs3Stream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Encrypt and send data.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.client.send(data)?;
        flush(&mut self.stream, &mut self.client).await
    }

    /// Receive and decrypt the next available bytes.
    ///
    /// Returns an empty vector once the peer has closed the stream.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            let plaintext = self.client.take_plaintext();
            if !plaintext.is_empty() {
                return Ok(plaintext.to_vec());
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(Vec::new());
            }
            self.client.receive(&self.read_buf[..n])?;
        }
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;
    use crate::crypto::{
        random_padding, DirectionalCiphers, SessionKeys, UniformDh, KEY_LENGTH, MAGIC_LENGTH,
    };

    fn small_scalar(value: u64) -> [u8; KEY_LENGTH] {
        let mut scalar = [0u8; KEY_LENGTH];
        scalar[KEY_LENGTH - 8..].copy_from_slice(&value.to_be_bytes());
        scalar
    }

    /// Accept one obfs3 client: greet it, read 4 bytes, echo them uppercased.
    async fn run_bridge<S>(mut io: S, padding: usize) -> Vec<u8>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut client_public = [0u8; KEY_LENGTH];
        io.read_exact(&mut client_public).await.unwrap();

        let mut key_exchange = UniformDh::from_private_key(&small_scalar(0xfeed_f00d));
        let shared = key_exchange.compute_shared_secret(&client_public).unwrap();
        let keys = SessionKeys::derive(&shared);
        let mut ciphers = DirectionalCiphers::responder(&keys);

        let mut wire = key_exchange.public_value().as_ref().to_vec();
        wire.extend(random_padding(padding));
        wire.extend_from_slice(keys.responder_magic());
        let mut greeting = b"welcome".to_vec();
        ciphers.encrypt(&mut greeting);
        wire.extend(greeting);
        io.write_all(&wire).await.unwrap();

        // Client padding, then its magic, then ciphertext
        let mut received = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut data = loop {
            let n = io.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending data");
            received.extend_from_slice(&chunk[..n]);

            let found = received
                .windows(MAGIC_LENGTH)
                .position(|w| w == &keys.initiator_magic()[..]);
            if let Some(pos) = found {
                let rest = &received[pos + MAGIC_LENGTH..];
                if rest.len() >= 4 {
                    break rest.to_vec();
                }
            }
        };
        ciphers.decrypt(&mut data);

        let mut reply = data.to_ascii_uppercase();
        ciphers.encrypt(&mut reply);
        io.write_all(&reply).await.unwrap();
        data
    }

    async fn recv_exact<S>(stream: &mut Obfs3Stream<S>, len: usize) -> Vec<u8>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut out = Vec::new();
        while out.len() < len {
            let data = stream.recv().await.unwrap();
            assert!(!data.is_empty(), "stream closed early");
            out.extend(data);
        }
        out
    }

    #[tokio::test]
    async fn test_handshake_over_duplex() {
        for padding in [0, 1, 4096] {
            let (client_io, bridge_io) = tokio::io::duplex(64 * 1024);
            let bridge = tokio::spawn(run_bridge(bridge_io, padding));

            let client = Obfs3Client::new()
                .with_key_exchange(UniformDh::from_private_key(&small_scalar(0x0123_4567)));
            let mut stream = handshake(client_io, client).await.unwrap();

            assert_eq!(recv_exact(&mut stream, 7).await, b"welcome");
            stream.send(b"ping").await.unwrap();
            assert_eq!(recv_exact(&mut stream, 4).await, b"PING");

            assert_eq!(bridge.await.unwrap(), b"ping");
        }
    }

    #[tokio::test]
    async fn test_connector_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let bridge = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            run_bridge(socket, 300).await
        });

        let connector = Obfs3Connector::new(Obfs3Config::new("127.0.0.1", port)).unwrap();
        let mut stream = connector.connect().await.unwrap();
        assert!(stream.get_ref().peer_addr().is_ok());

        assert_eq!(recv_exact(&mut stream, 7).await, b"welcome");
        stream.send(b"abcd").await.unwrap();
        assert_eq!(recv_exact(&mut stream, 4).await, b"ABCD");
        assert_eq!(bridge.await.unwrap(), b"abcd");

        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_closes_during_handshake() {
        let (client_io, mut bridge_io) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let mut client_public = [0u8; KEY_LENGTH];
            bridge_io.read_exact(&mut client_public).await.unwrap();
            bridge_io.write_all(&[0x55u8; 100]).await.unwrap();
        });

        let client = Obfs3Client::new()
            .with_key_exchange(UniformDh::from_private_key(&small_scalar(0x0123_4567)));
        let err = handshake(client_io, client).await.err().unwrap();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_malformed_bridge_key() {
        let (client_io, mut bridge_io) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let mut client_public = [0u8; KEY_LENGTH];
            bridge_io.read_exact(&mut client_public).await.unwrap();
            bridge_io.write_all(&[0xffu8; KEY_LENGTH]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = Obfs3Client::new()
            .with_key_exchange(UniformDh::from_private_key(&small_scalar(0x0123_4567)));
        let err = handshake(client_io, client).await.err().unwrap();
        assert!(matches!(err, Error::MalformedPublicValue));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept and stay silent
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut config = Obfs3Config::new("127.0.0.1", port);
        config.handshake_timeout_ms = 300;
        let connector = Obfs3Connector::new(config).unwrap();

        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, Error::HandshakeTimeout(300)));
    }

    #[test]
    fn test_connector_rejects_invalid_config() {
        let result = Obfs3Connector::new(Obfs3Config::new("", 443));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
