//! TCP listener and connection built on tokio.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::{Cipher, ConnectionId, CryptReader, CryptWriter, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Listens for channel clients and wraps each socket in a [`CryptConn`].
pub struct TcpTransport<C: Cipher> {
    listener: TcpListener,
    cipher: Arc<C>,
}

impl<C: Cipher> TcpTransport<C> {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: &str, cipher: C) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "channel transport listening");
        Ok(Self {
            listener,
            cipher: Arc::new(cipher),
        })
    }

    /// Waits for and accepts the next incoming connection.
    pub async fn accept(&self) -> Result<CryptConn<C>, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let conn = CryptConn::from_stream(stream, addr, Arc::clone(&self.cipher))?;
        tracing::debug!(id = %conn.id(), %addr, "accepted channel connection");
        Ok(conn)
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// A single framed TCP connection, not yet split into halves.
pub struct CryptConn<C: Cipher> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    reader: CryptReader<OwnedReadHalf, C>,
    writer: CryptWriter<OwnedWriteHalf, C>,
}

impl<C: Cipher> CryptConn<C> {
    /// Wraps an already-connected stream.
    pub fn from_stream(
        stream: TcpStream,
        peer_addr: SocketAddr,
        cipher: Arc<C>,
    ) -> Result<Self, TransportError> {
        stream
            .set_nodelay(true)
            .map_err(TransportError::AcceptFailed)?;
        let (read_half, write_half) = stream.into_split();
        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        Ok(Self {
            id,
            peer_addr,
            reader: CryptReader::new(read_half, Arc::clone(&cipher)),
            writer: CryptWriter::new(write_half, cipher),
        })
    }

    /// Opens a client connection. Used by tooling and tests that play the
    /// client side of the protocol.
    pub async fn connect(
        addr: SocketAddr,
        cipher: C,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            TransportError::ConnectionClosed(format!("connect to {addr}: {e}"))
        })?;
        Self::from_stream(stream, addr, Arc::new(cipher))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Splits into independent halves so reading and writing never contend.
    pub fn into_split(
        self,
    ) -> (
        CryptReader<OwnedReadHalf, C>,
        CryptWriter<OwnedWriteHalf, C>,
    ) {
        (self.reader, self.writer)
    }
}
