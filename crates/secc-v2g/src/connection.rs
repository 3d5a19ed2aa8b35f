//! Vehicle-facing stream connection
//!
//! Plaintext or secured; the engine reads and writes through one seam and
//! never learns how the secured variant is established. Secured streams
//! come from a [`SecurityBackend`] supplied by the surrounding application;
//! certificate handling and handshake internals stay outside this crate.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use secc_core::TransportError;

/// A fully established secured stream.
pub trait SecuredStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SecuredStream for T {}

/// Produces secured streams from freshly accepted TCP connections.
#[async_trait]
pub trait SecurityBackend: Send + Sync {
    async fn accept(&self, stream: TcpStream) -> Result<Box<dyn SecuredStream>, TransportError>;
}

/// Stream connection to one vehicle.
pub enum Connection {
    Plain(TcpStream),
    Secured(Box<dyn SecuredStream>),
}

impl Connection {
    pub fn is_secured(&self) -> bool {
        matches!(self, Connection::Secured(_))
    }

    /// Read up to `buf.len()` bytes. An orderly shutdown by the peer while
    /// bytes are still expected surfaces as [`TransportError::PeerClosed`].
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = match self {
            Connection::Plain(s) => s.read(buf).await,
            Connection::Secured(s) => s.read(buf).await,
        }
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        if n == 0 && !buf.is_empty() {
            return Err(TransportError::PeerClosed);
        }
        Ok(n)
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            Connection::Plain(s) => s.write_all(bytes).await,
            Connection::Secured(s) => s.write_all(bytes).await,
        }
        .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Best-effort orderly shutdown during session teardown.
    pub async fn shutdown(&mut self) {
        let result = match self {
            Connection::Plain(s) => s.shutdown().await,
            Connection::Secured(s) => s.shutdown().await,
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "connection shutdown");
        }
    }
}
