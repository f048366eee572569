//! The dialer
//!
//! Resolves which operator fronts a receiver, opens a TCP connection to it,
//! performs the DialRequest handshake, and hands the caller the connection
//! as a raw byte stream. By the time the handshake completes the operator
//! has already spliced the connection into the tunnel, so the caller needs
//! no framing awareness at all.

use std::pin::Pin;
use std::task::{Context, Poll};

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use switchboard_connection::{ConnReader, ConnWriter, FramedConnection};
use switchboard_control::{OperatorRegistry, RegistryError};
use switchboard_proto::{Frame, FrameError};

/// Dial errors
#[derive(Debug, Error)]
pub enum DialError {
    #[error("operator resolution failed: {0}")]
    Resolve(#[from] RegistryError),

    #[error("failed to connect to operator: {0}")]
    Connect(std::io::Error),

    #[error("frame exchange failed: {0}")]
    Frame(#[from] FrameError),

    #[error("dial rejected: {0}")]
    Rejected(String),

    #[error("unexpected {0} reply to dial request")]
    UnexpectedFrame(&'static str),
}

/// Dials named services behind receivers, via whichever operator the
/// resolver names for them.
pub struct Dialer {
    operators: Arc<OperatorRegistry>,
}

impl Dialer {
    pub fn new(operators: Arc<OperatorRegistry>) -> Self {
        Self { operators }
    }

    /// Open a byte stream to `service_key` inside `receiver_id`'s network.
    pub async fn dial(
        &self,
        receiver_id: &str,
        service_key: &str,
    ) -> Result<DialedStream, DialError> {
        debug!("dialing {}.{}", receiver_id, service_key);

        let operator_addr = self.operators.resolve_operator(receiver_id)?;
        debug!("resolved {} to operator at {}", receiver_id, operator_addr);

        let stream = TcpStream::connect(&operator_addr)
            .await
            .map_err(DialError::Connect)?;
        let mut conn = FramedConnection::new(stream);

        conn.send_frame(&Frame::DialRequest {
            receiver_id: receiver_id.to_string(),
            service_key: service_key.to_string(),
        })
        .await?;

        match conn.recv_frame().await? {
            Frame::DialResponse { channel_id } => {
                debug!("dial succeeded, channel {}", channel_id);
                let (reader, writer) = conn.into_split();
                Ok(DialedStream {
                    channel_id,
                    reader,
                    writer,
                })
            }
            Frame::Error { message } => {
                warn!("dial rejected: {}", message);
                Err(DialError::Rejected(message))
            }
            other => Err(DialError::UnexpectedFrame(other.kind_name())),
        }
    }
}

/// A dialed tunnel endpoint. Reads and writes raw bytes; the operator does
/// the framing on the far side of the socket. Any tunnel bytes that arrived
/// buffered behind the DialResponse are served first.
pub struct DialedStream {
    channel_id: String,
    reader: ConnReader,
    writer: ConnWriter,
}

impl std::fmt::Debug for DialedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialedStream")
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

impl DialedStream {
    /// The channel id the operator allocated for this tunnel.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl AsyncRead for DialedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for DialedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn resolver_for(receiver_id: &str, addr: &str) -> Arc<OperatorRegistry> {
        let operators = Arc::new(OperatorRegistry::new());
        operators.set_operator(receiver_id, addr).unwrap();
        operators
    }

    #[tokio::test]
    async fn test_dial_unknown_receiver_fails_at_resolution() {
        let dialer = Dialer::new(Arc::new(OperatorRegistry::new()));
        let err = dialer.dial("phone1", "key1").await.unwrap_err();
        assert!(matches!(
            err,
            DialError::Resolve(RegistryError::OperatorNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dial_handshake_and_raw_stream() {
        // A stand-in operator: accept one connection, answer the dial, then
        // echo raw bytes back.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = FramedConnection::new(stream);
            let frame = conn.recv_frame().await.unwrap();
            assert_eq!(
                frame,
                Frame::DialRequest {
                    receiver_id: "phone1".to_string(),
                    service_key: "key1".to_string(),
                }
            );
            conn.send_frame(&Frame::DialResponse {
                channel_id: "chan123456".to_string(),
            })
            .await
            .unwrap();

            let (mut reader, mut writer) = conn.into_split();
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf).await.unwrap();
            writer.write_all(&buf).await.unwrap();
            writer.flush().await.unwrap();
        });

        let dialer = Dialer::new(resolver_for("phone1", &addr.to_string()));
        let mut stream = dialer.dial("phone1", "key1").await.unwrap();
        assert_eq!(stream.channel_id(), "chan123456");

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_dial_rejection_surfaces_the_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = FramedConnection::new(stream);
            let _ = conn.recv_frame().await.unwrap();
            conn.send_frame(&Frame::Error {
                message: "Service discovery failed: Service not found: key1".to_string(),
            })
            .await
            .unwrap();
        });

        let dialer = Dialer::new(resolver_for("phone1", &addr.to_string()));
        let err = dialer.dial("phone1", "key1").await.unwrap_err();
        let DialError::Rejected(message) = err else {
            panic!("expected a rejection");
        };
        assert!(message.contains("Service not found"));
    }
}
