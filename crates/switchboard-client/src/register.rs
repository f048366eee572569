//! Service registration
//!
//! A service process announces itself to an operator: "connections tunnelled
//! for `service_key` should be dialed to `service_host`". One short framed
//! exchange; the connection is not kept.

use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use switchboard_connection::FramedConnection;
use switchboard_proto::{Frame, FrameError};

/// Registration errors
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("failed to connect to operator: {0}")]
    Connect(std::io::Error),

    #[error("frame exchange failed: {0}")]
    Frame(#[from] FrameError),

    #[error("registration rejected: {0}")]
    Rejected(String),

    #[error("unexpected {0} reply to register request")]
    UnexpectedFrame(&'static str),
}

/// Bind `service_key` to `service_host` on the operator at `operator_addr`.
pub async fn register_service(
    operator_addr: &str,
    service_key: &str,
    service_host: &str,
) -> Result<(), RegisterError> {
    debug!(
        "registering {} -> {} with operator {}",
        service_key, service_host, operator_addr
    );

    let stream = TcpStream::connect(operator_addr)
        .await
        .map_err(RegisterError::Connect)?;
    let mut conn = FramedConnection::new(stream);

    conn.send_frame(&Frame::RegisterRequest {
        service_host: service_host.to_string(),
        service_key: service_key.to_string(),
    })
    .await?;

    match conn.recv_frame().await? {
        Frame::RegisterResponse => {
            info!("registered service {} ({})", service_key, service_host);
            Ok(())
        }
        Frame::Error { message } => {
            warn!("failed to register service {}: {}", service_key, message);
            Err(RegisterError::Rejected(message))
        }
        other => Err(RegisterError::UnexpectedFrame(other.kind_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_register_against_accepting_operator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = FramedConnection::new(stream);
            assert_eq!(
                conn.recv_frame().await.unwrap(),
                Frame::RegisterRequest {
                    service_host: "127.0.0.1:8080".to_string(),
                    service_key: "key1".to_string(),
                }
            );
            conn.send_frame(&Frame::RegisterResponse).await.unwrap();
        });

        register_service(&addr.to_string(), "key1", "127.0.0.1:8080")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = FramedConnection::new(stream);
            let _ = conn.recv_frame().await.unwrap();
            conn.send_frame(&Frame::Error {
                message: "no".to_string(),
            })
            .await
            .unwrap();
        });

        let err = register_service(&addr.to_string(), "key1", "127.0.0.1:8080")
            .await
            .unwrap_err();
        assert!(matches!(err, RegisterError::Rejected(_)));
    }
}
