//! The operator node
//!
//! A publicly reachable rendezvous point. Phones link to it, services
//! register through it, clients dial through it. Each accepted connection
//! gets its own handler task that reads exactly one frame and dispatches on
//! it; a dial handler then splices the caller's connection onto the right
//! link and returns, leaving the splice running.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use switchboard_connection::{
    send_heartbeats, FramedConnection, LinkError, ReconnectConfig, ServiceDirectory,
};
use switchboard_proto::{Frame, FrameError};

use crate::registry::{LinkRegistry, OperatorRegistry, RegistryError, ServiceRegistry};

/// Operator node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),

    #[error("frame exchange failed: {0}")]
    Frame(#[from] FrameError),

    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("splice write failed: {0}")]
    Splice(std::io::Error),
}

/// A rendezvous node. Also drives the phone side: `link_and_serve` keeps an
/// outbound link alive to a remote operator while serving locally.
pub struct Operator {
    receiver_id: String,
    address: String,
    links: Arc<LinkRegistry>,
    services: Arc<ServiceRegistry>,
    operators: Arc<OperatorRegistry>,
    reconnect: ReconnectConfig,
}

impl Operator {
    /// Create an operator named `receiver_id`, reachable at `address`.
    /// The address is what gets published to dialers when this operator
    /// accepts a link.
    pub fn new(receiver_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            address: address.into(),
            links: Arc::new(LinkRegistry::new()),
            services: Arc::new(ServiceRegistry::new()),
            operators: Arc::new(OperatorRegistry::new()),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    pub fn links(&self) -> &Arc<LinkRegistry> {
        &self.links
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn operators(&self) -> &Arc<OperatorRegistry> {
        &self.operators
    }

    /// Bind a TCP listener on `port` and start accepting connections.
    pub async fn serve(self: &Arc<Self>, port: u16) -> Result<ServeHandle, NodeError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(NodeError::Bind)?;
        self.serve_listener(listener)
    }

    /// Start accepting connections on an already-bound listener.
    pub fn serve_listener(self: &Arc<Self>, listener: TcpListener) -> Result<ServeHandle, NodeError> {
        let local_addr = listener.local_addr().map_err(NodeError::Bind)?;
        info!("operator {} serving on {}", self.receiver_id, local_addr);

        let accept_loop = tokio::spawn(Arc::clone(self).accept_loop(listener));
        Ok(ServeHandle {
            local_addr,
            accept_loop,
            links: Arc::clone(&self.links),
        })
    }

    /// Begin the phone-side reconnect loop against `operator_addr`, then
    /// serve locally on `port`.
    pub async fn link_and_serve(
        self: &Arc<Self>,
        port: u16,
        operator_addr: &str,
    ) -> Result<ServeHandle, NodeError> {
        let _ = self.start_link(operator_addr);
        self.serve(port).await
    }

    /// Spawn the reconnect loop that keeps an outbound link alive to
    /// `operator_addr`.
    pub fn start_link(self: &Arc<Self>, operator_addr: &str) -> JoinHandle<()> {
        let operator = Arc::clone(self);
        let operator_addr = operator_addr.to_string();
        tokio::spawn(async move { operator.keep_linked(operator_addr).await })
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("accepted connection from {}", peer_addr);
                    let operator = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(err) = operator.respond(FramedConnection::new(stream)).await {
                            warn!("failed to handle connection from {}: {}", peer_addr, err);
                        }
                    });
                }
                Err(err) => warn!("failed to accept connection: {}", err),
            }
        }
    }

    /// Read the one outstanding frame off a fresh connection and dispatch.
    async fn respond(&self, mut conn: FramedConnection) -> Result<(), NodeError> {
        let frame = match conn.recv_frame().await {
            Ok(frame) => frame,
            Err(err @ (FrameError::EndOfStream | FrameError::Transport(_))) => {
                return Err(err.into());
            }
            Err(err) => {
                warn!("rejecting connection with unreadable first frame: {}", err);
                conn.send_frame(&Frame::Error {
                    message: format!("Malformed request: {}", err),
                })
                .await?;
                return Ok(());
            }
        };

        match frame {
            Frame::LinkRequest { receiver_id } => self.handle_link_request(conn, receiver_id).await,
            Frame::RegisterRequest {
                service_host,
                service_key,
            } => {
                self.handle_register_request(conn, service_host, service_key)
                    .await
            }
            Frame::DialRequest {
                receiver_id,
                service_key,
            } => self.handle_dial_request(conn, receiver_id, service_key).await,
            other => {
                warn!("unrecognized first frame: {}", other.kind_name());
                conn.send_frame(&Frame::Error {
                    message: format!("Unrecognized request: {}", other.kind_name()),
                })
                .await?;
                Ok(())
            }
        }
    }

    /// Adopt the connection as the link to `receiver_id` and publish this
    /// operator as its rendezvous point.
    async fn handle_link_request(
        &self,
        mut conn: FramedConnection,
        receiver_id: String,
    ) -> Result<(), NodeError> {
        info!("link request from {}", receiver_id);

        conn.send_frame(&Frame::LinkResponse {
            receiver_id: self.receiver_id.clone(),
        })
        .await?;

        self.links.set_link(
            &receiver_id,
            conn,
            Arc::clone(&self.services) as Arc<dyn ServiceDirectory>,
        );
        self.operators.set_operator(&receiver_id, &self.address)?;
        Ok(())
    }

    async fn handle_register_request(
        &self,
        mut conn: FramedConnection,
        service_host: String,
        service_key: String,
    ) -> Result<(), NodeError> {
        info!("register request: {} -> {}", service_key, service_host);
        self.services.set_service(&service_key, &service_host);
        conn.send_frame(&Frame::RegisterResponse).await?;
        Ok(())
    }

    /// The two-hop splice. Ask the link to tunnel the service, then absorb
    /// the caller's connection: its bytes become Data frames on the link,
    /// and Data frames on its channel are written back to it. The handler
    /// returns but the splice persists.
    async fn handle_dial_request(
        &self,
        mut conn: FramedConnection,
        receiver_id: String,
        service_key: String,
    ) -> Result<(), NodeError> {
        info!("dial request for {}.{}", receiver_id, service_key);

        let Some(link) = self.links.get_link(&receiver_id) else {
            warn!("no link registered for {}", receiver_id);
            conn.send_frame(&Frame::Error {
                message: format!("No link for receiver: {}", receiver_id),
            })
            .await?;
            return Ok(());
        };

        let pending = link.tunnel(&service_key).await;
        let outcome = match pending.await {
            Ok(frame) => frame,
            Err(_) => Frame::Error {
                message: "Link closed while dialing".to_string(),
            },
        };

        let channel_id = match outcome {
            Frame::DialResponse { channel_id } => channel_id,
            Frame::Error { message } => {
                warn!("dial error received from tunnel: {}", message);
                conn.send_frame(&Frame::Error {
                    message: format!("Service discovery failed: {}", message),
                })
                .await?;
                return Ok(());
            }
            other => {
                // A tunnel slot can only resolve to the two arms above.
                error!("impossible tunnel outcome: {}", other.kind_name());
                conn.send_frame(&Frame::Error {
                    message: "Service discovery failed".to_string(),
                })
                .await?;
                return Ok(());
            }
        };

        let (reader, writer) = conn.into_split();
        let pipe = link.create_pipe(&channel_id, writer);
        link.pipe_in(channel_id.clone(), Box::new(reader));

        // Confirm through the pipe's writer so the response cannot
        // interleave with tunnelled data already flowing to the caller.
        let response = Frame::DialResponse {
            channel_id: channel_id.clone(),
        };
        let mut pipe_writer = pipe.lock().await;
        pipe_writer
            .write_all(&response.encode())
            .await
            .map_err(NodeError::Splice)?;
        pipe_writer.flush().await.map_err(NodeError::Splice)?;

        debug!("dial spliced onto channel {}", channel_id);
        Ok(())
    }

    /// The phone-side driver: dial out, handshake, install the link, push
    /// heartbeats until the link dies, repeat. Connect failures back off
    /// between one and four seconds.
    async fn keep_linked(self: Arc<Self>, operator_addr: String) {
        loop {
            debug!("linking to {} as {}", operator_addr, self.receiver_id);
            let stream = match TcpStream::connect(&operator_addr).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("failed to link to {}: {}, retrying", operator_addr, err);
                    self.reconnect.wait().await;
                    continue;
                }
            };

            let mut conn = FramedConnection::new(stream);
            if let Err(err) = conn
                .send_frame(&Frame::LinkRequest {
                    receiver_id: self.receiver_id.clone(),
                })
                .await
            {
                warn!("broken link to {}: {}, retrying", operator_addr, err);
                continue;
            }

            let peer_id = match conn.recv_frame().await {
                Ok(Frame::LinkResponse { receiver_id }) => receiver_id,
                Ok(Frame::Error { message }) => {
                    warn!("link to {} rejected: {}, retrying", operator_addr, message);
                    continue;
                }
                Ok(other) => {
                    warn!(
                        "unexpected {} reply to link request, retrying",
                        other.kind_name()
                    );
                    continue;
                }
                Err(err) => {
                    warn!("broken link to {}: {}, retrying", operator_addr, err);
                    continue;
                }
            };

            let link = self.links.set_link(
                &peer_id,
                conn,
                Arc::clone(&self.services) as Arc<dyn ServiceDirectory>,
            );
            if let Err(err) = self.operators.set_operator(&peer_id, &self.address) {
                warn!("operator registry error: {}", err);
            }
            info!("linked to {} as {}", peer_id, self.receiver_id);

            // Blocks until the link stops taking heartbeats.
            let err = send_heartbeats(&link).await;
            warn!("broken link to {}: {}, retrying", peer_id, err);
            self.links.remove_link(&peer_id);
        }
    }
}

/// Handle to a serving operator: its bound address, and the means to stop
/// accepting and tear down every link it holds.
pub struct ServeHandle {
    local_addr: SocketAddr,
    accept_loop: JoinHandle<()>,
    links: Arc<LinkRegistry>,
}

impl ServeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until the accept loop ends (it normally never does).
    pub async fn wait(self) {
        let _ = self.accept_loop.await;
    }

    /// Stop accepting and drop every registered link.
    pub fn shutdown(&self) {
        self.accept_loop.abort();
        self.links.clear();
    }
}
