//! The multiplexed link
//!
//! A Link is the long-lived framed connection between an operator and one
//! phone. It owns a table of open channels (pipes), a table of pending
//! tunnel requests, and the read loop that dispatches incoming frames.
//!
//! Locking: the pipe and pending-tunnel tables share one std mutex and are
//! never held across an await. The frame-send path is serialized by an async
//! mutex around the writer half, held for exactly one frame write, so frames
//! from concurrent pipes and tunnel handshakes never interleave on the wire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, trace, warn};

use switchboard_proto::{
    escape_content, new_channel_id, read_frame, unescape_content, write_frame, Frame, FrameError,
};

use crate::connection::{ConnReader, ConnWriter, FramedConnection};

/// Link errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("frame send failed: {0}")]
    Send(std::io::Error),

    #[error("no pipe bound to channel {0}")]
    PipeNotFound(String),

    #[error("pipe write failed ({channel_id}): {source}")]
    PipeWrite {
        channel_id: String,
        source: std::io::Error,
    },

    #[error("codec error: {0}")]
    Codec(#[from] FrameError),
}

/// Resolves service keys to dialable host:port strings. The phone-side
/// operator's service registry sits behind this seam.
pub trait ServiceDirectory: Send + Sync {
    fn lookup(&self, service_key: &str) -> Option<String>;
}

/// A pipe destination: the writer half of one local connection. The mutex
/// keeps the single DialResponse written during a splice from interleaving
/// with tunnelled bytes.
pub type PipeWriter = Arc<Mutex<ConnWriter>>;

#[derive(Default)]
struct LinkTables {
    pipes: HashMap<String, PipeWriter>,
    tunnels_waiting: HashMap<String, oneshot::Sender<Frame>>,
}

pub struct Link {
    receiver_id: String,
    reader: std::sync::Mutex<Option<ConnReader>>,
    writer: Mutex<ConnWriter>,
    tables: std::sync::Mutex<LinkTables>,
    last_heartbeat: std::sync::Mutex<Instant>,
    services: Arc<dyn ServiceDirectory>,
}

impl Link {
    /// Take ownership of a framed connection as the link to `receiver_id`.
    /// The link does nothing until [`Link::maintain`] is running.
    pub fn new(
        conn: FramedConnection,
        receiver_id: impl Into<String>,
        services: Arc<dyn ServiceDirectory>,
    ) -> Arc<Link> {
        let (reader, writer) = conn.into_split();
        Arc::new(Link {
            receiver_id: receiver_id.into(),
            reader: std::sync::Mutex::new(Some(reader)),
            writer: Mutex::new(writer),
            tables: std::sync::Mutex::new(LinkTables::default()),
            last_heartbeat: std::sync::Mutex::new(Instant::now()),
            services,
        })
    }

    /// The peer this link leads to.
    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    /// Arrival time of the most recent Heartbeat frame (or link creation).
    pub fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.lock().unwrap()
    }

    /// Send one frame over the link. Acquires the send path for the
    /// duration of a single frame write.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), LinkError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await.map_err(LinkError::Send)
    }

    /// Close the write half of the underlying transport. The peer's read
    /// loop observes end of stream shortly after.
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Ask the far side to open `service_key` under a freshly minted channel
    /// id. The returned slot resolves exactly once: with a DialResponse on
    /// success, or an Error frame on failure. The slot is published before
    /// the TunnelRequest goes out, so even an instant response finds it.
    pub async fn tunnel(&self, service_key: &str) -> oneshot::Receiver<Frame> {
        let channel_id = new_channel_id();
        let (tx, rx) = oneshot::channel();
        self.tables
            .lock()
            .unwrap()
            .tunnels_waiting
            .insert(channel_id.clone(), tx);

        debug!(
            "link {} requesting tunnel for {} ({})",
            self.receiver_id, service_key, channel_id
        );
        let request = Frame::TunnelRequest {
            channel_id: channel_id.clone(),
            service_key: service_key.to_string(),
        };
        if let Err(err) = self.send_frame(&request).await {
            warn!(
                "link {} failed to send tunnel request: {}",
                self.receiver_id, err
            );
            // The caller still observes exactly one resolution.
            if let Some(tx) = self.tables.lock().unwrap().tunnels_waiting.remove(&channel_id) {
                let _ = tx.send(Frame::Error {
                    message: format!("tunnel request failed: {}", err),
                });
            }
        }

        rx
    }

    /// Bind `channel_id` to a writer: every Data frame arriving on the link
    /// with this channel id is decoded and written there. Replaces any prior
    /// binding. The pipe writer is returned so a splice can push its
    /// handshake reply through the same serialized path.
    pub fn create_pipe(&self, channel_id: &str, writer: ConnWriter) -> PipeWriter {
        debug!("link {} creating pipe ({})", self.receiver_id, channel_id);
        let pipe = Arc::new(Mutex::new(writer));
        self.tables
            .lock()
            .unwrap()
            .pipes
            .insert(channel_id.to_string(), Arc::clone(&pipe));
        pipe
    }

    /// Spawn the inbound copier for a channel: read bytes from `reader`,
    /// wrap them in Data frames, and send them over the link. On end of
    /// stream the channel's pipe entry is removed.
    pub fn pipe_in(
        self: &Arc<Self>,
        channel_id: impl Into<String>,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
    ) {
        let link = Arc::clone(self);
        let channel_id = channel_id.into();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        debug!("pipe closed ({})", channel_id);
                        link.remove_pipe(&channel_id);
                        return;
                    }
                    Ok(n) => {
                        trace!("read {} bytes from pipe ({})", n, channel_id);
                        let frame = Frame::Data {
                            receiver_id: link.receiver_id.clone(),
                            channel_id: channel_id.clone(),
                            content: escape_content(&buf[..n]),
                        };
                        if let Err(err) = link.send_frame(&frame).await {
                            warn!("pipe send failed ({}): {}", channel_id, err);
                            link.remove_pipe(&channel_id);
                            return;
                        }
                    }
                    Err(err) => {
                        warn!("pipe read error ({}): {}", channel_id, err);
                        link.remove_pipe(&channel_id);
                        return;
                    }
                }
            }
        });
    }

    /// Drop the pipe bound to `channel_id`, if any. Idempotent.
    pub fn remove_pipe(&self, channel_id: &str) {
        self.tables.lock().unwrap().pipes.remove(channel_id);
    }

    /// The read loop. Decodes frames and dispatches them until the
    /// transport yields end of stream or an I/O error, then releases every
    /// pipe and pending tunnel. Malformed lines and unknown kinds are logged
    /// and skipped; they do not tear the link down.
    pub async fn maintain(self: Arc<Self>) {
        let taken = self.reader.lock().unwrap().take();
        let Some(mut reader) = taken else {
            warn!("link {} read loop started twice", self.receiver_id);
            return;
        };

        loop {
            match read_frame(&mut reader).await {
                Ok(frame) => {
                    if let Err(err) = self.handle_frame(frame).await {
                        warn!("link {} failed to handle frame: {}", self.receiver_id, err);
                    }
                }
                Err(FrameError::EndOfStream) => {
                    info!("link {} closed: end of stream", self.receiver_id);
                    break;
                }
                Err(FrameError::Transport(err)) => {
                    error!("link {} transport error: {}", self.receiver_id, err);
                    break;
                }
                Err(FrameError::FrameTooLarge(len)) => {
                    // The rest of the oversized line is still in flight;
                    // there is no safe way to resynchronize on it.
                    error!(
                        "link {} sent an oversized frame ({} bytes), closing",
                        self.receiver_id, len
                    );
                    break;
                }
                Err(err) => {
                    warn!("link {} skipping bad frame: {}", self.receiver_id, err);
                }
            }
        }

        self.teardown();
    }

    /// Release every pipe writer and resolve nothing: pending tunnel slots
    /// are dropped, which surfaces as a closed-channel error to whoever is
    /// awaiting them.
    fn teardown(&self) {
        let mut tables = self.tables.lock().unwrap();
        let pipes = tables.pipes.len();
        let tunnels = tables.tunnels_waiting.len();
        if pipes > 0 || tunnels > 0 {
            debug!(
                "link {} releasing {} pipes, {} pending tunnels",
                self.receiver_id, pipes, tunnels
            );
        }
        tables.pipes.clear();
        tables.tunnels_waiting.clear();
    }

    async fn handle_frame(self: &Arc<Self>, frame: Frame) -> Result<(), LinkError> {
        match frame {
            Frame::Data {
                channel_id, content, ..
            } => self.pipe_out(&channel_id, &content).await,

            Frame::TunnelRequest {
                channel_id,
                service_key,
            } => self.handle_tunnel_request(channel_id, service_key).await,

            Frame::TunnelResponse { channel_id } => {
                debug!("link {} tunnel established ({})", self.receiver_id, channel_id);
                self.resolve_tunnel(
                    &channel_id,
                    Frame::DialResponse {
                        channel_id: channel_id.clone(),
                    },
                );
                Ok(())
            }

            Frame::TunnelError {
                channel_id,
                message,
            } => {
                warn!(
                    "link {} tunnel failed ({}): {}",
                    self.receiver_id, channel_id, message
                );
                self.resolve_tunnel(&channel_id, Frame::Error { message });
                Ok(())
            }

            Frame::Heartbeat => {
                trace!("link {} heartbeat", self.receiver_id);
                *self.last_heartbeat.lock().unwrap() = Instant::now();
                Ok(())
            }

            other => {
                warn!(
                    "link {} ignoring unexpected {} frame",
                    self.receiver_id,
                    other.kind_name()
                );
                Ok(())
            }
        }
    }

    /// Open the requested service and splice it onto the channel, or report
    /// why that was impossible.
    async fn handle_tunnel_request(
        self: &Arc<Self>,
        channel_id: String,
        service_key: String,
    ) -> Result<(), LinkError> {
        debug!(
            "link {} tunnel request for {} ({})",
            self.receiver_id, service_key, channel_id
        );

        let Some(service_host) = self.services.lookup(&service_key) else {
            warn!("service key not registered: {}", service_key);
            return self
                .send_frame(&Frame::TunnelError {
                    channel_id,
                    message: format!("Service not found: {}", service_key),
                })
                .await;
        };

        let stream = match TcpStream::connect(&service_host).await {
            Ok(stream) => stream,
            Err(err) => {
                error!(
                    "failed to open service connection to {} ({}): {}",
                    service_host, service_key, err
                );
                return self
                    .send_frame(&Frame::TunnelError {
                        channel_id,
                        message: format!("Service dial failed: {}", err),
                    })
                    .await;
            }
        };

        let (read_half, write_half) = stream.into_split();
        self.create_pipe(&channel_id, Box::new(write_half));
        self.pipe_in(channel_id.clone(), Box::new(read_half));
        self.send_frame(&Frame::TunnelResponse { channel_id }).await
    }

    /// Deliver decoded Data bytes to the pipe bound to `channel_id`.
    async fn pipe_out(&self, channel_id: &str, content: &str) -> Result<(), LinkError> {
        let pipe = self.tables.lock().unwrap().pipes.get(channel_id).cloned();
        let Some(pipe) = pipe else {
            return Err(LinkError::PipeNotFound(channel_id.to_string()));
        };

        let bytes = unescape_content(content)?;
        let mut writer = pipe.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|source| LinkError::PipeWrite {
                channel_id: channel_id.to_string(),
                source,
            })?;
        writer.flush().await.map_err(|source| LinkError::PipeWrite {
            channel_id: channel_id.to_string(),
            source,
        })
    }

    /// Consume the pending-tunnel slot for `channel_id`.
    fn resolve_tunnel(&self, channel_id: &str, outcome: Frame) {
        let slot = self
            .tables
            .lock()
            .unwrap()
            .tunnels_waiting
            .remove(channel_id);
        match slot {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => warn!(
                "link {} tunnel resolution with no waiting slot ({})",
                self.receiver_id, channel_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    struct FixedDirectory(HashMap<String, String>);

    impl FixedDirectory {
        fn empty() -> Arc<Self> {
            Arc::new(Self(HashMap::new()))
        }

        fn with(key: &str, host: &str) -> Arc<Self> {
            let mut map = HashMap::new();
            map.insert(key.to_string(), host.to_string());
            Arc::new(Self(map))
        }
    }

    impl ServiceDirectory for FixedDirectory {
        fn lookup(&self, service_key: &str) -> Option<String> {
            self.0.get(service_key).cloned()
        }
    }

    /// A link over an in-memory stream, plus the remote end to poke at it.
    fn test_link(services: Arc<dyn ServiceDirectory>) -> (Arc<Link>, FramedConnection) {
        let (near, far) = tokio::io::duplex(16 * 1024);
        let link = Link::new(FramedConnection::new(near), "phone1", services);
        (link, FramedConnection::new(far))
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_heartbeat_updates_timestamp() {
        let (link, mut remote) = test_link(FixedDirectory::empty());
        let before = link.last_heartbeat();
        tokio::spawn(Arc::clone(&link).maintain());

        tokio::time::sleep(Duration::from_millis(20)).await;
        remote.send_frame(&Frame::Heartbeat).await.unwrap();

        let probe = Arc::clone(&link);
        wait_for(move || probe.last_heartbeat() > before).await;
    }

    #[tokio::test]
    async fn test_data_routed_to_its_pipe_only() {
        let (link, mut remote) = test_link(FixedDirectory::empty());
        tokio::spawn(Arc::clone(&link).maintain());

        let (a_write, mut a_read) = local_pipe();
        let (b_write, mut b_read) = local_pipe();
        link.create_pipe("chana00000", a_write);
        link.create_pipe("chanb00000", b_write);

        remote
            .send_frame(&Frame::Data {
                receiver_id: "ignored".to_string(),
                channel_id: "chana00000".to_string(),
                content: escape_content(b"for a"),
            })
            .await
            .unwrap();
        remote
            .send_frame(&Frame::Data {
                receiver_id: "ignored".to_string(),
                channel_id: "chanb00000".to_string(),
                content: escape_content(b"for b"),
            })
            .await
            .unwrap();

        let mut buf = [0u8; 5];
        a_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"for a");
        b_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"for b");
    }

    #[tokio::test]
    async fn test_data_for_unknown_channel_is_dropped() {
        let (link, mut remote) = test_link(FixedDirectory::empty());
        tokio::spawn(Arc::clone(&link).maintain());

        remote
            .send_frame(&Frame::Data {
                receiver_id: "ignored".to_string(),
                channel_id: "nosuchchan".to_string(),
                content: escape_content(b"lost"),
            })
            .await
            .unwrap();

        // The link keeps serving afterwards.
        let before = link.last_heartbeat();
        remote.send_frame(&Frame::Heartbeat).await.unwrap();
        let probe = Arc::clone(&link);
        wait_for(move || probe.last_heartbeat() > before).await;
    }

    #[tokio::test]
    async fn test_tunnel_resolves_exactly_once() {
        let (link, remote) = test_link(FixedDirectory::empty());
        tokio::spawn(Arc::clone(&link).maintain());
        let (mut remote_reader, mut remote_writer) = remote.into_split();

        let rx = link.tunnel("key1").await;

        // The far side sees the TunnelRequest and answers it.
        let request = read_frame(&mut remote_reader).await.unwrap();
        let Frame::TunnelRequest {
            channel_id,
            service_key,
        } = request
        else {
            panic!("expected a TunnelRequest");
        };
        assert_eq!(service_key, "key1");

        write_frame(
            &mut remote_writer,
            &Frame::TunnelResponse {
                channel_id: channel_id.clone(),
            },
        )
        .await
        .unwrap();

        let outcome = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
        assert_eq!(outcome, Frame::DialResponse { channel_id: channel_id.clone() });

        // A duplicate resolution has no slot left to land in; the link
        // just logs it and keeps going.
        let before = link.last_heartbeat();
        write_frame(
            &mut remote_writer,
            &Frame::TunnelResponse { channel_id },
        )
        .await
        .unwrap();
        write_frame(&mut remote_writer, &Frame::Heartbeat).await.unwrap();
        let probe = Arc::clone(&link);
        wait_for(move || probe.last_heartbeat() > before).await;
    }

    #[tokio::test]
    async fn test_tunnel_error_resolves_with_error_frame() {
        let (link, remote) = test_link(FixedDirectory::empty());
        tokio::spawn(Arc::clone(&link).maintain());
        let (mut remote_reader, mut remote_writer) = remote.into_split();

        let rx = link.tunnel("key1").await;
        let Frame::TunnelRequest { channel_id, .. } =
            read_frame(&mut remote_reader).await.unwrap()
        else {
            panic!("expected a TunnelRequest");
        };

        write_frame(
            &mut remote_writer,
            &Frame::TunnelError {
                channel_id,
                message: "Service not found: key1".to_string(),
            },
        )
        .await
        .unwrap();

        let outcome = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            Frame::Error {
                message: "Service not found: key1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_tunnel_send_failure_resolves_with_error_frame() {
        let (link, remote) = test_link(FixedDirectory::empty());
        drop(remote); // sending the TunnelRequest will fail

        let rx = link.tunnel("key1").await;
        let outcome = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
        assert!(matches!(outcome, Frame::Error { .. }));
    }

    #[tokio::test]
    async fn test_pending_tunnel_dropped_on_teardown() {
        let (link, remote) = test_link(FixedDirectory::empty());
        let maintain = tokio::spawn(Arc::clone(&link).maintain());

        let rx = link.tunnel("key1").await;
        drop(remote);

        timeout(Duration::from_secs(5), maintain)
            .await
            .unwrap()
            .unwrap();
        // The slot was released without a value: awaiting it errors instead
        // of hanging.
        assert!(timeout(Duration::from_secs(5), rx).await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_kill_the_link() {
        let (link, remote) = test_link(FixedDirectory::empty());
        tokio::spawn(Arc::clone(&link).maintain());
        let (_remote_reader, mut remote_writer) = remote.into_split();

        remote_writer.write_all(b"Zgarbage\n").await.unwrap();
        remote_writer.write_all(b"0only,two\n").await.unwrap();
        let before = link.last_heartbeat();
        write_frame(&mut remote_writer, &Frame::Heartbeat).await.unwrap();

        let probe = Arc::clone(&link);
        wait_for(move || probe.last_heartbeat() > before).await;
    }

    #[tokio::test]
    async fn test_maintain_ends_on_eof() {
        let (link, remote) = test_link(FixedDirectory::empty());
        let maintain = tokio::spawn(Arc::clone(&link).maintain());
        drop(remote);

        timeout(Duration::from_secs(5), maintain)
            .await
            .expect("read loop should end on EOF")
            .unwrap();
    }

    #[tokio::test]
    async fn test_tunnel_request_for_unknown_service() {
        let (link, remote) = test_link(FixedDirectory::empty());
        tokio::spawn(Arc::clone(&link).maintain());
        let (mut remote_reader, mut remote_writer) = remote.into_split();

        write_frame(
            &mut remote_writer,
            &Frame::TunnelRequest {
                channel_id: "chan123456".to_string(),
                service_key: "missing".to_string(),
            },
        )
        .await
        .unwrap();

        let reply = read_frame(&mut remote_reader).await.unwrap();
        let Frame::TunnelError {
            channel_id,
            message,
        } = reply
        else {
            panic!("expected a TunnelError");
        };
        assert_eq!(channel_id, "chan123456");
        assert!(message.contains("Service not found"));
    }

    #[tokio::test]
    async fn test_tunnel_request_splices_the_service() {
        // A real TCP service that echoes one payload back.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let service_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
            socket.write_all(b"world").await.unwrap();
        });

        let (link, remote) = test_link(FixedDirectory::with("key1", &service_addr.to_string()));
        tokio::spawn(Arc::clone(&link).maintain());
        let (mut remote_reader, mut remote_writer) = remote.into_split();

        write_frame(
            &mut remote_writer,
            &Frame::TunnelRequest {
                channel_id: "chan123456".to_string(),
                service_key: "key1".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            read_frame(&mut remote_reader).await.unwrap(),
            Frame::TunnelResponse {
                channel_id: "chan123456".to_string()
            }
        );

        // Bytes sent as Data frames reach the service; its reply comes back
        // as a Data frame on the same channel.
        write_frame(
            &mut remote_writer,
            &Frame::Data {
                receiver_id: "ignored".to_string(),
                channel_id: "chan123456".to_string(),
                content: escape_content(b"hello"),
            },
        )
        .await
        .unwrap();

        let reply = timeout(Duration::from_secs(5), read_frame(&mut remote_reader))
            .await
            .unwrap()
            .unwrap();
        let Frame::Data {
            channel_id,
            content,
            ..
        } = reply
        else {
            panic!("expected a Data frame");
        };
        assert_eq!(channel_id, "chan123456");
        assert_eq!(unescape_content(&content).unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_pipe_removed_when_source_closes() {
        let (link, remote) = test_link(FixedDirectory::empty());
        tokio::spawn(Arc::clone(&link).maintain());
        let (mut remote_reader, _remote_writer) = remote.into_split();

        let (dest_writer, _dest_reader) = local_pipe();
        link.create_pipe("chan123456", dest_writer);
        assert!(link.tables.lock().unwrap().pipes.contains_key("chan123456"));

        let (source_near, source_far) = tokio::io::duplex(1024);
        let (source_read, _source_write) = tokio::io::split(source_near);
        link.pipe_in("chan123456", Box::new(source_read));

        // Feed one chunk through, then close the source.
        let (_far_read, mut far_write) = tokio::io::split(source_far);
        far_write.write_all(b"abc").await.unwrap();
        let frame = read_frame(&mut remote_reader).await.unwrap();
        assert!(matches!(frame, Frame::Data { .. }));

        far_write.shutdown().await.unwrap();
        let probe = Arc::clone(&link);
        wait_for(move || !probe.tables.lock().unwrap().pipes.contains_key("chan123456")).await;
    }

    /// An in-memory stand-in for one side of a local TCP connection:
    /// a boxed writer to bind into a pipe, and the reader that observes
    /// what was written through it.
    fn local_pipe() -> (ConnWriter, BufReader<Box<dyn AsyncRead + Send + Unpin>>) {
        let (near, far) = tokio::io::duplex(1024);
        let (_near_read, near_write) = tokio::io::split(near);
        let (far_read, _far_write) = tokio::io::split(far);
        (
            Box::new(near_write),
            BufReader::new(Box::new(far_read) as Box<dyn AsyncRead + Send + Unpin>),
        )
    }
}
