//! Buffered framed connection
//!
//! Wraps a bidirectional byte stream with a line-buffered read side so frame
//! boundaries can be found without peeking across reads. Exposes frame-level
//! send and receive plus raw writes; raw writes exist because the operator
//! splices a client-facing connection straight into a pipe, where the bytes
//! are payload rather than frames.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use switchboard_proto::{read_frame, write_frame, Frame, FrameError};

/// The buffered read half of a framed connection.
pub type ConnReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// The write half of a framed connection.
pub type ConnWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct FramedConnection {
    reader: ConnReader,
    writer: ConnWriter,
}

impl FramedConnection {
    /// Wrap any bidirectional byte stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
        }
    }

    /// Receive the next frame.
    pub async fn recv_frame(&mut self) -> Result<Frame, FrameError> {
        read_frame(&mut self.reader).await
    }

    /// Send one frame and flush it.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        write_frame(&mut self.writer, frame)
            .await
            .map_err(FrameError::from)
    }

    /// Write raw bytes, bypassing framing.
    pub async fn write_raw(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(buf).await?;
        self.writer.flush().await
    }

    /// Split into the buffered read half and the write half. Bytes already
    /// buffered on the read side stay with the reader, so nothing that
    /// arrived early is lost to the splice.
    pub fn into_split(self) -> (ConnReader, ConnWriter) {
        (self.reader, self.writer)
    }
}
