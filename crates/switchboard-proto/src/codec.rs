//! Line codec for frames
//!
//! Reads and writes whole frames against async byte streams, and escapes
//! Data frame content so that arbitrary bytes survive the delimited text
//! format.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::frame::{Frame, FrameError};
use crate::{FRAME_DELIMITER, MAX_FRAME_SIZE};

/// Read one frame off the stream.
///
/// Reads are capped at [`MAX_FRAME_SIZE`] bytes: a line that long without a
/// delimiter yields [`FrameError::FrameTooLarge`], so a peer that never
/// sends a newline cannot grow the buffer without bound. A clean close
/// before any byte of the next frame yields [`FrameError::EndOfStream`]; a
/// close in the middle of a line does too, since a truncated frame can
/// never be completed. Unknown kinds and bad payloads consume the offending
/// line, so the caller may keep reading.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader
        .take(MAX_FRAME_SIZE as u64)
        .read_until(FRAME_DELIMITER, &mut line)
        .await?;
    if n == 0 {
        return Err(FrameError::EndOfStream);
    }
    if line.last() != Some(&FRAME_DELIMITER) {
        if line.len() >= MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(line.len()));
        }
        // The peer went away mid-line.
        return Err(FrameError::EndOfStream);
    }
    line.pop();

    let Some((&kind, payload)) = line.split_first() else {
        return Err(FrameError::Malformed {
            kind: "empty line",
            payload: String::new(),
        });
    };
    let payload = std::str::from_utf8(payload).map_err(|_| FrameError::Malformed {
        kind: "non-utf8",
        payload: String::from_utf8_lossy(payload).into_owned(),
    })?;

    Frame::parse(kind, payload)
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await
}

/// Encode raw tunnel bytes for carriage inside a Data frame. The output
/// contains neither comma nor newline.
pub fn escape_content(content: &[u8]) -> String {
    BASE64.encode(content)
}

/// Decode Data frame content back into raw bytes.
pub fn unescape_content(content: &str) -> Result<Vec<u8>, FrameError> {
    BASE64.decode(content).map_err(|_| FrameError::Malformed {
        kind: "Data content",
        payload: content.to_string(),
    })
}
