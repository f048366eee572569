//! Frame types
//!
//! One frame is one line on the wire: a single kind byte, a printable
//! payload with comma-separated fields, and a trailing newline. Data frame
//! content is base64 so it can never collide with either delimiter.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::FRAME_DELIMITER;

// Kind bytes. The two error kinds sit below the printable range on purpose:
// they can never be confused with a payload byte.
pub const KIND_ERROR: u8 = 0x00;
pub const KIND_TUNNEL_ERROR: u8 = 0x01;
pub const KIND_DATA: u8 = b'0';
pub const KIND_LINK_REQ: u8 = b'1';
pub const KIND_LINK_RES: u8 = b'2';
pub const KIND_REGISTER_REQ: u8 = b'3';
pub const KIND_REGISTER_RES: u8 = b'4';
pub const KIND_DIAL_REQ: u8 = b'5';
pub const KIND_DIAL_RES: u8 = b'6';
pub const KIND_TUNNEL_REQ: u8 = b'7';
pub const KIND_TUNNEL_RES: u8 = b'8';
pub const KIND_HEARTBEAT: u8 = b'9';

/// Codec errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unknown frame kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("malformed {kind} payload: '{payload}'")]
    Malformed { kind: &'static str, payload: String },

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("end of stream")]
    EndOfStream,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// A discrete message on the wire. The set of variants is closed; anything
/// with an unlisted kind byte fails to decode as [`FrameError::UnknownKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Tunnelled bytes for one channel. `content` is base64-encoded.
    /// The receiver id is populated on send for debuggability and ignored
    /// on receive; the link a Data frame arrives on already names the peer.
    Data {
        receiver_id: String,
        channel_id: String,
        content: String,
    },
    /// A phone asking an operator to adopt it under `receiver_id`.
    LinkRequest { receiver_id: String },
    /// The operator's acceptance, carrying the operator's own id.
    LinkResponse { receiver_id: String },
    /// Bind `service_key` to a dialable `service_host`.
    RegisterRequest {
        service_host: String,
        service_key: String,
    },
    RegisterResponse,
    /// A client asking to reach `service_key` behind `receiver_id`.
    DialRequest {
        receiver_id: String,
        service_key: String,
    },
    DialResponse { channel_id: String },
    /// Ask the far side of a link to open `service_key` under `channel_id`.
    TunnelRequest {
        channel_id: String,
        service_key: String,
    },
    TunnelResponse { channel_id: String },
    Heartbeat,
    Error { message: String },
    TunnelError { channel_id: String, message: String },
}

impl Frame {
    /// The kind byte this frame is written with.
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Data { .. } => KIND_DATA,
            Frame::LinkRequest { .. } => KIND_LINK_REQ,
            Frame::LinkResponse { .. } => KIND_LINK_RES,
            Frame::RegisterRequest { .. } => KIND_REGISTER_REQ,
            Frame::RegisterResponse => KIND_REGISTER_RES,
            Frame::DialRequest { .. } => KIND_DIAL_REQ,
            Frame::DialResponse { .. } => KIND_DIAL_RES,
            Frame::TunnelRequest { .. } => KIND_TUNNEL_REQ,
            Frame::TunnelResponse { .. } => KIND_TUNNEL_RES,
            Frame::Heartbeat => KIND_HEARTBEAT,
            Frame::Error { .. } => KIND_ERROR,
            Frame::TunnelError { .. } => KIND_TUNNEL_ERROR,
        }
    }

    /// Human-readable variant name, for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Frame::Data { .. } => "Data",
            Frame::LinkRequest { .. } => "LinkRequest",
            Frame::LinkResponse { .. } => "LinkResponse",
            Frame::RegisterRequest { .. } => "RegisterRequest",
            Frame::RegisterResponse => "RegisterResponse",
            Frame::DialRequest { .. } => "DialRequest",
            Frame::DialResponse { .. } => "DialResponse",
            Frame::TunnelRequest { .. } => "TunnelRequest",
            Frame::TunnelResponse { .. } => "TunnelResponse",
            Frame::Heartbeat => "Heartbeat",
            Frame::Error { .. } => "Error",
            Frame::TunnelError { .. } => "TunnelError",
        }
    }

    /// The payload portion of the encoded line, without kind byte or
    /// delimiter.
    pub fn payload(&self) -> String {
        match self {
            Frame::Data {
                receiver_id,
                channel_id,
                content,
            } => format!("{},{},{}", receiver_id, channel_id, content),
            Frame::LinkRequest { receiver_id } | Frame::LinkResponse { receiver_id } => {
                receiver_id.clone()
            }
            Frame::RegisterRequest {
                service_host,
                service_key,
            } => format!("{},{}", service_host, service_key),
            Frame::RegisterResponse | Frame::Heartbeat => String::new(),
            Frame::DialRequest {
                receiver_id,
                service_key,
            } => format!("{},{}", receiver_id, service_key),
            Frame::DialResponse { channel_id } | Frame::TunnelResponse { channel_id } => {
                channel_id.clone()
            }
            Frame::TunnelRequest {
                channel_id,
                service_key,
            } => format!("{},{}", channel_id, service_key),
            Frame::Error { message } => message.clone(),
            Frame::TunnelError {
                channel_id,
                message,
            } => format!("{},{}", channel_id, message),
        }
    }

    /// Encode this frame as a single delimited line.
    pub fn encode(&self) -> Bytes {
        let payload = self.payload();
        let mut buf = BytesMut::with_capacity(payload.len() + 2);
        buf.put_u8(self.kind());
        buf.put_slice(payload.as_bytes());
        buf.put_u8(FRAME_DELIMITER);
        buf.freeze()
    }

    /// Parse a payload into the variant selected by `kind`.
    pub fn parse(kind: u8, payload: &str) -> Result<Frame, FrameError> {
        match kind {
            KIND_DATA => {
                let mut fields = payload.splitn(3, ',');
                match (fields.next(), fields.next(), fields.next()) {
                    (Some(receiver_id), Some(channel_id), Some(content)) => Ok(Frame::Data {
                        receiver_id: receiver_id.to_string(),
                        channel_id: channel_id.to_string(),
                        content: content.to_string(),
                    }),
                    _ => Err(malformed("Data", payload)),
                }
            }
            KIND_LINK_REQ => Ok(Frame::LinkRequest {
                receiver_id: payload.to_string(),
            }),
            KIND_LINK_RES => Ok(Frame::LinkResponse {
                receiver_id: payload.to_string(),
            }),
            KIND_REGISTER_REQ => match split_two(payload) {
                Some((service_host, service_key)) => Ok(Frame::RegisterRequest {
                    service_host,
                    service_key,
                }),
                None => Err(malformed("RegisterRequest", payload)),
            },
            KIND_REGISTER_RES => {
                if payload.is_empty() {
                    Ok(Frame::RegisterResponse)
                } else {
                    Err(malformed("RegisterResponse", payload))
                }
            }
            KIND_DIAL_REQ => match split_two(payload) {
                Some((receiver_id, service_key)) => Ok(Frame::DialRequest {
                    receiver_id,
                    service_key,
                }),
                None => Err(malformed("DialRequest", payload)),
            },
            KIND_DIAL_RES => Ok(Frame::DialResponse {
                channel_id: payload.to_string(),
            }),
            KIND_TUNNEL_REQ => match split_two(payload) {
                Some((channel_id, service_key)) => Ok(Frame::TunnelRequest {
                    channel_id,
                    service_key,
                }),
                None => Err(malformed("TunnelRequest", payload)),
            },
            KIND_TUNNEL_RES => Ok(Frame::TunnelResponse {
                channel_id: payload.to_string(),
            }),
            KIND_HEARTBEAT => {
                if payload.is_empty() {
                    Ok(Frame::Heartbeat)
                } else {
                    Err(malformed("Heartbeat", payload))
                }
            }
            KIND_ERROR => Ok(Frame::Error {
                message: payload.to_string(),
            }),
            KIND_TUNNEL_ERROR => match split_two(payload) {
                Some((channel_id, message)) => Ok(Frame::TunnelError {
                    channel_id,
                    message,
                }),
                None => Err(malformed("TunnelError", payload)),
            },
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

fn split_two(payload: &str) -> Option<(String, String)> {
    let mut fields = payload.splitn(2, ',');
    match (fields.next(), fields.next()) {
        (Some(a), Some(b)) => Some((a.to_string(), b.to_string())),
        _ => None,
    }
}

fn malformed(kind: &'static str, payload: &str) -> FrameError {
    FrameError::Malformed {
        kind,
        payload: payload.to_string(),
    }
}
