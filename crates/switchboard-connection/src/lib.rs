//! Framed connections and the multiplexed link
//!
//! A [`FramedConnection`] wraps one byte stream with frame-level send and
//! receive. A [`Link`] owns a framed connection for its whole life and fans
//! many logical channels in and out of it.

pub mod connection;
pub mod heartbeat;
pub mod link;
pub mod reconnect;

pub use connection::{ConnReader, ConnWriter, FramedConnection};
pub use heartbeat::{send_heartbeats, HEARTBEAT_INTERVAL};
pub use link::{Link, LinkError, PipeWriter, ServiceDirectory};
pub use reconnect::ReconnectConfig;
