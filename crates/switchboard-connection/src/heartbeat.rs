//! Heartbeat emitter
//!
//! The phone side pushes a Heartbeat frame over its link every two seconds.
//! The far side only records the arrival time; the emitter's real job is to
//! notice a dead transport, which it does by exiting on the first failed
//! send.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{trace, warn};

use switchboard_proto::Frame;

use crate::link::{Link, LinkError};

/// Interval between Heartbeat frames.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Send heartbeats over the link until one fails; returns the send error
/// that ended the loop.
pub async fn send_heartbeats(link: &Link) -> LinkError {
    loop {
        if let Err(err) = link.send_frame(&Frame::Heartbeat).await {
            warn!("failed to heartbeat {}: {}", link.receiver_id(), err);
            return err;
        }
        trace!("sent heartbeat to {}", link.receiver_id());
        sleep(HEARTBEAT_INTERVAL).await;
    }
}
