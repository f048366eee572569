//! Switchboard Protocol Definitions
//!
//! This crate defines the wire frames exchanged between operators, phones,
//! services, and dialing clients, together with the line-oriented codec and
//! the channel identifier generator.

pub mod codec;
pub mod frame;
pub mod id;

pub use codec::{escape_content, read_frame, unescape_content, write_frame};
pub use frame::{Frame, FrameError};
pub use id::new_channel_id;

/// Every frame on the wire ends with this byte.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Longest encoded frame accepted off the wire (16MB), delimiter included.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
