//! Client-side entry points
//!
//! [`Dialer`] turns "reach `service_key` behind `receiver_id`" into a plain
//! bidirectional byte stream; [`register_service`] binds a service key to a
//! host on an operator.

pub mod dialer;
pub mod register;

pub use dialer::{DialError, DialedStream, Dialer};
pub use register::{register_service, RegisterError};
