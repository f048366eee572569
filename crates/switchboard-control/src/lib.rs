//! Rendezvous control plane
//!
//! The operator node accepts framed connections, dispatches their first
//! frame (link, register, or dial), and wires dialed clients onto the
//! multiplexed links it holds in its registries.

pub mod node;
pub mod registry;

pub use node::{NodeError, Operator, ServeHandle};
pub use registry::{LinkRegistry, OperatorRegistry, RegistryError, ServiceRegistry};
