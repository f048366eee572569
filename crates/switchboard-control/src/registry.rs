//! In-memory registries
//!
//! Three maps, one mutex each: receiver id to link, service key to service
//! host, receiver id to operator address. Links are owned here: setting a
//! link starts its read loop, and the loop's exit removes the entry again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use switchboard_connection::{FramedConnection, Link, ServiceDirectory};

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("operator address cannot be empty; set the operator's address before serving")]
    EmptyAddress,

    #[error("no operator known for receiver {0}")]
    OperatorNotFound(String),
}

struct LinkEntry {
    link: Arc<Link>,
    read_loop: JoinHandle<()>,
}

/// Receiver id to live link. One entry per receiver; setting a link for a
/// receiver that already has one replaces it, and the older link runs on
/// until its own transport closes.
#[derive(Default)]
pub struct LinkRegistry {
    links: Mutex<HashMap<String, LinkEntry>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a framed connection as the link to `receiver_id` and start its
    /// read loop. When the loop ends the entry removes itself, unless it was
    /// already replaced by a newer link.
    pub fn set_link(
        self: &Arc<Self>,
        receiver_id: &str,
        conn: FramedConnection,
        services: Arc<dyn ServiceDirectory>,
    ) -> Arc<Link> {
        let link = Link::new(conn, receiver_id, services);

        let read_loop = {
            let registry = Arc::clone(self);
            let link = Arc::clone(&link);
            let receiver_id = receiver_id.to_string();
            tokio::spawn(async move {
                Arc::clone(&link).maintain().await;
                registry.remove_link_entry(&receiver_id, &link);
            })
        };

        let entry = LinkEntry {
            link: Arc::clone(&link),
            read_loop,
        };
        let mut links = self.links.lock().unwrap();
        if links.insert(receiver_id.to_string(), entry).is_some() {
            info!("replaced existing link for {}", receiver_id);
        } else {
            info!("registered link for {}", receiver_id);
        }

        link
    }

    pub fn get_link(&self, receiver_id: &str) -> Option<Arc<Link>> {
        self.links
            .lock()
            .unwrap()
            .get(receiver_id)
            .map(|entry| Arc::clone(&entry.link))
    }

    /// Drop the entry for `receiver_id`, if any. Idempotent. The read loop
    /// is left to finish against its own transport.
    pub fn remove_link(&self, receiver_id: &str) {
        if self.links.lock().unwrap().remove(receiver_id).is_some() {
            debug!("removed link for {}", receiver_id);
        }
    }

    /// Self-removal by a finished read loop: only evicts the entry if it
    /// still holds this very link, so a replaced link cannot knock out its
    /// replacement.
    fn remove_link_entry(&self, receiver_id: &str, link: &Arc<Link>) {
        let mut links = self.links.lock().unwrap();
        if let Some(entry) = links.get(receiver_id) {
            if Arc::ptr_eq(&entry.link, link) {
                links.remove(receiver_id);
                debug!("link for {} removed after its read loop ended", receiver_id);
            }
        }
    }

    pub fn count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    /// Tear down every link: abort the read loops and close the transports.
    /// Used when an operator shuts down.
    pub fn clear(&self) {
        let entries: Vec<(String, LinkEntry)> =
            self.links.lock().unwrap().drain().collect();
        for (receiver_id, entry) in entries {
            debug!("dropping link for {}", receiver_id);
            entry.read_loop.abort();
            let link = entry.link;
            tokio::spawn(async move { link.shutdown().await });
        }
    }
}

/// Service key to dialable host. Authoritative on the phone-side operator.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<String, String>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a service key to a host, replacing any prior binding.
    pub fn set_service(&self, service_key: &str, service_host: &str) {
        info!("registered service {} -> {}", service_key, service_host);
        self.services
            .lock()
            .unwrap()
            .insert(service_key.to_string(), service_host.to_string());
    }

    pub fn get_service(&self, service_key: &str) -> Option<String> {
        self.services.lock().unwrap().get(service_key).cloned()
    }
}

impl ServiceDirectory for ServiceRegistry {
    fn lookup(&self, service_key: &str) -> Option<String> {
        self.get_service(service_key)
    }
}

/// Receiver id to the address of the operator it is reachable through.
/// Populated when a link is accepted; consulted by dialers.
#[derive(Default)]
pub struct OperatorRegistry {
    operators: Mutex<HashMap<String, String>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_operator(&self, receiver_id: &str, address: &str) -> Result<(), RegistryError> {
        if address.is_empty() {
            warn!("refusing to register empty operator address for {}", receiver_id);
            return Err(RegistryError::EmptyAddress);
        }
        self.operators
            .lock()
            .unwrap()
            .insert(receiver_id.to_string(), address.to_string());
        Ok(())
    }

    pub fn resolve_operator(&self, receiver_id: &str) -> Result<String, RegistryError> {
        self.operators
            .lock()
            .unwrap()
            .get(receiver_id)
            .cloned()
            .ok_or_else(|| RegistryError::OperatorNotFound(receiver_id.to_string()))
    }
}
