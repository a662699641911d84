//! Connection-Pool Collaborator
//!
//! The pool that physically dials and holds sockets per endpoint lives in
//! the transport layer. Discovery only drives it through this trait and
//! asks it one question: is at least one endpoint usable for a service.

use crate::registry::types::{Address, RegisterMeta, ServiceId};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;

pub trait ConnectionPool: Send + Sync {
    /// Establish (or reuse) a connection for the meta's address.
    fn add_connection(&self, meta: &RegisterMeta);
    /// Drop the connection for this (address, service) pairing.
    fn remove_connection(&self, meta: &RegisterMeta);
    fn is_available(&self, id: &ServiceId) -> bool;
}

/// Bookkeeping-only pool used by tests and the demo binary: it records which
/// addresses serve which services without opening anything.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connections: DashMap<ServiceId, HashSet<Address>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Addresses currently recorded for a service. Test accessor.
    pub fn addresses_of(&self, id: &ServiceId) -> Vec<Address> {
        self.connections
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl ConnectionPool for ConnectionTracker {
    fn add_connection(&self, meta: &RegisterMeta) {
        self.connections
            .entry(meta.service.clone())
            .or_default()
            .insert(meta.address.clone());
        tracing::debug!("Connection recorded for {} at {}", meta.service, meta.address);
    }

    fn remove_connection(&self, meta: &RegisterMeta) {
        if let Entry::Occupied(mut entry) = self.connections.entry(meta.service.clone()) {
            entry.get_mut().remove(&meta.address);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
        tracing::debug!("Connection dropped for {} at {}", meta.service, meta.address);
    }

    fn is_available(&self, id: &ServiceId) -> bool {
        self.connections
            .get(id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }
}
