//! Client Registry
//!
//! One connected `RegistryClient` per store address, owned by the process's
//! composition root and handed to providers/consumers by reference. There is
//! no global lookup; whoever builds the process wires this in explicitly.

use super::client::RegistryClient;
use crate::config::RegistryConfig;
use crate::store::adapter::CoordinationStore;

use anyhow::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Builds a store adapter for a given registry address. The config is
/// passed along so adapters can honor the session/connect timeouts.
pub type StoreConnector =
    Arc<dyn Fn(&str, &RegistryConfig) -> Arc<dyn CoordinationStore> + Send + Sync>;

pub struct ClientRegistry {
    config: RegistryConfig,
    connector: StoreConnector,
    clients: DashMap<String, Arc<RegistryClient>>,
}

impl ClientRegistry {
    pub fn new<F>(config: RegistryConfig, connector: F) -> Self
    where
        F: Fn(&str, &RegistryConfig) -> Arc<dyn CoordinationStore> + Send + Sync + 'static,
    {
        Self {
            config,
            connector: Arc::new(connector),
            clients: DashMap::new(),
        }
    }

    /// Returns the client for `addr`, creating and connecting it on first
    /// use. Concurrent callers for the same address all get the one
    /// instance; only the call that inserted it pays for the connect.
    pub async fn get_or_connect(&self, addr: &str) -> Result<Arc<RegistryClient>> {
        if let Some(existing) = self.clients.get(addr) {
            return Ok(existing.clone());
        }

        let store = (self.connector)(addr, &self.config);
        let candidate = RegistryClient::new(store, self.config.clone());

        let (client, fresh) = match self.clients.entry(addr.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                entry.insert(candidate.clone());
                (candidate, true)
            }
        };

        if fresh {
            if let Err(e) = client.connect().await {
                self.clients.remove(addr);
                return Err(e);
            }
            tracing::info!("Connected registry client for {}", addr);
        }

        Ok(client)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
