//! Service Container
//!
//! Maps service identities to the async closures that implement them. The
//! dispatch layer looks implementations up here when a request arrives; the
//! provider bootstrap fills it before registering anything with the store.

use crate::registry::types::ServiceId;

use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type-erased provider implementation: JSON arguments in, JSON result out.
pub type ProviderFn = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Lookup capability the dispatch layer queries by service identity.
pub trait ProviderLookup: Send + Sync {
    fn lookup(&self, id: &ServiceId) -> Option<ProviderFn>;
}

/// Default `ProviderLookup`: a concurrent map keyed by `group/name`.
pub struct ServiceContainer {
    providers: DashMap<String, ProviderFn>,
}

impl ServiceContainer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            providers: DashMap::new(),
        })
    }

    /// Binds an implementation to a service identity. The first binding
    /// wins; a second one for the same identity is refused with a warning.
    /// Returns whether the binding was added.
    pub fn add_provider<F, Fut>(&self, id: &ServiceId, provider: F) -> bool
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        // Box::pin erases the concrete future type so different providers
        // fit the same map.
        let provider_fn: ProviderFn = Arc::new(move |args: serde_json::Value| {
            Box::pin(provider(args))
                as Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        });

        let key = id.to_string();
        if self.providers.contains_key(&key) {
            tracing::warn!(
                "Already have a provider for service {}, keeping the existing one",
                id
            );
            return false;
        }
        self.providers.insert(key, provider_fn);
        tracing::info!("Loaded provider for service {}", id);
        true
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

impl ProviderLookup for ServiceContainer {
    fn lookup(&self, id: &ServiceId) -> Option<ProviderFn> {
        self.providers.get(&id.to_string()).map(|f| f.clone())
    }
}
