//! Event Reconciler
//!
//! Watch delivery is at-least-once and can skip events across a disconnect
//! window, so raw child events cannot be applied blindly. The membership
//! view is a plain set per address: applying an event is an idempotent set
//! operation, and only transitions that actually changed the set produce an
//! effect. Convergence therefore depends on the final state of the store's
//! children, not on seeing every event exactly once.

use crate::registry::types::{Address, ServiceId};
use crate::store::adapter::ChildEventKind;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;

/// What a reconciled event means for downstream listeners. A duplicate add
/// or a remove of an absent member produces no effect at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Added,
    Removed {
        /// True when this removal emptied the address's service set. Purely
        /// informational; connection teardown stays a pool concern.
        address_offline: bool,
    },
}

/// Which services each provider address is currently believed to serve,
/// derived solely from reconciled watch events.
#[derive(Debug, Default)]
pub struct MembershipView {
    view: DashMap<Address, HashSet<ServiceId>>,
}

impl MembershipView {
    pub fn new() -> Self {
        Self {
            view: DashMap::new(),
        }
    }

    /// Applies one raw event. Insert, remove, and the emptiness check run
    /// under the address's map entry, so concurrent events for different
    /// addresses never interleave within one address's set.
    ///
    /// Ordering of Added/Removed for the *same* (address, service) pair is
    /// the store's per-path delivery order; this layer does not reconstruct
    /// it. Across a reconnect that ordering is best effort.
    pub fn apply(
        &self,
        id: &ServiceId,
        address: &Address,
        kind: ChildEventKind,
    ) -> Option<Effect> {
        match kind {
            ChildEventKind::Added => {
                let mut services = self.view.entry(address.clone()).or_default();
                if services.insert(id.clone()) {
                    Some(Effect::Added)
                } else {
                    // Replayed event, or the view already caught up.
                    None
                }
            }
            ChildEventKind::Removed => match self.view.entry(address.clone()) {
                Entry::Occupied(mut entry) => {
                    if !entry.get_mut().remove(id) {
                        return None;
                    }
                    let address_offline = entry.get().is_empty();
                    if address_offline {
                        entry.remove();
                    }
                    Some(Effect::Removed { address_offline })
                }
                Entry::Vacant(_) => None,
            },
        }
    }

    /// Services currently believed live at an address.
    pub fn services_at(&self, address: &Address) -> Vec<ServiceId> {
        self.view
            .get(address)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Addresses currently believed to provide a service.
    pub fn addresses_of(&self, id: &ServiceId) -> Vec<Address> {
        self.view
            .iter()
            .filter(|entry| entry.value().contains(id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn address_count(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }
}
