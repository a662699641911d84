//! Discovery Watcher
//!
//! One watch task per subscribed service identity, no matter how many
//! listeners attach. The task is pure translation: it parses each raw child
//! event's payload into a `RegisterMeta`, runs it through the reconciler,
//! and fans the surviving effect out to a snapshot of the identity's
//! listeners. If the store drops the event stream (session loss), the task
//! re-subscribes after a short backoff; missing events in that gap is a
//! liveness concern only, since the view is re-derived, not order-dependent.

use super::listener::{NotifyEvent, NotifyListener};
use super::reconciler::{Effect, MembershipView};
use crate::registry::types::{ServiceId, decode_meta};
use crate::store::adapter::{ChildEvent, CoordinationStore};

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Per-identity subscription state: the attached listeners and whether the
/// watch task exists yet.
pub struct Subscription {
    listeners: RwLock<Vec<Arc<dyn NotifyListener>>>,
    watch_started: AtomicBool,
}

impl Subscription {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: RwLock::new(Vec::new()),
            watch_started: AtomicBool::new(false),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn NotifyListener>) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }

    /// Cloned snapshot for dispatch, so listeners are invoked without the
    /// lock held and late subscribers never block a delivery in flight.
    pub fn listeners_snapshot(&self) -> Vec<Arc<dyn NotifyListener>> {
        self.listeners
            .read()
            .expect("listener lock poisoned")
            .clone()
    }

    /// True exactly once: the caller that wins spawns the watch task.
    pub(crate) fn try_start_watch(&self) -> bool {
        self.watch_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Body of the per-identity watch task.
pub(crate) async fn watch_service(
    store: Arc<dyn CoordinationStore>,
    view: Arc<MembershipView>,
    subscriptions: Arc<DashMap<ServiceId, Arc<Subscription>>>,
    path: String,
    resubscribe_backoff: Duration,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        let mut events = store.subscribe_children(&path);

        while let Some(event) = events.recv().await {
            handle_child_event(&view, &subscriptions, event);
        }

        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        tracing::warn!("Watch stream for {} ended, re-subscribing", path);
        tokio::time::sleep(resubscribe_backoff).await;

        if shutdown.load(Ordering::SeqCst) {
            return;
        }
    }
}

/// Translates one raw event and dispatches its effect, if any.
fn handle_child_event(
    view: &MembershipView,
    subscriptions: &DashMap<ServiceId, Arc<Subscription>>,
    event: ChildEvent,
) {
    tracing::debug!("Child event: {:?} {}", event.kind, event.path);

    let meta = match decode_meta(&event.data) {
        Ok(meta) => meta,
        Err(e) => {
            // A malformed payload must never take the watcher down.
            tracing::warn!("Dropping watch event with bad payload at {}: {}", event.path, e);
            return;
        }
    };

    let Some(effect) = view.apply(&meta.service, &meta.address, event.kind) else {
        tracing::debug!(
            "Ignoring replayed {:?} for {} at {}",
            event.kind,
            meta.service,
            meta.address
        );
        return;
    };

    let notify_event = match effect {
        Effect::Added => NotifyEvent::Added,
        Effect::Removed { address_offline } => {
            if address_offline {
                tracing::info!("Offline notify: {}", meta.address);
            }
            NotifyEvent::Removed
        }
    };

    // Snapshot first so listeners run without any map guard held.
    let listeners = match subscriptions.get(&meta.service) {
        Some(subscription) => subscription.listeners_snapshot(),
        None => return,
    };
    for listener in listeners {
        listener.notify(&meta, notify_event);
    }
}
