//! Notify Listener & Availability Gate
//!
//! The consumer-facing end of discovery: reconciled effects update the
//! connection-pool collaborator, and callers who need a provider before
//! dispatching can block on [`ServiceListener::wait_for_available`] until
//! one shows up or their deadline passes.

use crate::pool::ConnectionPool;
use crate::registry::types::{RegisterMeta, ServiceId};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A reconciled membership change, as seen by listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Added,
    Removed,
}

/// Sink for reconciled add/remove events of one subscribed service.
pub trait NotifyListener: Send + Sync {
    fn notify(&self, meta: &RegisterMeta, event: NotifyEvent);
}

/// Standard listener: keeps the connection pool in sync and wakes callers
/// blocked on availability.
pub struct ServiceListener {
    service: ServiceId,
    pool: Arc<dyn ConnectionPool>,
    available: Notify,
}

impl ServiceListener {
    pub fn new(service: ServiceId, pool: Arc<dyn ConnectionPool>) -> Arc<Self> {
        Arc::new(Self {
            service,
            pool,
            available: Notify::new(),
        })
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    /// Waits until the pool reports an available provider for this service,
    /// up to `timeout`. Returns whether one is available.
    ///
    /// The deadline is fixed once up front; every wakeup re-checks the
    /// predicate against the remaining time, so spurious or stale wakeups
    /// just loop. Deadline exhaustion is a normal outcome, not an error.
    pub async fn wait_for_available(&self, timeout: Duration) -> bool {
        if self.pool.is_available(&self.service) {
            return true;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        tracing::debug!(
            "Waiting for an available provider of {}, max {:?}",
            self.service,
            timeout
        );

        loop {
            let notified = self.available.notified();
            // Arm the wakeup hook before re-checking, so a notify landing
            // between the check and the await is not lost.
            if self.pool.is_available(&self.service) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pool.is_available(&self.service);
            }
        }
    }
}

impl NotifyListener for ServiceListener {
    fn notify(&self, meta: &RegisterMeta, event: NotifyEvent) {
        match event {
            NotifyEvent::Added => {
                tracing::info!(
                    "Service {} has a new provider at {}",
                    meta.service,
                    meta.address
                );
                self.pool.add_connection(meta);
                self.available.notify_waiters();
            }
            NotifyEvent::Removed => {
                tracing::info!(
                    "Service {} lost its provider at {}",
                    meta.service,
                    meta.address
                );
                self.pool.remove_connection(meta);
            }
        }
    }
}
