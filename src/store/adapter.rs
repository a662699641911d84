use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

/// What happened under a watched parent path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEventKind {
    Added,
    Removed,
}

/// A raw child-watch notification.
///
/// `data` carries the node's payload (a serialized meta). Delivery is
/// at-least-once: the same event may be replayed, and events can be missed
/// entirely across a disconnect window. The reconciler absorbs both.
#[derive(Debug, Clone)]
pub struct ChildEvent {
    pub kind: ChildEventKind,
    /// Full path of the changed child node.
    pub path: String,
    pub data: Vec<u8>,
}

/// Session-level connection transitions surfaced by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial session established.
    Connected,
    /// Connection dropped, session may still be alive.
    Suspended,
    /// A new session was established after a suspension. Ephemeral nodes
    /// owned by the old session are gone and must be republished.
    Reconnected,
    /// Session given up for good.
    Lost,
}

/// The narrow surface the registry consumes from the coordination store.
///
/// Implementations own sessions, liveness, and watch plumbing; the registry
/// only ever creates nodes, checks paths, and listens.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Establishes the session. Must be called before any node operation.
    async fn connect(&self) -> Result<()>;

    async fn check_exists(&self, path: &str) -> Result<bool>;

    /// Creates a persistent node, with ancestors when `parents` is set.
    /// Fails if the node already exists; callers that only need the path to
    /// be present check first and tolerate the race.
    async fn create_path(&self, path: &str, parents: bool) -> Result<()>;

    /// Creates an ephemeral child under `parent` with a store-assigned node
    /// id, returning the full path of the created node. The node vanishes
    /// when the owning session ends.
    async fn create_ephemeral(&self, parent: &str, data: &[u8]) -> Result<String>;

    /// Deletes a node explicitly (early unregistration).
    async fn delete_path(&self, path: &str) -> Result<()>;

    /// Subscribes to child changes under `path`. Current children are
    /// replayed as `Added` events so late subscribers start from a complete
    /// picture. The stream ends when the store drops the watch; callers
    /// re-subscribe.
    fn subscribe_children(&self, path: &str) -> mpsc::UnboundedReceiver<ChildEvent>;

    /// Stream of connection-state transitions. Every subscriber sees every
    /// transition emitted after it subscribed.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionState>;
}
