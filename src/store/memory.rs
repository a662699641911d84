use super::adapter::{ChildEvent, ChildEventKind, ConnectionState, CoordinationStore};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone)]
struct EphemeralNode {
    parent: String,
    data: Vec<u8>,
}

/// In-process coordination store.
///
/// Implements the full adapter contract against DashMap-backed state, which
/// is enough for tests, the demo binary, and single-process deployments.
/// On top of the contract it exposes two simulation hooks:
/// [`MemoryStore::fail_next_creates`] injects write failures, and
/// [`MemoryStore::expire_session`] wipes every ephemeral node and replays
/// the Suspended/Reconnected transition a real store would deliver.
pub struct MemoryStore {
    /// Persistent (parent) nodes.
    persistent: DashMap<String, ()>,
    /// Ephemeral nodes keyed by full path.
    ephemerals: DashMap<String, EphemeralNode>,
    /// Child-watch subscribers keyed by parent path.
    watches: DashMap<String, Vec<mpsc::UnboundedSender<ChildEvent>>>,
    state_tx: broadcast::Sender<ConnectionState>,
    connected: AtomicBool,
    /// Current session id; changes on every (re)connection.
    session_id: std::sync::Mutex<String>,
    /// Monotonic counter behind store-assigned node ids.
    next_node_id: AtomicU64,
    /// How many upcoming ephemeral creations should fail.
    fail_creates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let (state_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            persistent: DashMap::new(),
            ephemerals: DashMap::new(),
            watches: DashMap::new(),
            state_tx,
            connected: AtomicBool::new(false),
            session_id: std::sync::Mutex::new(String::new()),
            next_node_id: AtomicU64::new(0),
            fail_creates: AtomicUsize::new(0),
        })
    }

    /// Makes the next `n` ephemeral creations fail with a write error.
    pub fn fail_next_creates(&self, n: usize) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    /// Simulates session expiry: every ephemeral node disappears (watchers
    /// see Removed events), then Suspended and Reconnected are emitted, in
    /// that order, exactly as a re-established session surfaces them.
    pub fn expire_session(&self) {
        let paths: Vec<String> = self.ephemerals.iter().map(|e| e.key().clone()).collect();
        for path in paths {
            if let Some((_, node)) = self.ephemerals.remove(&path) {
                self.emit(
                    &node.parent,
                    ChildEvent {
                        kind: ChildEventKind::Removed,
                        path,
                        data: node.data,
                    },
                );
            }
        }

        let session = self.rotate_session();
        let _ = self.state_tx.send(ConnectionState::Suspended);
        let _ = self.state_tx.send(ConnectionState::Reconnected);
        tracing::info!(
            "Session expired, all ephemeral nodes dropped, new session {}",
            session
        );
    }

    /// Current session id. Empty before the first connect.
    pub fn session_id(&self) -> String {
        self.session_id.lock().expect("session lock poisoned").clone()
    }

    fn rotate_session(&self) -> String {
        let session = uuid::Uuid::new_v4().to_string();
        *self.session_id.lock().expect("session lock poisoned") = session.clone();
        session
    }

    /// Number of live children under `parent`. Test accessor.
    pub fn child_count(&self, parent: &str) -> usize {
        self.ephemerals
            .iter()
            .filter(|e| e.value().parent == parent)
            .count()
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("store not connected"));
        }
        Ok(())
    }

    /// Fans an event out to the parent's watchers, dropping closed ones.
    fn emit(&self, parent: &str, event: ChildEvent) {
        if let Some(mut senders) = self.watches.get_mut(parent) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn connect(&self) -> Result<()> {
        let session = self.rotate_session();
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.state_tx.send(ConnectionState::Connected);
        tracing::debug!("Memory store connected, session {}", session);
        Ok(())
    }

    async fn check_exists(&self, path: &str) -> Result<bool> {
        Ok(self.persistent.contains_key(path) || self.ephemerals.contains_key(path))
    }

    async fn create_path(&self, path: &str, parents: bool) -> Result<()> {
        self.ensure_connected()?;

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if parents {
            let mut ancestor = String::new();
            for segment in &segments[..segments.len().saturating_sub(1)] {
                ancestor.push('/');
                ancestor.push_str(segment);
                self.persistent.entry(ancestor.clone()).or_insert(());
            }
        }

        if self.persistent.contains_key(path) {
            return Err(anyhow::anyhow!("node already exists: {}", path));
        }
        self.persistent.insert(path.to_string(), ());
        Ok(())
    }

    async fn create_ephemeral(&self, parent: &str, data: &[u8]) -> Result<String> {
        self.ensure_connected()?;

        let inject = self
            .fail_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if inject {
            return Err(anyhow::anyhow!("injected write failure for {}", parent));
        }

        if !self.persistent.contains_key(parent) {
            return Err(anyhow::anyhow!("parent path missing: {}", parent));
        }

        let id = self.next_node_id.fetch_add(1, Ordering::SeqCst);
        let path = format!("{}/n{:010}", parent, id);
        self.ephemerals.insert(
            path.clone(),
            EphemeralNode {
                parent: parent.to_string(),
                data: data.to_vec(),
            },
        );

        self.emit(
            parent,
            ChildEvent {
                kind: ChildEventKind::Added,
                path: path.clone(),
                data: data.to_vec(),
            },
        );

        Ok(path)
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        if let Some((_, node)) = self.ephemerals.remove(path) {
            self.emit(
                &node.parent,
                ChildEvent {
                    kind: ChildEventKind::Removed,
                    path: path.to_string(),
                    data: node.data,
                },
            );
            return Ok(());
        }
        if self.persistent.remove(path).is_some() {
            return Ok(());
        }
        Err(anyhow::anyhow!("no such node: {}", path))
    }

    fn subscribe_children(&self, path: &str) -> mpsc::UnboundedReceiver<ChildEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Replay current children so a late subscriber starts complete.
        // A creation racing the replay can surface twice; the contract is
        // at-least-once and the reconciler absorbs the duplicate.
        for entry in self.ephemerals.iter() {
            if entry.value().parent == path {
                let _ = tx.send(ChildEvent {
                    kind: ChildEventKind::Added,
                    path: entry.key().clone(),
                    data: entry.value().data.clone(),
                });
            }
        }

        self.watches.entry(path.to_string()).or_default().push(tx);
        rx
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}
