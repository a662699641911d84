//! Registration Pipeline & Registry Client
//!
//! One client per coordination-store address. Providers hand it metas to
//! announce; consumers subscribe listeners to service identities. All store
//! writes go through a single serialized drain task, so registrations from
//! one process land in submission order and never race each other on the
//! same parent path.
//!
//! ## Failure model
//! - `register` is fire-and-forget: store errors are logged and retried on a
//!   detached timer until they succeed or the client shuts down. One failing
//!   meta never blocks the rest of the queue.
//! - On a Reconnected transition every tracked meta is re-submitted through
//!   the same pipeline, whatever its last recorded state: ephemeral nodes of
//!   the expired session are gone and must be republished.

use super::types::{
    RegisterMeta, RegisterState, ServiceId, encode_meta, service_path,
};
use crate::config::RegistryConfig;
use crate::discovery::listener::NotifyListener;
use crate::discovery::reconciler::MembershipView;
use crate::discovery::watcher::{Subscription, watch_service};
use crate::store::adapter::{ConnectionState, CoordinationStore};

use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

pub struct RegistryClient {
    store: Arc<dyn CoordinationStore>,
    config: RegistryConfig,

    /// Producer side of the registration queue. Any task may enqueue.
    queue_tx: mpsc::UnboundedSender<RegisterMeta>,
    /// Consumer side. Drain tasks serialize on this mutex, so exactly one
    /// drains at a time and registrations stay ordered.
    queue_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<RegisterMeta>>>,

    /// Everything this process has announced, and how far it got.
    registered: DashMap<RegisterMeta, RegisterState>,
    /// Node path the store assigned per confirmed meta (for unregister).
    node_paths: DashMap<RegisterMeta, String>,

    /// Which listeners are bound to which identity, plus the per-identity
    /// watch bookkeeping.
    subscriptions: Arc<DashMap<ServiceId, Arc<Subscription>>>,
    view: Arc<MembershipView>,

    /// One-shot connectivity gate: flips to true on the first Connected and
    /// stays true.
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    shutdown: Arc<AtomicBool>,
}

impl RegistryClient {
    pub fn new(store: Arc<dyn CoordinationStore>, config: RegistryConfig) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);

        Arc::new(Self {
            store,
            config,
            queue_tx,
            queue_rx: Arc::new(tokio::sync::Mutex::new(queue_rx)),
            registered: DashMap::new(),
            node_paths: DashMap::new(),
            subscriptions: Arc::new(DashMap::new()),
            view: Arc::new(MembershipView::new()),
            connected_tx,
            connected_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Connects the underlying store and starts the connection-state
    /// listener that opens the gate and drives re-publication.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let state_rx = self.store.connection_events();
        let client = self.clone();
        tokio::spawn(async move {
            client.state_loop(state_rx).await;
        });

        match tokio::time::timeout(self.config.connect_timeout, self.store.connect()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "timed out connecting to the store after {:?}",
                self.config.connect_timeout
            )),
        }
    }

    async fn state_loop(self: Arc<Self>, mut state_rx: broadcast::Receiver<ConnectionState>) {
        loop {
            match state_rx.recv().await {
                Ok(state) => {
                    tracing::info!("Store connection state changed: {:?}", state);
                    match state {
                        ConnectionState::Connected => {
                            let _ = self.connected_tx.send(true);
                        }
                        ConnectionState::Reconnected => {
                            let _ = self.connected_tx.send(true);
                            self.republish();
                        }
                        ConnectionState::Suspended | ConnectionState::Lost => {}
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Connection state stream lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }

            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    /// Announces a batch of metas. Returns immediately; creation, retries,
    /// and re-publication all happen on background tasks.
    pub fn register(self: &Arc<Self>, metas: Vec<RegisterMeta>) {
        for meta in metas {
            let _ = self.queue_tx.send(meta);
        }
        self.spawn_drain();
    }

    /// Re-submits the full tracked set after a session was re-established.
    fn republish(self: &Arc<Self>) {
        let metas: Vec<RegisterMeta> = self
            .registered
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        if metas.is_empty() {
            return;
        }
        tracing::info!(
            "Session re-established, republishing {} registrations",
            metas.len()
        );
        self.register(metas);
    }

    fn spawn_drain(self: &Arc<Self>) {
        let client = self.clone();
        tokio::spawn(async move {
            // Serialize with any other drain; whoever holds the receiver is
            // the single active worker.
            let mut queue = client.queue_rx.lock().await;

            let mut connected = client.connected_rx.clone();
            if connected.wait_for(|up| *up).await.is_err() {
                return;
            }

            while !client.shutdown.load(Ordering::SeqCst) {
                let meta =
                    match tokio::time::timeout(client.config.queue_poll_timeout, queue.recv())
                        .await
                    {
                        Ok(Some(meta)) => meta,
                        // Queue endpoint dropped with the client.
                        Ok(None) => return,
                        // Nothing arrived for the whole window: the queue is
                        // drained. A later register call starts a new drain.
                        Err(_) => return,
                    };

                client
                    .registered
                    .insert(meta.clone(), RegisterState::Prepare);

                if let Err(e) = client.create_node(&meta).await {
                    tracing::error!(
                        "Register [{}] failed: {}, will try again...",
                        meta.service,
                        e
                    );
                    client.spawn_retry(meta);
                }
            }
        });
    }

    /// Ensures the parent path, then creates the ephemeral node carrying
    /// the serialized meta.
    async fn create_node(&self, meta: &RegisterMeta) -> Result<()> {
        let directory = service_path(&self.config.namespace, &meta.service);

        // Parent creation is idempotent: losing the create race to another
        // process is the same as the path already existing.
        match self.store.check_exists(&directory).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.store.create_path(&directory, true).await {
                    tracing::warn!("Create parent path {} failed: {}", directory, e);
                }
            }
            Err(e) => {
                tracing::warn!("Existence check for {} failed: {}", directory, e);
            }
        }

        let payload = encode_meta(meta)?;
        let node_path = self.store.create_ephemeral(&directory, &payload).await?;

        self.registered.insert(meta.clone(), RegisterState::Done);
        self.node_paths.insert(meta.clone(), node_path.clone());
        tracing::info!(
            "Registered {} at {} as {}",
            meta.service,
            meta.address,
            node_path
        );
        Ok(())
    }

    /// Retries one meta's node creation on its own timer until it lands,
    /// leaving the drain free to keep moving.
    fn spawn_retry(self: &Arc<Self>, meta: RegisterMeta) {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                tokio::time::sleep(client.config.retry_backoff + jitter).await;

                if client.shutdown.load(Ordering::SeqCst) {
                    return;
                }

                match client.create_node(&meta).await {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::warn!(
                            "Retry for [{}] failed: {}, will try again...",
                            meta.service,
                            e
                        );
                    }
                }
            }
        });
    }

    /// Deletes a previously published node and stops tracking the meta.
    /// Unknown metas are a no-op.
    pub async fn unregister(&self, meta: &RegisterMeta) {
        self.registered.remove(meta);
        if let Some((_, path)) = self.node_paths.remove(meta) {
            match self.store.delete_path(&path).await {
                Ok(()) => tracing::info!("Unregistered {} ({})", meta.service, path),
                Err(e) => tracing::warn!("Delete of {} failed: {}", path, e),
            }
        }
    }

    /// Attaches a listener to a service identity and guarantees a child
    /// watch exists for it. The first subscriber starts the watch task;
    /// later subscribers only add their listener.
    pub fn subscribe(self: &Arc<Self>, id: &ServiceId, listener: Arc<dyn NotifyListener>) {
        let subscription = self
            .subscriptions
            .entry(id.clone())
            .or_insert_with(Subscription::new)
            .clone();
        subscription.add_listener(listener);

        if subscription.try_start_watch() {
            let path = service_path(&self.config.namespace, id);
            tracing::info!("Starting child watch for {} at {}", id, path);
            tokio::spawn(watch_service(
                self.store.clone(),
                self.view.clone(),
                self.subscriptions.clone(),
                path,
                self.config.resubscribe_backoff,
                self.shutdown.clone(),
            ));
        }
    }

    /// The membership view this client reconciles watch events into.
    pub fn view(&self) -> Arc<MembershipView> {
        self.view.clone()
    }

    /// Last recorded pipeline state of a meta, if it was ever submitted.
    pub fn register_state(&self, meta: &RegisterMeta) -> Option<RegisterState> {
        self.registered.get(meta).map(|entry| *entry.value())
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// Stops background tasks at their next checkpoint. Ephemeral nodes are
    /// left to die with the session.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
