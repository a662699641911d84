//! Registry Module Tests
//!
//! Validates the registration pipeline end to end against the in-memory
//! store: ordering, retry-under-failure, re-publication after session loss,
//! and the client registry's one-client-per-address guarantee.

#[cfg(test)]
mod tests {
    use crate::config::RegistryConfig;
    use crate::registry::client::RegistryClient;
    use crate::registry::clients::ClientRegistry;
    use crate::registry::types::{
        Address, RegisterMeta, RegisterState, ServiceId, decode_meta, encode_meta, service_path,
    };
    use crate::store::adapter::{ChildEventKind, CoordinationStore};
    use crate::store::memory::MemoryStore;

    use std::sync::Arc;
    use std::time::Duration;

    fn echo_meta(port: u16) -> RegisterMeta {
        RegisterMeta::new(
            "test-app",
            100,
            Address::new("10.0.0.1", port),
            ServiceId::new("EchoService", "default"),
        )
    }

    async fn connected_client(store: Arc<MemoryStore>) -> Arc<RegistryClient> {
        let client = RegistryClient::new(store, RegistryConfig::fast());
        client.connect().await.expect("connect failed");
        client
    }

    /// Polls a condition until it holds or time runs out.
    async fn wait_until<F: Fn() -> bool>(cond: F, max: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + max;
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    // ============================================================
    // DATA MODEL
    // ============================================================

    #[test]
    fn test_register_meta_structural_equality() {
        let a = echo_meta(9000);
        let b = echo_meta(9000);
        let c = echo_meta(9001);

        assert_eq!(a, b);
        assert_ne!(a, c);

        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b); // duplicate, no growth
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_meta_payload_round_trip() {
        let meta = echo_meta(9000);

        let payload = encode_meta(&meta).expect("encode failed");
        let restored = decode_meta(&payload).expect("decode failed");

        assert_eq!(restored, meta);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_meta(b"not a meta").is_err());
    }

    #[test]
    fn test_service_path_layout() {
        let id = ServiceId::new("EchoService", "default");
        assert_eq!(service_path("rpc", &id), "/rpc/default/EchoService");
    }

    // ============================================================
    // REGISTRATION PIPELINE
    // ============================================================

    #[tokio::test]
    async fn test_register_creates_ephemeral_node() {
        let store = MemoryStore::new();
        let client = connected_client(store.clone()).await;
        let meta = echo_meta(9000);

        client.register(vec![meta.clone()]);

        let done = wait_until(
            || client.register_state(&meta) == Some(RegisterState::Done),
            Duration::from_secs(2),
        )
        .await;
        assert!(done, "meta never reached Done");
        assert_eq!(store.child_count("/rpc/default/EchoService"), 1);

        // The node payload is the serialized meta itself.
        let mut events = store.subscribe_children("/rpc/default/EchoService");
        let replayed = events.recv().await.unwrap();
        assert_eq!(decode_meta(&replayed.data).unwrap(), meta);
    }

    #[tokio::test]
    async fn test_registrations_apply_in_submission_order() {
        let store = MemoryStore::new();
        let client = connected_client(store.clone()).await;

        let metas: Vec<RegisterMeta> = (0..3).map(|n| echo_meta(9000 + n)).collect();
        let mut events = store.subscribe_children("/rpc/default/EchoService");

        client.register(metas.clone());

        for expected in &metas {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("timed out waiting for registration")
                .unwrap();
            assert_eq!(event.kind, ChildEventKind::Added);
            assert_eq!(&decode_meta(&event.data).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let store = MemoryStore::new();
        let client = connected_client(store.clone()).await;
        let failing = echo_meta(9000);
        let healthy = echo_meta(9001);

        // First write fails; the retry timer must land it eventually while
        // the drain keeps going with the second meta.
        store.fail_next_creates(1);
        client.register(vec![failing.clone(), healthy.clone()]);

        let both_done = wait_until(
            || {
                client.register_state(&failing) == Some(RegisterState::Done)
                    && client.register_state(&healthy) == Some(RegisterState::Done)
            },
            Duration::from_secs(2),
        )
        .await;
        assert!(both_done, "registrations did not recover from the failed write");
        assert_eq!(store.child_count("/rpc/default/EchoService"), 2);
    }

    #[tokio::test]
    async fn test_register_queued_before_connect_waits_for_gate() {
        let store = MemoryStore::new();
        let client = RegistryClient::new(store.clone(), RegistryConfig::fast());
        let meta = echo_meta(9000);

        // Queue first; the worker must block on the connectivity gate.
        client.register(vec![meta.clone()]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.child_count("/rpc/default/EchoService"), 0);

        client.connect().await.unwrap();

        let done = wait_until(
            || client.register_state(&meta) == Some(RegisterState::Done),
            Duration::from_secs(2),
        )
        .await;
        assert!(done);
    }

    #[tokio::test]
    async fn test_worker_stops_when_drained_and_restarts() {
        let store = MemoryStore::new();
        let client = connected_client(store.clone()).await;

        client.register(vec![echo_meta(9000)]);
        let first = wait_until(
            || store.child_count("/rpc/default/EchoService") == 1,
            Duration::from_secs(2),
        )
        .await;
        assert!(first);

        // Outlive the drain window so the worker exits as drained.
        tokio::time::sleep(Duration::from_millis(400)).await;

        client.register(vec![echo_meta(9001)]);
        let second = wait_until(
            || store.child_count("/rpc/default/EchoService") == 2,
            Duration::from_secs(2),
        )
        .await;
        assert!(second, "a later register call should restart the worker");
    }

    #[tokio::test]
    async fn test_reconnect_republishes_all_metas() {
        let store = MemoryStore::new();
        let client = connected_client(store.clone()).await;
        let metas: Vec<RegisterMeta> = (0..2).map(|n| echo_meta(9000 + n)).collect();

        client.register(metas.clone());
        let published = wait_until(
            || store.child_count("/rpc/default/EchoService") == 2,
            Duration::from_secs(2),
        )
        .await;
        assert!(published);

        // Session death wipes the nodes; Reconnected must bring them back.
        store.expire_session();

        let republished = wait_until(
            || store.child_count("/rpc/default/EchoService") == 2,
            Duration::from_secs(3),
        )
        .await;
        assert!(republished, "metas were not republished after reconnect");

        // The full set came back once, not once per meta per event.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.child_count("/rpc/default/EchoService"), 2);
        assert_eq!(client.registered_count(), 2);
    }

    #[tokio::test]
    async fn test_unregister_deletes_node_and_forgets_meta() {
        let store = MemoryStore::new();
        let client = connected_client(store.clone()).await;
        let meta = echo_meta(9000);

        client.register(vec![meta.clone()]);
        let done = wait_until(
            || client.register_state(&meta) == Some(RegisterState::Done),
            Duration::from_secs(2),
        )
        .await;
        assert!(done);

        client.unregister(&meta).await;

        assert_eq!(store.child_count("/rpc/default/EchoService"), 0);
        assert_eq!(client.register_state(&meta), None);

        // A session bounce must not resurrect it.
        store.expire_session();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.child_count("/rpc/default/EchoService"), 0);
    }

    // ============================================================
    // CLIENT REGISTRY
    // ============================================================

    #[tokio::test]
    async fn test_client_registry_reuses_client_per_address() {
        let store = MemoryStore::new();
        let registry = ClientRegistry::new(
            RegistryConfig::fast(),
            move |_addr: &str, _config: &RegistryConfig| store.clone() as Arc<dyn CoordinationStore>,
        );

        let first = registry.get_or_connect("memory://a").await.unwrap();
        let second = registry.get_or_connect("memory://a").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.client_count(), 1);

        let other = registry.get_or_connect("memory://b").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.client_count(), 2);
    }
}
