use rpc_registry::config::RegistryConfig;
use rpc_registry::discovery::listener::ServiceListener;
use rpc_registry::dispatch::container::ServiceContainer;
use rpc_registry::dispatch::processor::{
    ProviderProcessor, RequestPayload, RequestProcessor, ResponseChannel, ResponsePayload,
};
use rpc_registry::pool::ConnectionTracker;
use rpc_registry::registry::clients::ClientRegistry;
use rpc_registry::registry::types::{Address, RegisterMeta, ServiceId};
use rpc_registry::store::adapter::CoordinationStore;
use rpc_registry::store::memory::MemoryStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut namespace = "rpc".to_string();
    let mut providers: u16 = 2;
    let mut expire = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--namespace" => {
                namespace = args[i + 1].clone();
                i += 2;
            }
            "--providers" => {
                providers = args[i + 1].parse()?;
                i += 2;
            }
            "--expire" => {
                expire = true;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    let config = RegistryConfig {
        namespace,
        ..RegistryConfig::fast()
    };

    // 1. Store + client registry (composition root owns both):
    let store = MemoryStore::new();
    let store_for_connector = store.clone();
    let clients = ClientRegistry::new(config, move |_addr: &str, _config: &RegistryConfig| {
        store_for_connector.clone() as Arc<dyn CoordinationStore>
    });
    let client = clients.get_or_connect("memory://local").await?;

    // 2. Provider side: load the implementation, publish the endpoints.
    let echo = ServiceId::new("EchoService", "default");
    let container = ServiceContainer::new();
    container.add_provider(&echo, |args| async move {
        Ok(serde_json::json!({ "echo": args }))
    });

    let metas: Vec<RegisterMeta> = (0..providers)
        .map(|n| {
            RegisterMeta::new(
                "demo-app",
                100,
                Address::new("127.0.0.1", 9000 + n),
                echo.clone(),
            )
        })
        .collect();
    client.register(metas);

    // 3. Consumer side: subscribe and block until a provider is reachable.
    let pool = Arc::new(ConnectionTracker::new());
    let listener = ServiceListener::new(echo.clone(), pool.clone());
    client.subscribe(&echo, listener.clone());

    let available = listener.wait_for_available(Duration::from_secs(5)).await;
    tracing::info!("EchoService available: {}", available);
    for address in client.view().addresses_of(&echo) {
        tracing::info!("  provider at {}", address);
    }

    // 4. One dispatched call through the provider processor:
    let processor = ProviderProcessor::new(container);
    let (response_tx, mut response_rx) = mpsc::unbounded_channel();
    let channel = Arc::new(DemoChannel { response_tx });
    processor.handle_request(
        channel,
        RequestPayload {
            id: 1,
            service: echo.clone(),
            method: "echo".to_string(),
            args: serde_json::json!({ "msg": "hello" }),
        },
    );
    if let Some(response) = response_rx.recv().await {
        tracing::info!(
            "Response {} -> {:?}: {}",
            response.id,
            response.status,
            response.body
        );
    }

    // 5. Optionally kill the session to show re-publication:
    if expire {
        tracing::info!("Expiring the store session...");
        store.expire_session();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let available = listener.wait_for_available(Duration::from_secs(5)).await;
        tracing::info!("EchoService available after reconnect: {}", available);
    }

    client.shutdown();
    Ok(())
}

struct DemoChannel {
    response_tx: mpsc::UnboundedSender<ResponsePayload>,
}

impl ResponseChannel for DemoChannel {
    fn send(&self, response: ResponsePayload) {
        let _ = self.response_tx.send(response);
    }

    fn close(&self) {
        tracing::info!("Demo channel closed");
    }
}
