use std::sync::Arc;

use hub::auth::StubVerifier;
use hub::registry::Registry;
use hub::state::AppState;
use hub::store::memory::{MemoryBus, MemoryStore};
use sync_protocol::Envelope;
use sync_test_utils::HubTestClient;

/// Boots a hub instance on a random local port, backed by the in-memory
/// store/bus and a verifier that treats any non-empty token as its own
/// user id. Returns the `ws://` base URL for `/ws`.
pub async fn spawn_hub() -> String {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    let (registry, registry_handle) = Registry::new(store.clone(), bus.clone());
    tokio::spawn(registry.run());

    let state = AppState {
        registry: registry_handle,
        store,
        bus,
        verifier: Arc::new(StubVerifier),
    };
    let router = hub::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("ws://{addr}/ws")
}

/// Drains messages off `client` until `pred` matches one, skipping the
/// device-list updates and other interleaved traffic the registry may have
/// queued ahead of the message under test. Panics after too many misses --
/// tests should never hang on a genuine protocol bug.
pub async fn recv_until<F>(client: &mut HubTestClient, mut pred: F) -> Envelope
where
    F: FnMut(&Envelope) -> bool,
{
    for _ in 0..16 {
        let envelope = client.recv().await.expect("connection closed while waiting for message");
        if pred(&envelope) {
            return envelope;
        }
    }
    panic!("did not see a matching message within 16 receives");
}
