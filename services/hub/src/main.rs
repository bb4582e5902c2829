use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use hub::auth::{HmacVerifier, TokenVerifier};
use hub::config::{HubConfig, StoreBackend};
use hub::registry::Registry;
use hub::state::AppState;
use hub::store::memory::{MemoryBus, MemoryStore};
use hub::store::redis_store::{RedisBus, RedisStore};
use hub::store::{Bus, StateStore};

#[tokio::main]
async fn main() {
    let config = HubConfig::from_env().expect("invalid configuration");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .init();

    let (store, bus): (Arc<dyn StateStore>, Arc<dyn Bus>) = match config.store_backend {
        StoreBackend::Redis => {
            let url = config.redis_url.as_deref().expect("REDIS_URL set for redis backend");
            info!("connecting to redis...");
            let store = RedisStore::connect(url).await.expect("failed to connect redis store");
            let bus = RedisBus::connect(url).await.expect("failed to connect redis bus");
            (Arc::new(store), Arc::new(bus))
        }
        StoreBackend::Memory => {
            info!("running with in-memory store backend");
            (Arc::new(MemoryStore::new()), Arc::new(MemoryBus::new()))
        }
    };

    let verifier: Arc<dyn TokenVerifier> = Arc::new(HmacVerifier::new(config.auth_shared_secret.into_bytes()));

    let (registry, registry_handle) = Registry::new(Arc::clone(&store), Arc::clone(&bus));
    tokio::spawn(registry.run());

    let state = AppState {
        registry: registry_handle,
        store,
        bus,
        verifier,
    };

    let router = hub::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %config.bind_addr, "hub listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("hub shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
