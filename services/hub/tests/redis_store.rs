//! Exercises `RedisStore` / `RedisBus` against a real Redis instance.
//!
//! Gated behind the `redis-integration-tests` feature since it needs Docker;
//! run with `cargo test --features redis-integration-tests --test redis_store`.

#![cfg(feature = "redis-integration-tests")]

use hub::store::redis_store::{RedisBus, RedisStore};
use hub::store::{Bus, StateStore};
use sync_protocol::{DeviceRecord, PlaybackState};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;

async fn redis_url(container: &testcontainers::ContainerAsync<Redis>) -> String {
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    format!("redis://127.0.0.1:{port}")
}

#[tokio::test]
async fn redis_store_round_trips_playback_and_devices() {
    let container = Redis::default().start().await.unwrap();
    let url = redis_url(&container).await;
    let store = RedisStore::connect(&url).await.unwrap();

    assert_eq!(store.get_playback("u1").await.unwrap(), None);

    let state = PlaybackState {
        track_id: "t1".to_owned(),
        playing: Some(true),
        ..Default::default()
    };
    store.set_playback("u1", &state).await.unwrap();
    assert_eq!(store.get_playback("u1").await.unwrap(), Some(state));

    let device = DeviceRecord {
        id: "d1".to_owned(),
        name: "phone".to_owned(),
    };
    store.add_device("u1", &device).await.unwrap();
    assert_eq!(store.list_devices("u1").await.unwrap(), vec![device]);

    store.remove_device("u1", "d1").await.unwrap();
    assert!(store.list_devices("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn redis_bus_delivers_published_payload_to_subscriber() {
    let container = Redis::default().start().await.unwrap();
    let url = redis_url(&container).await;
    let bus = RedisBus::connect(&url).await.unwrap();

    let mut sub = bus.subscribe("playback:user:u1").await.unwrap();
    // The subscribe call races the SUBSCRIBE command's own round trip, so
    // give the server a moment before publishing.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    bus.publish("playback:user:u1", b"hello".to_vec()).await.unwrap();

    let received = tokio::time::timeout(std::time::Duration::from_secs(5), sub.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"hello");
}
