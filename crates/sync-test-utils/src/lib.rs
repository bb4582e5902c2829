// sync-test-utils: shared WebSocket test client for hub integration tests.

pub mod hub_client;

pub use hub_client::HubTestClient;
