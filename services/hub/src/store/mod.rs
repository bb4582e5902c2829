//! Pluggable state store / pub-sub bus abstraction.
//!
//! The registry and command dispatcher only ever talk to `dyn StateStore`
//! and `dyn Bus`, never to Redis or the in-memory adapter directly, so the
//! same merge and fan-out logic runs unchanged whether the hub is backed by
//! Redis or running as a single in-process instance for tests.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use sync_protocol::DeviceRecord;

use crate::error::HubError;

/// A live subscription to a bus channel. Dropping it stops delivery; the
/// background forwarding task is aborted when the subscription is dropped.
pub struct BusSubscription {
    pub receiver: tokio::sync::mpsc::Receiver<Vec<u8>>,
    task: tokio::task::JoinHandle<()>,
}

impl BusSubscription {
    pub fn new(receiver: tokio::sync::mpsc::Receiver<Vec<u8>>, task: tokio::task::JoinHandle<()>) -> Self {
        Self { receiver, task }
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Holds the canonical per-user playback record and the per-user device
/// set. Implementations must make `set_playback` / `add_device` /
/// `remove_device` safe to call concurrently for the same user -- the
/// registry is the only writer in practice, but the trait doesn't assume it.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_playback(&self, user_id: &str) -> Result<Option<sync_protocol::PlaybackState>, HubError>;
    async fn set_playback(
        &self,
        user_id: &str,
        state: &sync_protocol::PlaybackState,
    ) -> Result<(), HubError>;

    async fn add_device(&self, user_id: &str, device: &DeviceRecord) -> Result<(), HubError>;
    async fn remove_device(&self, user_id: &str, device_id: &str) -> Result<(), HubError>;
    async fn list_devices(&self, user_id: &str) -> Result<Vec<DeviceRecord>, HubError>;

    async fn ping(&self) -> Result<(), HubError>;
}

/// Fans updates out to every hub instance subscribed to a user's channel,
/// including the instance that published them -- the registry relies on
/// this self-echo to keep its in-process view consistent with what it just
/// wrote to the store.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), HubError>;
    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, HubError>;
    async fn ping(&self) -> Result<(), HubError>;
}

/// The channel name a given user's playback updates are published on.
pub fn user_channel(user_id: &str) -> String {
    format!("playback:user:{user_id}")
}
