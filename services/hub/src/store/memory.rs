//! In-process `StateStore` / `Bus` adapter.
//!
//! Used by `STORE_BACKEND=memory` single-instance deployments and by the
//! integration test suite, which would otherwise need a real Redis to
//! exercise the registry and dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sync_protocol::{DeviceRecord, PlaybackState};
use tokio::sync::{RwLock, broadcast, mpsc};

use crate::error::HubError;
use crate::store::{Bus, BusSubscription, StateStore};

#[derive(Default)]
struct Inner {
    playback: HashMap<String, PlaybackState>,
    devices: HashMap<String, Vec<DeviceRecord>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_playback(&self, user_id: &str) -> Result<Option<PlaybackState>, HubError> {
        Ok(self.inner.read().await.playback.get(user_id).cloned())
    }

    async fn set_playback(&self, user_id: &str, state: &PlaybackState) -> Result<(), HubError> {
        self.inner
            .write()
            .await
            .playback
            .insert(user_id.to_owned(), state.clone());
        Ok(())
    }

    async fn add_device(&self, user_id: &str, device: &DeviceRecord) -> Result<(), HubError> {
        let mut inner = self.inner.write().await;
        let devices = inner.devices.entry(user_id.to_owned()).or_default();
        if !devices.iter().any(|d| d.id == device.id) {
            devices.push(device.clone());
        }
        Ok(())
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> Result<(), HubError> {
        let mut inner = self.inner.write().await;
        if let Some(devices) = inner.devices.get_mut(user_id) {
            devices.retain(|d| d.id != device_id);
        }
        Ok(())
    }

    async fn list_devices(&self, user_id: &str) -> Result<Vec<DeviceRecord>, HubError> {
        Ok(self.inner.read().await.devices.get(user_id).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), HubError> {
        Ok(())
    }
}

/// A bus implemented with one `tokio::sync::broadcast` channel per topic,
/// created lazily on first publish or subscribe.
#[derive(Clone, Default)]
pub struct MemoryBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender_for(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(tx) = self.channels.read().await.get(channel) {
            return tx.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), HubError> {
        // No subscribers is not an error: a user with no other hub
        // instances listening simply has nothing to fan out to.
        let _ = self.sender_for(channel).await.send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, HubError> {
        let mut broadcast_rx = self.sender_for(channel).await.subscribe();
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(BusSubscription::new(rx, task))
    }

    async fn ping(&self) -> Result<(), HubError> {
        Ok(())
    }
}
