//! Redis-backed `StateStore` / `Bus` adapter: the hub's production backend.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sync_protocol::{DeviceRecord, PlaybackState};
use tokio::sync::mpsc;

use crate::error::HubError;
use crate::store::{Bus, BusSubscription, StateStore};

/// Device sets and playback records expire after a day of inactivity, so an
/// abandoned user's state doesn't linger in Redis forever.
const TTL_SECONDS: u64 = 24 * 60 * 60;

fn playback_key(user_id: &str) -> String {
    format!("user:{user_id}:playback")
}

fn devices_key(user_id: &str) -> String {
    format!("user:{user_id}:devices")
}

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, HubError> {
        let client = redis::Client::open(url).map_err(HubError::from)?;
        let conn = client.get_connection_manager().await.map_err(HubError::from)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get_playback(&self, user_id: &str) -> Result<Option<PlaybackState>, HubError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(playback_key(user_id))
            .await
            .map_err(HubError::from)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_playback(&self, user_id: &str, state: &PlaybackState) -> Result<(), HubError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(state)?;
        conn.set_ex::<_, _, ()>(playback_key(user_id), raw, TTL_SECONDS)
            .await
            .map_err(HubError::from)
    }

    async fn add_device(&self, user_id: &str, device: &DeviceRecord) -> Result<(), HubError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(device)?;
        let key = devices_key(user_id);
        conn.sadd::<_, _, ()>(&key, raw).await.map_err(HubError::from)?;
        conn.expire::<_, ()>(&key, TTL_SECONDS as i64)
            .await
            .map_err(HubError::from)
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> Result<(), HubError> {
        let mut conn = self.conn.clone();
        let key = devices_key(user_id);
        let raw_members: Vec<String> = conn.smembers(&key).await.map_err(HubError::from)?;
        for raw in raw_members {
            if let Ok(device) = serde_json::from_str::<DeviceRecord>(&raw) {
                if device.id == device_id {
                    conn.srem::<_, _, ()>(&key, raw).await.map_err(HubError::from)?;
                }
            }
        }
        Ok(())
    }

    async fn list_devices(&self, user_id: &str) -> Result<Vec<DeviceRecord>, HubError> {
        let mut conn = self.conn.clone();
        let raw_members: Vec<String> = conn
            .smembers(devices_key(user_id))
            .await
            .map_err(HubError::from)?;
        Ok(raw_members
            .into_iter()
            .filter_map(|raw| serde_json::from_str(&raw).ok())
            .collect())
    }

    async fn ping(&self) -> Result<(), HubError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(HubError::from)
    }
}

pub struct RedisBus {
    client: redis::Client,
    publish_conn: ConnectionManager,
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self, HubError> {
        let client = redis::Client::open(url).map_err(HubError::from)?;
        let publish_conn = client.get_connection_manager().await.map_err(HubError::from)?;
        Ok(Self {
            client,
            publish_conn,
        })
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), HubError> {
        let mut conn = self.publish_conn.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(HubError::from)
    }

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, HubError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(HubError::from)?;
        pubsub.subscribe(channel).await.map_err(HubError::from)?;

        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload = msg.get_payload_bytes().to_vec();
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        Ok(BusSubscription::new(rx, task))
    }

    async fn ping(&self) -> Result<(), HubError> {
        let mut conn = self.publish_conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(HubError::from)
    }
}
