//! Maps each inbound envelope to its effect: publish a state delta to the
//! bus, or reply directly to the sending connection.
//!
//! Persisting a `playback:sync` / `control:seek` delta once it comes back
//! off the bus is the registry's job (`registry::handle_relay`), not this
//! module's -- that keeps a single persistence path regardless of whether
//! the delta originated locally or on another hub instance.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, Utf8Bytes};
use tracing::warn;

use sync_protocol::{DeviceListUpdate, DeviceWithStatus, Envelope, PlaybackState};

use crate::store::{Bus, StateStore, user_channel};

pub struct DispatchCtx {
    pub user_id: String,
    pub device_id: String,
    pub store: Arc<dyn StateStore>,
    pub bus: Arc<dyn Bus>,
    pub outbound: tokio::sync::mpsc::Sender<WsMessage>,
}

/// Whether the connection that produced this dispatch should keep reading.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Close,
}

pub async fn handle(envelope: Envelope, ctx: &DispatchCtx) -> Outcome {
    match envelope {
        Envelope::PlaybackUpdate { mut data } => {
            data.active_device_id = ctx.device_id.clone();
            publish_sync(ctx, data).await;
        }
        Envelope::ControlPlay { mut data } => {
            data.playing = Some(true);
            if data.active_device_id.is_empty() {
                data.active_device_id = ctx.device_id.clone();
            }
            publish_sync(ctx, data).await;
        }
        Envelope::ControlPause { mut data } => {
            data.playing = Some(false);
            publish_sync(ctx, data).await;
        }
        Envelope::ControlStop { mut data } => {
            data.playing = Some(false);
            data.position = Some(0);
            publish_sync(ctx, data).await;
        }
        Envelope::ControlSeek { data } => {
            publish_raw(ctx, &Envelope::ControlSeek { data }).await;
        }
        Envelope::ControlVolume { data } => {
            publish_sync(
                ctx,
                PlaybackState {
                    volume: data.volume,
                    ..Default::default()
                },
            )
            .await;
        }
        Envelope::ControlLoad { data } => {
            // No stored state is the same as a zero-value state with no
            // active device elected, so a fresh load still claims it.
            let existing_active = ctx
                .store
                .get_playback(&ctx.user_id)
                .await
                .ok()
                .flatten()
                .map(|state| state.active_device_id)
                .unwrap_or_default();
            let active_device_id = if existing_active.is_empty() {
                ctx.device_id.clone()
            } else {
                existing_active
            };
            publish_sync(
                ctx,
                PlaybackState {
                    track_id: data.track_id,
                    position: Some(0),
                    playing: Some(true),
                    active_device_id,
                    ..Default::default()
                },
            )
            .await;
        }
        Envelope::ControlNext => publish_raw(ctx, &Envelope::ControlNext).await,
        Envelope::ControlPrevious => publish_raw(ctx, &Envelope::ControlPrevious).await,
        Envelope::ControlShuffle { data } => {
            publish_sync(
                ctx,
                PlaybackState {
                    shuffle: data.shuffle,
                    ..Default::default()
                },
            )
            .await;
            // Also broadcast the raw control message, unmodified, so
            // connected clients can react immediately without waiting on
            // the merge-and-republish round trip above.
            publish_raw(ctx, &Envelope::ControlShuffle { data }).await;
        }
        Envelope::ControlRepeat { data } => {
            publish_sync(
                ctx,
                PlaybackState {
                    repeat: data.mode.clone(),
                    ..Default::default()
                },
            )
            .await;
            publish_raw(ctx, &Envelope::ControlRepeat { data }).await;
        }
        Envelope::DeviceSetActive { data } => {
            publish_sync(
                ctx,
                PlaybackState {
                    active_device_id: data.device_id,
                    position: Some(data.position),
                    ..Default::default()
                },
            )
            .await;
        }
        Envelope::DeviceGetList => {
            return reply_device_list(ctx).await;
        }
        Envelope::Ping => {
            return reply(ctx, &Envelope::Pong).await;
        }
        // Server -> client only; a client sending one of these is simply
        // ignored rather than treated as a protocol violation.
        Envelope::PlaybackSync { .. } | Envelope::DeviceListUpdate { .. } | Envelope::Pong => {}
    }
    Outcome::Continue
}

async fn publish_sync(ctx: &DispatchCtx, data: PlaybackState) {
    publish_raw(ctx, &Envelope::PlaybackSync { data }).await;
}

async fn publish_raw(ctx: &DispatchCtx, env: &Envelope) {
    match serde_json::to_vec(env) {
        Ok(bytes) => {
            if let Err(err) = ctx.bus.publish(&user_channel(&ctx.user_id), bytes).await {
                warn!(user_id = %ctx.user_id, %err, "failed to publish envelope");
            }
        }
        Err(err) => warn!(user_id = %ctx.user_id, %err, "failed to encode outgoing envelope"),
    }
}

/// Replies directly to the connection that sent the message, bypassing the
/// registry entirely. If the connection's own outbound queue is full, it's
/// treated the same as a dead connection and closed.
async fn reply(ctx: &DispatchCtx, env: &Envelope) -> Outcome {
    let Ok(bytes) = serde_json::to_vec(env) else {
        return Outcome::Continue;
    };
    let text = Utf8Bytes::from(String::from_utf8_lossy(&bytes).into_owned());
    match ctx.outbound.try_send(WsMessage::Text(text)) {
        Ok(()) => Outcome::Continue,
        Err(_) => Outcome::Close,
    }
}

async fn reply_device_list(ctx: &DispatchCtx) -> Outcome {
    let active_device_id = ctx
        .store
        .get_playback(&ctx.user_id)
        .await
        .ok()
        .flatten()
        .map(|s| s.active_device_id)
        .unwrap_or_default();
    let devices = match ctx.store.list_devices(&ctx.user_id).await {
        Ok(devices) => devices,
        Err(err) => {
            warn!(user_id = %ctx.user_id, %err, "failed to list devices");
            return Outcome::Continue;
        }
    };

    let update = DeviceListUpdate {
        devices: devices
            .into_iter()
            .map(|d| DeviceWithStatus {
                is_active: d.id == active_device_id,
                id: d.id,
                name: d.name,
            })
            .collect(),
        active_device_id,
    };
    reply(ctx, &Envelope::DeviceListUpdate { data: update }).await
}
