//! The session registry: the single task that owns the authoritative view
//! of which connections belong to which user.
//!
//! Every mutation of the connection map happens inside `Registry::run`, so
//! there's never a lock to take or a race between two connections joining
//! or leaving at once. Everything else -- the WebSocket handler, the
//! command dispatcher -- only ever talks to a cloned `RegistryHandle`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::AbortHandle;
use tracing::warn;

use sync_protocol::{DeviceRecord, DeviceWithStatus, Envelope, DeviceListUpdate, PlaybackState};

use crate::playback;
use crate::store::{Bus, StateStore, user_channel};

/// What a connection task registers with the registry so it can be reached
/// again later, either for a local fan-out or for the one-off ping/pong and
/// device-list replies it sends itself.
///
/// `kill` exists because the connection's own read loop keeps a clone of
/// `outbound` for direct ping/pong replies, so dropping the registry's copy
/// alone never closes the channel. A full queue is fatal: the registry
/// notifies `kill` so the write loop tears the connection down instead of
/// silently leaving a stalled client registered nowhere.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub outbound: mpsc::Sender<WsMessage>,
    pub kill: Arc<Notify>,
}

enum RegistryCommand {
    Register {
        user_id: String,
        connection_id: String,
        device: DeviceRecord,
        outbound: mpsc::Sender<WsMessage>,
        kill: Arc<Notify>,
        reply: oneshot::Sender<()>,
    },
    Deregister {
        user_id: String,
        connection_id: String,
        device_id: String,
    },
    /// A payload arriving from this user's bus subscription, to be
    /// persisted (if it's one of the two types the hub cares about) and
    /// fanned out to every local connection for that user.
    Relay { user_id: String, payload: Vec<u8> },
}

/// A cheaply-cloneable front door to the registry task.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub async fn register(
        &self,
        user_id: String,
        connection_id: String,
        device: DeviceRecord,
        outbound: mpsc::Sender<WsMessage>,
        kill: Arc<Notify>,
    ) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(RegistryCommand::Register {
                user_id,
                connection_id,
                device,
                outbound,
                kill,
                reply: reply_tx,
            })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    pub async fn deregister(&self, user_id: String, connection_id: String, device_id: String) {
        let _ = self
            .tx
            .send(RegistryCommand::Deregister {
                user_id,
                connection_id,
                device_id,
            })
            .await;
    }
}

pub struct Registry {
    tx: mpsc::Sender<RegistryCommand>,
    rx: mpsc::Receiver<RegistryCommand>,
    clients: HashMap<String, HashMap<String, ConnectionHandle>>,
    subscriptions: HashMap<String, AbortHandle>,
    store: Arc<dyn StateStore>,
    bus: Arc<dyn Bus>,
}

impl Registry {
    pub fn new(store: Arc<dyn StateStore>, bus: Arc<dyn Bus>) -> (Self, RegistryHandle) {
        let (tx, rx) = mpsc::channel(256);
        let handle = RegistryHandle { tx: tx.clone() };
        (
            Self {
                tx,
                rx,
                clients: HashMap::new(),
                subscriptions: HashMap::new(),
                store,
                bus,
            },
            handle,
        )
    }

    /// Drives the registry until its command channel is closed, which only
    /// happens once every `RegistryHandle` (and the one the registry itself
    /// holds) has been dropped.
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                RegistryCommand::Register {
                    user_id,
                    connection_id,
                    device,
                    outbound,
                    kill,
                    reply,
                } => {
                    self.handle_register(user_id, connection_id, device, outbound, kill).await;
                    let _ = reply.send(());
                }
                RegistryCommand::Deregister {
                    user_id,
                    connection_id,
                    device_id,
                } => {
                    self.handle_deregister(user_id, connection_id, device_id).await;
                }
                RegistryCommand::Relay { user_id, payload } => {
                    self.handle_relay(user_id, payload).await;
                }
            }
        }
    }

    async fn handle_register(
        &mut self,
        user_id: String,
        connection_id: String,
        device: DeviceRecord,
        outbound: mpsc::Sender<WsMessage>,
        kill: Arc<Notify>,
    ) {
        if !self.clients.contains_key(&user_id) {
            self.spawn_subscriber(user_id.clone());
        }
        self.clients
            .entry(user_id.clone())
            .or_default()
            .insert(connection_id, ConnectionHandle { outbound: outbound.clone(), kill });

        if let Err(err) = self.store.add_device(&user_id, &device).await {
            warn!(%user_id, %err, "failed to register device");
        }

        if let Ok(Some(state)) = self.store.get_playback(&user_id).await {
            let env = Envelope::PlaybackSync { data: state };
            if let Ok(bytes) = serde_json::to_vec(&env) {
                let _ = outbound.try_send(WsMessage::Text(String::from_utf8_lossy(&bytes).into_owned().into()));
            }
        }

        self.broadcast_device_list(&user_id).await;
    }

    async fn handle_deregister(&mut self, user_id: String, connection_id: String, device_id: String) {
        let Some(conns) = self.clients.get_mut(&user_id) else {
            return;
        };
        if conns.remove(&connection_id).is_none() {
            return;
        }

        if let Err(err) = self.store.remove_device(&user_id, &device_id).await {
            warn!(%user_id, %err, "failed to remove device");
        }

        if let Ok(Some(mut state)) = self.store.get_playback(&user_id).await {
            if state.active_device_id == device_id {
                let remaining = self.store.list_devices(&user_id).await.unwrap_or_default();
                state.playing = Some(false);
                state.active_device_id = remaining.first().map(|d| d.id.clone()).unwrap_or_default();

                if let Err(err) = self.store.set_playback(&user_id, &state).await {
                    warn!(%user_id, %err, "failed to persist playback state after device switch");
                }
                self.publish(&user_id, &Envelope::PlaybackSync { data: state }).await;
            }
        }

        let now_empty = self.clients.get(&user_id).is_some_and(HashMap::is_empty);
        if now_empty {
            self.clients.remove(&user_id);
            if let Some(handle) = self.subscriptions.remove(&user_id) {
                handle.abort();
            }
        } else {
            self.broadcast_device_list(&user_id).await;
        }
    }

    async fn handle_relay(&mut self, user_id: String, payload: Vec<u8>) {
        if let Ok(env) = serde_json::from_slice::<Envelope>(&payload) {
            match env {
                Envelope::PlaybackSync { data } => self.persist_delta(&user_id, &data).await,
                Envelope::ControlSeek { data } => {
                    self.persist_delta(
                        &user_id,
                        &PlaybackState {
                            position: Some(data.position),
                            ..Default::default()
                        },
                    )
                    .await;
                }
                _ => {}
            }
        }

        let Some(conns) = self.clients.get_mut(&user_id) else {
            return;
        };
        let text: axum::extract::ws::Utf8Bytes = String::from_utf8_lossy(&payload).into_owned().into();
        conns.retain(|_, handle| {
            let ok = handle.outbound.try_send(WsMessage::Text(text.clone())).is_ok();
            if !ok {
                handle.kill.notify_one();
            }
            ok
        });
    }

    async fn persist_delta(&self, user_id: &str, delta: &PlaybackState) {
        let mut current = self.store.get_playback(user_id).await.ok().flatten().unwrap_or_default();
        playback::merge(&mut current, delta);
        if let Err(err) = self.store.set_playback(user_id, &current).await {
            warn!(%user_id, %err, "failed to persist playback delta");
        }
    }

    async fn publish(&self, user_id: &str, env: &Envelope) {
        match serde_json::to_vec(env) {
            Ok(bytes) => {
                if let Err(err) = self.bus.publish(&user_channel(user_id), bytes).await {
                    warn!(%user_id, %err, "failed to publish to bus");
                }
            }
            Err(err) => warn!(%user_id, %err, "failed to encode outgoing envelope"),
        }
    }

    /// Publishes the current device list to the bus so every one of this
    /// user's connections -- local or on another hub instance -- receives
    /// it via the same subscriber/relay path as any other state change.
    async fn broadcast_device_list(&mut self, user_id: &str) {
        let active_device_id = self
            .store
            .get_playback(user_id)
            .await
            .ok()
            .flatten()
            .map(|s| s.active_device_id)
            .unwrap_or_default();
        let devices = self.store.list_devices(user_id).await.unwrap_or_default();

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
        self.publish(user_id, &Envelope::DeviceListUpdate { data: update }).await;
    }

    fn spawn_subscriber(&mut self, user_id: String) {
        let bus = self.bus.clone();
        let tx = self.tx.clone();
        let channel = user_channel(&user_id);
        let task = tokio::spawn(async move {
            let mut subscription = match bus.subscribe(&channel).await {
                Ok(sub) => sub,
                Err(err) => {
                    warn!(%channel, %err, "failed to start bus subscription");
                    return;
                }
            };
            while let Some(payload) = subscription.receiver.recv().await {
                if tx
                    .send(RegistryCommand::Relay {
                        user_id: user_id.clone(),
                        payload,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        self.subscriptions.insert(user_id, task.abort_handle());
    }
}
