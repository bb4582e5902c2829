//! Per-connection read and write loops.
//!
//! Each accepted WebSocket gets two tasks, mirroring the source system's
//! read-pump / write-pump split: one drives `stream.next()` against a read
//! deadline and feeds the dispatcher, the other drains the connection's
//! outbound queue against a write deadline and sends periodic pings. They
//! talk to each other only through the bounded `outbound` channel and the
//! write task's own abort at the end of the read loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use rand::RngCore;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use sync_protocol::{DeviceRecord, Envelope};

use crate::dispatch::{self, DispatchCtx, Outcome};
use crate::registry::RegistryHandle;
use crate::store::{Bus, StateStore};

const READ_DEADLINE: Duration = Duration::from_secs(60);
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(54);
const OUTBOUND_CAPACITY: usize = 256;

/// A fresh random hex identifier with 64 bits of entropy, used for
/// connection ids and as the fallback device id for clients that don't
/// supply their own.
pub fn random_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub async fn run(
    socket: WebSocket,
    user_id: String,
    device_id: String,
    device_name: String,
    registry: RegistryHandle,
    store: Arc<dyn StateStore>,
    bus: Arc<dyn Bus>,
) {
    let connection_id = random_id();
    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<WsMessage>(OUTBOUND_CAPACITY);
    let kill = Arc::new(Notify::new());

    registry
        .register(
            user_id.clone(),
            connection_id.clone(),
            DeviceRecord {
                id: device_id.clone(),
                name: device_name,
            },
            outbound_tx.clone(),
            kill.clone(),
        )
        .await;

    let write_task = tokio::spawn(write_loop(sink, outbound_rx, kill));

    let ctx = DispatchCtx {
        user_id: user_id.clone(),
        device_id: device_id.clone(),
        store,
        bus,
        outbound: outbound_tx,
    };

    read_loop(&mut stream, &ctx).await;

    // Dropping the write task's sink half closes the underlying socket.
    write_task.abort();
    registry.deregister(user_id, connection_id, device_id).await;
}

async fn read_loop(
    stream: &mut futures_util::stream::SplitStream<WebSocket>,
    ctx: &DispatchCtx,
) {
    loop {
        let next = tokio::time::timeout(READ_DEADLINE, stream.next()).await;
        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(err))) => {
                debug!(user_id = %ctx.user_id, %err, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                debug!(user_id = %ctx.user_id, "read deadline exceeded, closing connection");
                break;
            }
        };

        match message {
            WsMessage::Text(text) => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => {
                    if dispatch::handle(envelope, ctx).await == Outcome::Close {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        user_id = %ctx.user_id,
                        device_id = %ctx.device_id,
                        %err,
                        "dropping malformed message"
                    );
                }
            },
            WsMessage::Close(_) => break,
            // Binary frames aren't part of the protocol; pings/pongs are
            // handled by the underlying websocket implementation and just
            // reset the read deadline by virtue of having arrived.
            WsMessage::Binary(_) | WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }
}

async fn write_loop(
    mut sink: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut outbound_rx: mpsc::Receiver<WsMessage>,
    kill: Arc<Notify>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            maybe_message = outbound_rx.recv() => {
                let Some(message) = maybe_message else { break };
                if tokio::time::timeout(WRITE_DEADLINE, sink.send(message)).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                let ping = WsMessage::Ping(Vec::new().into());
                if tokio::time::timeout(WRITE_DEADLINE, sink.send(ping)).await.is_err() {
                    break;
                }
            }
            // The registry evicted us after a full queue; tear the socket
            // down instead of leaving the connection registered nowhere.
            _ = kill.notified() => break,
        }
    }
}
