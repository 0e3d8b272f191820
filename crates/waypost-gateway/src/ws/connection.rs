use axum::{
    body::Bytes,
    extract::{
        ws::{close_code, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use waypost_core::Identity;
use waypost_fanout::{CloseReason, SubscriptionFilter, SubscriptionHandle};
use waypost_protocol::frames::EventFrame;

use crate::app::AppState;
use crate::ws::send;

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Only push samples for this identity.
    pub identity: Option<String>,
}

impl WsQuery {
    fn filter(&self) -> SubscriptionFilter {
        match self.identity.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => SubscriptionFilter::Identity(Identity::from(id)),
            _ => SubscriptionFilter::All,
        }
    }
}

/// Axum handler: upgrades HTTP to WebSocket at GET /ws[?identity=...].
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let filter = query.filter();
    ws.max_message_size(state.config.gateway.max_payload_bytes)
        .on_upgrade(move |socket| run_connection(socket, state, filter))
}

/// Per-connection event loop: lives for the entire WS session.
///
/// The subscription is registered before anything is sent, so a viewer that
/// waits for `hello` and then pulls history misses nothing in between.
async fn run_connection(socket: WebSocket, state: Arc<AppState>, filter: SubscriptionFilter) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let mut subscription = state.broadcaster.subscribe_filtered(filter);
    info!(conn_id = %conn_id, subscriber = %subscription.id(), "new WS connection");

    let (mut tx, mut rx) = socket.split();

    let identity = match subscription.filter() {
        SubscriptionFilter::Identity(id) => Some(id),
        SubscriptionFilter::All => None,
    };
    let hello = EventFrame::hello(subscription.id(), identity);
    if send::event(&mut tx, &hello).await.is_err() {
        subscription.close(CloseReason::Dropped);
        return;
    }

    let period = Duration::from_secs(state.config.gateway.heartbeat_secs.max(1));
    let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let reason = loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break CloseReason::Failed;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break CloseReason::Dropped,
                    Some(Err(e)) if oversized(&e) => {
                        warn!(conn_id, error = %e, "inbound frame over the size limit");
                        send::close(&mut tx, close_code::SIZE, "message too large").await;
                        break CloseReason::Graceful;
                    }
                    Some(Err(e)) => {
                        debug!(conn_id, error = %e, "WS read error");
                        break CloseReason::Dropped;
                    }
                    // viewers have nothing to say; text/binary/pong are ignored
                    Some(Ok(_)) => {}
                }
            }

            delivery = subscription.recv() => {
                match delivery {
                    Some(d) => {
                        let frame = EventFrame::location(&d.sample, d.seq);
                        if send::event(&mut tx, &frame).await.is_err() {
                            break CloseReason::Failed;
                        }
                    }
                    None => break evicted(&conn_id, &subscription, &mut tx).await,
                }
            }

            _ = tick.tick() => {
                if tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break CloseReason::Failed;
                }
            }
        }
    };

    subscription.close(reason);
    info!(conn_id, %reason, "WS connection closed");
}

/// The manager ended this subscription (queue overflow or shutdown): tell the
/// peer why and report the recorded reason.
async fn evicted(
    conn_id: &str,
    subscription: &SubscriptionHandle,
    tx: &mut send::WsSink,
) -> CloseReason {
    let reason = subscription.close_reason().unwrap_or(CloseReason::Failed);
    match reason {
        CloseReason::Graceful => send::close(tx, close_code::AWAY, "server shutting down").await,
        _ => {
            warn!(conn_id, "viewer fell behind, closing");
            send::close(tx, close_code::POLICY, "subscriber lagged").await;
        }
    }
    reason
}

/// Frames over `max_message_size` are refused by the transport and surface
/// as a capacity read error rather than a message.
fn oversized(e: &axum::Error) -> bool {
    e.to_string().contains("Space limit exceeded")
}
