use std::convert::Infallible;
use std::sync::Arc;

use abi::{InitialData, PumpData, TokenConfig};
use futures::{SinkExt, StreamExt};
use log::{debug, info};
use serde::Serialize;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::broadcast::{BroadcastSink, SubscriberHub};
use crate::snapshot::{sorted_holders, SnapshotReader};
use crate::worker::{StatusReport, TrackerStatus};

pub struct AppState {
    /// Subscriber registry.
    pub hub: Arc<SubscriberHub>,
    /// Receives each new subscriber's initial payload; normally `hub` itself.
    pub sink: Arc<dyn BroadcastSink>,
    pub reader: SnapshotReader,
    pub token_config: TokenConfig,
    pub pump_data: Option<PumpData>,
    pub status: Arc<TrackerStatus>,
}

impl AppState {
    pub fn initial_data(&self) -> InitialData {
        InitialData {
            holders: sorted_holders(&self.reader.current()),
            token_config: self.token_config.clone(),
            pump_data: self.pump_data.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    mint: String,
    holders: usize,
    subscribers: usize,
    #[serde(flatten)]
    cycles: StatusReport,
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let ws = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_state(state.clone()))
        .map(|ws: warp::ws::Ws, state: Arc<AppState>| {
            ws.on_upgrade(move |socket| subscriber_connected(socket, state))
        });

    let holders = warp::path("holders")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: Arc<AppState>| warp::reply::json(&state.initial_data()));

    let health_check = warp::path("health_check")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .map(|state: Arc<AppState>| {
            warp::reply::json(&HealthReport {
                mint: state.token_config.mint.clone(),
                holders: state.reader.current().len(),
                subscribers: state.hub.len(),
                cycles: state.status.report(),
            })
        });

    ws.or(holders)
        .or(health_check)
        .with(warp::cors().allow_any_origin().allow_methods(vec!["GET"]))
}

async fn subscriber_connected(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = state.hub.channel();

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = ws_tx.send(Message::text(frame)).await {
                debug!("websocket send error: {}", e);
                return;
            }
        }
        // queue dropped by the hub: subscriber stalled or detached
        let _ = ws_tx.close().await;
    });

    let id = {
        let registration = state.hub.register(tx);
        state.sink.send_initial(registration.id(), &state.initial_data());
        registration.id()
    };
    info!("User connected: {}", id);

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) if msg.is_close() => break,
            Ok(_) => {}
            Err(e) => {
                debug!("websocket error for subscriber {}: {}", id, e);
                break;
            }
        }
    }

    state.hub.remove(id);
    info!("User disconnected: {}", id);
}
