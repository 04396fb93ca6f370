// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebSocket transport adapter for the message relay.
//!
//! Protocol:
//! ```text
//! Client -> Server: GET /message-relay/{did}  (upgrade)
//! Server -> Client: {"type":"server_time","data":"2026-01-01T00:00:00.000Z"}
//! Server -> Client: {"type":"delivery_message","data":"<packed delivery>"}
//! ```
//!
//! The connecting DID becomes the session's client id and is routed to the
//! session itself, so messages for it are relayed right away. The session is
//! registered with the relay for as long as the socket stays open. A
//! `server_time` frame is sent on connect and then periodically; some
//! clients only treat the socket as open once data arrives.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::models::{ClientId, RecipientDid};
use crate::relay::{DeliveryError, MessageRelay, PackedMessage, RelaySink};
use crate::state::AppState;

/// Frames buffered per session before `deliver` waits on the socket.
const SESSION_BUFFER: usize = 32;

/// Server-to-client frame.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    DeliveryMessage(String),
    ServerTime(String),
}

impl ServerFrame {
    fn server_time() -> Self {
        ServerFrame::ServerTime(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Relay sink writing delivery frames to one WebSocket session.
pub struct WebSocketSink {
    client_id: ClientId,
    frames: mpsc::Sender<String>,
}

impl WebSocketSink {
    pub fn new(client_id: ClientId, frames: mpsc::Sender<String>) -> Self {
        Self { client_id, frames }
    }
}

#[async_trait]
impl RelaySink for WebSocketSink {
    async fn deliver(
        &self,
        packed: PackedMessage,
        attachment_count: usize,
    ) -> Result<(), DeliveryError> {
        debug!(
            client = %self.client_id,
            count = attachment_count,
            "Relaying {} message{}",
            attachment_count,
            if attachment_count == 1 { "" } else { "s" }
        );

        let frame = ServerFrame::DeliveryMessage(packed.message)
            .encode()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        self.frames
            .send(frame)
            .await
            .map_err(|_| DeliveryError::ChannelClosed)
    }
}

#[utoipa::path(
    get,
    path = "/message-relay/{did}",
    params(
        ("did" = String, Path, description = "DID of the connecting client")
    ),
    tag = "Relay",
    responses(
        (status = 101, description = "Switching to the relay WebSocket"),
        (status = 403, description = "Mediation not granted for this DID"),
        (status = 409, description = "A session is already open for this DID")
    )
)]
pub async fn message_relay_socket(
    State(state): State<AppState>,
    Path(did): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let client_id = ClientId::from(did);
    if let Err(e) = authorize(&state, &client_id).await {
        return e.into_response();
    }
    ws.on_upgrade(move |socket| relay_session(socket, state, client_id))
}

async fn authorize(state: &AppState, client_id: &ClientId) -> Result<(), ApiError> {
    match state.mediation.is_mediation_granted(client_id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(client = %client_id, "Mediation not granted, refusing relay session");
            return Err(ApiError::forbidden("Mediation not granted"));
        }
        Err(e) => {
            warn!(client = %client_id, error = %e, "Mediation check failed");
            return Err(ApiError::forbidden("Mediation status unavailable"));
        }
    }

    // First registration wins; a second socket would otherwise tear down
    // the first session's registration when it closes.
    if state.relay.is_registered(client_id) {
        return Err(ApiError::conflict("A relay session is already open for this DID"));
    }
    Ok(())
}

/// One socket's registration with the relay. Dropping it removes the
/// client and every route it owns.
struct SessionRegistration {
    relay: MessageRelay,
    client_id: ClientId,
}

impl SessionRegistration {
    /// Register `sink` and route the connecting DID to it. Returns `None` if
    /// another session got the DID first; that session is left untouched.
    fn open(
        relay: &MessageRelay,
        client_id: &ClientId,
        sink: Arc<dyn RelaySink>,
    ) -> Option<Self> {
        if !relay.register_client(client_id.clone(), sink) {
            return None;
        }
        if let Err(e) = relay.add_recipient(RecipientDid::from(client_id.as_str()), client_id) {
            warn!(client = %client_id, error = %e, "Failed to route session DID to itself");
        }
        Some(Self {
            relay: relay.clone(),
            client_id: client_id.clone(),
        })
    }
}

impl Drop for SessionRegistration {
    fn drop(&mut self) {
        self.relay.remove_client(&self.client_id);
        info!(client = %self.client_id, "Relay session closed");
    }
}

async fn relay_session(mut socket: WebSocket, state: AppState, client_id: ClientId) {
    let (frames_tx, mut frames_rx) = mpsc::channel::<String>(SESSION_BUFFER);
    let sink = Arc::new(WebSocketSink::new(client_id.clone(), frames_tx));

    // A concurrent upgrade for the same DID can pass `authorize` too.
    let Some(_registration) = SessionRegistration::open(&state.relay, &client_id, sink) else {
        warn!(client = %client_id, "Relay session already open for this DID, closing socket");
        let close = CloseFrame {
            code: close_code::POLICY,
            reason: Utf8Bytes::from_static("relay session already open"),
        };
        let _ = socket.send(Message::Close(Some(close))).await;
        return;
    };
    info!(client = %client_id, "Relay session opened");

    let (mut sender, mut receiver) = socket.split();
    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let outgoing = tokio::select! {
            _ = heartbeat.tick() => ServerFrame::server_time().encode().ok(),
            Some(frame) = frames_rx.recv() => Some(frame),
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => None,
            },
        };

        if let Some(frame) = outgoing {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    }
}
