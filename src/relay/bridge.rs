// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Event Bridge
//!
//! Consumes the identity agent's event bus and drives the relay engine.
//!
//! ## Events
//!
//! - **Forward message queued** `{id, to, raw}`: the recipient DID is `to`
//!   truncated at the first `#`. Payloads missing a field, or whose `raw` is
//!   not JSON, are ignored. Otherwise the message is enqueued.
//! - **Message received**: only coordinate-mediation recipient updates are
//!   handled. Each `{action, recipient_did}` entry is applied on its own, with
//!   the message sender as the client id. A failing entry is logged and does
//!   not affect its siblings.
//!
//! ## Shutdown
//!
//! [`EventBridge::run`] returns when the bus closes or the cancellation token
//! fires, following the same pattern as the other background tasks.

use serde::de::IgnoredAny;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::MessageRelay;
use super::error::RelayError;
use crate::models::{
    AgentEvent, ClientId, ForwardMessageQueued, MessageReceived, RecipientKey, RecipientUpdate,
    UpdateAction,
};

/// Routes agent events into a [`MessageRelay`].
#[derive(Clone)]
pub struct EventBridge {
    relay: MessageRelay,
}

impl EventBridge {
    pub fn new(relay: MessageRelay) -> Self {
        Self { relay }
    }

    /// Run until the bus closes or `shutdown` is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(bridge.run(bus.subscribe(), shutdown.clone()));
    /// ```
    pub async fn run(self, mut events: broadcast::Receiver<AgentEvent>, shutdown: CancellationToken) {
        info!("Event bridge starting");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Event bridge shutting down");
                    return;
                }
                received = events.recv() => match received {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event bridge lagged behind the agent, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        info!("Agent event bus closed, event bridge stopping");
                        return;
                    }
                },
            }
        }
    }

    /// Apply one agent event. Never fails; problems are logged.
    pub fn handle_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::ForwardMessageQueued(payload) => match self.on_forward_queued(payload) {
                Ok(()) | Err(RelayError::NoRoute(_)) => {}
                Err(e) => debug!(error = %e, "Ignoring forward event"),
            },
            AgentEvent::MessageReceived(payload) => self.on_message_received(payload),
        }
    }

    fn on_forward_queued(&self, payload: &ForwardMessageQueued) -> Result<(), RelayError> {
        let (Some(id), Some(to), Some(raw)) = (&payload.id, &payload.to, &payload.raw) else {
            return Err(RelayError::Validation(
                "forward event requires id, to and raw".into(),
            ));
        };
        if id.is_empty() || raw.is_empty() {
            return Err(RelayError::Validation("empty id or raw".into()));
        }

        let recipient_key = RecipientKey::from(to.as_str());
        let recipient = recipient_key
            .owning_did()
            .ok_or_else(|| RelayError::Validation(format!("no DID in recipient key {to:?}")))?;

        serde_json::from_str::<IgnoredAny>(raw)
            .map_err(|e| RelayError::Validation(format!("raw is not JSON: {e}")))?;

        self.relay
            .enqueue(recipient, recipient_key, id.as_str(), raw.as_str())
    }

    fn on_message_received(&self, payload: &MessageReceived) {
        let Some(message) = &payload.message else {
            return;
        };
        if !message.is_recipient_update() {
            return;
        }
        let Some(from) = message.from.as_deref().filter(|from| !from.is_empty()) else {
            return;
        };
        let Some(updates) = message.body.get("updates").and_then(|u| u.as_array()) else {
            return;
        };

        let sender = ClientId::from(from);
        debug!(client = %sender, updates = updates.len(), "Received recipient update");

        for entry in updates {
            if let Err(e) = self.apply_update(&sender, entry) {
                warn!(client = %sender, error = %e, "Failed to apply recipient update entry");
            }
        }
    }

    fn apply_update(&self, sender: &ClientId, entry: &serde_json::Value) -> Result<(), RelayError> {
        let update: RecipientUpdate = serde_json::from_value(entry.clone())
            .map_err(|e| RelayError::Validation(format!("malformed update entry: {e}")))?;

        match update.action {
            UpdateAction::Add => self.relay.add_recipient(update.recipient_did, sender),
            UpdateAction::Remove => {
                self.relay.remove_recipient(&update.recipient_did, sender);
                Ok(())
            }
        }
    }
}
