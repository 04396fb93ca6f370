// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::{DEFAULT_EVENT_BUS_CAPACITY, DEFAULT_HEARTBEAT_INTERVAL};
use crate::mediation::{GrantAllPolicy, MediationPolicy};
use crate::models::AgentEvent;
use crate::relay::{MessageRelay, PlaintextPacker, RelaySettings};

#[derive(Clone)]
pub struct AppState {
    pub relay: MessageRelay,
    /// Publishing side of the agent event bus.
    pub events: broadcast::Sender<AgentEvent>,
    pub mediation: Arc<dyn MediationPolicy>,
    pub heartbeat_interval: Duration,
}

impl AppState {
    pub fn new(
        relay: MessageRelay,
        events: broadcast::Sender<AgentEvent>,
        mediation: Arc<dyn MediationPolicy>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            relay,
            events,
            mediation,
            heartbeat_interval,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_BUS_CAPACITY);
        Self::new(
            MessageRelay::new(
                RelaySettings::new("did:web:localhost"),
                Arc::new(PlaintextPacker),
            ),
            events,
            Arc::new(GrantAllPolicy),
            DEFAULT_HEARTBEAT_INTERVAL,
        )
    }
}
