// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client registry and recipient routing table.
//!
//! The registry holds the delivery sink of every live session. The routing
//! table maps each recipient DID to the single session currently authorized
//! to receive for it. A route can only name a registered client, and
//! removing a client drops every route that names it.

use std::collections::HashMap;
use std::sync::Arc;

use super::agent::RelaySink;
use crate::models::{ClientId, RecipientDid};

#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, Arc<dyn RelaySink>>,
    routes: HashMap<RecipientDid, ClientId>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session's sink. First registration wins: returns `false`
    /// and keeps the existing sink if `client_id` is already registered.
    pub fn register(&mut self, client_id: ClientId, sink: Arc<dyn RelaySink>) -> bool {
        if self.clients.contains_key(&client_id) {
            return false;
        }
        self.clients.insert(client_id, sink);
        true
    }

    /// Forget a session and every route it owns. Returns the recipients that
    /// lost their route.
    pub fn remove(&mut self, client_id: &ClientId) -> Vec<RecipientDid> {
        self.clients.remove(client_id);

        let orphaned: Vec<RecipientDid> = self
            .routes
            .iter()
            .filter(|(_, owner)| *owner == client_id)
            .map(|(recipient, _)| recipient.clone())
            .collect();
        for recipient in &orphaned {
            self.routes.remove(recipient);
        }
        orphaned
    }

    pub fn is_registered(&self, client_id: &ClientId) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Bind `recipient` to `client_id`, replacing any previous owner.
    ///
    /// Returns `false` without touching the table if the client is not
    /// registered.
    pub fn add_route(&mut self, recipient: RecipientDid, client_id: &ClientId) -> bool {
        if !self.is_registered(client_id) {
            return false;
        }
        self.routes.insert(recipient, client_id.clone());
        true
    }

    /// Drop the route for `recipient` only if `client_id` currently owns it.
    pub fn remove_route(&mut self, recipient: &RecipientDid, client_id: &ClientId) -> bool {
        if self.routes.get(recipient) != Some(client_id) {
            return false;
        }
        self.routes.remove(recipient);
        true
    }

    pub fn owner(&self, recipient: &RecipientDid) -> Option<&ClientId> {
        self.routes.get(recipient)
    }

    pub fn has_route(&self, recipient: &RecipientDid) -> bool {
        self.routes.contains_key(recipient)
    }

    /// Sink of the client currently owning `recipient`.
    pub fn sink_for(&self, recipient: &RecipientDid) -> Option<(ClientId, Arc<dyn RelaySink>)> {
        let owner = self.routes.get(recipient)?;
        let sink = self.clients.get(owner)?;
        Some((owner.clone(), Arc::clone(sink)))
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}
