// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! DIDComm Relay - Store-and-Forward Message Relay
//!
//! This crate holds end-to-end-encrypted DIDComm messages for recipients that
//! are not directly reachable, and pushes them in debounced batches over the
//! live channel of whichever client currently represents the recipient.
//!
//! ## Modules
//!
//! - `relay` - Routing table, outbound queues, batch scheduler, event bridge
//! - `api` - HTTP API and WebSocket transport adapter (Axum)
//! - `mediation` - Mediation grant policy seam
//! - `models` - Identifier types and agent event payloads

pub mod api;
pub mod config;
pub mod error;
pub mod mediation;
pub mod models;
pub mod relay;
pub mod state;
