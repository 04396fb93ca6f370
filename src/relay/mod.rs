// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Message Relay
//!
//! Store-and-forward core of the mediator. Ciphertexts forwarded to a
//! recipient are queued per recipient DID and pushed, batched and in arrival
//! order, to the live client session currently owning that recipient.
//!
//! ## Data Flow
//!
//! ```text
//! agent event ──▶ EventBridge ──▶ routing update
//!                             └─▶ enqueue ──▶ threshold / debounce timer
//!                                              └─▶ build delivery ──▶ pack ──▶ sink
//! ```
//!
//! ## Components
//!
//! - `registry` - live clients and recipient routes
//! - `queue` - per-recipient queues and flush timers
//! - `envelope` - delivery message builder
//! - `engine` - [`MessageRelay`], owning all of the above
//! - `bridge` - [`EventBridge`], the agent event consumer
//! - `agent` - packer and sink collaborator traits

pub mod agent;
pub mod bridge;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod queue;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{MessagePacker, PackedMessage, PlaintextPacker, RelaySink};
pub use bridge::EventBridge;
pub use engine::{
    MessageRelay, RelaySettings, RelayStats, DEFAULT_BATCH_THRESHOLD, DEFAULT_FLUSH_WINDOW,
};
pub use envelope::{build_delivery, DeliveryMessage, DELIVERY_MESSAGE_TYPE, ENCRYPTED_MEDIA_TYPE};
pub use error::{DeliveryError, PackError, RelayError};
