// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay errors.
//!
//! None of these are fatal. Every variant degrades to "this message is not
//! delivered over the live relay path"; callers log and move on.

use crate::models::{ClientId, RecipientDid};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed event payload or recipient-update entry.
    #[error("Invalid payload: {0}")]
    Validation(String),

    /// No live client owns the recipient.
    #[error("No live route for recipient {0}")]
    NoRoute(RecipientDid),

    /// A recipient update came from a client that is not registered.
    #[error("Client {0} is not registered")]
    UnregisteredClient(ClientId),

    /// A queued ciphertext could not be parsed into an attachment.
    #[error("Invalid ciphertext in message {message_id}: {reason}")]
    InvalidCiphertext { message_id: String, reason: String },

    #[error("Packing failed: {0}")]
    Packing(#[from] PackError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Failure reported by a [`MessagePacker`](super::agent::MessagePacker).
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Agent(String),
}

/// Failure reported by a [`RelaySink`](super::agent::RelaySink).
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The session's channel is gone.
    #[error("Channel closed")]
    ChannelClosed,

    #[error("{0}")]
    Transport(String),
}
