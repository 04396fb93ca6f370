// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Collaborator seams of the relay engine.
//!
//! - [`MessagePacker`] is the identity agent's `pack` operation. The relay
//!   calls it exactly once per flushed batch and never touches key material.
//! - [`RelaySink`] is supplied by the transport adapter when a session
//!   registers; invoking it pushes bytes over that session's channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::envelope::DeliveryMessage;
use super::error::{DeliveryError, PackError};

/// A packed (encrypted and serialized) DIDComm message ready for the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackedMessage {
    pub message: String,
}

/// Packs a logical DIDComm message for its recipient.
#[async_trait]
pub trait MessagePacker: Send + Sync {
    async fn pack(&self, message: &DeliveryMessage) -> Result<PackedMessage, PackError>;
}

/// Delivery capability of one live client session.
#[async_trait]
pub trait RelaySink: Send + Sync {
    /// Push a packed delivery message carrying `attachment_count` messages.
    async fn deliver(
        &self,
        packed: PackedMessage,
        attachment_count: usize,
    ) -> Result<(), DeliveryError>;
}

/// Packer that emits the plaintext JSON form of the message.
///
/// Used by the standalone binary, where no agent with key material is
/// attached. The attachments themselves are already encrypted end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextPacker;

#[async_trait]
impl MessagePacker for PlaintextPacker {
    async fn pack(&self, message: &DeliveryMessage) -> Result<PackedMessage, PackError> {
        Ok(PackedMessage {
            message: serde_json::to_string(message)?,
        })
    }
}
