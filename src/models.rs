// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Data Models
//!
//! Identifier newtypes used throughout the relay, and the payloads of the
//! events the identity agent publishes on its bus.
//!
//! ## Identifier Types
//!
//! - [`ClientId`] names one live transport session. Sessions opened over the
//!   WebSocket adapter use the connecting DID as their id.
//! - [`RecipientDid`] is the DID a message is ultimately addressed to. One
//!   session may represent several recipients.
//! - [`RecipientKey`] is a DID URL (`<did>#<fragment>`) naming one key of a
//!   recipient. Truncating at the first `#` yields the owning DID.
//!
//! ## Event Payloads
//!
//! Payload fields are optional on purpose: the event bridge decides what is
//! malformed and ignores it instead of failing deserialization of the whole
//! event.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// DIDComm message type of a mediation recipient update.
pub const RECIPIENT_UPDATE_MESSAGE_TYPE: &str =
    "https://didcomm.org/coordinate-mediation/3.0/recipient-update";

// =============================================================================
// Identifier Types
// =============================================================================

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

string_newtype!(
    /// Opaque identifier of one live client session.
    ClientId
);

string_newtype!(
    /// Decentralized identifier a message is addressed to.
    RecipientDid
);

string_newtype!(
    /// DID URL of a specific recipient key, e.g. `did:peer:abc#k1`.
    RecipientKey
);

impl RecipientKey {
    /// The DID owning this key: everything before the first `#`.
    ///
    /// Returns `None` when that part is empty.
    pub fn owning_did(&self) -> Option<RecipientDid> {
        let did = self.0.split('#').next().unwrap_or_default();
        if did.is_empty() {
            None
        } else {
            Some(RecipientDid::from(did))
        }
    }
}

// =============================================================================
// Agent Events
// =============================================================================

/// An event published by the identity agent.
///
/// Encoded as `{"type": "<event name>", "data": { ... }}` using the agent's
/// own event names.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum AgentEvent {
    /// A forwarded message was queued by the mediator for a recipient.
    #[serde(rename = "DIDCommV2Message-forwardMessageQueued")]
    ForwardMessageQueued(ForwardMessageQueued),
    /// The agent received and decoded a DIDComm message.
    #[serde(rename = "DIDCommV2Message-received")]
    MessageReceived(MessageReceived),
}

/// Payload of a "forward message queued" event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ForwardMessageQueued {
    /// Id of the queued message.
    pub id: Option<String>,
    /// Recipient key the message is encrypted for (`<did>#<fragment>`).
    pub to: Option<String>,
    /// Raw ciphertext, a JSON-encoded encrypted envelope.
    pub raw: Option<String>,
}

/// Payload of a "message received" event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct MessageReceived {
    pub message: Option<ReceivedMessage>,
}

/// A decoded DIDComm message as reported by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ReceivedMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub from: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub body: serde_json::Value,
}

impl ReceivedMessage {
    /// Whether this is a coordinate-mediation recipient update.
    pub fn is_recipient_update(&self) -> bool {
        self.message_type == RECIPIENT_UPDATE_MESSAGE_TYPE
    }
}

/// Action requested by one entry of a recipient update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Add,
    Remove,
}

/// One `{action, recipient_did}` entry of a recipient update body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientUpdate {
    pub action: UpdateAction,
    pub recipient_did: RecipientDid,
}
