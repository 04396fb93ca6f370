// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Delivery Envelope Builder
//!
//! Turns a flushed batch into one message-pickup `delivery` message with one
//! attachment per queued ciphertext, in arrival order.
//!
//! ## Wire Shape
//!
//! ```text
//! { type: "https://didcomm.org/messagepickup/3.0/delivery",
//!   from: <relay DID>, to: <recipient DID>, id: <uuid>,
//!   created_time: <ISO8601>, body: { recipient_key },
//!   attachments: [ { id: <message id>,
//!                    media_type: "application/didcomm-encrypted+json",
//!                    data: { json: <parsed ciphertext> } }, ... ] }
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::RelayError;
use super::queue::QueuedMessage;
use crate::models::{RecipientDid, RecipientKey};

pub const DELIVERY_MESSAGE_TYPE: &str = "https://didcomm.org/messagepickup/3.0/delivery";

/// Media type tag of an attachment holding an encrypted DIDComm envelope.
pub const ENCRYPTED_MEDIA_TYPE: &str = "application/didcomm-encrypted+json";

/// A plaintext DIDComm message of type `delivery`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thid: Option<String>,
    pub created_time: String,
    pub body: DeliveryBody,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryBody {
    pub recipient_key: RecipientKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub media_type: String,
    pub data: AttachmentData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentData {
    pub json: serde_json::Value,
}

/// Build the delivery message for `batch` without modifying it.
///
/// Fails if any queued ciphertext is not valid JSON.
pub fn build_delivery(
    relay_did: &str,
    recipient: &RecipientDid,
    recipient_key: &RecipientKey,
    batch: &[QueuedMessage],
) -> Result<DeliveryMessage, RelayError> {
    let attachments = batch
        .iter()
        .map(|queued| -> Result<Attachment, RelayError> {
            let json = serde_json::from_str(&queued.raw).map_err(|e| {
                RelayError::InvalidCiphertext {
                    message_id: queued.id.clone(),
                    reason: e.to_string(),
                }
            })?;
            Ok(Attachment {
                id: queued.id.clone(),
                media_type: ENCRYPTED_MEDIA_TYPE.to_string(),
                data: AttachmentData { json },
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DeliveryMessage {
        id: Uuid::new_v4().to_string(),
        message_type: DELIVERY_MESSAGE_TYPE.to_string(),
        from: relay_did.to_string(),
        to: recipient.to_string(),
        thid: None,
        created_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        body: DeliveryBody {
            recipient_key: recipient_key.clone(),
        },
        attachments,
    })
}
