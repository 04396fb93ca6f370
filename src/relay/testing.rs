// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test doubles for the relay's collaborator traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::agent::{MessagePacker, PackedMessage, PlaintextPacker, RelaySink};
use super::envelope::DeliveryMessage;
use super::error::{DeliveryError, PackError};

/// One call observed by [`RecordingSink`], decoded from plaintext packing.
#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    pub message: DeliveryMessage,
    pub attachment_count: usize,
}

impl RecordedDelivery {
    pub fn attachment_ids(&self) -> Vec<String> {
        self.message
            .attachments
            .iter()
            .map(|a| a.id.clone())
            .collect()
    }
}

/// Sink that records every delivery. Expects [`PlaintextPacker`] output.
#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<RecordedDelivery>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelaySink for RecordingSink {
    async fn deliver(
        &self,
        packed: PackedMessage,
        attachment_count: usize,
    ) -> Result<(), DeliveryError> {
        let message = serde_json::from_str(&packed.message)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        self.deliveries.lock().unwrap().push(RecordedDelivery {
            message,
            attachment_count,
        });
        Ok(())
    }
}

/// Sink whose channel is always closed.
#[derive(Default)]
pub struct FailingSink {
    calls: AtomicUsize,
}

impl FailingSink {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelaySink for FailingSink {
    async fn deliver(&self, _: PackedMessage, _: usize) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DeliveryError::ChannelClosed)
    }
}

/// Packer that always fails.
#[derive(Default)]
pub struct FailingPacker {
    calls: AtomicUsize,
}

impl FailingPacker {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagePacker for FailingPacker {
    async fn pack(&self, _: &DeliveryMessage) -> Result<PackedMessage, PackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PackError::Agent("no key agreement key for recipient".into()))
    }
}

/// Plaintext packer that waits for `gate` before packing.
pub struct GatedPacker {
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl GatedPacker {
    pub fn new(gate: Arc<tokio::sync::Mutex<()>>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl MessagePacker for GatedPacker {
    async fn pack(&self, message: &DeliveryMessage) -> Result<PackedMessage, PackError> {
        let _open = self.gate.lock().await;
        PlaintextPacker.pack(message).await
    }
}

/// Plaintext packer that takes `delay` to pack any batch of more than one
/// attachment.
pub struct SlowPacker {
    delay: Duration,
}

impl SlowPacker {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl MessagePacker for SlowPacker {
    async fn pack(&self, message: &DeliveryMessage) -> Result<PackedMessage, PackError> {
        if message.attachments.len() > 1 {
            tokio::time::sleep(self.delay).await;
        }
        PlaintextPacker.pack(message).await
    }
}
