// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-recipient outbound queues and their debounce timers.
//!
//! Queues are created lazily on first push and handed out whole when taken,
//! so anything pushed while a batch is in flight starts a new list. Timers
//! are tracked by generation: a timer task only flushes if its generation is
//! still the armed one when it wakes.
//!
//! Flushed batches then wait on the recipient's delivery lane, which one
//! task drains at a time, so batches reach the client in flush order.

use std::collections::{HashMap, VecDeque};

use tokio::task::AbortHandle;

use crate::models::{RecipientDid, RecipientKey};

/// One undelivered ciphertext, in arrival order within its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: String,
    pub raw: String,
}

impl QueuedMessage {
    pub fn new(id: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw: raw.into(),
        }
    }
}

/// Pending messages per recipient.
#[derive(Debug, Default)]
pub struct OutboundQueues {
    queues: HashMap<RecipientDid, Vec<QueuedMessage>>,
}

impl OutboundQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return the resulting queue length.
    pub fn push(&mut self, recipient: &RecipientDid, message: QueuedMessage) -> usize {
        let queue = self.queues.entry(recipient.clone()).or_default();
        queue.push(message);
        queue.len()
    }

    /// Snapshot and clear the recipient's queue in one step.
    pub fn take(&mut self, recipient: &RecipientDid) -> Vec<QueuedMessage> {
        self.queues.remove(recipient).unwrap_or_default()
    }

    pub fn len(&self, recipient: &RecipientDid) -> usize {
        self.queues.get(recipient).map(Vec::len).unwrap_or(0)
    }

    pub fn has_queue(&self, recipient: &RecipientDid) -> bool {
        self.queues.contains_key(recipient)
    }

    /// Total number of messages waiting across all recipients.
    pub fn total(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }
}

/// A flushed batch waiting for its turn on the delivery lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub recipient_key: RecipientKey,
    pub messages: Vec<QueuedMessage>,
}

/// Per-recipient FIFO of flushed batches.
///
/// A recipient has a lane exactly while some task is draining it. The lane
/// stays open while its last batch is being delivered and is closed by the
/// drainer once it finds nothing left.
#[derive(Debug, Default)]
pub struct DeliveryLanes {
    lanes: HashMap<RecipientDid, VecDeque<PendingBatch>>,
}

impl DeliveryLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `batch` to the recipient's lane. Returns `true` if the lane
    /// was closed, in which case the caller must start draining it.
    pub fn submit(&mut self, recipient: &RecipientDid, batch: PendingBatch) -> bool {
        match self.lanes.get_mut(recipient) {
            Some(lane) => {
                lane.push_back(batch);
                false
            }
            None => {
                self.lanes
                    .insert(recipient.clone(), VecDeque::from([batch]));
                true
            }
        }
    }

    /// Next batch for the lane's drainer. Closes the lane when it is empty.
    pub fn next(&mut self, recipient: &RecipientDid) -> Option<PendingBatch> {
        let lane = self.lanes.get_mut(recipient)?;
        let batch = lane.pop_front();
        if batch.is_none() {
            self.lanes.remove(recipient);
        }
        batch
    }

    /// Close the lane, discarding what is still waiting on it. Returns the
    /// number of discarded batches.
    pub fn close(&mut self, recipient: &RecipientDid) -> usize {
        self.lanes.remove(recipient).map_or(0, |lane| lane.len())
    }

    pub fn is_open(&self, recipient: &RecipientDid) -> bool {
        self.lanes.contains_key(recipient)
    }

    /// Number of recipients with a delivery in flight.
    pub fn open(&self) -> usize {
        self.lanes.len()
    }
}

struct ArmedTimer {
    generation: u64,
    handle: AbortHandle,
}

/// At most one armed flush timer per recipient.
#[derive(Default)]
pub struct FlushTimers {
    timers: HashMap<RecipientDid, ArmedTimer>,
    next_generation: u64,
}

impl FlushTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the generation for the next timer to arm.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Record a freshly spawned timer, cancelling any previous one.
    pub fn arm(&mut self, recipient: &RecipientDid, generation: u64, handle: AbortHandle) {
        let previous = self
            .timers
            .insert(recipient.clone(), ArmedTimer { generation, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    /// Cancel and forget the recipient's timer. Returns whether one was armed.
    pub fn cancel(&mut self, recipient: &RecipientDid) -> bool {
        match self.timers.remove(recipient) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Called by a timer task when it wakes. Removes the entry and returns
    /// `true` only if `generation` is still the armed timer.
    pub fn fire(&mut self, recipient: &RecipientDid, generation: u64) -> bool {
        match self.timers.get(recipient) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(recipient);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, recipient: &RecipientDid) -> bool {
        self.timers.contains_key(recipient)
    }

    pub fn armed(&self) -> usize {
        self.timers.len()
    }
}

impl std::fmt::Debug for FlushTimers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushTimers")
            .field("armed", &self.timers.len())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}
