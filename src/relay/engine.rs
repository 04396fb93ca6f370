// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Engine
//!
//! [`MessageRelay`] owns the client registry, the routing table, the outbound
//! queues and the flush timers, and decides when a queue becomes a delivery.
//!
//! ## Scheduling
//!
//! Every enqueue cancels the recipient's pending timer. If the queue reached
//! the batch threshold it is flushed right away, otherwise a new timer is
//! armed for the flush window. A batch is therefore flushed by exactly one
//! trigger.
//!
//! A flushed batch joins the recipient's delivery lane in the same critical
//! section that took it from the queue. One task drains a lane at a time,
//! so at most one batch per recipient is being packed or sent, and batches
//! reach the client in the order they were flushed.
//!
//! ## Locking
//!
//! All state sits behind one mutex that is only held for synchronous
//! bookkeeping, never across packing or sink calls. A flush takes its batch
//! out of the queue under the lock before any async work starts, so messages
//! arriving mid-flush start a new batch that waits behind it on the lane.
//!
//! ## Delivery Contract
//!
//! At most once. A recipient without a live route drops its messages, and a
//! batch whose packing or delivery fails is logged and discarded. Nothing is
//! retried or requeued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::agent::{MessagePacker, RelaySink};
use super::envelope::build_delivery;
use super::error::RelayError;
use super::queue::{DeliveryLanes, FlushTimers, OutboundQueues, PendingBatch, QueuedMessage};
use super::registry::ClientRegistry;
use crate::models::{ClientId, RecipientDid, RecipientKey};

/// Queue length that triggers an immediate flush.
pub const DEFAULT_BATCH_THRESHOLD: usize = 5;

/// Quiet period after the last enqueue before a partial batch is flushed.
pub const DEFAULT_FLUSH_WINDOW: Duration = Duration::from_millis(300);

/// Tunables of the relay engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// The relay's own DID, used as `from` of every delivery.
    pub relay_did: String,
    pub batch_threshold: usize,
    pub flush_window: Duration,
}

impl RelaySettings {
    pub fn new(relay_did: impl Into<String>) -> Self {
        Self {
            relay_did: relay_did.into(),
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            flush_window: DEFAULT_FLUSH_WINDOW,
        }
    }

    /// Threshold below 1 is treated as 1.
    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold.max(1);
        self
    }

    pub fn with_flush_window(mut self, window: Duration) -> Self {
        self.flush_window = window;
        self
    }
}

/// Point-in-time counters of the engine's state.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct RelayStats {
    pub clients: usize,
    pub routes: usize,
    pub queued_messages: usize,
    pub armed_timers: usize,
    /// Recipients with a batch being packed or sent.
    pub deliveries_in_flight: usize,
}

#[derive(Default)]
struct RelayState {
    registry: ClientRegistry,
    queues: OutboundQueues,
    timers: FlushTimers,
    lanes: DeliveryLanes,
}

impl RelayState {
    /// Take the recipient's queue onto its delivery lane. Returns `true` if
    /// the caller must start draining the lane.
    fn flush_to_lane(&mut self, recipient: &RecipientDid, recipient_key: RecipientKey) -> bool {
        let messages = self.queues.take(recipient);
        if messages.is_empty() {
            return false;
        }
        self.lanes.submit(
            recipient,
            PendingBatch {
                recipient_key,
                messages,
            },
        )
    }
}

struct RelayInner {
    settings: RelaySettings,
    packer: Arc<dyn MessagePacker>,
    state: Mutex<RelayState>,
}

/// Store-and-forward relay engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MessageRelay {
    inner: Arc<RelayInner>,
}

impl MessageRelay {
    pub fn new(settings: RelaySettings, packer: Arc<dyn MessagePacker>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                settings,
                packer,
                state: Mutex::new(RelayState::default()),
            }),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.inner.settings
    }

    fn state(&self) -> MutexGuard<'_, RelayState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Clients and routes
    // =========================================================================

    /// Register a live session. A second registration of the same id is a
    /// no-op and the first sink stays authoritative.
    ///
    /// Returns whether `sink` was registered.
    pub fn register_client(&self, client_id: ClientId, sink: Arc<dyn RelaySink>) -> bool {
        let registered = self.state().registry.register(client_id.clone(), sink);
        if registered {
            info!(client = %client_id, "Relay client registered");
        } else {
            debug!(client = %client_id, "Relay client already registered, keeping existing sink");
        }
        registered
    }

    /// Revoke a session's sink and every route it owns.
    pub fn remove_client(&self, client_id: &ClientId) {
        let orphaned = self.state().registry.remove(client_id);
        info!(
            client = %client_id,
            routes = orphaned.len(),
            "Relay client removed"
        );
    }

    /// Route `recipient` to `client_id`, replacing any previous owner.
    pub fn add_recipient(
        &self,
        recipient: RecipientDid,
        client_id: &ClientId,
    ) -> Result<(), RelayError> {
        let added = self.state().registry.add_route(recipient.clone(), client_id);
        if !added {
            return Err(RelayError::UnregisteredClient(client_id.clone()));
        }
        debug!(recipient = %recipient, client = %client_id, "Recipient route added");
        Ok(())
    }

    /// Remove the route for `recipient` if `client_id` still owns it.
    /// Returns whether a route was removed.
    pub fn remove_recipient(&self, recipient: &RecipientDid, client_id: &ClientId) -> bool {
        let removed = self.state().registry.remove_route(recipient, client_id);
        if removed {
            debug!(recipient = %recipient, client = %client_id, "Recipient route removed");
        } else {
            debug!(
                recipient = %recipient,
                client = %client_id,
                "Ignoring route removal from non-owner"
            );
        }
        removed
    }

    pub fn is_registered(&self, client_id: &ClientId) -> bool {
        self.state().registry.is_registered(client_id)
    }

    pub fn route_owner(&self, recipient: &RecipientDid) -> Option<ClientId> {
        self.state().registry.owner(recipient).cloned()
    }

    // =========================================================================
    // Queueing and flushing
    // =========================================================================

    /// Queue a ciphertext for `recipient` and schedule its flush.
    ///
    /// Must be called from within a tokio runtime. Returns
    /// [`RelayError::NoRoute`] (and queues nothing) if no live client owns
    /// the recipient.
    pub fn enqueue(
        &self,
        recipient: RecipientDid,
        recipient_key: RecipientKey,
        message_id: impl Into<String>,
        raw: impl Into<String>,
    ) -> Result<(), RelayError> {
        let message_id = message_id.into();
        let mut state = self.state();

        if !state.registry.has_route(&recipient) {
            drop(state);
            debug!(
                recipient = %recipient,
                message_id = %message_id,
                "No live route for recipient, dropping message"
            );
            return Err(RelayError::NoRoute(recipient));
        }

        let queued = state
            .queues
            .push(&recipient, QueuedMessage::new(message_id, raw));
        state.timers.cancel(&recipient);

        if queued >= self.inner.settings.batch_threshold {
            let start_drain = state.flush_to_lane(&recipient, recipient_key);
            drop(state);

            debug!(recipient = %recipient, count = queued, "Batch threshold reached");
            if start_drain {
                let relay = self.clone();
                tokio::spawn(async move { relay.drain(recipient).await });
            }
            return Ok(());
        }

        let generation = state.timers.next_generation();
        let relay = self.clone();
        let timer_recipient = recipient.clone();
        let window = self.inner.settings.flush_window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            relay
                .flush_on_timer(timer_recipient, recipient_key, generation)
                .await;
        });
        state.timers.arm(&recipient, generation, timer.abort_handle());
        drop(state);

        debug!(recipient = %recipient, queued, "Message queued");
        Ok(())
    }

    /// Flush whatever is queued for `recipient` now, cancelling its timer.
    ///
    /// Waits for the delivery unless an earlier batch for the recipient is
    /// still in flight, in which case the batch is delivered after it.
    pub async fn flush(&self, recipient: RecipientDid, recipient_key: RecipientKey) {
        let start_drain = {
            let mut state = self.state();
            state.timers.cancel(&recipient);
            state.flush_to_lane(&recipient, recipient_key)
        };
        if !start_drain {
            return;
        }

        // Drain on a task of its own so a dropped caller cannot strand the lane.
        let relay = self.clone();
        let drain = tokio::spawn(async move { relay.drain(recipient).await });
        if let Err(e) = drain.await {
            warn!(error = %e, "Relay delivery task failed");
        }
    }

    async fn flush_on_timer(
        &self,
        recipient: RecipientDid,
        recipient_key: RecipientKey,
        generation: u64,
    ) {
        let start_drain = {
            let mut state = self.state();
            if !state.timers.fire(&recipient, generation) {
                return;
            }
            state.flush_to_lane(&recipient, recipient_key)
        };
        // A fired timer is no longer in the table, so nothing aborts this task.
        if start_drain {
            self.drain(recipient).await;
        }
    }

    /// Deliver the recipient's lane batch by batch until it is empty.
    async fn drain(&self, recipient: RecipientDid) {
        let mut lane = LaneGuard {
            relay: self,
            recipient: &recipient,
            drained: false,
        };
        loop {
            let next = self.state().lanes.next(&recipient);
            let Some(batch) = next else {
                break;
            };
            self.deliver_batch(&recipient, batch).await;
        }
        lane.drained = true;
    }

    async fn deliver_batch(&self, recipient: &RecipientDid, batch: PendingBatch) {
        let count = batch.messages.len();
        match self
            .try_deliver(recipient, &batch.recipient_key, &batch.messages)
            .await
        {
            Ok(client) => {
                info!(
                    recipient = %recipient,
                    client = %client,
                    count,
                    "Relayed queued messages"
                );
            }
            Err(RelayError::NoRoute(_)) => {
                warn!(
                    recipient = %recipient,
                    count,
                    "Recipient has no live route, discarding batch"
                );
            }
            Err(e) => {
                warn!(
                    recipient = %recipient,
                    count,
                    error = %e,
                    "Failed to relay messages"
                );
            }
        }
    }

    async fn try_deliver(
        &self,
        recipient: &RecipientDid,
        recipient_key: &RecipientKey,
        batch: &[QueuedMessage],
    ) -> Result<ClientId, RelayError> {
        // Skip packing for a recipient that lost its route since the flush.
        let routed = self.state().registry.has_route(recipient);
        if !routed {
            return Err(RelayError::NoRoute(recipient.clone()));
        }

        let message = build_delivery(
            &self.inner.settings.relay_did,
            recipient,
            recipient_key,
            batch,
        )?;
        let packed = self.inner.packer.pack(&message).await?;

        // Packing can suspend, so resolve the sink again: the route may have
        // moved to another client or vanished in the meantime.
        let owner = self.state().registry.sink_for(recipient);
        let (client, sink) = owner.ok_or_else(|| RelayError::NoRoute(recipient.clone()))?;

        sink.deliver(packed, batch.len()).await?;
        Ok(client)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn queued_len(&self, recipient: &RecipientDid) -> usize {
        self.state().queues.len(recipient)
    }

    pub fn has_queue(&self, recipient: &RecipientDid) -> bool {
        self.state().queues.has_queue(recipient)
    }

    pub fn has_pending_flush(&self, recipient: &RecipientDid) -> bool {
        self.state().timers.is_armed(recipient)
    }

    pub fn has_delivery_in_flight(&self, recipient: &RecipientDid) -> bool {
        self.state().lanes.is_open(recipient)
    }

    pub fn stats(&self) -> RelayStats {
        let state = self.state();
        RelayStats {
            clients: state.registry.client_count(),
            routes: state.registry.route_count(),
            queued_messages: state.queues.total(),
            armed_timers: state.timers.armed(),
            deliveries_in_flight: state.lanes.open(),
        }
    }
}

/// Closes a lane whose drain ended early, so later flushes can open it
/// again instead of queueing behind a drainer that no longer exists.
struct LaneGuard<'a> {
    relay: &'a MessageRelay,
    recipient: &'a RecipientDid,
    drained: bool,
}

impl Drop for LaneGuard<'_> {
    fn drop(&mut self) {
        if self.drained {
            return;
        }
        let discarded = self.relay.state().lanes.close(self.recipient);
        warn!(
            recipient = %self.recipient,
            batches = discarded,
            "Relay delivery interrupted, discarding waiting batches"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::agent::PlaintextPacker;
    use crate::relay::testing::{
        FailingPacker, FailingSink, GatedPacker, RecordingSink, SlowPacker,
    };
    use tokio::time::sleep;

    const RAW: &str = r#"{"protected":"eyJ","ciphertext":"abc"}"#;

    fn relay_with(packer: Arc<dyn MessagePacker>) -> MessageRelay {
        MessageRelay::new(RelaySettings::new("did:web:relay.example"), packer)
    }

    fn relay() -> MessageRelay {
        relay_with(Arc::new(PlaintextPacker))
    }

    fn abc() -> RecipientDid {
        RecipientDid::from("did:peer:abc")
    }

    fn abc_key() -> RecipientKey {
        RecipientKey::from("did:peer:abc#k1")
    }

    fn c1() -> ClientId {
        ClientId::from("c1")
    }

    /// Registers `c1` with a recording sink and routes `did:peer:abc` to it.
    fn bound(relay: &MessageRelay) -> Arc<RecordingSink> {
        let sink = RecordingSink::new();
        relay.register_client(c1(), sink.clone());
        relay.add_recipient(abc(), &c1()).unwrap();
        sink
    }

    #[tokio::test(start_paused = true)]
    async fn single_message_is_delivered_after_window() {
        let relay = relay();
        let sink = bound(&relay);

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        assert!(relay.has_pending_flush(&abc()));

        sleep(Duration::from_millis(299)).await;
        assert!(sink.deliveries().is_empty());

        sleep(Duration::from_millis(2)).await;
        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].attachment_ids(), vec!["m1"]);
        assert_eq!(deliveries[0].attachment_count, 1);
        assert_eq!(deliveries[0].message.to, "did:peer:abc");
        assert_eq!(deliveries[0].message.body.recipient_key, abc_key());
        assert!(!relay.has_pending_flush(&abc()));
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_flushes_immediately_and_once() {
        let relay = relay();
        let sink = bound(&relay);

        for id in ["m1", "m2", "m3", "m4", "m5"] {
            relay.enqueue(abc(), abc_key(), id, RAW).unwrap();
        }
        assert!(!relay.has_pending_flush(&abc()));
        assert_eq!(relay.queued_len(&abc()), 0);

        sleep(Duration::from_millis(1)).await;
        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].attachment_ids(),
            vec!["m1", "m2", "m3", "m4", "m5"]
        );
        assert_eq!(deliveries[0].attachment_count, 5);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_enqueue_restarts_the_window() {
        let relay = relay();
        let sink = bound(&relay);

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        sleep(Duration::from_millis(200)).await;
        relay.enqueue(abc(), abc_key(), "m2", RAW).unwrap();

        sleep(Duration::from_millis(150)).await;
        assert!(sink.deliveries().is_empty());

        sleep(Duration::from_millis(200)).await;
        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].attachment_ids(), vec!["m1", "m2"]);
        assert_eq!(relay.stats().armed_timers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_after_threshold_starts_new_batch() {
        let relay = relay();
        let sink = bound(&relay);

        for id in ["m1", "m2", "m3", "m4", "m5", "m6"] {
            relay.enqueue(abc(), abc_key(), id, RAW).unwrap();
        }

        sleep(Duration::from_millis(400)).await;
        let batches: Vec<_> = sink
            .deliveries()
            .iter()
            .map(|d| d.attachment_ids())
            .collect();
        assert_eq!(
            batches,
            vec![vec!["m1", "m2", "m3", "m4", "m5"], vec!["m6"]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn message_without_route_is_dropped() {
        let relay = relay();
        let sink = bound(&relay);
        let xyz = RecipientDid::from("did:peer:xyz");

        let err = relay
            .enqueue(xyz.clone(), RecipientKey::from("did:peer:xyz#k1"), "m1", RAW)
            .unwrap_err();

        assert!(matches!(err, RelayError::NoRoute(ref did) if *did == xyz));
        assert!(!relay.has_queue(&xyz));
        assert!(!relay.has_pending_flush(&xyz));

        sleep(Duration::from_secs(1)).await;
        assert!(sink.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn removed_client_loses_its_recipients() {
        let relay = relay();
        let sink = bound(&relay);

        relay.remove_client(&c1());
        assert!(!relay.is_registered(&c1()));
        assert_eq!(relay.route_owner(&abc()), None);

        assert!(relay.enqueue(abc(), abc_key(), "m1", RAW).is_err());
        sleep(Duration::from_secs(1)).await;
        assert!(sink.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_is_discarded_if_route_vanishes_before_flush() {
        let relay = relay();
        let sink = bound(&relay);

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        assert!(relay.remove_recipient(&abc(), &c1()));

        sleep(Duration::from_millis(400)).await;
        assert!(sink.deliveries().is_empty());
        assert_eq!(relay.stats().queued_messages, 0);
        assert_eq!(relay.stats().armed_timers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_goes_to_current_owner() {
        let relay = relay();
        let first = bound(&relay);
        let second = RecordingSink::new();
        relay.register_client(ClientId::from("c2"), second.clone());

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        relay.add_recipient(abc(), &ClientId::from("c2")).unwrap();

        sleep(Duration::from_millis(400)).await;
        assert!(first.deliveries().is_empty());
        assert_eq!(second.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_keeps_first_sink() {
        let relay = relay();
        let first = bound(&relay);
        let second = RecordingSink::new();
        assert!(!relay.register_client(c1(), second.clone()));

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        sleep(Duration::from_millis(400)).await;

        assert_eq!(first.deliveries().len(), 1);
        assert!(second.deliveries().is_empty());
        assert_eq!(relay.stats().clients, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_owner_cannot_remove_route() {
        let relay = relay();
        let _sink = bound(&relay);
        relay.register_client(ClientId::from("c2"), RecordingSink::new());

        assert!(!relay.remove_recipient(&abc(), &ClientId::from("c2")));
        assert_eq!(relay.route_owner(&abc()), Some(c1()));
    }

    #[tokio::test(start_paused = true)]
    async fn add_recipient_rejects_unregistered_client() {
        let relay = relay();
        let err = relay
            .add_recipient(abc(), &ClientId::from("ghost"))
            .unwrap_err();
        assert!(matches!(err, RelayError::UnregisteredClient(_)));
        assert_eq!(relay.stats().routes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn message_arriving_mid_flush_starts_new_batch() {
        let gate = Arc::new(tokio::sync::Mutex::new(()));
        let relay = relay_with(Arc::new(GatedPacker::new(gate.clone())));
        let sink = bound(&relay);

        let held = gate.clone().lock_owned().await;
        for id in ["m1", "m2", "m3", "m4", "m5"] {
            relay.enqueue(abc(), abc_key(), id, RAW).unwrap();
        }
        // Let the flush task start and block inside pack.
        sleep(Duration::from_millis(1)).await;
        assert!(sink.deliveries().is_empty());

        relay.enqueue(abc(), abc_key(), "m6", RAW).unwrap();
        assert_eq!(relay.queued_len(&abc()), 1);

        // m6 is flushed while m1..m5 are still packing and waits its turn.
        sleep(Duration::from_millis(400)).await;
        assert_eq!(relay.queued_len(&abc()), 0);
        assert!(relay.has_delivery_in_flight(&abc()));
        assert!(sink.deliveries().is_empty());

        drop(held);
        sleep(Duration::from_millis(10)).await;

        let batches: Vec<_> = sink
            .deliveries()
            .iter()
            .map(|d| d.attachment_ids())
            .collect();
        assert_eq!(
            batches,
            vec![vec!["m1", "m2", "m3", "m4", "m5"], vec!["m6"]]
        );
        assert!(!relay.has_delivery_in_flight(&abc()));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_batch_is_not_overtaken_by_later_batch() {
        let relay = relay_with(Arc::new(SlowPacker::new(Duration::from_secs(1))));
        let sink = bound(&relay);

        for id in ["m1", "m2", "m3", "m4", "m5", "m6"] {
            relay.enqueue(abc(), abc_key(), id, RAW).unwrap();
        }

        // m6 alone would pack instantly once its window closes.
        sleep(Duration::from_millis(500)).await;
        assert!(sink.deliveries().is_empty());
        assert_eq!(relay.stats().deliveries_in_flight, 1);

        sleep(Duration::from_millis(1500)).await;
        let batches: Vec<_> = sink
            .deliveries()
            .iter()
            .map(|d| d.attachment_ids())
            .collect();
        assert_eq!(
            batches,
            vec![vec!["m1", "m2", "m3", "m4", "m5"], vec!["m6"]]
        );
        assert_eq!(relay.stats().deliveries_in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn packing_failure_discards_batch_without_retry() {
        let packer = Arc::new(FailingPacker::default());
        let relay = relay_with(packer.clone());
        let sink = bound(&relay);

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        sleep(Duration::from_secs(2)).await;

        assert_eq!(packer.calls(), 1);
        assert!(sink.deliveries().is_empty());
        assert_eq!(relay.stats().queued_messages, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_discards_batch_and_keeps_serving() {
        let relay = relay();
        let failing = Arc::new(FailingSink::default());
        relay.register_client(c1(), failing.clone());
        relay.add_recipient(abc(), &c1()).unwrap();

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        sleep(Duration::from_millis(400)).await;
        assert_eq!(failing.calls(), 1);

        relay.enqueue(abc(), abc_key(), "m2", RAW).unwrap();
        sleep(Duration::from_millis(400)).await;
        assert_eq!(failing.calls(), 2);
        assert_eq!(relay.stats().queued_messages, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_ciphertext_drops_batch() {
        let relay = relay();
        let sink = bound(&relay);

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        relay.enqueue(abc(), abc_key(), "m2", "not json").unwrap();
        sleep(Duration::from_millis(400)).await;

        assert!(sink.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_flush_cancels_timer() {
        let relay = relay();
        let sink = bound(&relay);

        relay.enqueue(abc(), abc_key(), "m1", RAW).unwrap();
        relay.enqueue(abc(), abc_key(), "m2", RAW).unwrap();
        relay.flush(abc(), abc_key()).await;

        assert_eq!(sink.deliveries().len(), 1);
        assert!(!relay.has_pending_flush(&abc()));
        assert!(!relay.has_delivery_in_flight(&abc()));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recipients_are_batched_independently() {
        let relay = relay();
        let sink = bound(&relay);
        let other = RecipientDid::from("did:peer:def");
        relay.add_recipient(other.clone(), &c1()).unwrap();

        relay.enqueue(abc(), abc_key(), "a1", RAW).unwrap();
        relay
            .enqueue(other.clone(), RecipientKey::from("did:peer:def#k1"), "d1", RAW)
            .unwrap();
        assert_eq!(relay.stats().armed_timers, 2);

        sleep(Duration::from_millis(400)).await;
        let mut recipients: Vec<_> = sink
            .deliveries()
            .iter()
            .map(|d| d.message.to.clone())
            .collect();
        recipients.sort();
        assert_eq!(recipients, vec!["did:peer:abc", "did:peer:def"]);
    }

    #[test]
    fn settings_clamp_threshold() {
        let settings = RelaySettings::new("did:web:relay.example").with_batch_threshold(0);
        assert_eq!(settings.batch_threshold, 1);
        assert_eq!(settings.flush_window, DEFAULT_FLUSH_WINDOW);
    }
}
