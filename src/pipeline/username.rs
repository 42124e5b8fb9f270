//! Transaction-id to username correlation
//!
//! An inbound message carrying a USERNAME attribute parks the username under
//! its transaction id; when the outbound message for the same transaction
//! completes, the entry is removed and the username attached for downstream
//! integrity-hash computation.
//!
//! Transactions that never produce an outbound reply would otherwise pin
//! their entries forever, so the map is bounded: entries expire after a TTL
//! and a capacity cap evicts oldest-first. An optional janitor task sweeps
//! expired entries in the background.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::ProxyStage;
use crate::config::UsernameCacheConfig;
use crate::proto::message::{Message, TransactionId};

struct PendingUsername {
    username: String,
    inserted_at: Instant,
}

/// Concurrent, bounded transaction-id to username map
///
/// Shared across all connections; receipt and send-completion may run on
/// different tasks.
pub struct TransactionUsernameStage {
    entries: DashMap<TransactionId, PendingUsername>,
    // Insertion order for TTL purge and oldest-first eviction. Records for
    // completed transactions go stale here and are skipped on pop.
    order: Mutex<VecDeque<(Instant, TransactionId)>>,
    capacity: usize,
    ttl: Duration,
}

impl TransactionUsernameStage {
    /// Create a stage with the given cache bounds
    pub fn new(config: &UsernameCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: config.capacity,
            ttl: config.ttl(),
        }
    }

    /// Number of pending (uncompleted) transactions
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Park a username under its transaction id
    fn record(&self, tid: TransactionId, username: String) {
        self.purge_expired();
        self.enforce_capacity();

        let now = Instant::now();
        self.entries.insert(
            tid,
            PendingUsername {
                username,
                inserted_at: now,
            },
        );
        self.order.lock().push_back((now, tid));
        trace!(tid = %tid, "recorded transaction username");
    }

    /// Remove and return the username parked under a transaction id
    fn take(&self, tid: &TransactionId) -> Option<String> {
        self.entries.remove(tid).map(|(_, entry)| entry.username)
    }

    /// Drop entries older than the TTL
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let mut order = self.order.lock();
        while let Some(&(inserted_at, tid)) = order.front() {
            if now.duration_since(inserted_at) < self.ttl {
                break;
            }
            order.pop_front();
            // Only remove if this queue record still describes the live
            // entry; a completed-and-reinserted transaction keeps its newer
            // entry.
            let removed = self
                .entries
                .remove_if(&tid, |_, entry| entry.inserted_at == inserted_at);
            if removed.is_some() {
                debug!(tid = %tid, "expired unanswered transaction username");
            }
        }
    }

    fn enforce_capacity(&self) {
        let mut order = self.order.lock();
        while self.entries.len() >= self.capacity {
            let Some((inserted_at, tid)) = order.pop_front() else {
                break;
            };
            if self
                .entries
                .remove_if(&tid, |_, entry| entry.inserted_at == inserted_at)
                .is_some()
            {
                debug!(tid = %tid, "evicted oldest transaction username at capacity");
            }
        }
    }

    /// Spawn a background sweep removing expired entries every `period`
    ///
    /// The handle must be aborted when the proxy shuts down.
    pub fn spawn_janitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let stage = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                stage.purge_expired();
            }
        })
    }
}

impl ProxyStage for TransactionUsernameStage {
    fn process_inbound(&self, message: &mut Message) {
        if let Some(username) = message.username_attribute() {
            self.record(message.transaction_id, username.to_string());
        }
    }

    fn process_outbound(&self, message: &mut Message) {
        if let Some(username) = self.take(&message.transaction_id) {
            message.set_correlated_username(username);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::attribute::Attribute;
    use crate::proto::message::{MessageClass, Method};

    fn stage(capacity: usize, ttl: Duration) -> TransactionUsernameStage {
        TransactionUsernameStage::new(&UsernameCacheConfig {
            capacity,
            ttl_secs: ttl.as_secs(),
        })
    }

    fn request_with_username(name: &str) -> Message {
        let mut msg = Message::new(MessageClass::Request, Method::Allocate, TransactionId::new());
        msg.add_attribute(Attribute::username(name));
        msg
    }

    #[test]
    fn test_correlates_inbound_username_to_outbound() {
        let stage = stage(16, Duration::from_secs(60));
        let mut inbound = request_with_username("alice");
        stage.process_inbound(&mut inbound);
        assert_eq!(stage.pending(), 1);

        let mut outbound = Message::new(
            MessageClass::SuccessResponse,
            Method::Allocate,
            inbound.transaction_id,
        );
        stage.process_outbound(&mut outbound);
        assert_eq!(outbound.correlated_username(), Some("alice"));
        assert_eq!(stage.pending(), 0);
    }

    #[test]
    fn test_outbound_without_entry_is_untouched() {
        let stage = stage(16, Duration::from_secs(60));
        let mut outbound = Message::new(
            MessageClass::SuccessResponse,
            Method::Binding,
            TransactionId::new(),
        );
        stage.process_outbound(&mut outbound);
        assert_eq!(outbound.correlated_username(), None);
    }

    #[test]
    fn test_message_without_username_not_recorded() {
        let stage = stage(16, Duration::from_secs(60));
        let mut inbound = Message::new(MessageClass::Request, Method::Binding, TransactionId::new());
        stage.process_inbound(&mut inbound);
        assert_eq!(stage.pending(), 0);
    }

    #[test]
    fn test_ttl_purges_unanswered_transactions() {
        let stage = stage(16, Duration::from_secs(0));
        let mut inbound = request_with_username("bob");
        stage.process_inbound(&mut inbound);

        stage.purge_expired();
        assert_eq!(stage.pending(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let stage = stage(2, Duration::from_secs(60));
        let mut first = request_with_username("first");
        let mut second = request_with_username("second");
        let mut third = request_with_username("third");

        stage.process_inbound(&mut first);
        stage.process_inbound(&mut second);
        stage.process_inbound(&mut third);
        assert!(stage.pending() <= 2);

        // The oldest entry is gone; the newest survives
        let mut reply = Message::new(
            MessageClass::SuccessResponse,
            Method::Allocate,
            first.transaction_id,
        );
        stage.process_outbound(&mut reply);
        assert_eq!(reply.correlated_username(), None);

        let mut reply = Message::new(
            MessageClass::SuccessResponse,
            Method::Allocate,
            third.transaction_id,
        );
        stage.process_outbound(&mut reply);
        assert_eq!(reply.correlated_username(), Some("third"));
    }

    #[tokio::test]
    async fn test_janitor_sweeps_expired_entries() {
        let stage = Arc::new(stage(16, Duration::from_secs(0)));
        let mut inbound = request_with_username("carol");
        stage.process_inbound(&mut inbound);

        let handle = stage.spawn_janitor(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stage.pending(), 0);
        handle.abort();
    }
}
