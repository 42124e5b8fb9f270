//! Per-connection session context
//!
//! Owned by the transport layer; the protocol engine reads the relay state
//! to pick its decode strategy and hands encoded bytes back through the
//! [`Outbound`] seam. Connection lifecycle (setup, teardown, timeouts) stays
//! with the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ProxyError, ProxyResult};

/// Relay state of a connection, gating the decoder strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Control-plane negotiation in progress; full STUN/ChannelData parsing
    NotAllocated,
    /// TURN allocation completed; all bytes pass through unparsed
    Allocated,
}

/// Sink for encoded wire bytes, implemented by the transport
pub trait Outbound: Send + Sync {
    /// Hand one encoded unit to the transport for delivery
    fn send_bytes(&self, payload: Bytes) -> ProxyResult<()>;
}

/// Per-connection context shared between the transport and the engine
pub struct SessionContext {
    id: Uuid,
    allocated: AtomicBool,
    outbound: Option<Arc<dyn Outbound>>,
}

impl SessionContext {
    /// Create a context with no outbound sink attached
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            allocated: AtomicBool::new(false),
            outbound: None,
        }
    }

    /// Create a context wired to the transport's outbound sink
    pub fn with_outbound(outbound: Arc<dyn Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            allocated: AtomicBool::new(false),
            outbound: Some(outbound),
        }
    }

    /// Connection id used in log correlation
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current relay state
    pub fn relay_state(&self) -> RelayState {
        if self.allocated.load(Ordering::Acquire) {
            RelayState::Allocated
        } else {
            RelayState::NotAllocated
        }
    }

    /// Record that the TURN allocation completed; one-way transition
    pub fn mark_allocated(&self) {
        self.allocated.store(true, Ordering::Release);
        debug!(conn = %self.id, "session entered fast-relay mode");
    }

    /// Send encoded bytes through the attached transport sink
    pub fn send(&self, payload: Bytes) -> ProxyResult<()> {
        match &self.outbound {
            Some(outbound) => outbound.send_bytes(payload),
            None => Err(ProxyError::InvalidState(
                "no outbound sink attached to session".into(),
            )),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
