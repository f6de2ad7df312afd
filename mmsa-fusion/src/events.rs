//! Policy lifecycle events
//!
//! Reloads and control writes publish a `PolicyEvent` so callers can observe
//! non-fatal configuration failures without polling the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// What triggered a policy change attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadTrigger {
    Timer,
    OnDemand,
}

/// Policy lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyEvent {
    /// Source changed and the new policy is active
    Reloaded {
        revision: u64,
        trigger: ReloadTrigger,
        warnings: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Source checked, content identical to the active policy's
    Unchanged {
        trigger: ReloadTrigger,
        timestamp: DateTime<Utc>,
    },

    /// Reload attempt failed; the previous policy stays active
    ReloadFailed {
        revision: u64,
        trigger: ReloadTrigger,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Runtime control write replaced the policy
    Updated {
        revision: u64,
        operation: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast channel for `PolicyEvent`s
#[derive(Debug, Clone)]
pub struct PolicyEventBus {
    tx: broadcast::Sender<PolicyEvent>,
}

impl PolicyEventBus {
    /// `capacity` events are buffered per subscriber before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PolicyEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers. No subscribers is fine.
    pub fn emit(&self, event: PolicyEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for PolicyEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
