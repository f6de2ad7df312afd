//! Policy Store - atomically replaceable policy snapshot
//!
//! The only mutable shared state in the engine is the pointer to the current
//! `FusionPolicy`. Readers clone the `Arc` and then work on an immutable
//! value for as long as they like. Writers serialize on a separate mutex and
//! only hold the pointer lock for the swap itself.

use crate::policy::FusionPolicy;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// One consistent view of the store
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub policy: Arc<FusionPolicy>,

    /// Incremented on every swap, starting at 1
    pub revision: u64,
}

/// Holder of the active policy snapshot
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<PolicySnapshot>,
    writer: Mutex<()>,
}

impl PolicyStore {
    pub fn new(policy: FusionPolicy) -> Self {
        Self {
            current: RwLock::new(PolicySnapshot {
                policy: Arc::new(policy),
                revision: 1,
            }),
            writer: Mutex::new(()),
        }
    }

    /// Capture the current snapshot
    pub fn snapshot(&self) -> PolicySnapshot {
        // A poisoned lock still holds a complete snapshot: swaps never panic
        // halfway through.
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Capture the current policy
    pub fn current(&self) -> Arc<FusionPolicy> {
        self.snapshot().policy
    }

    pub fn revision(&self) -> u64 {
        self.snapshot().revision
    }

    /// Swap in a new policy wholesale. Returns the new revision.
    pub(crate) fn replace(&self, policy: FusionPolicy) -> u64 {
        let _guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.swap(policy)
    }

    /// Derive a new policy from the current one and swap it in. Concurrent
    /// writers are serialized, so the derivation always starts from the
    /// latest committed snapshot. On error nothing changes.
    pub(crate) fn update<F, E>(&self, derive: F) -> Result<u64, E>
    where
        F: FnOnce(&FusionPolicy) -> Result<FusionPolicy, E>,
    {
        let _guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let base = self.current();
        let next = derive(&base)?;
        Ok(self.swap(next))
    }

    fn swap(&self, policy: FusionPolicy) -> u64 {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let revision = current.revision + 1;
        *current = PolicySnapshot {
            policy: Arc::new(policy),
            revision,
        };
        debug!("Policy snapshot swapped (revision {})", revision);
        revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FusionError, Result};
    use crate::types::FusionMethod;

    #[test]
    fn test_replace_bumps_revision() {
        let store = PolicyStore::new(FusionPolicy::default());
        assert_eq!(store.revision(), 1);

        let rev = store.replace(FusionPolicy::default().with_method(FusionMethod::Simple));
        assert_eq!(rev, 2);
        assert_eq!(store.current().method, FusionMethod::Simple);
    }

    #[test]
    fn test_snapshot_survives_swap() {
        let store = PolicyStore::new(FusionPolicy::default());
        let held = store.current();

        store.replace(FusionPolicy::default().with_method(FusionMethod::Adaptive));

        // The earlier reader still sees the policy it captured
        assert_eq!(held.method, FusionMethod::ConfidenceWeighted);
        assert_eq!(store.current().method, FusionMethod::Adaptive);
    }

    #[test]
    fn test_failed_update_leaves_store_untouched() {
        let store = PolicyStore::new(FusionPolicy::default());
        let result: Result<u64> =
            store.update(|_| Err(FusionError::UnknownPreset("x".to_string())));

        assert!(result.is_err());
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_concurrent_updates_serialize() {
        let store = Arc::new(PolicyStore::new(FusionPolicy::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update(|p| Ok::<_, FusionError>(p.clone()))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.revision(), 1 + 8 * 25);
    }
}
