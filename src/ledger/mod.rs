// ============================================================================
// Session Lock Ledger
// ============================================================================
//
// Process-local record of which identities each transaction currently
// holds locks on. Consulted before going to the store so that a second
// operation on the same identity within the same session does not
// re-request a lock it already holds.
//
// Entries are created on successful acquisition and removed only by
// `release_all` at transaction end; there is no per-entity release,
// matching the whole-transaction duration model of pessimistic locking.
//
// ============================================================================

use crate::core::types::{EntityKey, LockMode};
use crate::transaction::TransactionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct SessionLockLedger {
    held: Arc<RwLock<HashMap<TransactionId, HashMap<EntityKey, LockMode>>>>,
}

impl SessionLockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful acquisition.
    ///
    /// Idempotent: recording the same identity and mode twice is a
    /// no-op. Recording a stronger mode upgrades the entry; recording a
    /// weaker one keeps the stronger mode already held. `None` carries
    /// no obligation and is never recorded.
    pub async fn record_acquired(&self, key: EntityKey, mode: LockMode, tx: TransactionId) {
        if mode == LockMode::None {
            return;
        }
        let mut held = self.held.write().await;
        let entries = held.entry(tx).or_default();
        let entry = entries.entry(key).or_insert(mode);
        *entry = entry.stronger(mode);
    }

    /// Mode this transaction currently holds on `key`, if any.
    pub async fn held_mode(&self, key: &EntityKey, tx: TransactionId) -> Option<LockMode> {
        let held = self.held.read().await;
        held.get(&tx).and_then(|entries| entries.get(key)).copied()
    }

    /// Number of identities this transaction holds locks on.
    pub async fn held_count(&self, tx: TransactionId) -> usize {
        let held = self.held.read().await;
        held.get(&tx).map(|entries| entries.len()).unwrap_or(0)
    }

    /// Identities this transaction holds locks on, unordered.
    pub async fn held_keys(&self, tx: TransactionId) -> Vec<EntityKey> {
        let held = self.held.read().await;
        held.get(&tx)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every entry for `tx` and return the released identities.
    ///
    /// The sole removal path, invoked from the transaction-end hook.
    pub async fn release_all(&self, tx: TransactionId) -> Vec<EntityKey> {
        let mut held = self.held.write().await;
        let released: Vec<EntityKey> = held
            .remove(&tx)
            .map(|entries| entries.into_keys().collect())
            .unwrap_or_default();
        if !released.is_empty() {
            debug!("ledger released {} entr(ies) for {}", released.len(), tx);
        }
        released
    }
}
