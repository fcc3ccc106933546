// ============================================================================
// Lock Acquisition Executor
// ============================================================================
//
// Issues one lock request against the store and settles it into a
// terminal outcome: Acquired, TimedOut, or Conflict. Blocking happens
// inside the store call and nowhere else; the executor keeps no global
// lock of its own, so sessions acquiring disjoint identities never
// serialize here. Terminal outcomes are final - retrying means issuing
// a fresh request, the executor never retries internally.
//
// ============================================================================

use crate::classifier::ConflictClassifier;
use crate::core::types::{LockMode, LockOutcome, LockRequest, Query};
use crate::core::Result;
use crate::ledger::SessionLockLedger;
use crate::storage::StoreAdapter;
use crate::transaction::TransactionId;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct LockExecutor {
    store: Arc<dyn StoreAdapter>,
    ledger: Arc<SessionLockLedger>,
    classifier: Arc<ConflictClassifier>,
}

impl LockExecutor {
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        ledger: Arc<SessionLockLedger>,
        classifier: Arc<ConflictClassifier>,
    ) -> Self {
        Self {
            store,
            ledger,
            classifier,
        }
    }

    /// Acquire the requested lock, blocking up to the request's timeout.
    ///
    /// On a grant the session ledger is updated as a side effect. A
    /// request the session's ledger already covers short-circuits
    /// without a store round trip. Store-native failures are classified;
    /// unrecognized signals propagate as `StoreIo`.
    pub async fn acquire(&self, tx: TransactionId, request: &LockRequest) -> Result<LockOutcome> {
        if request.mode == LockMode::None {
            return Ok(LockOutcome::Acquired);
        }

        if let Some(held) = self.ledger.held_mode(&request.key, tx).await {
            if held.covers(request.mode) {
                debug!(
                    "{} already holds {} on {}, skipping store round trip",
                    tx, held, request.key
                );
                return Ok(LockOutcome::Acquired);
            }
        }

        let started = Instant::now();
        let query = Query::by_key(&request.key);
        match self
            .store
            .execute_locking_read(tx, &query, request.mode, request.timeout)
            .await
        {
            Ok(_rows) => {
                self.ledger
                    .record_acquired(request.key.clone(), request.mode, tx)
                    .await;
                debug!("{} acquired {} on {}", tx, request.mode, request.key);
                Ok(LockOutcome::Acquired)
            }
            Err(signal) => {
                let waited = started.elapsed();
                let outcome = self.classifier.classify(&signal, waited)?;
                warn!(
                    "{} failed to lock {} ({}): {:?}",
                    tx, request.key, signal, outcome
                );
                Ok(outcome)
            }
        }
    }
}
