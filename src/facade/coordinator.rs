// ============================================================================
// Lock Coordinator
// ============================================================================

use crate::classifier::ConflictClassifier;
use crate::core::types::{
    EntityKey, LockMode, LockOutcome, LockTimeout, PageWindow, Query, Record,
};
use crate::core::{LockError, Result};
use crate::executor::LockExecutor;
use crate::ledger::SessionLockLedger;
use crate::resolver::LockRequestResolver;
use crate::storage::StoreAdapter;
use crate::transaction::{TransactionEndHook, TransactionId, TransactionManager};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The caller-facing surface of the lock coordination core, invoked by
/// find/query execution paths.
///
/// Wires the resolver, executor, classifier, and ledger together over
/// one store adapter, and subscribes to transaction end so a session's
/// locks are dropped atomically with its transaction - the only release
/// path there is.
pub struct LockCoordinator {
    store: Arc<dyn StoreAdapter>,
    ledger: Arc<SessionLockLedger>,
    executor: LockExecutor,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn StoreAdapter>, classifier: Arc<ConflictClassifier>) -> Arc<Self> {
        let ledger = Arc::new(SessionLockLedger::new());
        let executor = LockExecutor::new(store.clone(), ledger.clone(), classifier);
        Arc::new(Self {
            store,
            ledger,
            executor,
        })
    }

    /// Subscribe this coordinator's release path to transaction end.
    pub async fn attach(self: &Arc<Self>, transactions: &TransactionManager) {
        transactions
            .register_end_hook(Arc::new(ReleaseOnEnd {
                ledger: self.ledger.clone(),
                store: self.store.clone(),
            }))
            .await;
    }

    pub fn ledger(&self) -> &Arc<SessionLockLedger> {
        &self.ledger
    }

    /// Lock a single identity, blocking up to `timeout_ms` (0 = store
    /// default, -1 = no timeout).
    pub async fn lock_for(
        &self,
        tx: TransactionId,
        key: &EntityKey,
        mode: LockMode,
        timeout_ms: i64,
    ) -> Result<LockOutcome> {
        let timeout = LockTimeout::from_millis(timeout_ms)?;
        let request = LockRequestResolver::resolve_key(key, mode, timeout);
        self.executor.acquire(tx, &request).await
    }

    /// Lock the identities a query materializes into its result window.
    ///
    /// The window rows are materialized first without locks, then each
    /// resolved identity is acquired in result order. Outcomes are
    /// per-identity: one row failing to lock never fails the page, the
    /// caller can see exactly which rows did not lock.
    pub async fn lock_for_query_results(
        &self,
        tx: TransactionId,
        query: &Query,
        window: &PageWindow,
        mode: LockMode,
        timeout_ms: i64,
    ) -> Result<Vec<(EntityKey, Result<LockOutcome>)>> {
        let timeout = LockTimeout::from_millis(timeout_ms)?;
        let rows = self
            .store
            .execute_locking_read(tx, query, LockMode::None, timeout)
            .await
            .map_err(LockError::StoreIo)?;

        let requests =
            LockRequestResolver::resolve_query(&rows, &query.select, window, mode, timeout)?;
        debug!(
            "{} locking {} of {} materialized row(s) for query on {}",
            tx,
            requests.len(),
            rows.len(),
            query.entity
        );

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let outcome = self.executor.acquire(tx, &request).await;
            outcomes.push((request.key, outcome));
        }
        Ok(outcomes)
    }

    /// Materialize a query's result window without taking locks, for
    /// callers that need the rows themselves alongside the lock pass.
    pub async fn fetch_window(
        &self,
        tx: TransactionId,
        query: &Query,
        window: &PageWindow,
    ) -> Result<Vec<Record>> {
        let rows = self
            .store
            .execute_locking_read(tx, query, LockMode::None, LockTimeout::StoreDefault)
            .await
            .map_err(LockError::StoreIo)?;
        Ok(rows
            .into_iter()
            .skip(window.offset)
            .take(window.limit.unwrap_or(usize::MAX))
            .collect())
    }
}

/// Drains the ledger and drops the store's row locks when a transaction
/// reaches a terminal state, commit and rollback alike.
struct ReleaseOnEnd {
    ledger: Arc<SessionLockLedger>,
    store: Arc<dyn StoreAdapter>,
}

#[async_trait]
impl TransactionEndHook for ReleaseOnEnd {
    async fn on_transaction_end(&self, tx: TransactionId, committed: bool) {
        let released = self.ledger.release_all(tx).await;
        self.store.release_locks(tx).await;
        debug!(
            "{} ended (committed={}), released {} lock(s)",
            tx,
            committed,
            released.len()
        );
    }
}
