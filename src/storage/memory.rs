// ============================================================================
// In-Memory Reference Store
// ============================================================================
//
// A seedable in-memory store with a row-lock table. Row-level exclusion
// is enforced here and only here: sessions block inside
// `execute_locking_read` until their lock is grantable, their wait
// budget runs out, or a deadlock is detected. Failures surface as the
// configured backend profile's native codes, so the classifier sees the
// same shape of signal a real backend would produce.
//
// ============================================================================

use super::adapter::{BackendProfile, StoreAdapter};
use crate::core::types::{
    BackendId, EntityKey, LockMode, LockTimeout, NativeSignal, Query, Record,
};
use crate::transaction::TransactionId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, warn};

#[derive(Default)]
struct LockTable {
    /// Holders per row. A row may have many Read holders or one Write
    /// holder; the invariant is enforced in `grantable`.
    held: HashMap<EntityKey, HashMap<TransactionId, LockMode>>,

    /// Which key each blocked transaction is currently parked on.
    /// A session requests locks one at a time, so one entry per tx.
    waiting: HashMap<TransactionId, EntityKey>,
}

pub struct InMemoryStore {
    profile: BackendProfile,
    tables: RwLock<HashMap<String, HashMap<u64, Record>>>,
    locks: Mutex<LockTable>,
    changed: Notify,
}

impl InMemoryStore {
    pub fn new(profile: BackendProfile) -> Self {
        Self {
            profile,
            tables: RwLock::new(HashMap::new()),
            locks: Mutex::new(LockTable::default()),
            changed: Notify::new(),
        }
    }

    pub fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    /// Seed a row. Test fixtures and loaders use this; the lock
    /// coordination paths never write rows.
    pub async fn insert(&self, record: Record) {
        let mut tables = self.tables.write().await;
        tables
            .entry(record.key.entity.clone())
            .or_default()
            .insert(record.key.id, record);
    }

    /// Non-locking read of the rows matching `query`.
    pub async fn read(&self, query: &Query) -> Vec<Record> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .get(&query.entity)
            .map(|table| {
                table
                    .values()
                    .filter(|r| query.id_eq.is_none_or(|id| r.key.id == id))
                    .filter(|r| query.id_below.is_none_or(|bound| r.key.id < bound))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Without an explicit ordering the store promises nothing about
        // row order (HashMap iteration order).
        if query.ordered {
            rows.sort_by_key(|r| r.key.id);
        }
        rows
    }

    fn native(&self, code: &str, message: String) -> NativeSignal {
        NativeSignal::new(self.profile.id.clone(), code, message)
    }

    /// Every holder other than `tx` must be compatible with the
    /// requested mode. The requester's own holding never blocks it, so
    /// reentrant requests and sole-holder upgrades are grantable.
    fn grantable(
        held: &HashMap<EntityKey, HashMap<TransactionId, LockMode>>,
        key: &EntityKey,
        tx: TransactionId,
        mode: LockMode,
    ) -> bool {
        match held.get(key) {
            None => true,
            Some(holders) => holders
                .iter()
                .all(|(holder, m)| *holder == tx || m.is_compatible_with(mode)),
        }
    }

    /// Two-party cycle check: `tx` is about to park on `key` while some
    /// holder of `key` is itself parked on a key `tx` holds.
    fn wait_would_deadlock(locks: &LockTable, tx: TransactionId, key: &EntityKey) -> bool {
        let Some(holders) = locks.held.get(key) else {
            return false;
        };
        for holder in holders.keys() {
            if *holder == tx {
                continue;
            }
            if let Some(wanted) = locks.waiting.get(holder) {
                if locks
                    .held
                    .get(wanted)
                    .is_some_and(|h| h.contains_key(&tx))
                {
                    return true;
                }
            }
        }
        false
    }

    async fn acquire_row_lock(
        &self,
        tx: TransactionId,
        key: &EntityKey,
        mode: LockMode,
        deadline: Option<tokio::time::Instant>,
    ) -> std::result::Result<(), NativeSignal> {
        let started = Instant::now();
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            {
                let mut locks = self.locks.lock().await;
                if Self::grantable(&locks.held, key, tx, mode) {
                    let entry = locks
                        .held
                        .entry(key.clone())
                        .or_default()
                        .entry(tx)
                        .or_insert(mode);
                    *entry = entry.stronger(mode);
                    locks.waiting.remove(&tx);
                    debug!("{} granted {} lock on {}", tx, mode, key);
                    return Ok(());
                }
                if Self::wait_would_deadlock(&locks, tx, key) {
                    locks.waiting.remove(&tx);
                    warn!("{} deadlocked requesting {} on {}", tx, mode, key);
                    let code = self.profile.deadlock_code.clone();
                    return Err(self.native(
                        &code,
                        format!("deadlock detected: {} requesting {} on {}", tx, mode, key),
                    ));
                }
                locks.waiting.insert(tx, key.clone());
                // Register for wakeups before the table unlocks so a
                // release between unlock and await cannot be missed.
                notified.as_mut().enable();
            }

            match deadline {
                Some(d) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(d) => {
                            let mut locks = self.locks.lock().await;
                            locks.waiting.remove(&tx);
                            let waited = started.elapsed();
                            debug!("{} lock wait on {} expired after {:?}", tx, key, waited);
                            let code = self.profile.lock_wait_code().to_string();
                            return Err(self.native(
                                &code,
                                format!("lock wait on {} exceeded budget after {:?}", key, waited),
                            ));
                        }
                    }
                }
                None => notified.await,
            }
        }
    }
}

#[async_trait]
impl StoreAdapter for InMemoryStore {
    fn backend(&self) -> &BackendId {
        &self.profile.id
    }

    async fn execute_locking_read(
        &self,
        tx: TransactionId,
        query: &Query,
        mode: LockMode,
        timeout: LockTimeout,
    ) -> std::result::Result<Vec<Record>, NativeSignal> {
        let rows = self.read(query).await;

        if mode != LockMode::None {
            // One deadline covers the whole statement, however many rows
            // it has to lock.
            let deadline = timeout
                .budget(self.profile.default_wait())
                .map(|budget| tokio::time::Instant::now() + budget);

            if let Some(id) = query.id_eq {
                // Key lookups lock the identity itself, present or not.
                let key = EntityKey::new(query.entity.clone(), id);
                self.acquire_row_lock(tx, &key, mode, deadline).await?;
            } else {
                for row in &rows {
                    self.acquire_row_lock(tx, &row.key, mode, deadline).await?;
                }
            }
        }

        Ok(rows)
    }

    async fn release_locks(&self, tx: TransactionId) {
        let mut locks = self.locks.lock().await;
        locks.waiting.remove(&tx);
        let mut released = 0usize;
        locks.held.retain(|_, holders| {
            if holders.remove(&tx).is_some() {
                released += 1;
            }
            !holders.is_empty()
        });
        drop(locks);
        if released > 0 {
            debug!("{} released {} row lock(s)", tx, released);
            self.changed.notify_waiters();
        }
    }
}
