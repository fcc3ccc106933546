// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Transaction, TransactionId};
use crate::core::{LockError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Callback invoked exactly once when a transaction reaches a terminal
/// state, whether by commit or rollback.
///
/// The lock coordination layer subscribes here to drain the session
/// lock ledger and drop the store's row locks; pessimistic locks live
/// exactly as long as their transaction.
#[async_trait]
pub trait TransactionEndHook: Send + Sync {
    async fn on_transaction_end(&self, tx: TransactionId, committed: bool);
}

pub struct TransactionManager {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
    end_hooks: Arc<RwLock<Vec<Arc<dyn TransactionEndHook>>>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
            end_hooks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Subscribe a hook to transaction-end events.
    pub async fn register_end_hook(&self, hook: Arc<dyn TransactionEndHook>) {
        self.end_hooks.write().await.push(hook);
    }

    /// Begin a new transaction
    pub async fn begin(&self) -> TransactionId {
        let id = TransactionId::new();
        let transaction = Transaction::new(id);

        let mut transactions = self.transactions.write().await;
        transactions.insert(id, transaction);
        debug!("began transaction {}", id);
        id
    }

    pub async fn is_active(&self, tx: TransactionId) -> bool {
        let transactions = self.transactions.read().await;
        transactions
            .get(&tx)
            .map(|t| t.state().is_active())
            .unwrap_or(false)
    }

    /// Commit the transaction and fire end hooks
    pub async fn commit(&self, tx: TransactionId) -> Result<()> {
        self.end(tx, true).await
    }

    /// Roll the transaction back and fire end hooks
    pub async fn rollback(&self, tx: TransactionId) -> Result<()> {
        self.end(tx, false).await
    }

    async fn end(&self, tx: TransactionId, committed: bool) -> Result<()> {
        {
            let mut transactions = self.transactions.write().await;
            let transaction = transactions
                .get_mut(&tx)
                .ok_or_else(|| LockError::Transaction(format!("unknown transaction {}", tx)))?;

            if committed {
                transaction.commit()?;
            } else {
                transaction.rollback()?;
            }
            debug!(
                "transaction {} ended ({}) after {:?}",
                tx,
                transaction.state(),
                transaction.duration()
            );
            transactions.remove(&tx);
        }

        // Hooks fire after the transaction left the table, so a hook
        // observing the manager sees the terminal state.
        let hooks = self.end_hooks.read().await.clone();
        for hook in hooks {
            hook.on_transaction_end(tx, committed).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        fired: AtomicUsize,
    }

    #[async_trait]
    impl TransactionEndHook for CountingHook {
        async fn on_transaction_end(&self, _tx: TransactionId, _committed: bool) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_begin_commit() {
        let manager = TransactionManager::new();
        let tx = manager.begin().await;
        assert!(manager.is_active(tx).await);

        manager.commit(tx).await.unwrap();
        assert!(!manager.is_active(tx).await);
    }

    #[tokio::test]
    async fn test_end_hook_fires_once_per_transaction() {
        let manager = TransactionManager::new();
        let hook = Arc::new(CountingHook {
            fired: AtomicUsize::new(0),
        });
        manager.register_end_hook(hook.clone()).await;

        let tx1 = manager.begin().await;
        let tx2 = manager.begin().await;
        manager.commit(tx1).await.unwrap();
        manager.rollback(tx2).await.unwrap();

        assert_eq!(hook.fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cannot_end_twice() {
        let manager = TransactionManager::new();
        let tx = manager.begin().await;
        manager.commit(tx).await.unwrap();
        assert!(manager.commit(tx).await.is_err());
        assert!(manager.rollback(tx).await.is_err());
    }
}
