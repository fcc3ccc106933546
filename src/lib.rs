// ============================================================================
// Lockman Library
// ============================================================================
//
// Pessimistic lock coordination for a persistence engine: resolve which
// rows a find or query obligates the session to lock, acquire them with
// a bounded wait, classify backend-native failures into a stable
// outcome taxonomy, and release everything atomically at transaction
// end.
//
// ============================================================================

pub mod classifier;
pub mod core;
pub mod executor;
pub mod facade;
pub mod ledger;
pub mod resolver;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use crate::core::{
    BackendId, EntityKey, LockError, LockMode, LockOutcome, LockRequest, LockTimeout,
    NativeSignal, PageWindow, Query, Record, Result, Selection, NO_TIMEOUT,
};
pub use classifier::{ClassifierConfig, ClassifierRule, ConflictClassifier, OutcomeKind};
pub use executor::LockExecutor;
pub use facade::LockCoordinator;
pub use ledger::SessionLockLedger;
pub use resolver::LockRequestResolver;
pub use storage::{BackendProfile, InMemoryStore, StoreAdapter};
pub use transaction::{TransactionEndHook, TransactionId, TransactionManager};
