// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Transaction identity, the Active -> Committed/Aborted state machine,
// and the manager that fires end-of-transaction hooks. Pessimistic lock
// duration is tied to this lifecycle: the ledger and the store release
// a transaction's locks from an end hook, never earlier.
//
// ============================================================================

pub mod manager;
pub mod state;

pub use manager::{TransactionEndHook, TransactionManager};
pub use state::{Transaction, TransactionId, TransactionState};
