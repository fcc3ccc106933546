pub mod error;
pub mod types;

pub use error::{LockError, Result};
pub use types::{
    BackendId, EntityKey, LockMode, LockOutcome, LockRequest, LockTimeout, NativeSignal,
    PageWindow, Query, Record, Selection, NO_TIMEOUT,
};
