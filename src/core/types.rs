// ============================================================================
// Core Lock Coordination Types
// ============================================================================

use crate::core::{LockError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Identity of a single persistent row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub entity: String,
    pub id: u64,
}

impl EntityKey {
    pub fn new(entity: impl Into<String>, id: u64) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity, self.id)
    }
}

/// Strength of a requested or held lock.
///
/// `Read` permits concurrent readers; `Write` excludes everything else.
/// `None` carries no lock obligation at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    None,
    Read,
    Write,
}

impl LockMode {
    fn strength(self) -> u8 {
        match self {
            LockMode::None => 0,
            LockMode::Read => 1,
            LockMode::Write => 2,
        }
    }

    /// Can a lock of `self` be held concurrently with a request for `other`?
    pub fn is_compatible_with(self, other: LockMode) -> bool {
        matches!(
            (self, other),
            (LockMode::None, _) | (_, LockMode::None) | (LockMode::Read, LockMode::Read)
        )
    }

    /// Does a held lock of `self` satisfy a request for `requested`?
    pub fn covers(self, requested: LockMode) -> bool {
        self.strength() >= requested.strength()
    }

    /// The stronger of two modes. Used for ledger upgrades: Read then
    /// Write keeps Write, Write then Read stays Write.
    pub fn stronger(self, other: LockMode) -> LockMode {
        if other.strength() > self.strength() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::None => write!(f, "NONE"),
            LockMode::Read => write!(f, "READ"),
            LockMode::Write => write!(f, "WRITE"),
        }
    }
}

/// Caller-supplied wait budget for a lock request.
///
/// Constructed from a signed milliseconds value the way persistence APIs
/// pass timeout hints: `0` means "use the store's default wait", `-1`
/// means "wait forever". Any other negative value is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeout {
    StoreDefault,
    NoTimeout,
    Millis(u64),
}

/// Sentinel accepted by [`LockTimeout::from_millis`] for an unbounded wait.
pub const NO_TIMEOUT: i64 = -1;

impl LockTimeout {
    pub fn from_millis(millis: i64) -> Result<Self> {
        match millis {
            0 => Ok(LockTimeout::StoreDefault),
            NO_TIMEOUT => Ok(LockTimeout::NoTimeout),
            ms if ms > 0 => Ok(LockTimeout::Millis(ms as u64)),
            ms => Err(LockError::InvalidRequest(format!(
                "negative timeout {} ms (only {} means no timeout)",
                ms, NO_TIMEOUT
            ))),
        }
    }

    /// Concrete wait budget, with the store default substituted in.
    /// `None` means the wait is unbounded.
    pub fn budget(self, store_default: Duration) -> Option<Duration> {
        match self {
            LockTimeout::StoreDefault => Some(store_default),
            LockTimeout::NoTimeout => None,
            LockTimeout::Millis(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

/// A single immutable lock obligation: lock `key` in `mode`, waiting at
/// most `timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub key: EntityKey,
    pub mode: LockMode,
    pub timeout: LockTimeout,
}

impl LockRequest {
    pub fn new(key: EntityKey, mode: LockMode, timeout: LockTimeout) -> Self {
        Self { key, mode, timeout }
    }
}

/// Terminal result of one lock request.
///
/// A caller that receives `TimedOut` or `Conflict` must issue a fresh
/// request to retry; nothing in this crate retries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    TimedOut { waited: Duration },
    Conflict { reason: String },
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired)
    }

    /// Fold the failing variants into the error taxonomy for callers
    /// that treat anything short of a grant as an error.
    pub fn into_result(self) -> Result<()> {
        match self {
            LockOutcome::Acquired => Ok(()),
            LockOutcome::TimedOut { waited } => Err(LockError::Timeout { waited }),
            LockOutcome::Conflict { reason } => Err(LockError::Conflict { reason }),
        }
    }
}

/// What a query materializes: the matched rows themselves, or a related
/// entity reached through a named link on each matched row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Root,
    Related(String),
}

/// A predicate over one entity's rows.
///
/// Deliberately tiny: an optional exact-id match (key lookups), an
/// optional exclusive upper id bound (range scans), a selection path and
/// an ordering flag. Result order without `ordered` is unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub entity: String,
    pub id_eq: Option<u64>,
    pub id_below: Option<u64>,
    pub select: Selection,
    pub ordered: bool,
}

impl Query {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id_eq: None,
            id_below: None,
            select: Selection::Root,
            ordered: false,
        }
    }

    /// Exact-key lookup query for a single identity.
    pub fn by_key(key: &EntityKey) -> Self {
        let mut q = Query::new(key.entity.clone());
        q.id_eq = Some(key.id);
        q
    }

    pub fn id_below(mut self, bound: u64) -> Self {
        self.id_below = Some(bound);
        self
    }

    pub fn selecting_related(mut self, field: impl Into<String>) -> Self {
        self.select = Selection::Related(field.into());
        self
    }

    pub fn ordered_by_id(mut self) -> Self {
        self.ordered = true;
        self
    }
}

/// Offset/limit window applied to a query's materialized rows.
///
/// Only rows inside the window carry a lock obligation; offset-skipped
/// rows are read to position the window but never locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl PageWindow {
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }

    pub fn skip(offset: usize) -> Self {
        Self {
            offset,
            limit: None,
        }
    }

    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

/// A materialized row: its identity, scalar attributes, and named links
/// to related identities (e.g. employee -> department).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: EntityKey,
    pub attrs: HashMap<String, String>,
    pub links: HashMap<String, EntityKey>,
}

impl Record {
    pub fn new(key: EntityKey) -> Self {
        Self {
            key,
            attrs: HashMap::new(),
            links: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_link(mut self, field: impl Into<String>, target: EntityKey) -> Self {
        self.links.insert(field.into(), target);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn link(&self, field: &str) -> Option<&EntityKey> {
        self.links.get(field)
    }
}

/// Identifier of a store backend, used to key classifier rules and
/// backend ancestry declarations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A store-native failure signal, preserved verbatim.
///
/// Different backends report the same logical condition through
/// different codes; the classifier maps these, and keeps the original
/// around as diagnostic context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSignal {
    pub backend: BackendId,
    pub code: String,
    pub message: String,
}

impl NativeSignal {
    pub fn new(backend: BackendId, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.backend, self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_compatibility() {
        assert!(LockMode::Read.is_compatible_with(LockMode::Read));
        assert!(!LockMode::Read.is_compatible_with(LockMode::Write));
        assert!(!LockMode::Write.is_compatible_with(LockMode::Read));
        assert!(!LockMode::Write.is_compatible_with(LockMode::Write));
        assert!(LockMode::None.is_compatible_with(LockMode::Write));
    }

    #[test]
    fn test_mode_covers_and_stronger() {
        assert!(LockMode::Write.covers(LockMode::Read));
        assert!(!LockMode::Read.covers(LockMode::Write));
        assert_eq!(LockMode::Read.stronger(LockMode::Write), LockMode::Write);
        assert_eq!(LockMode::Write.stronger(LockMode::Read), LockMode::Write);
    }

    #[test]
    fn test_timeout_sentinels() {
        assert_eq!(LockTimeout::from_millis(0).unwrap(), LockTimeout::StoreDefault);
        assert_eq!(LockTimeout::from_millis(-1).unwrap(), LockTimeout::NoTimeout);
        assert_eq!(
            LockTimeout::from_millis(2000).unwrap(),
            LockTimeout::Millis(2000)
        );
    }

    #[test]
    fn test_timeout_rejects_other_negatives() {
        assert!(matches!(
            LockTimeout::from_millis(-7),
            Err(LockError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_timeout_budget() {
        let default = Duration::from_millis(500);
        assert_eq!(LockTimeout::StoreDefault.budget(default), Some(default));
        assert_eq!(LockTimeout::NoTimeout.budget(default), None);
        assert_eq!(
            LockTimeout::Millis(100).budget(default),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_outcome_into_result() {
        assert!(LockOutcome::Acquired.into_result().is_ok());
        let waited = Duration::from_millis(42);
        assert_eq!(
            LockOutcome::TimedOut { waited }.into_result(),
            Err(LockError::Timeout { waited })
        );
    }
}
