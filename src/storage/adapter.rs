use crate::classifier::{ClassifierRule, ConflictClassifier, OutcomeKind};
use crate::core::types::{BackendId, LockMode, LockTimeout, NativeSignal, Query, Record};
use crate::transaction::TransactionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Store adapter trait - allows pluggable store backends
///
/// The row-lock table behind this trait is the only resource shared
/// across transactions; every lock acquisition and release goes through
/// it, nothing inspects or mutates lock state another way.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Identifier of the backend, used to key classifier rules.
    fn backend(&self) -> &BackendId;

    /// Materialize the rows matching `query` and, for a mode other than
    /// `None`, take row locks on them, blocking up to `timeout`.
    ///
    /// A failure is reported as the backend's native signal; callers
    /// classify it, this layer never does.
    async fn execute_locking_read(
        &self,
        tx: TransactionId,
        query: &Query,
        mode: LockMode,
        timeout: LockTimeout,
    ) -> std::result::Result<Vec<Record>, NativeSignal>;

    /// Drop every row lock held by `tx`.
    async fn release_locks(&self, tx: TransactionId);
}

/// Native failure codes one backend emits for lock-related conditions,
/// plus its default lock wait.
///
/// `reports_lock_wait_as_statement_timeout` models backends that
/// surface a lock wait through their statement-timeout path instead of
/// a dedicated lock-wait code; the classifier table absorbs the
/// difference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendProfile {
    pub id: BackendId,
    pub lock_wait_timeout_code: String,
    pub statement_timeout_code: String,
    pub deadlock_code: String,
    pub reports_lock_wait_as_statement_timeout: bool,
    pub default_wait_ms: u64,
}

impl BackendProfile {
    /// Derby-style SQLSTATE codes.
    pub fn derby() -> Self {
        Self {
            id: BackendId::from("derby"),
            lock_wait_timeout_code: "40XL1".to_string(),
            statement_timeout_code: "XCL52".to_string(),
            deadlock_code: "40001".to_string(),
            reports_lock_wait_as_statement_timeout: false,
            default_wait_ms: 1000,
        }
    }

    /// DB2-style codes. Reports lock waits through the statement-timeout
    /// path, a known backend inconsistency handled by table entries.
    pub fn db2() -> Self {
        Self {
            id: BackendId::from("db2"),
            lock_wait_timeout_code: "-913".to_string(),
            statement_timeout_code: "57014".to_string(),
            deadlock_code: "-911".to_string(),
            reports_lock_wait_as_statement_timeout: true,
            default_wait_ms: 1000,
        }
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    /// Code emitted when a lock wait exhausts its budget.
    pub fn lock_wait_code(&self) -> &str {
        if self.reports_lock_wait_as_statement_timeout {
            &self.statement_timeout_code
        } else {
            &self.lock_wait_timeout_code
        }
    }

    /// The classifier rules for this backend: both timeout paths map to
    /// `Timeout`, the deadlock code maps to `Conflict`.
    pub fn classifier_rules(&self) -> Vec<ClassifierRule> {
        vec![
            ClassifierRule {
                backend: Some(self.id.clone()),
                code: self.lock_wait_timeout_code.clone(),
                outcome: OutcomeKind::Timeout,
            },
            ClassifierRule {
                backend: Some(self.id.clone()),
                code: self.statement_timeout_code.clone(),
                outcome: OutcomeKind::Timeout,
            },
            ClassifierRule {
                backend: Some(self.id.clone()),
                code: self.deadlock_code.clone(),
                outcome: OutcomeKind::Conflict,
            },
        ]
    }
}

impl ConflictClassifier {
    /// Classifier preloaded with the rules of the given backend profiles.
    pub fn with_profiles(profiles: &[BackendProfile]) -> Self {
        let mut classifier = ConflictClassifier::new();
        for profile in profiles {
            for rule in profile.classifier_rules() {
                classifier.register(rule.backend, &rule.code, rule.outcome);
            }
        }
        classifier
    }
}
