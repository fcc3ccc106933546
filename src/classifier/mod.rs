// ============================================================================
// Lock Conflict Classifier
// ============================================================================
//
// Store backends report the same logical lock failure through different
// native codes: one backend raises a dedicated lock-wait code, another
// reports the same wait through its statement-timeout path, a third only
// surfaces a deadlock/rollback code. The classifier normalizes these
// into the crate's two user-visible failure variants via a lookup table
// supplied at configuration time, instead of per-call-site branching.
//
// Lookup is two-tier: rules keyed by (backend, code) are consulted first,
// walking the backend's declared ancestor chain (a plain iterative table
// lookup over static data, most specific backend first), then a generic
// backend-independent tier. Codes no rule recognizes propagate as
// `StoreIo` carrying the untouched native signal; they are never guessed
// into Timeout or Conflict.
//
// ============================================================================

use crate::core::types::{BackendId, LockOutcome, NativeSignal};
use crate::core::{LockError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Which user-visible failure variant a native code maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Timeout,
    Conflict,
}

/// One mapping rule. A rule with no backend sits in the generic tier and
/// applies to every backend whose chain has no more specific match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierRule {
    #[serde(default)]
    pub backend: Option<BackendId>,
    pub code: String,
    pub outcome: OutcomeKind,
}

/// Serializable classifier configuration: the rule set plus the declared
/// backend ancestry (child, parent) pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub parents: Vec<(BackendId, BackendId)>,
    pub rules: Vec<ClassifierRule>,
}

pub struct ConflictClassifier {
    rules: HashMap<(BackendId, String), OutcomeKind>,
    generic: HashMap<String, OutcomeKind>,
    parents: HashMap<BackendId, BackendId>,
}

impl Default for ConflictClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictClassifier {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            generic: HashMap::new(),
            parents: HashMap::new(),
        }
    }

    pub fn from_config(config: ClassifierConfig) -> Self {
        let mut classifier = Self::new();
        for (child, parent) in config.parents {
            classifier.register_parent(child, parent);
        }
        for rule in config.rules {
            classifier.register(rule.backend, &rule.code, rule.outcome);
        }
        classifier
    }

    /// Build a classifier from a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ClassifierConfig = serde_json::from_str(json)
            .map_err(|e| LockError::InvalidRequest(format!("classifier config: {}", e)))?;
        Ok(Self::from_config(config))
    }

    /// Register a mapping rule. `None` registers into the generic tier.
    pub fn register(&mut self, backend: Option<BackendId>, code: &str, outcome: OutcomeKind) {
        match backend {
            Some(backend) => {
                self.rules.insert((backend, code.to_string()), outcome);
            }
            None => {
                self.generic.insert(code.to_string(), outcome);
            }
        }
    }

    /// Declare `parent` as the next backend to consult when `child` has
    /// no rule for a code.
    pub fn register_parent(&mut self, child: BackendId, parent: BackendId) {
        self.parents.insert(child, parent);
    }

    fn lookup(&self, backend: &BackendId, code: &str) -> Option<OutcomeKind> {
        let mut cursor = Some(backend.clone());
        let mut hops = 0;
        while let Some(current) = cursor {
            if let Some(kind) = self.rules.get(&(current.clone(), code.to_string())) {
                return Some(*kind);
            }
            cursor = self.parents.get(&current).cloned();
            // Guard against ancestry cycles in bad configuration
            hops += 1;
            if hops > 16 {
                break;
            }
        }
        self.generic.get(code).copied()
    }

    /// Map a store-native failure into a terminal lock outcome.
    ///
    /// `waited` is the time the executor spent blocked before the store
    /// reported the failure; it rides along into `TimedOut`. Signals no
    /// rule recognizes come back as `StoreIo` with the original signal.
    pub fn classify(&self, signal: &NativeSignal, waited: Duration) -> Result<LockOutcome> {
        match self.lookup(&signal.backend, &signal.code) {
            Some(OutcomeKind::Timeout) => {
                debug!("classified {} as lock timeout", signal);
                Ok(LockOutcome::TimedOut { waited })
            }
            Some(OutcomeKind::Conflict) => {
                debug!("classified {} as lock conflict", signal);
                Ok(LockOutcome::Conflict {
                    reason: signal.to_string(),
                })
            }
            None => Err(LockError::StoreIo(signal.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(backend: &str, code: &str) -> NativeSignal {
        NativeSignal::new(BackendId::from(backend), code, "native failure")
    }

    const WAITED: Duration = Duration::from_millis(150);

    #[test]
    fn test_three_native_conditions_one_backend() {
        let mut classifier = ConflictClassifier::new();
        classifier.register(Some("derby".into()), "XCL52", OutcomeKind::Timeout);
        classifier.register(Some("derby".into()), "40XL1", OutcomeKind::Timeout);
        classifier.register(Some("derby".into()), "40001", OutcomeKind::Conflict);

        // statement timeout, lock-wait timeout, deadlock
        assert_eq!(
            classifier.classify(&signal("derby", "XCL52"), WAITED).unwrap(),
            LockOutcome::TimedOut { waited: WAITED }
        );
        assert_eq!(
            classifier.classify(&signal("derby", "40XL1"), WAITED).unwrap(),
            LockOutcome::TimedOut { waited: WAITED }
        );
        assert!(matches!(
            classifier.classify(&signal("derby", "40001"), WAITED).unwrap(),
            LockOutcome::Conflict { .. }
        ));
    }

    #[test]
    fn test_unrecognized_code_propagates_as_store_io() {
        let classifier = ConflictClassifier::new();
        let native = signal("derby", "08006");
        match classifier.classify(&native, WAITED) {
            Err(LockError::StoreIo(kept)) => assert_eq!(kept, native),
            other => panic!("expected StoreIo, got {:?}", other),
        }
    }

    #[test]
    fn test_ancestor_chain_walk() {
        let mut classifier = ConflictClassifier::new();
        classifier.register_parent("db2-zos".into(), "db2".into());
        classifier.register(Some("db2".into()), "-911", OutcomeKind::Conflict);

        // No rule for db2-zos directly; resolved through its parent
        assert!(matches!(
            classifier.classify(&signal("db2-zos", "-911"), WAITED).unwrap(),
            LockOutcome::Conflict { .. }
        ));
    }

    #[test]
    fn test_specific_rule_beats_ancestor_and_generic() {
        let mut classifier = ConflictClassifier::new();
        classifier.register_parent("db2-zos".into(), "db2".into());
        classifier.register(None, "57014", OutcomeKind::Conflict);
        classifier.register(Some("db2".into()), "57014", OutcomeKind::Conflict);
        classifier.register(Some("db2-zos".into()), "57014", OutcomeKind::Timeout);

        assert_eq!(
            classifier.classify(&signal("db2-zos", "57014"), WAITED).unwrap(),
            LockOutcome::TimedOut { waited: WAITED }
        );
    }

    #[test]
    fn test_generic_tier_fallback() {
        let mut classifier = ConflictClassifier::new();
        classifier.register(None, "40001", OutcomeKind::Conflict);

        assert!(matches!(
            classifier.classify(&signal("anything", "40001"), WAITED).unwrap(),
            LockOutcome::Conflict { .. }
        ));
    }

    #[test]
    fn test_from_json_config() {
        let json = r#"{
            "parents": [["db2-zos", "db2"]],
            "rules": [
                { "backend": "db2", "code": "-911", "outcome": "conflict" },
                { "backend": "db2", "code": "57014", "outcome": "timeout" },
                { "code": "40001", "outcome": "conflict" }
            ]
        }"#;
        let classifier = ConflictClassifier::from_json(json).unwrap();

        assert!(matches!(
            classifier.classify(&signal("db2-zos", "-911"), WAITED).unwrap(),
            LockOutcome::Conflict { .. }
        ));
        assert_eq!(
            classifier.classify(&signal("db2", "57014"), WAITED).unwrap(),
            LockOutcome::TimedOut { waited: WAITED }
        );
        assert!(matches!(
            classifier.classify(&signal("other", "40001"), WAITED).unwrap(),
            LockOutcome::Conflict { .. }
        ));
    }

    #[test]
    fn test_bad_json_is_invalid_request() {
        assert!(matches!(
            ConflictClassifier::from_json("{ nope"),
            Err(LockError::InvalidRequest(_))
        ));
    }
}
