// ============================================================================
// Lock Request Resolver
// ============================================================================
//
// Decides which identities a find or query actually obligates the
// session to lock. The rule is strict: lock scope equals the
// materialized result window. Rows skipped by an offset are read to
// position the window but never locked, and when a related path is
// selected only the related identities carry the obligation - the rows
// traversed to reach them do not.
//
// ============================================================================

use crate::core::types::{
    EntityKey, LockMode, LockRequest, LockTimeout, PageWindow, Record, Selection,
};
use crate::core::{LockError, Result};
use std::collections::HashSet;

pub struct LockRequestResolver;

impl LockRequestResolver {
    /// A key lookup obligates exactly one lock: the target identity.
    /// Related entities are never implicitly locked.
    pub fn resolve_key(key: &EntityKey, mode: LockMode, timeout: LockTimeout) -> LockRequest {
        LockRequest::new(key.clone(), mode, timeout)
    }

    /// One request per identity in the materialized window, in result
    /// order, deduplicated (several window rows may share one related
    /// identity). `None` mode resolves to no obligations at all.
    pub fn resolve_query(
        records: &[Record],
        select: &Selection,
        window: &PageWindow,
        mode: LockMode,
        timeout: LockTimeout,
    ) -> Result<Vec<LockRequest>> {
        if mode == LockMode::None {
            return Ok(Vec::new());
        }

        let windowed = records
            .iter()
            .skip(window.offset)
            .take(window.limit.unwrap_or(usize::MAX));

        let mut seen = HashSet::new();
        let mut requests = Vec::new();
        for record in windowed {
            let key = match select {
                Selection::Root => record.key.clone(),
                Selection::Related(field) => record
                    .link(field)
                    .cloned()
                    .ok_or_else(|| {
                        LockError::InvalidRequest(format!(
                            "no relation '{}' on {}",
                            field, record.key
                        ))
                    })?,
            };
            if seen.insert(key.clone()) {
                requests.push(LockRequest::new(key, mode, timeout));
            }
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(n: u64) -> Vec<Record> {
        (1..=n)
            .map(|id| {
                Record::new(EntityKey::new("Employee", id)).with_link(
                    "department",
                    // Two employees per department
                    EntityKey::new("Department", 10 * id.div_ceil(2)),
                )
            })
            .collect()
    }

    fn keys(requests: &[LockRequest]) -> Vec<EntityKey> {
        requests.iter().map(|r| r.key.clone()).collect()
    }

    #[test]
    fn test_key_lookup_resolves_to_one_request() {
        let key = EntityKey::new("Employee", 2);
        let request =
            LockRequestResolver::resolve_key(&key, LockMode::Read, LockTimeout::StoreDefault);
        assert_eq!(request.key, key);
        assert_eq!(request.mode, LockMode::Read);
    }

    #[test]
    fn test_offset_skipped_rows_are_never_locked() {
        let records = fixture(4);
        for offset in [0usize, 1, 3] {
            let requests = LockRequestResolver::resolve_query(
                &records,
                &Selection::Root,
                &PageWindow::skip(offset),
                LockMode::Read,
                LockTimeout::StoreDefault,
            )
            .unwrap();

            let locked = keys(&requests);
            let expected: Vec<EntityKey> =
                records.iter().skip(offset).map(|r| r.key.clone()).collect();
            assert_eq!(locked, expected, "offset {}", offset);
            for skipped in records.iter().take(offset) {
                assert!(!locked.contains(&skipped.key));
            }
        }
    }

    #[test]
    fn test_limit_caps_the_window() {
        let records = fixture(4);
        let requests = LockRequestResolver::resolve_query(
            &records,
            &Selection::Root,
            &PageWindow::new(1, 2),
            LockMode::Write,
            LockTimeout::StoreDefault,
        )
        .unwrap();
        assert_eq!(
            keys(&requests),
            vec![EntityKey::new("Employee", 2), EntityKey::new("Employee", 3)]
        );
    }

    #[test]
    fn test_related_path_locks_only_related_identities() {
        let records = fixture(2);
        let requests = LockRequestResolver::resolve_query(
            &records,
            &Selection::Related("department".to_string()),
            &PageWindow::all(),
            LockMode::Read,
            LockTimeout::StoreDefault,
        )
        .unwrap();

        // Both employees link the same department: one request, and no
        // employee identity appears.
        assert_eq!(keys(&requests), vec![EntityKey::new("Department", 10)]);
    }

    #[test]
    fn test_missing_relation_is_invalid_request() {
        let records = vec![Record::new(EntityKey::new("Employee", 1))];
        let result = LockRequestResolver::resolve_query(
            &records,
            &Selection::Related("department".to_string()),
            &PageWindow::all(),
            LockMode::Read,
            LockTimeout::StoreDefault,
        );
        assert!(matches!(result, Err(LockError::InvalidRequest(_))));
    }

    #[test]
    fn test_none_mode_resolves_to_no_obligations() {
        let records = fixture(3);
        let requests = LockRequestResolver::resolve_query(
            &records,
            &Selection::Root,
            &PageWindow::all(),
            LockMode::None,
            LockTimeout::StoreDefault,
        )
        .unwrap();
        assert!(requests.is_empty());
    }
}
