//! # Idempotency Ledger
//!
//! Maps a caller-supplied idempotency key to the result it produced, with a
//! TTL. The ledger is consulted *before* any side-effecting persistence so a
//! repeated submission returns the original task id instead of creating
//! duplicate work.
//!
//! Read-path policy: fail closed. A storage error during lookup is logged
//! and treated as a miss — the submission proceeds as non-duplicate rather
//! than being blocked on ledger availability.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::constants::{bounds, system};
use crate::models::IdempotencyRecord;
use crate::store::{IdempotencyStore, StoreResult};

/// TTL-scoped key → result ledger for submission deduplication
pub struct IdempotencyLedger {
    store: Arc<dyn IdempotencyStore>,
    default_ttl_hours: i64,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            store,
            default_ttl_hours: system::DEFAULT_IDEMPOTENCY_TTL_HOURS,
        }
    }

    pub fn with_ttl_hours(store: Arc<dyn IdempotencyStore>, ttl_hours: i64) -> Self {
        Self {
            store,
            default_ttl_hours: ttl_hours,
        }
    }

    /// Validate a key at the submission boundary: non-empty, bounded length,
    /// restricted charset
    pub fn is_valid_key(key: &str) -> bool {
        !key.is_empty()
            && key.len() <= bounds::MAX_IDEMPOTENCY_KEY_LEN
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    }

    /// Look up a key, treating storage errors as a miss and lazily deleting
    /// an expired record when one is found
    pub async fn lookup(&self, key: &str) -> Option<IdempotencyRecord> {
        let record = match self.store.get(key).await {
            Ok(record) => record?,
            Err(error) => {
                warn!(
                    key = key,
                    error = %error,
                    "Idempotency lookup failed; treating as non-duplicate"
                );
                return None;
            }
        };

        if record.is_expired(Utc::now()) {
            debug!(key = key, "Expired idempotency record found; deleting");
            if let Err(error) = self.store.delete(key).await {
                warn!(key = key, error = %error, "Failed to delete expired idempotency record");
            }
            return None;
        }

        Some(record)
    }

    /// Record the result produced for a key (last-writer-wins)
    pub async fn store(
        &self,
        key: &str,
        result: Value,
        operation_type: &str,
        ttl_hours: Option<i64>,
    ) -> StoreResult<()> {
        let record = IdempotencyRecord::new(
            key,
            result,
            operation_type,
            ttl_hours.unwrap_or(self.default_ttl_hours),
        );
        self.store.put(&record).await
    }

    /// Delete every expired record; individual deletion failures are logged
    /// and skipped. Returns the number of records removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired = match self.store.expired_keys(now).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(error = %error, "Idempotency sweep could not list expired records");
                return 0;
            }
        };

        let mut removed = 0;
        for key in expired {
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(error) => {
                    warn!(key = %key, error = %error, "Failed to delete expired idempotency record")
                }
            }
        }

        if removed > 0 {
            debug!(removed = removed, "Idempotency sweep completed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryIdempotencyStore, StoreError};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use proptest::prelude::*;

    /// Store stub whose reads always fail, for the fail-closed path
    struct FailingIdempotencyStore;

    #[async_trait]
    impl IdempotencyStore for FailingIdempotencyStore {
        async fn put(&self, _record: &IdempotencyRecord) -> StoreResult<()> {
            Err(StoreError::Unavailable {
                message: "injected".into(),
            })
        }

        async fn get(&self, _key: &str) -> StoreResult<Option<IdempotencyRecord>> {
            Err(StoreError::Unavailable {
                message: "injected".into(),
            })
        }

        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable {
                message: "injected".into(),
            })
        }

        async fn expired_keys(&self, _now: DateTime<Utc>) -> StoreResult<Vec<String>> {
            Err(StoreError::Unavailable {
                message: "injected".into(),
            })
        }
    }

    #[test]
    fn test_key_validation() {
        assert!(IdempotencyLedger::is_valid_key("submit.itinerary-42_a"));
        assert!(!IdempotencyLedger::is_valid_key(""));
        assert!(!IdempotencyLedger::is_valid_key("has space"));
        assert!(!IdempotencyLedger::is_valid_key("emoji✈"));
        assert!(!IdempotencyLedger::is_valid_key(&"k".repeat(256)));
        assert!(IdempotencyLedger::is_valid_key(&"k".repeat(255)));
    }

    proptest! {
        #[test]
        fn prop_valid_charset_keys_accepted(key in "[A-Za-z0-9_.-]{1,255}") {
            prop_assert!(IdempotencyLedger::is_valid_key(&key));
        }

        #[test]
        fn prop_keys_with_other_chars_rejected(
            prefix in "[A-Za-z0-9_.-]{0,10}",
            bad in "[ !@#$%^&*()+=/\\\\]",
        ) {
            let key = format!("{prefix}{bad}");
            prop_assert!(!IdempotencyLedger::is_valid_key(&key));
        }
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let ledger = IdempotencyLedger::new(Arc::new(MemoryIdempotencyStore::new()));

        ledger
            .store(
                "submit-1",
                serde_json::json!({"task_id": "t1"}),
                "submit_task",
                None,
            )
            .await
            .unwrap();

        let record = ledger.lookup("submit-1").await.unwrap();
        assert_eq!(record.result["task_id"], "t1");
        assert_eq!(record.operation_type, "submit_task");

        assert!(ledger.lookup("submit-2").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_record_lazily_deleted() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let ledger = IdempotencyLedger::new(store.clone());

        let mut record = IdempotencyRecord::new(
            "old",
            serde_json::json!({"task_id": "t1"}),
            "submit_task",
            24,
        );
        record.expires_at = Utc::now() - Duration::hours(1);
        store.put(&record).await.unwrap();

        assert!(ledger.lookup("old").await.is_none());
        assert!(store.get("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_fails_closed() {
        let ledger = IdempotencyLedger::new(Arc::new(FailingIdempotencyStore));
        assert!(ledger.lookup("any").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let ledger = IdempotencyLedger::new(store.clone());

        ledger
            .store("fresh", serde_json::json!({}), "submit_task", None)
            .await
            .unwrap();
        let mut stale =
            IdempotencyRecord::new("stale", serde_json::json!({}), "submit_task", 24);
        stale.expires_at = Utc::now() - Duration::minutes(5);
        store.put(&stale).await.unwrap();

        assert_eq!(ledger.sweep_expired().await, 1);
        assert!(store.get("fresh").await.unwrap().is_some());
        assert!(store.get("stale").await.unwrap().is_none());
    }
}
