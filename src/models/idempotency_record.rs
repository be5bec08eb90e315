use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A deduplication record mapping an idempotency key to the result it produced
///
/// Created once per successful submission and consulted on every subsequent
/// submission carrying the same key until `expires_at` passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub result: Value,
    pub operation_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(
        key: impl Into<String>,
        result: Value,
        operation_type: impl Into<String>,
        ttl_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            result,
            operation_type: operation_type.into(),
            created_at: now,
            expires_at: now + Duration::hours(ttl_hours),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
