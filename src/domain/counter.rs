use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CounterId = Uuid;

/// A named quantity being tracked (e.g. "glasses of water").
/// The `value` field is a cached running total; the authoritative history
/// lives in the counter's events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    pub id: CounterId,
    /// Unique (case-insensitively) among non-deleted counters
    pub name: String,
    /// Free-form label for what is being counted (e.g. "glasses")
    pub unit: String,
    /// Running sum of all applied event deltas
    pub value: i64,
    /// Delta magnitude used when an increment/decrement omits an amount
    pub default_amount: i64,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker; the row and its events are retained
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Counter {
    /// Create a new counter with value 0. Inputs are expected to be
    /// trimmed and validated by the service.
    pub fn new(name: String, unit: String, default_amount: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            unit,
            value: 0,
            default_amount,
            created_at,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
