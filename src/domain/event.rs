use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CounterId;

pub type EventId = Uuid;

/// One entry in a counter's ledger. Events are immutable - corrections are
/// made by applying further deltas, never by editing history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterEvent {
    pub id: EventId,
    /// The counter this delta applies to
    pub counter_id: CounterId,
    /// Signed change (positive for increment, negative for decrement); never zero
    pub delta: i64,
    /// When the change happened in the real world (callers may backdate)
    pub occurred_at: DateTime<Utc>,
    /// When we durably recorded this event
    pub created_at: DateTime<Utc>,
}

impl CounterEvent {
    pub fn new(
        counter_id: CounterId,
        delta: i64,
        occurred_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        assert!(delta != 0, "Event delta must be non-zero");
        Self {
            id: Uuid::new_v4(),
            counter_id,
            delta,
            occurred_at,
            created_at,
        }
    }
}
