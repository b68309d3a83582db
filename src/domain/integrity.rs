use std::collections::HashMap;

use super::{Counter, CounterEvent, CounterId};

/// Recompute a single counter's value from its events.
pub fn compute_value(counter_id: CounterId, events: &[CounterEvent]) -> i64 {
    events
        .iter()
        .filter(|e| e.counter_id == counter_id)
        .map(|e| e.delta)
        .sum()
}

/// Recompute values for all counters from a list of events.
/// Counters with no events won't be in the map (value = 0).
pub fn compute_all_values(events: &[CounterEvent]) -> HashMap<CounterId, i64> {
    let mut values: HashMap<CounterId, i64> = HashMap::new();

    for event in events {
        *values.entry(event.counter_id).or_insert(0) += event.delta;
    }

    values
}

/// Result of verifying the counter table against the event ledger.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub counter_count: i64,
    pub event_count: i64,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Cross-check every counter's cached value against the sum of its event
/// deltas. Soft-deleted counters are checked too: their history is retained
/// and must still reconcile.
pub fn build_integrity_report(
    counters: &[Counter],
    event_sums: &HashMap<CounterId, i64>,
    event_count: i64,
    orphaned_events: i64,
    zero_delta_events: i64,
) -> IntegrityReport {
    let mut issues = Vec::new();

    for counter in counters {
        let computed = event_sums.get(&counter.id).copied().unwrap_or(0);
        if counter.value != computed {
            issues.push(format!(
                "counter '{}' ({}): stored value {} != event sum {}",
                counter.name, counter.id, counter.value, computed
            ));
        }
    }

    if orphaned_events > 0 {
        issues.push(format!(
            "{} event(s) reference a counter that does not exist",
            orphaned_events
        ));
    }

    if zero_delta_events > 0 {
        issues.push(format!("{} event(s) have a zero delta", zero_delta_events));
    }

    IntegrityReport {
        counter_count: counters.len() as i64,
        event_count,
        issues,
    }
}
