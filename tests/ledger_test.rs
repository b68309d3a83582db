mod common;

use anyhow::Result;
use chrono::Utc;
use common::{parse_date, parse_instant, test_repository, test_service, test_service_at};
use tally::application::AppError;
use tally::domain::{compute_value, Counter, CounterEvent};
use uuid::Uuid;

#[tokio::test]
async fn test_increment_uses_default_amount_when_omitted() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Water", "glasses", Some(3)).await?;
    service.increment(counter.id, Some(10), None).await?;

    let counter = service.increment(counter.id, None, None).await?;

    assert_eq!(counter.value, 13);

    let events = service.counter_history(counter.id).await?;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].delta, 3);

    Ok(())
}

#[tokio::test]
async fn test_increment_uses_explicit_amount_when_provided() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Water", "glasses", Some(3)).await?;

    let counter = service.increment(counter.id, Some(7), None).await?;

    assert_eq!(counter.value, 7);
    Ok(())
}

#[tokio::test]
async fn test_decrement_applies_negative_delta() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Water", "glasses", None).await?;
    service.increment(counter.id, Some(10), None).await?;

    let counter = service.decrement(counter.id, Some(7), None).await?;

    assert_eq!(counter.value, 3);

    let events = service.counter_history(counter.id).await?;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].delta, -7);

    Ok(())
}

#[tokio::test]
async fn test_decrement_uses_default_amount_when_omitted() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Water", "glasses", Some(2)).await?;
    service.increment(counter.id, Some(10), None).await?;

    let counter = service.decrement(counter.id, None, None).await?;

    assert_eq!(counter.value, 8);
    Ok(())
}

#[tokio::test]
async fn test_zero_amount_is_a_pure_noop() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Water", "glasses", None).await?;
    service.increment(counter.id, Some(10), None).await?;

    let after_inc = service.increment(counter.id, Some(0), None).await?;
    let after_dec = service.decrement(counter.id, Some(0), None).await?;

    assert_eq!(after_inc.value, 10);
    assert_eq!(after_dec.value, 10);

    // No event was written for either call
    let events = service.counter_history(counter.id).await?;
    assert_eq!(events.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_negative_amount_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Water", "glasses", None).await?;

    let inc = service.increment(counter.id, Some(-5), None).await;
    assert!(matches!(inc, Err(AppError::Validation(_))));

    let dec = service.decrement(counter.id, Some(-5), None).await;
    assert!(matches!(dec, Err(AppError::Validation(_))));

    assert_eq!(service.get_counter(counter.id).await?.value, 0);
    Ok(())
}

#[tokio::test]
async fn test_delta_on_missing_or_deleted_counter_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let unknown = service.increment(Uuid::new_v4(), None, None).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));

    let counter = service.create_counter("Water", "glasses", None).await?;
    service.delete_counter(counter.id).await?;

    let deleted = service.decrement(counter.id, Some(1), None).await;
    assert!(matches!(deleted, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_value_is_the_sum_of_applied_deltas() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Pushups", "reps", Some(5)).await?;

    service.increment(counter.id, Some(20), None).await?;
    service.increment(counter.id, None, None).await?; // +5
    service.decrement(counter.id, Some(3), None).await?;
    service.increment(counter.id, Some(0), None).await?; // no-op
    service.decrement(counter.id, None, None).await?; // -5

    let counter = service.get_counter(counter.id).await?;
    assert_eq!(counter.value, 20 + 5 - 3 - 5);

    // One event per non-zero call
    let events = service.counter_history(counter.id).await?;
    assert_eq!(events.len(), 4);

    // The ledger reproduces the cached value exactly
    assert_eq!(compute_value(counter.id, &events), counter.value);

    Ok(())
}

#[tokio::test]
async fn test_store_round_trip_sum_matches_value() -> Result<()> {
    let (repo, _temp) = test_repository().await?;

    let now = Utc::now();
    let counter = Counter::new("Pushups".into(), "reps".into(), 1, now);
    repo.insert_counter(&counter).await?;

    repo.apply_delta(&CounterEvent::new(counter.id, 20, now, now))
        .await?;
    repo.apply_delta(&CounterEvent::new(counter.id, -3, now, now))
        .await?;
    let applied = repo
        .apply_delta(&CounterEvent::new(counter.id, 5, now, now))
        .await?
        .unwrap();

    assert_eq!(applied.value, 22);
    assert_eq!(repo.sum_events_for_counter(counter.id).await?, 22);

    Ok(())
}

#[tokio::test]
async fn test_store_refuses_deltas_on_deleted_counters() -> Result<()> {
    // Even without the service's active-state check, a delta racing a
    // delete must write nothing: neither the value bump nor the event.
    let (repo, _temp) = test_repository().await?;

    let now = Utc::now();
    let counter = Counter::new("Water".into(), "glasses".into(), 1, now);
    repo.insert_counter(&counter).await?;
    assert!(repo.soft_delete(counter.id, now).await?);

    let applied = repo
        .apply_delta(&CounterEvent::new(counter.id, 5, now, now))
        .await?;

    assert!(applied.is_none());
    assert_eq!(repo.count_events_for_counter(counter.id).await?, 0);
    assert_eq!(repo.sum_events_for_counter(counter.id).await?, 0);

    let stored = repo.get_counter(counter.id).await?.unwrap();
    assert_eq!(stored.value, 0);
    assert!(stored.is_deleted());

    Ok(())
}

#[tokio::test]
async fn test_backdated_events_keep_both_timestamps() -> Result<()> {
    let now = parse_instant("2026-01-04T12:00:00Z");
    let (service, _temp) = test_service_at(now).await?;

    let counter = service.create_counter("Water", "glasses", None).await?;

    let yesterday = parse_date("2026-01-03");
    service.increment(counter.id, Some(2), Some(yesterday)).await?;

    let events = service.counter_history(counter.id).await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].occurred_at, yesterday);
    assert_eq!(events[0].created_at, now);

    Ok(())
}

#[tokio::test]
async fn test_occurred_at_defaults_to_now() -> Result<()> {
    let now = parse_instant("2026-01-04T12:00:00Z");
    let (service, _temp) = test_service_at(now).await?;

    let counter = service.create_counter("Water", "glasses", None).await?;
    service.increment(counter.id, None, None).await?;

    let events = service.counter_history(counter.id).await?;
    assert_eq!(events[0].occurred_at, now);
    assert_eq!(events[0].created_at, now);

    Ok(())
}

#[tokio::test]
async fn test_history_is_newest_first_by_occurred_at() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Water", "glasses", None).await?;

    service
        .increment(counter.id, Some(1), Some(parse_date("2026-01-01")))
        .await?;
    service
        .increment(counter.id, Some(3), Some(parse_date("2026-01-03")))
        .await?;
    service
        .increment(counter.id, Some(2), Some(parse_date("2026-01-02")))
        .await?;

    let deltas: Vec<i64> = service
        .counter_history(counter.id)
        .await?
        .iter()
        .map(|e| e.delta)
        .collect();

    assert_eq!(deltas, vec![3, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_increments_never_lose_an_update() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let counter = service.create_counter("Water", "glasses", None).await?;

    let (a, b) = tokio::join!(
        service.increment(counter.id, Some(3), None),
        service.increment(counter.id, Some(4), None),
    );
    a?;
    b?;

    let counter = service.get_counter(counter.id).await?;
    assert_eq!(counter.value, 7);
    assert_eq!(service.counter_history(counter.id).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_integrity_check_passes_for_any_history() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let water = service.create_counter("Water", "glasses", Some(2)).await?;
    let pushups = service.create_counter("Pushups", "reps", Some(10)).await?;

    service.increment(water.id, None, None).await?;
    service
        .increment(water.id, Some(5), Some(parse_date("2026-01-01")))
        .await?;
    service.decrement(water.id, Some(3), None).await?;
    service.increment(pushups.id, None, None).await?;

    // Deleted counters keep their history and must still reconcile
    service.delete_counter(pushups.id).await?;

    let report = service.check_integrity().await?;

    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    assert_eq!(report.counter_count, 2);
    assert_eq!(report.event_count, 4);

    Ok(())
}
