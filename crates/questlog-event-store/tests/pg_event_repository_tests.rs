//! Integration tests for `PgEventRepository`.
//!
//! These need a live `PostgreSQL` reachable through `DATABASE_URL`:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/questlog cargo test -p questlog-event-store -- --ignored
//! ```

use chrono::{Duration, Utc};
use questlog_core::error::DomainError;
use questlog_core::repository::{EventRepository, ScanCursor, StoredEvent};
use questlog_event_store::pg_event_repository::PgEventRepository;
use sqlx::PgPool;
use uuid::Uuid;

/// Helper to build a `StoredEvent` with sensible defaults.
fn make_stored_event(aggregate_id: Uuid, sequence_number: i64) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::new_v4(),
        aggregate_id,
        event_type: "TestEvent".to_string(),
        payload: serde_json::json!({"key": "value"}),
        sequence_number,
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        actor_id: Some("gm-1".to_owned()),
        occurred_at: Utc::now(),
    }
}

// --- load_events ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_load_events_returns_empty_vec_for_nonexistent_aggregate(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let events = repo.load_events(Uuid::new_v4()).await.unwrap();

    assert!(events.is_empty());
}

// --- append_events + load_events round-trip ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_append_and_load_single_event(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let event = make_stored_event(aggregate_id, 1);

    repo.append_events(aggregate_id, 0, std::slice::from_ref(&event))
        .await
        .unwrap();

    let loaded = repo.load_events(aggregate_id).await.unwrap();
    assert_eq!(loaded.len(), 1);

    let e = &loaded[0];
    assert_eq!(e.event_id, event.event_id);
    assert_eq!(e.aggregate_id, aggregate_id);
    assert_eq!(e.event_type, event.event_type);
    assert_eq!(e.payload, event.payload);
    assert_eq!(e.sequence_number, 1);
    assert_eq!(e.correlation_id, event.correlation_id);
    assert_eq!(e.causation_id, event.causation_id);
    assert_eq!(e.actor_id.as_deref(), Some("gm-1"));
    // PostgreSQL TIMESTAMPTZ has microsecond precision.
    assert_eq!(
        e.occurred_at.timestamp_micros(),
        event.occurred_at.timestamp_micros()
    );
}

// --- tail replay ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_load_events_since_is_exclusive(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let events: Vec<_> = (1..=4)
        .map(|n| make_stored_event(aggregate_id, n))
        .collect();
    repo.append_events(aggregate_id, 0, &events).await.unwrap();

    let tail = repo.load_events_since(aggregate_id, 2).await.unwrap();

    let versions: Vec<i64> = tail.iter().map(|e| e.sequence_number).collect();
    assert_eq!(versions, vec![3, 4]);
}

// --- concurrency ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_concurrency_conflict_on_duplicate_sequence_number(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();

    repo.append_events(aggregate_id, 0, &[make_stored_event(aggregate_id, 1)])
        .await
        .unwrap();

    let result = repo
        .append_events(aggregate_id, 0, &[make_stored_event(aggregate_id, 1)])
        .await;

    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id: conflict_agg_id,
            expected,
            actual,
        }) => {
            assert_eq!(conflict_agg_id, aggregate_id);
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_concurrent_writers_at_same_version_have_one_winner(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let seed: Vec<_> = (1..=3)
        .map(|n| make_stored_event(aggregate_id, n))
        .collect();
    repo.append_events(aggregate_id, 0, &seed).await.unwrap();

    let first = make_stored_event(aggregate_id, 4);
    let second = make_stored_event(aggregate_id, 4);
    let (a, b) = tokio::join!(
        repo.append_events(aggregate_id, 3, std::slice::from_ref(&first)),
        repo.append_events(aggregate_id, 3, std::slice::from_ref(&second)),
    );

    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(DomainError::ConcurrencyConflict { .. })))
        .count();
    assert_eq!(conflicts, 1);
    assert!(a.is_ok() || b.is_ok());
    assert_eq!(repo.load_events(aggregate_id).await.unwrap().len(), 4);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_stale_expected_version_with_non_overlapping_sequences(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();

    repo.append_events(
        aggregate_id,
        0,
        &[
            make_stored_event(aggregate_id, 1),
            make_stored_event(aggregate_id, 2),
        ],
    )
    .await
    .unwrap();

    // Stale expected_version 0 (actual is 2) with versions 1-2 would collide;
    // the head check must reject it before any insert.
    let result = repo
        .append_events(
            aggregate_id,
            0,
            &[
                make_stored_event(aggregate_id, 1),
                make_stored_event(aggregate_id, 2),
            ],
        )
        .await;

    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict {
            expected: 0,
            actual: 2,
            ..
        })
    ));
}

// --- edge cases ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_append_empty_events_is_noop(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();

    repo.append_events(aggregate_id, 0, &[]).await.unwrap();

    assert!(repo.load_events(aggregate_id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_complex_json_payload_round_trip(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let complex_payload = serde_json::json!({
        "nested": {"key": "value", "number": 42},
        "array": [1, "two", null, true, false],
        "null_field": null,
        "empty_object": {},
        "empty_array": []
    });

    let mut event = make_stored_event(aggregate_id, 1);
    event.payload = complex_payload.clone();

    repo.append_events(aggregate_id, 0, &[event]).await.unwrap();

    let loaded = repo.load_events(aggregate_id).await.unwrap();
    assert_eq!(loaded[0].payload, complex_payload);
}

// --- archival support ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_remove_events_keeps_head_for_next_append(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let mut events: Vec<_> = (1..=3)
        .map(|n| make_stored_event(aggregate_id, n))
        .collect();
    for event in &mut events {
        event.occurred_at = Utc::now() - Duration::days(400);
    }
    repo.append_events(aggregate_id, 0, &events).await.unwrap();

    let old = repo
        .load_events_before(Utc::now() - Duration::days(365), None, 10)
        .await
        .unwrap();
    assert_eq!(old.len(), 3);
    let resumed = repo
        .load_events_before(Utc::now() - Duration::days(365), old.first().map(ScanCursor::at), 10)
        .await
        .unwrap();
    assert_eq!(resumed.len(), 2);

    let removed = repo
        .remove_events(aggregate_id, &[events[0].event_id])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    repo.append_events(aggregate_id, 3, &[make_stored_event(aggregate_id, 4)])
        .await
        .unwrap();
    let totals = repo.totals().await.unwrap();
    assert_eq!(totals.event_count, 3);
    assert_eq!(totals.aggregate_count, 1);
}
