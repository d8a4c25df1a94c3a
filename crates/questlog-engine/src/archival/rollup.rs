//! Lossy many-to-one summaries of same-type events.
//!
//! Events are bucketed per character, event type, and fixed time window.
//! A bucket becomes one [`EventRollup`] whose payload keeps the event count
//! and the sum, minimum, and maximum of every numeric payload field. The ids
//! of all consumed events are kept for audit.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use questlog_core::archive::EventRollup;
use questlog_core::error::DomainError;
use questlog_core::repository::StoredEvent;
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Groups `events` into rollup buckets keyed by character, event type, and
/// window. Each bucket keeps its events in the order given.
#[must_use]
pub fn bucket_events<'a>(
    events: impl IntoIterator<Item = &'a StoredEvent>,
    window: Duration,
) -> Vec<Vec<&'a StoredEvent>> {
    let window_secs = window.num_seconds().max(1);
    let mut buckets: BTreeMap<(Uuid, &str, i64), Vec<&StoredEvent>> = BTreeMap::new();
    for event in events {
        let slot = event.occurred_at.timestamp().div_euclid(window_secs);
        buckets
            .entry((event.aggregate_id, event.event_type.as_str(), slot))
            .or_default()
            .push(event);
    }
    buckets.into_values().collect()
}

/// Summarizes a non-empty run of same-character, same-type events.
///
/// # Errors
///
/// Returns `Validation` when `events` is empty or mixes characters or
/// event types.
pub fn build_rollup(events: &[&StoredEvent], created_at: DateTime<Utc>) -> Result<EventRollup, DomainError> {
    let Some(first) = events.first() else {
        return Err(DomainError::Validation("cannot roll up an empty bucket".into()));
    };
    if let Some(stray) = events
        .iter()
        .find(|e| e.aggregate_id != first.aggregate_id || e.event_type != first.event_type)
    {
        return Err(DomainError::Validation(format!(
            "event {} ({}) does not belong in a {} rollup of {}",
            stray.event_id, stray.event_type, first.event_type, first.aggregate_id
        )));
    }

    let mut fields: BTreeMap<String, FieldStats> = BTreeMap::new();
    let mut original_bytes = 0usize;
    for event in events {
        original_bytes += event.payload_size_bytes();
        for (name, number) in numeric_fields(&event.payload) {
            fields
                .entry(name)
                .and_modify(|stats| stats.record(number))
                .or_insert_with(|| FieldStats::new(number));
        }
    }

    let event_count = i64::try_from(events.len()).unwrap_or(i64::MAX);
    let mut sum = Map::new();
    let mut min = Map::new();
    let mut max = Map::new();
    for (name, stats) in fields {
        sum.insert(name.clone(), stats.sum.to_json());
        min.insert(name.clone(), stats.min.to_json());
        max.insert(name, stats.max.to_json());
    }
    let aggregated_payload = json!({
        "event_count": event_count,
        "sum": sum,
        "min": min,
        "max": max,
    });

    let summary_bytes = serde_json::to_vec(&aggregated_payload)?.len();
    let space_saved_bytes =
        i64::try_from(original_bytes.saturating_sub(summary_bytes)).unwrap_or(i64::MAX);

    Ok(EventRollup {
        id: Uuid::new_v4(),
        character_id: first.aggregate_id,
        event_type: first.event_type.clone(),
        event_count,
        start_timestamp: events.iter().map(|e| e.occurred_at).min().unwrap_or(first.occurred_at),
        end_timestamp: events.iter().map(|e| e.occurred_at).max().unwrap_or(first.occurred_at),
        aggregated_payload,
        original_event_ids: events.iter().map(|e| e.event_id).collect(),
        space_saved_bytes,
        created_at,
    })
}

/// Top-level numeric fields of a payload. A payload wrapped in a single
/// variant tag, such as `{"DamageDealt": {"amount": 7}}`, is unwrapped first.
fn numeric_fields(payload: &Value) -> Vec<(String, Number)> {
    let Some(mut object) = payload.as_object() else {
        return Vec::new();
    };
    let single = object.len() == 1;
    if let Some(inner) = object.values().next().filter(|_| single).and_then(Value::as_object) {
        object = inner;
    }
    object
        .iter()
        .filter_map(|(name, value)| Number::from_json(value).map(|n| (name.clone(), n)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_json(value: &Value) -> Option<Self> {
        value
            .as_i64()
            .map(Self::Int)
            .or_else(|| value.as_f64().map(Self::Float))
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(n) => n,
        }
    }

    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map_or_else(|| Self::Float(self.as_f64() + other.as_f64()), Self::Int),
            _ => Self::Float(self.as_f64() + other.as_f64()),
        }
    }

    fn to_json(self) -> Value {
        match self {
            Self::Int(n) => json!(n),
            Self::Float(n) => json!(n),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldStats {
    sum: Number,
    min: Number,
    max: Number,
}

impl FieldStats {
    fn new(first: Number) -> Self {
        Self {
            sum: first,
            min: first,
            max: first,
        }
    }

    fn record(&mut self, number: Number) {
        self.sum = self.sum.add(number);
        if number.as_f64() < self.min.as_f64() {
            self.min = number;
        }
        if number.as_f64() > self.max.as_f64() {
            self.max = number;
        }
    }
}
