//! Reversible per-event compression.
//!
//! Payloads are stored as raw deflate streams of their JSON encoding, with a
//! hex SHA-256 of the uncompressed bytes. The checksum is verified on every
//! decompression, so a damaged archive record never yields a wrong event.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use questlog_core::archive::CompressedEvent;
use questlog_core::error::DomainError;
use questlog_core::repository::StoredEvent;
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn to_i64(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

/// Compresses one event for cold storage.
///
/// # Errors
///
/// Returns `Serialization` if the payload cannot be encoded or deflated.
pub fn compress_event(
    event: &StoredEvent,
    archived_at: DateTime<Utc>,
) -> Result<CompressedEvent, DomainError> {
    let raw = serde_json::to_vec(&event.payload)?;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&raw)
        .map_err(|e| DomainError::Serialization(format!("deflate failed: {e}")))?;
    let compressed_payload = encoder
        .finish()
        .map_err(|e| DomainError::Serialization(format!("deflate failed: {e}")))?;

    Ok(CompressedEvent {
        id: Uuid::new_v4(),
        character_id: event.aggregate_id,
        original_event_id: event.event_id,
        event_type: event.event_type.clone(),
        sequence_number: event.sequence_number,
        correlation_id: event.correlation_id,
        causation_id: event.causation_id,
        actor_id: event.actor_id.clone(),
        original_size_bytes: to_i64(raw.len()),
        compressed_size_bytes: to_i64(compressed_payload.len()),
        compressed_payload,
        payload_checksum: checksum(&raw),
        original_timestamp: event.occurred_at,
        archived_at,
    })
}

/// Inflates and verifies the payload of a compressed event.
///
/// # Errors
///
/// Returns `Serialization` when the stream is damaged, the checksum or
/// recorded size does not match, or the bytes are not valid JSON.
pub fn decompress_payload(compressed: &CompressedEvent) -> Result<serde_json::Value, DomainError> {
    let mut raw = Vec::new();
    DeflateDecoder::new(compressed.compressed_payload.as_slice())
        .read_to_end(&mut raw)
        .map_err(|e| {
            DomainError::Serialization(format!(
                "archived event {} does not inflate: {e}",
                compressed.original_event_id
            ))
        })?;

    if to_i64(raw.len()) != compressed.original_size_bytes
        || checksum(&raw) != compressed.payload_checksum
    {
        return Err(DomainError::Serialization(format!(
            "archived event {} fails its checksum",
            compressed.original_event_id
        )));
    }
    Ok(serde_json::from_slice(&raw)?)
}

/// Recovers the original event from its compressed form.
///
/// # Errors
///
/// See [`decompress_payload`].
pub fn restore(compressed: &CompressedEvent) -> Result<StoredEvent, DomainError> {
    Ok(StoredEvent {
        event_id: compressed.original_event_id,
        aggregate_id: compressed.character_id,
        event_type: compressed.event_type.clone(),
        payload: decompress_payload(compressed)?,
        sequence_number: compressed.sequence_number,
        correlation_id: compressed.correlation_id,
        causation_id: compressed.causation_id,
        actor_id: compressed.actor_id.clone(),
        occurred_at: compressed.original_timestamp,
    })
}
