//! Event store database schema.
//!
//! The same statements ship as the workspace migration
//! `migrations/0001_questlog_schema.sql`; they are kept here so embedding
//! applications without the migrator can create the tables directly.

/// SQL to create the events table.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS domain_events (
    event_id        UUID PRIMARY KEY,
    aggregate_id    UUID NOT NULL,
    event_type      VARCHAR(255) NOT NULL,
    payload         JSONB NOT NULL,
    sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
    correlation_id  UUID NOT NULL,
    causation_id    UUID NOT NULL,
    actor_id        VARCHAR(255),
    occurred_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (aggregate_id, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_domain_events_aggregate_id
    ON domain_events (aggregate_id, sequence_number);

CREATE INDEX IF NOT EXISTS idx_domain_events_occurred_at
    ON domain_events (occurred_at);
";

/// SQL to create the snapshots table.
///
/// The partial unique index makes a second `is_latest` row per character a
/// constraint violation.
pub const CREATE_SNAPSHOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS character_snapshots (
    id                   UUID PRIMARY KEY,
    character_id         UUID NOT NULL,
    event_version        BIGINT NOT NULL,
    total_event_count    BIGINT NOT NULL,
    serialized_state     TEXT NOT NULL,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    is_latest            BOOLEAN NOT NULL DEFAULT FALSE,
    state_size_bytes     BIGINT NOT NULL,
    creation_duration_ms BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_character_snapshots_latest
    ON character_snapshots (character_id, is_latest);

CREATE UNIQUE INDEX IF NOT EXISTS uq_character_snapshots_single_latest
    ON character_snapshots (character_id) WHERE is_latest;
";

/// SQL to create the compressed-event and rollup tables.
pub const CREATE_ARCHIVE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS compressed_events (
    id                    UUID PRIMARY KEY,
    character_id          UUID NOT NULL,
    original_event_id     UUID NOT NULL UNIQUE,
    event_type            VARCHAR(255) NOT NULL,
    sequence_number       BIGINT NOT NULL,
    correlation_id        UUID NOT NULL,
    causation_id          UUID NOT NULL,
    actor_id              VARCHAR(255),
    compressed_payload    BYTEA NOT NULL,
    original_size_bytes   BIGINT NOT NULL,
    compressed_size_bytes BIGINT NOT NULL,
    payload_checksum      CHAR(64) NOT NULL,
    original_timestamp    TIMESTAMPTZ NOT NULL,
    archived_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_compressed_events_character_id
    ON compressed_events (character_id);

CREATE TABLE IF NOT EXISTS event_rollups (
    id                 UUID PRIMARY KEY,
    character_id       UUID NOT NULL,
    event_type         VARCHAR(255) NOT NULL,
    event_count        BIGINT NOT NULL,
    start_timestamp    TIMESTAMPTZ NOT NULL,
    end_timestamp      TIMESTAMPTZ NOT NULL,
    aggregated_payload JSONB NOT NULL,
    original_event_ids UUID[] NOT NULL,
    space_saved_bytes  BIGINT NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_event_rollups_character_id
    ON event_rollups (character_id);
";

/// Every statement needed for a fresh database, in dependency order.
pub const ALL: [&str; 3] = [
    CREATE_EVENTS_TABLE,
    CREATE_SNAPSHOTS_TABLE,
    CREATE_ARCHIVE_TABLES,
];
