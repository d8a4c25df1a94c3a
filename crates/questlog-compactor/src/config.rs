//! Environment-driven configuration.

use std::str::FromStr;

use chrono::Duration;
use questlog_character::domain::events::COMBAT_ROLLUP_EVENT_TYPES;
use questlog_engine::archival::ArchivalPolicy;
use questlog_engine::snapshot::SnapshotPolicy;

use crate::error::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Everything one compactor run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactorConfig {
    /// PostgreSQL connection string (`DATABASE_URL`).
    pub database_url: String,
    /// Pool size (`DB_MAX_CONNECTIONS`).
    pub max_connections: u32,
    /// Archival policy handed to the compactor.
    pub archival: ArchivalPolicy,
    /// Snapshots kept per character after pruning.
    pub snapshot_keep_count: usize,
}

impl CompactorConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is unset or any variable
    /// does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `DATABASE_URL` | required |
    /// | `DB_MAX_CONNECTIONS` | 5 |
    /// | `ARCHIVE_RETENTION_DAYS` | 90 |
    /// | `ROLLUP_WINDOW_MINUTES` | 60 |
    /// | `ROLLUP_EVENT_TYPES` | the character combat events, comma separated |
    /// | `ROLLUP_MIN_EVENTS` | 10 |
    /// | `ARCHIVE_BATCH_SIZE` | 1000 |
    /// | `ARCHIVE_PURGE_ORIGINALS` | false |
    /// | `SNAPSHOT_KEEP_COUNT` | 5 |
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any value
    /// does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".into())
            })?;

        let defaults = ArchivalPolicy::default();
        let retention_days: i64 =
            parse_or(&lookup, "ARCHIVE_RETENTION_DAYS", defaults.retention.num_days())?;
        let window_minutes: i64 =
            parse_or(&lookup, "ROLLUP_WINDOW_MINUTES", defaults.rollup_window.num_minutes())?;
        if retention_days < 0 {
            return Err(AppError::Config("ARCHIVE_RETENTION_DAYS must not be negative".into()));
        }
        if window_minutes <= 0 {
            return Err(AppError::Config("ROLLUP_WINDOW_MINUTES must be positive".into()));
        }

        let rollup_event_types = lookup("ROLLUP_EVENT_TYPES").map_or_else(
            || COMBAT_ROLLUP_EVENT_TYPES.iter().map(|t| (*t).to_owned()).collect(),
            |raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned)
                    .collect()
            },
        );

        let archival = ArchivalPolicy {
            retention: Duration::days(retention_days),
            rollup_window: Duration::minutes(window_minutes),
            rollup_event_types,
            min_rollup_size: parse_or(&lookup, "ROLLUP_MIN_EVENTS", defaults.min_rollup_size)?,
            batch_size: parse_or(&lookup, "ARCHIVE_BATCH_SIZE", defaults.batch_size)?,
            purge_originals: parse_or(&lookup, "ARCHIVE_PURGE_ORIGINALS", defaults.purge_originals)?,
        };
        if archival.batch_size == 0 {
            return Err(AppError::Config("ARCHIVE_BATCH_SIZE must be positive".into()));
        }

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            archival,
            snapshot_keep_count: parse_or(
                &lookup,
                "SNAPSHOT_KEEP_COUNT",
                SnapshotPolicy::default().keep_count,
            )?,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be valid: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<CompactorConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        CompactorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        // Act
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/questlog")]).unwrap();

        // Assert
        assert_eq!(config.database_url, "postgres://localhost/questlog");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.snapshot_keep_count, 5);
        assert_eq!(config.archival.retention, Duration::days(90));
        assert_eq!(config.archival.rollup_window, Duration::hours(1));
        assert!(config.archival.is_rollup_type("character.damage_dealt"));
        assert!(!config.archival.purge_originals);
    }

    #[test]
    fn test_overrides_are_parsed() {
        // Arrange
        let vars = [
            ("DATABASE_URL", "postgres://db/questlog"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("ARCHIVE_RETENTION_DAYS", "30"),
            ("ROLLUP_WINDOW_MINUTES", "15"),
            ("ROLLUP_EVENT_TYPES", " character.healed , ,character.damage_taken"),
            ("ROLLUP_MIN_EVENTS", "25"),
            ("ARCHIVE_BATCH_SIZE", "500"),
            ("ARCHIVE_PURGE_ORIGINALS", "true"),
            ("SNAPSHOT_KEEP_COUNT", "2"),
        ];

        // Act
        let config = config_from(&vars).unwrap();

        // Assert
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.snapshot_keep_count, 2);
        assert_eq!(
            config.archival,
            ArchivalPolicy {
                retention: Duration::days(30),
                rollup_window: Duration::minutes(15),
                rollup_event_types: vec![
                    "character.healed".to_owned(),
                    "character.damage_taken".to_owned()
                ],
                min_rollup_size: 25,
                batch_size: 500,
                purge_originals: true,
            }
        );
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let result = config_from(&[("ARCHIVE_RETENTION_DAYS", "30")]);

        match result {
            Err(AppError::Config(msg)) => assert!(msg.contains("DATABASE_URL")),
            other => panic!("expected Config, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_and_out_of_range_values_are_rejected() {
        let url = ("DATABASE_URL", "postgres://localhost/questlog");

        for bad in [
            ("ARCHIVE_BATCH_SIZE", "lots"),
            ("ARCHIVE_BATCH_SIZE", "0"),
            ("ARCHIVE_PURGE_ORIGINALS", "yes"),
            ("ROLLUP_WINDOW_MINUTES", "0"),
            ("ARCHIVE_RETENTION_DAYS", "-1"),
        ] {
            let result = config_from(&[url, bad]);
            assert!(
                matches!(result, Err(AppError::Config(_))),
                "expected {}={} to be rejected",
                bad.0,
                bad.1
            );
        }
    }
}
