//! Event handlers for the Character context.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use questlog_core::error::DomainError;
use questlog_core::event::DomainEvent;
use questlog_core::handler::EventHandler;
use questlog_core::repository::StoredEvent;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::events::{CharacterEvent, CharacterEventKind};

/// Running combat totals for one character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CombatTotals {
    /// Damage-dealt events seen.
    pub hits_landed: u64,
    /// Sum of damage dealt.
    pub damage_dealt: u64,
    /// Damage-taken events seen.
    pub hits_taken: u64,
    /// Sum of damage taken.
    pub damage_taken: u64,
    /// Sum of healing received.
    pub healing_received: u64,
}

/// Keeps per-character combat statistics from dispatched events.
///
/// The ledger is a read model: it only sees events dispatched while it is
/// registered and, with at-least-once delivery, may count a redelivered
/// event twice. The event log stays the source of truth.
#[derive(Debug, Default)]
pub struct CombatLedger {
    totals: Mutex<HashMap<Uuid, CombatTotals>>,
}

impl CombatLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals for `character_id`, all zero when nothing was recorded.
    #[must_use]
    pub fn totals(&self, character_id: Uuid) -> CombatTotals {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&character_id)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventHandler for CombatLedger {
    fn name(&self) -> &str {
        "combat-ledger"
    }

    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError> {
        let Some(decoded) = CharacterEvent::from_stored(event)? else {
            return Ok(());
        };
        let mut totals = self.totals.lock().map_err(|_| DomainError::HandlerFailure {
            handler: self.name().to_owned(),
            reason: "ledger lock poisoned".into(),
        })?;
        let entry = totals.entry(event.aggregate_id).or_default();
        match &decoded.kind {
            CharacterEventKind::DamageDealt(payload) => {
                entry.hits_landed += 1;
                entry.damage_dealt += u64::from(payload.amount);
            }
            CharacterEventKind::DamageTaken(payload) => {
                entry.hits_taken += 1;
                entry.damage_taken += u64::from(payload.amount);
            }
            CharacterEventKind::Healed(payload) => {
                entry.healing_received += u64::from(payload.amount);
            }
            _ => return Ok(()),
        }
        debug!(
            character_id = %event.aggregate_id,
            event_type = decoded.event_type(),
            "combat ledger updated"
        );
        Ok(())
    }
}
