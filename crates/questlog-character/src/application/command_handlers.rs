//! Command handlers for the Character context.
//!
//! Each handler loads the character through an [`AggregateStore`], runs the
//! domain method, and saves the pending events. The store decides whether
//! the load goes through a snapshot and whether the save schedules one.

use questlog_core::aggregate::AggregateRoot;
use questlog_core::clock::Clock;
use questlog_core::error::DomainError;
use questlog_core::repository::StoredEvent;
use questlog_engine::AggregateStore;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::Character;
use crate::domain::commands::{
    AwardExperience, CreateCharacter, DealDamage, Heal, ModifyAttribute, TakeDamage,
};

/// Loads a character, applies `change`, and saves the result.
async fn update<F>(
    store: &dyn AggregateStore<Character>,
    character_id: Uuid,
    actor_id: Option<&str>,
    change: F,
) -> Result<Vec<StoredEvent>, DomainError>
where
    F: FnOnce(&mut Character) -> Result<(), DomainError>,
{
    let mut character = store.load(character_id).await?;
    change(&mut character)?;
    store.save(&mut character, actor_id).await
}

/// Handles the `CreateCharacter` command: creates a fresh aggregate, applies
/// the create domain method, and persists the resulting events.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a bad name, class, or hit point
/// maximum, and `DomainError::ConcurrencyConflict` if the id is taken.
#[instrument(skip_all, fields(character_id = %command.character_id))]
pub async fn handle_create_character(
    command: &CreateCharacter,
    clock: &dyn Clock,
    store: &dyn AggregateStore<Character>,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut character = Character::new(command.character_id);
    character.create(
        &command.name,
        &command.class,
        command.max_hit_points,
        command.correlation_id,
        clock,
    )?;

    let stored = store
        .save(&mut character, command.actor_id.as_deref())
        .await?;
    info!(name = %character.name, class = %character.class, "character created");
    Ok(stored)
}

/// Handles the `ModifyAttribute` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown character,
/// `DomainError::Validation` for a bad attribute, and any storage error.
#[instrument(skip_all, fields(character_id = %command.character_id))]
pub async fn handle_modify_attribute(
    command: &ModifyAttribute,
    clock: &dyn Clock,
    store: &dyn AggregateStore<Character>,
) -> Result<Vec<StoredEvent>, DomainError> {
    update(store, command.character_id, command.actor_id.as_deref(), |c| {
        c.modify_attribute(
            &command.attribute,
            command.new_value,
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `AwardExperience` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown character,
/// `DomainError::Validation` for a zero amount, and any storage error.
#[instrument(skip_all, fields(character_id = %command.character_id, amount = command.amount))]
pub async fn handle_award_experience(
    command: &AwardExperience,
    clock: &dyn Clock,
    store: &dyn AggregateStore<Character>,
) -> Result<Vec<StoredEvent>, DomainError> {
    update(store, command.character_id, command.actor_id.as_deref(), |c| {
        c.award_experience(command.amount, &command.source, command.correlation_id, clock)
    })
    .await
}

/// Handles the `DealDamage` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown character,
/// `DomainError::Validation` for a zero amount or a defeated attacker, and
/// any storage error.
#[instrument(skip_all, fields(character_id = %command.character_id, amount = command.amount))]
pub async fn handle_deal_damage(
    command: &DealDamage,
    clock: &dyn Clock,
    store: &dyn AggregateStore<Character>,
) -> Result<Vec<StoredEvent>, DomainError> {
    update(store, command.character_id, command.actor_id.as_deref(), |c| {
        c.deal_damage(command.amount, &command.target, command.correlation_id, clock)
    })
    .await
}

/// Handles the `TakeDamage` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown character,
/// `DomainError::Validation` for a zero amount, and any storage error.
#[instrument(skip_all, fields(character_id = %command.character_id, amount = command.amount))]
pub async fn handle_take_damage(
    command: &TakeDamage,
    clock: &dyn Clock,
    store: &dyn AggregateStore<Character>,
) -> Result<Vec<StoredEvent>, DomainError> {
    update(store, command.character_id, command.actor_id.as_deref(), |c| {
        c.take_damage(command.amount, &command.source, command.correlation_id, clock)
    })
    .await
}

/// Handles the `Heal` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown character,
/// `DomainError::Validation` for a zero amount, and any storage error.
#[instrument(skip_all, fields(character_id = %command.character_id, amount = command.amount))]
pub async fn handle_heal(
    command: &Heal,
    clock: &dyn Clock,
    store: &dyn AggregateStore<Character>,
) -> Result<Vec<StoredEvent>, DomainError> {
    update(store, command.character_id, command.actor_id.as_deref(), |c| {
        c.heal(command.amount, &command.source, command.correlation_id, clock)
    })
    .await
}
