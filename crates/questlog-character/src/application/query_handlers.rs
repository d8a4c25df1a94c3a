//! Query handlers for the Character context.
//!
//! Queries read through the same [`AggregateStore`] as commands, so a store
//! backed by snapshots serves them from the latest snapshot plus its tail.

use std::collections::BTreeMap;

use questlog_core::aggregate::AggregateRoot;
use questlog_core::error::DomainError;
use questlog_engine::AggregateStore;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::Character;

/// Read-only view of a character sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterView {
    /// The character identifier.
    pub character_id: Uuid,
    /// The character's name.
    pub name: String,
    /// The character's class.
    pub class: String,
    /// Total experience earned.
    pub experience: u64,
    /// Attribute scores by lower-case name.
    pub attributes: BTreeMap<String, i32>,
    /// Remaining hit points.
    pub hit_points: u32,
    /// Hit points at full health.
    pub max_hit_points: u32,
    /// Lifetime damage inflicted.
    pub damage_dealt: u64,
    /// Lifetime damage suffered.
    pub damage_taken: u64,
    /// Lifetime healing received.
    pub healing_received: u64,
    /// Current version (sequence number of the last event).
    pub version: i64,
}

impl From<&Character> for CharacterView {
    fn from(character: &Character) -> Self {
        Self {
            character_id: character.id,
            name: character.name.clone(),
            class: character.class.clone(),
            experience: character.experience,
            attributes: character.attributes.clone(),
            hit_points: character.hit_points,
            max_hit_points: character.max_hit_points,
            damage_dealt: character.damage_dealt,
            damage_taken: character.damage_taken,
            healing_received: character.healing_received,
            version: character.version(),
        }
    }
}

/// Retrieves a character by its aggregate ID.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::CorruptAggregate` if the history cannot be folded.
pub async fn get_character_by_id(
    character_id: Uuid,
    store: &dyn AggregateStore<Character>,
) -> Result<CharacterView, DomainError> {
    let character = store.load(character_id).await?;
    Ok(CharacterView::from(&character))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use questlog_core::repository::{EventRepository, StoredEvent};
    use questlog_engine::{EventDispatcher, ReplayRepository};
    use questlog_event_store::InMemoryEventRepository;
    use questlog_test_support::stored_event;
    use serde_json::json;

    use super::*;
    use crate::domain::events::{
        AttributeModified, CharacterCreated, CharacterEventKind, ExperienceGained,
    };

    fn payload(kind: &CharacterEventKind) -> serde_json::Value {
        serde_json::to_value(kind).unwrap()
    }

    fn history(character_id: Uuid) -> Vec<StoredEvent> {
        vec![
            stored_event(
                character_id,
                1,
                "character.created",
                payload(&CharacterEventKind::CharacterCreated(CharacterCreated {
                    character_id,
                    name: "Mirela".to_owned(),
                    class: "cleric".to_owned(),
                    max_hit_points: 22,
                })),
            ),
            stored_event(
                character_id,
                2,
                "character.attribute_modified",
                payload(&CharacterEventKind::AttributeModified(AttributeModified {
                    character_id,
                    attribute: "wisdom".to_owned(),
                    new_value: 17,
                })),
            ),
            stored_event(
                character_id,
                3,
                "character.title_granted",
                json!({"TitleGranted": {"title": "Lightbringer"}}),
            ),
            stored_event(
                character_id,
                4,
                "character.experience_gained",
                payload(&CharacterEventKind::ExperienceGained(ExperienceGained {
                    character_id,
                    amount: 300,
                    source: "quest:bell-tower".to_owned(),
                })),
            ),
        ]
    }

    async fn store_with(events: &[StoredEvent]) -> ReplayRepository<Character> {
        let repo = Arc::new(InMemoryEventRepository::new());
        if let Some(first) = events.first() {
            repo.append_events(first.aggregate_id, 0, events).await.unwrap();
        }
        ReplayRepository::new(Arc::new(EventDispatcher::new(repo)))
    }

    #[tokio::test]
    async fn test_get_character_by_id_folds_history_into_view() {
        // Arrange
        let character_id = Uuid::new_v4();
        let store = store_with(&history(character_id)).await;

        // Act
        let view = get_character_by_id(character_id, &store).await.unwrap();

        // Assert
        assert_eq!(view.character_id, character_id);
        assert_eq!(view.name, "Mirela");
        assert_eq!(view.class, "cleric");
        assert_eq!(view.attributes.get("wisdom"), Some(&17));
        assert_eq!(view.experience, 300);
        assert_eq!(view.hit_points, 22);
        // The unrecognized event still counts toward the version.
        assert_eq!(view.version, 4);
    }

    #[tokio::test]
    async fn test_get_character_by_id_returns_not_found_for_unknown_id() {
        // Arrange
        let store = store_with(&[]).await;
        let character_id = Uuid::new_v4();

        // Act
        let result = get_character_by_id(character_id, &store).await;

        // Assert
        match result {
            Err(DomainError::AggregateNotFound(id)) => assert_eq!(id, character_id),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_view_serializes_for_api_consumers() {
        let character = Character::new(Uuid::new_v4());

        let value = serde_json::to_value(CharacterView::from(&character)).unwrap();

        assert_eq!(value["version"], json!(0));
        assert_eq!(value["attributes"], json!({}));
    }
}
