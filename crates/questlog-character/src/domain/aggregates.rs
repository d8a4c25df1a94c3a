//! Aggregate roots for the Character context.

use std::collections::BTreeMap;

use questlog_core::aggregate::AggregateRoot;
use questlog_core::clock::Clock;
use questlog_core::error::DomainError;
use questlog_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    AttributeModified, CharacterCreated, CharacterEvent, CharacterEventKind, DamageDealt,
    DamageTaken, ExperienceGained, Healed,
};

const MAX_NAME_LENGTH: usize = 64;

/// Inclusive range an attribute score may take.
pub const ATTRIBUTE_RANGE: std::ops::RangeInclusive<i32> = 1..=30;

/// The aggregate root for a character.
///
/// Serializable so the snapshot store can materialize it; pending events are
/// never part of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Sequence number of the last applied event.
    pub(crate) version: i64,
    pub(crate) name: String,
    pub(crate) class: String,
    pub(crate) experience: u64,
    pub(crate) attributes: BTreeMap<String, i32>,
    pub(crate) hit_points: u32,
    pub(crate) max_hit_points: u32,
    pub(crate) damage_dealt: u64,
    pub(crate) damage_taken: u64,
    pub(crate) healing_received: u64,
    #[serde(skip)]
    uncommitted_events: Vec<CharacterEvent>,
}

impl Character {
    /// Returns the next sequence number for a new event.
    fn next_sequence_number(&self) -> i64 {
        self.version + i64::try_from(self.uncommitted_events.len()).unwrap_or(i64::MAX) + 1
    }

    fn exists(&self) -> bool {
        self.version > 0 || self.uncommitted_events.iter().any(DomainEvent::is_creation)
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.exists() {
            Ok(())
        } else {
            Err(DomainError::Validation(format!(
                "character {} has not been created",
                self.id
            )))
        }
    }

    fn record(&mut self, kind: CharacterEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let event = CharacterEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.next_sequence_number(),
                correlation_id,
                causation_id: correlation_id,
                actor_id: None,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.uncommitted_events.push(event);
    }

    /// Creates the character, producing a `CharacterCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the character already exists,
    /// the name or class is blank, the name is too long, or the hit point
    /// maximum is zero.
    pub fn create(
        &mut self,
        name: &str,
        class: &str,
        max_hit_points: u32,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.exists() {
            return Err(DomainError::Validation(format!(
                "character {} already exists",
                self.id
            )));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("character name must not be empty".into()));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(DomainError::Validation(format!(
                "character name must be at most {MAX_NAME_LENGTH} characters"
            )));
        }
        let class = class.trim();
        if class.is_empty() {
            return Err(DomainError::Validation("character class must not be empty".into()));
        }
        if max_hit_points == 0 {
            return Err(DomainError::Validation("max hit points must be positive".into()));
        }

        self.record(
            CharacterEventKind::CharacterCreated(CharacterCreated {
                character_id: self.id,
                name: name.to_owned(),
                class: class.to_owned(),
                max_hit_points,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Sets an attribute score, producing an `AttributeModified` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the character does not exist, the
    /// attribute name is blank, or the value is outside [`ATTRIBUTE_RANGE`].
    pub fn modify_attribute(
        &mut self,
        attribute: &str,
        new_value: i32,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_exists()?;
        let attribute = attribute.trim();
        if attribute.is_empty() {
            return Err(DomainError::Validation("attribute name must not be empty".into()));
        }
        if !ATTRIBUTE_RANGE.contains(&new_value) {
            return Err(DomainError::Validation(format!(
                "{attribute} must be between {} and {}, got {new_value}",
                ATTRIBUTE_RANGE.start(),
                ATTRIBUTE_RANGE.end()
            )));
        }

        self.record(
            CharacterEventKind::AttributeModified(AttributeModified {
                character_id: self.id,
                attribute: attribute.to_lowercase(),
                new_value,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Awards experience, producing an `ExperienceGained` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the character does not exist or
    /// the amount is zero.
    pub fn award_experience(
        &mut self,
        amount: u32,
        source: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_exists()?;
        if amount == 0 {
            return Err(DomainError::Validation("experience award must be positive".into()));
        }

        self.record(
            CharacterEventKind::ExperienceGained(ExperienceGained {
                character_id: self.id,
                amount,
                source: source.to_owned(),
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Records a hit landed by the character, producing a `DamageDealt`
    /// event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the character does not exist, is
    /// defeated, or the amount is zero.
    pub fn deal_damage(
        &mut self,
        amount: u32,
        target: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_exists()?;
        if amount == 0 {
            return Err(DomainError::Validation("damage must be positive".into()));
        }
        if self.version > 0 && self.is_defeated() {
            return Err(DomainError::Validation(format!(
                "{} is defeated and cannot attack",
                self.name
            )));
        }

        self.record(
            CharacterEventKind::DamageDealt(DamageDealt {
                character_id: self.id,
                amount,
                target: target.to_owned(),
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Records a hit suffered by the character, producing a `DamageTaken`
    /// event. Hit points never drop below zero.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the character does not exist or
    /// the amount is zero.
    pub fn take_damage(
        &mut self,
        amount: u32,
        source: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_exists()?;
        if amount == 0 {
            return Err(DomainError::Validation("damage must be positive".into()));
        }

        self.record(
            CharacterEventKind::DamageTaken(DamageTaken {
                character_id: self.id,
                amount,
                source: source.to_owned(),
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Restores hit points, producing a `Healed` event. Hit points never
    /// exceed the maximum.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the character does not exist or
    /// the amount is zero.
    pub fn heal(
        &mut self,
        amount: u32,
        source: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_exists()?;
        if amount == 0 {
            return Err(DomainError::Validation("healing must be positive".into()));
        }

        self.record(
            CharacterEventKind::Healed(Healed {
                character_id: self.id,
                amount,
                source: source.to_owned(),
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Whether the character is at zero hit points.
    #[must_use]
    pub fn is_defeated(&self) -> bool {
        self.hit_points == 0
    }
}

impl AggregateRoot for Character {
    type Event = CharacterEvent;

    fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            name: String::new(),
            class: String::new(),
            experience: 0,
            attributes: BTreeMap::new(),
            hit_points: 0,
            max_hit_points: 0,
            damage_dealt: 0,
            damage_taken: 0,
            healing_received: 0,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            CharacterEventKind::CharacterCreated(payload) => {
                self.name.clone_from(&payload.name);
                self.class.clone_from(&payload.class);
                self.max_hit_points = payload.max_hit_points;
                self.hit_points = payload.max_hit_points;
            }
            CharacterEventKind::AttributeModified(payload) => {
                self.attributes
                    .insert(payload.attribute.clone(), payload.new_value);
            }
            CharacterEventKind::ExperienceGained(payload) => {
                self.experience += u64::from(payload.amount);
            }
            CharacterEventKind::DamageDealt(payload) => {
                self.damage_dealt += u64::from(payload.amount);
            }
            CharacterEventKind::DamageTaken(payload) => {
                self.damage_taken += u64::from(payload.amount);
                self.hit_points = self.hit_points.saturating_sub(payload.amount);
            }
            CharacterEventKind::Healed(payload) => {
                self.healing_received += u64::from(payload.amount);
                self.hit_points = self
                    .hit_points
                    .saturating_add(payload.amount)
                    .min(self.max_hit_points);
            }
        }
        self.version = event.metadata.sequence_number;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn take_uncommitted_events(&mut self) -> Vec<Self::Event> {
        std::mem::take(&mut self.uncommitted_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use questlog_test_support::FixedClock;

    use crate::domain::events::{
        ATTRIBUTE_MODIFIED_EVENT_TYPE, CHARACTER_CREATED_EVENT_TYPE, EXPERIENCE_GAINED_EVENT_TYPE,
    };

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap())
    }

    /// Applies and drains pending events, standing in for a save.
    fn commit(character: &mut Character) {
        for event in character.take_uncommitted_events() {
            character.apply(&event);
        }
    }

    fn created(max_hit_points: u32) -> Character {
        let mut character = Character::new(Uuid::new_v4());
        character
            .create("Aria", "ranger", max_hit_points, Uuid::new_v4(), &clock())
            .unwrap();
        commit(&mut character);
        character
    }

    #[test]
    fn test_create_records_creation_event() {
        // Arrange
        let id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let mut character = Character::new(id);

        // Act
        character
            .create("  Aria  ", "ranger", 24, correlation_id, &clock())
            .unwrap();

        // Assert
        let events = character.uncommitted_events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type(), CHARACTER_CREATED_EVENT_TYPE);
        assert_eq!(event.metadata.event_type, CHARACTER_CREATED_EVENT_TYPE);
        assert_eq!(event.metadata.aggregate_id, id);
        assert_eq!(event.metadata.sequence_number, 1);
        assert_eq!(event.metadata.correlation_id, correlation_id);
        assert_eq!(event.metadata.occurred_at, clock().0);
        match &event.kind {
            CharacterEventKind::CharacterCreated(payload) => {
                assert_eq!(payload.name, "Aria");
                assert_eq!(payload.max_hit_points, 24);
            }
            other => panic!("expected CharacterCreated, got {other:?}"),
        }
    }

    #[test]
    fn test_create_twice_is_rejected() {
        let mut character = Character::new(Uuid::new_v4());
        character.create("Aria", "ranger", 24, Uuid::new_v4(), &clock()).unwrap();

        let result = character.create("Aria", "ranger", 24, Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_create_validates_name_class_and_hit_points() {
        let mut character = Character::new(Uuid::new_v4());
        let long_name = "x".repeat(MAX_NAME_LENGTH + 1);

        let cases = [
            ("  ", "ranger", 10),
            (long_name.as_str(), "ranger", 10),
            ("Aria", "", 10),
            ("Aria", "ranger", 0),
        ];

        for (name, class, hp) in cases {
            let result = character.create(name, class, hp, Uuid::new_v4(), &clock());
            assert!(
                matches!(result, Err(DomainError::Validation(_))),
                "expected validation error for ({name:?}, {class:?}, {hp})"
            );
        }
        assert!(character.uncommitted_events().is_empty());
    }

    #[test]
    fn test_commands_on_missing_character_are_rejected() {
        let mut character = Character::new(Uuid::new_v4());

        let result = character.award_experience(50, "quest", Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_pending_events_get_consecutive_sequence_numbers() {
        // Arrange
        let mut character = created(20);

        // Act
        character.award_experience(100, "goblin camp", Uuid::new_v4(), &clock()).unwrap();
        character.modify_attribute("Strength", 14, Uuid::new_v4(), &clock()).unwrap();

        // Assert
        let events = character.uncommitted_events();
        assert_eq!(events[0].metadata.sequence_number, 2);
        assert_eq!(events[0].metadata.event_type, EXPERIENCE_GAINED_EVENT_TYPE);
        assert_eq!(events[1].metadata.sequence_number, 3);
        assert_eq!(events[1].metadata.event_type, ATTRIBUTE_MODIFIED_EVENT_TYPE);
        match &events[1].kind {
            CharacterEventKind::AttributeModified(payload) => {
                assert_eq!(payload.attribute, "strength");
            }
            other => panic!("expected AttributeModified, got {other:?}"),
        }
    }

    #[test]
    fn test_attribute_out_of_range_is_rejected() {
        let mut character = created(20);

        let too_high = character.modify_attribute("wisdom", 31, Uuid::new_v4(), &clock());
        let too_low = character.modify_attribute("wisdom", 0, Uuid::new_v4(), &clock());

        assert!(matches!(too_high, Err(DomainError::Validation(_))));
        assert!(matches!(too_low, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_apply_tracks_hit_points_and_combat_totals() {
        // Arrange
        let mut character = created(20);

        // Act
        character.deal_damage(7, "wolf", Uuid::new_v4(), &clock()).unwrap();
        character.take_damage(15, "wolf", Uuid::new_v4(), &clock()).unwrap();
        character.heal(50, "potion", Uuid::new_v4(), &clock()).unwrap();
        character.take_damage(30, "dragon", Uuid::new_v4(), &clock()).unwrap();
        commit(&mut character);

        // Assert
        assert_eq!(character.version(), 5);
        assert_eq!(character.damage_dealt, 7);
        assert_eq!(character.damage_taken, 45);
        assert_eq!(character.healing_received, 50);
        assert_eq!(character.hit_points, 0);
        assert!(character.is_defeated());
    }

    #[test]
    fn test_defeated_character_cannot_attack() {
        let mut character = created(5);
        character.take_damage(5, "trap", Uuid::new_v4(), &clock()).unwrap();
        commit(&mut character);

        let result = character.deal_damage(3, "trap", Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_snapshot_state_omits_pending_events() {
        // Arrange
        let mut character = created(12);
        character.award_experience(40, "riddle", Uuid::new_v4(), &clock()).unwrap();

        // Act
        let state = serde_json::to_value(&character).unwrap();
        let restored: Character = serde_json::from_value(state.clone()).unwrap();

        // Assert
        assert!(state.get("uncommitted_events").is_none());
        assert!(restored.uncommitted_events().is_empty());
        assert_eq!(restored.version(), 1);
        assert_eq!(restored.name, "Aria");
    }
}
