//! Domain events for the Character context.

use questlog_core::error::DomainError;
use questlog_core::event::{DomainEvent, EventMetadata};
use questlog_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type constant for character creation.
pub const CHARACTER_CREATED_EVENT_TYPE: &str = "character.created";
/// Event type constant for attribute modification.
pub const ATTRIBUTE_MODIFIED_EVENT_TYPE: &str = "character.attribute_modified";
/// Event type constant for experience gain.
pub const EXPERIENCE_GAINED_EVENT_TYPE: &str = "character.experience_gained";
/// Event type constant for damage dealt to a target.
pub const DAMAGE_DEALT_EVENT_TYPE: &str = "character.damage_dealt";
/// Event type constant for damage suffered.
pub const DAMAGE_TAKEN_EVENT_TYPE: &str = "character.damage_taken";
/// Event type constant for healing received.
pub const HEALED_EVENT_TYPE: &str = "character.healed";

/// High-volume combat events whose per-event detail can be rolled up once
/// they age out of the retention window.
pub const COMBAT_ROLLUP_EVENT_TYPES: [&str; 3] = [
    DAMAGE_DEALT_EVENT_TYPE,
    DAMAGE_TAKEN_EVENT_TYPE,
    HEALED_EVENT_TYPE,
];

/// Emitted when a new character is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterCreated {
    /// The character identifier.
    pub character_id: Uuid,
    /// The character's name.
    pub name: String,
    /// The character's class.
    pub class: String,
    /// Hit points at full health.
    pub max_hit_points: u32,
}

/// Emitted when a character attribute is modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeModified {
    /// The character identifier.
    pub character_id: Uuid,
    /// The attribute that was modified.
    pub attribute: String,
    /// The new value of the attribute.
    pub new_value: i32,
}

/// Emitted when a character gains experience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceGained {
    /// The character identifier.
    pub character_id: Uuid,
    /// The amount of experience gained.
    pub amount: u32,
    /// What the experience was awarded for.
    pub source: String,
}

/// Emitted when a character lands a hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageDealt {
    /// The character identifier.
    pub character_id: Uuid,
    /// Damage inflicted.
    pub amount: u32,
    /// Who or what was hit.
    pub target: String,
}

/// Emitted when a character is hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageTaken {
    /// The character identifier.
    pub character_id: Uuid,
    /// Damage suffered before clamping to remaining hit points.
    pub amount: u32,
    /// Who or what dealt the damage.
    pub source: String,
}

/// Emitted when a character recovers hit points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Healed {
    /// The character identifier.
    pub character_id: Uuid,
    /// Hit points restored before clamping to the maximum.
    pub amount: u32,
    /// Potion, spell, rest.
    pub source: String,
}

/// Event payload variants for the Character context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacterEventKind {
    /// A new character was created.
    CharacterCreated(CharacterCreated),
    /// A character attribute was modified.
    AttributeModified(AttributeModified),
    /// A character gained experience.
    ExperienceGained(ExperienceGained),
    /// A character dealt damage.
    DamageDealt(DamageDealt),
    /// A character took damage.
    DamageTaken(DamageTaken),
    /// A character was healed.
    Healed(Healed),
}

impl CharacterEventKind {
    /// The event type this payload is stored under.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CharacterCreated(_) => CHARACTER_CREATED_EVENT_TYPE,
            Self::AttributeModified(_) => ATTRIBUTE_MODIFIED_EVENT_TYPE,
            Self::ExperienceGained(_) => EXPERIENCE_GAINED_EVENT_TYPE,
            Self::DamageDealt(_) => DAMAGE_DEALT_EVENT_TYPE,
            Self::DamageTaken(_) => DAMAGE_TAKEN_EVENT_TYPE,
            Self::Healed(_) => HEALED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the Character context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: CharacterEventKind,
}

impl DomainEvent for CharacterEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(&self.kind).expect("CharacterEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn is_creation(&self) -> bool {
        matches!(self.kind, CharacterEventKind::CharacterCreated(_))
    }

    fn from_stored(stored: &StoredEvent) -> Result<Option<Self>, DomainError> {
        if !stored.event_type.starts_with("character.") {
            return Ok(None);
        }
        let kind: CharacterEventKind = match serde_json::from_value(stored.payload.clone()) {
            Ok(kind) => kind,
            // A newer event type in our namespace that this build predates.
            Err(_) if !is_known_event_type(&stored.event_type) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if kind.event_type() != stored.event_type {
            return Err(DomainError::Serialization(format!(
                "event {} is stored as {} but carries a {} payload",
                stored.event_id,
                stored.event_type,
                kind.event_type()
            )));
        }
        Ok(Some(Self {
            metadata: EventMetadata::from_stored(stored),
            kind,
        }))
    }
}

fn is_known_event_type(event_type: &str) -> bool {
    matches!(
        event_type,
        CHARACTER_CREATED_EVENT_TYPE
            | ATTRIBUTE_MODIFIED_EVENT_TYPE
            | EXPERIENCE_GAINED_EVENT_TYPE
            | DAMAGE_DEALT_EVENT_TYPE
            | DAMAGE_TAKEN_EVENT_TYPE
            | HEALED_EVENT_TYPE
    )
}
