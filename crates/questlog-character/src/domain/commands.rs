//! Commands for the Character context.
//!
//! `actor_id` names whoever issued the command; it is stamped onto every
//! event the command produces.

use uuid::Uuid;

/// Command to create a new character.
#[derive(Debug, Clone)]
pub struct CreateCharacter {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The character identifier chosen by the caller.
    pub character_id: Uuid,
    /// The character's name.
    pub name: String,
    /// The character's class.
    pub class: String,
    /// Hit points at full health.
    pub max_hit_points: u32,
    /// Who issued the command.
    pub actor_id: Option<String>,
}

/// Command to modify a character attribute.
#[derive(Debug, Clone)]
pub struct ModifyAttribute {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The character identifier.
    pub character_id: Uuid,
    /// The attribute key.
    pub attribute: String,
    /// The new value.
    pub new_value: i32,
    /// Who issued the command.
    pub actor_id: Option<String>,
}

/// Command to award experience to a character.
#[derive(Debug, Clone)]
pub struct AwardExperience {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The character identifier.
    pub character_id: Uuid,
    /// The amount of experience to award.
    pub amount: u32,
    /// What the experience is for.
    pub source: String,
    /// Who issued the command.
    pub actor_id: Option<String>,
}

/// Command recording a hit landed by the character.
#[derive(Debug, Clone)]
pub struct DealDamage {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The character identifier.
    pub character_id: Uuid,
    /// Damage inflicted.
    pub amount: u32,
    /// Who or what was hit.
    pub target: String,
    /// Who issued the command.
    pub actor_id: Option<String>,
}

/// Command recording a hit suffered by the character.
#[derive(Debug, Clone)]
pub struct TakeDamage {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The character identifier.
    pub character_id: Uuid,
    /// Damage suffered.
    pub amount: u32,
    /// Who or what dealt the damage.
    pub source: String,
    /// Who issued the command.
    pub actor_id: Option<String>,
}

/// Command restoring hit points.
#[derive(Debug, Clone)]
pub struct Heal {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The character identifier.
    pub character_id: Uuid,
    /// Hit points to restore.
    pub amount: u32,
    /// Potion, spell, rest.
    pub source: String,
    /// Who issued the command.
    pub actor_id: Option<String>,
}
