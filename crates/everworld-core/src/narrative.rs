//! Narrative source trait and stub implementation.
//!
//! Phrasing event descriptions is an external concern (ultimately an
//! LLM-backed content system). The engine only needs a line of text per
//! synthesized event; the [`NarrativeSource`] trait abstracts where that
//! text comes from, and [`StubNarrative`] produces deterministic phrasing
//! so the evolution cycle can be exercised end-to-end without a backend.

use chrono::{DateTime, Utc};

use everworld_types::EventKind;

/// A source of human-readable event descriptions.
pub trait NarrativeSource: Send + Sync {
    /// Describe one synthesized event. `entity_name` is the display name
    /// of the entity receiving the event.
    fn describe_event(
        &self,
        world_name: &str,
        entity_name: &str,
        kind: EventKind,
        at: DateTime<Utc>,
    ) -> String;
}

/// A deterministic narrative stub used by tests and the demo binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubNarrative;

impl StubNarrative {
    /// Create a new stub narrative source.
    pub const fn new() -> Self {
        Self
    }
}

impl NarrativeSource for StubNarrative {
    fn describe_event(
        &self,
        world_name: &str,
        entity_name: &str,
        kind: EventKind,
        at: DateTime<Utc>,
    ) -> String {
        let date = at.format("%Y-%m-%d");
        match kind {
            EventKind::CharacterIntroduction => {
                format!("{entity_name} arrives in {world_name}.")
            }
            EventKind::DailyLife => format!("{entity_name} goes about the day ({date})."),
            EventKind::EnvironmentalChange => {
                format!("Conditions shift around {entity_name} ({date}).")
            }
            EventKind::ObjectModification => {
                format!("{entity_name} shows signs of change ({date}).")
            }
            EventKind::RelationshipChange => {
                format!("Something shifts between {entity_name} and another ({date}).")
            }
            EventKind::PersonalMilestone => {
                format!("{entity_name} reaches a turning point ({date}).")
            }
            EventKind::SeasonalShift => {
                format!("The season turns over {entity_name} ({date}).")
            }
            EventKind::WorldMilestone => {
                format!("{world_name} marks a milestone at {entity_name} ({date}).")
            }
        }
    }
}
