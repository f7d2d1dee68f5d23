//! Closed enumerations shared across the Everworld workspace.
//!
//! These enums form the engine's vocabulary: what kinds of entities exist,
//! what kinds of history they accumulate, the lifecycle states of a world,
//! the fault taxonomy used by the recovery coordinator, and the named
//! remedial strategies it dispatches.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// The kind of entity a timeline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A named inhabitant of a world.
    Character,
    /// A place within a world.
    Location,
    /// An item within a world, optionally held at a location.
    Object,
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Character => "character",
            Self::Location => "location",
            Self::Object => "object",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// World lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a world. Worlds are never destroyed; archival is a
/// status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorldStatus {
    /// The world accepts mutation and evolution.
    Active,
    /// The world is held still; evolution is suspended.
    Paused,
    /// The world is retired from play but retained in full.
    Archived,
}

// ---------------------------------------------------------------------------
// Timeline events
// ---------------------------------------------------------------------------

/// Category of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A character enters the world's story.
    CharacterIntroduction,
    /// Ordinary activity in a character's life.
    DailyLife,
    /// A change in a location's conditions.
    EnvironmentalChange,
    /// An object is altered, moved, or repurposed.
    ObjectModification,
    /// The relationship between two characters shifts.
    RelationshipChange,
    /// A significant moment in a character's life.
    PersonalMilestone,
    /// A season turns over, touching the whole world.
    SeasonalShift,
    /// A world-level occurrence produced by a scheduled task.
    WorldMilestone,
}

impl EventKind {
    /// The default event category generated for an entity of the given
    /// kind during routine evolution.
    pub const fn for_entity(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Character => Self::DailyLife,
            EntityKind::Location => Self::EnvironmentalChange,
            EntityKind::Object => Self::ObjectModification,
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::CharacterIntroduction => "character-introduction",
            Self::DailyLife => "daily-life",
            Self::EnvironmentalChange => "environmental-change",
            Self::ObjectModification => "object-modification",
            Self::RelationshipChange => "relationship-change",
            Self::PersonalMilestone => "personal-milestone",
            Self::SeasonalShift => "seasonal-shift",
            Self::WorldMilestone => "world-milestone",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Fault taxonomy
// ---------------------------------------------------------------------------

/// Classified fault categories handled by the recovery coordinator.
///
/// Every internal failure is mapped onto exactly one of these before any
/// recovery strategy is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A timeline's ordering invariant was violated.
    TimelineCorruption,
    /// A character's state no longer parses or self-validates.
    CharacterStateCorruption,
    /// A world aggregate no longer parses or self-validates.
    WorldStateCorruption,
    /// Cross-references between records disagree.
    DataInconsistency,
    /// The persistence collaborator failed.
    PersistenceFailure,
    /// The cache collaborator returned damaged or stale data.
    CacheCorruption,
    /// Input or state failed a validation pass.
    ValidationFailure,
    /// The engine is saturated and shedding work.
    SystemOverload,
    /// A network dependency was unreachable.
    NetworkFailure,
    /// An external collaborator misbehaved.
    DependencyFailure,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::TimelineCorruption => "timeline-corruption",
            Self::CharacterStateCorruption => "character-state-corruption",
            Self::WorldStateCorruption => "world-state-corruption",
            Self::DataInconsistency => "data-inconsistency",
            Self::PersistenceFailure => "persistence-failure",
            Self::CacheCorruption => "cache-corruption",
            Self::ValidationFailure => "validation-failure",
            Self::SystemOverload => "system-overload",
            Self::NetworkFailure => "network-failure",
            Self::DependencyFailure => "dependency-failure",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Recovery strategies
// ---------------------------------------------------------------------------

/// A named remedial action attempted in response to a classified fault.
///
/// The coordinator maps each [`ErrorKind`] to an ordered list of these and
/// attempts them in order, stopping at the first success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecoveryStrategy {
    /// Restore the world from its most recent checkpoint.
    Rollback,
    /// Restore the world from a specific durable checkpoint.
    ResetToCheckpoint,
    /// Reconstruct a minimal valid state from remaining consistent data.
    Rebuild,
    /// Disable the failing subsystem and activate its fallback handler.
    GracefulDegradation,
    /// Drop cached views of the affected world.
    CacheInvalidation,
    /// Apply component-specific sanitation to salvage malformed records.
    DataRepair,
    /// Route the component's work through its registered fallback handler.
    FallbackMode,
    /// Re-initialize the world from its last durable checkpoint or defaults.
    SystemRestart,
}

impl core::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Rollback => "rollback",
            Self::ResetToCheckpoint => "reset-to-checkpoint",
            Self::Rebuild => "rebuild",
            Self::GracefulDegradation => "graceful-degradation",
            Self::CacheInvalidation => "cache-invalidation",
            Self::DataRepair => "data-repair",
            Self::FallbackMode => "fallback-mode",
            Self::SystemRestart => "system-restart",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_event_kind_per_entity() {
        assert_eq!(
            EventKind::for_entity(EntityKind::Character),
            EventKind::DailyLife
        );
        assert_eq!(
            EventKind::for_entity(EntityKind::Location),
            EventKind::EnvironmentalChange
        );
        assert_eq!(
            EventKind::for_entity(EntityKind::Object),
            EventKind::ObjectModification
        );
    }

    #[test]
    fn enums_round_trip_serde() {
        let kind = ErrorKind::TimelineCorruption;
        let json = serde_json::to_string(&kind).unwrap();
        let restored: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, kind);

        let strategy = RecoveryStrategy::GracefulDegradation;
        let json = serde_json::to_string(&strategy).unwrap();
        let restored: RecoveryStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, strategy);
    }

    #[test]
    fn display_names_are_kebab_case() {
        assert_eq!(EventKind::RelationshipChange.to_string(), "relationship-change");
        assert_eq!(ErrorKind::CacheCorruption.to_string(), "cache-corruption");
        assert_eq!(RecoveryStrategy::DataRepair.to_string(), "data-repair");
    }
}
