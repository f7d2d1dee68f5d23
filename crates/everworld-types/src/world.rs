//! The world aggregate and its entity state maps.
//!
//! A [`World`] is one independent simulated environment with its own
//! clock, entities, configuration flags, and deferred evolution tasks.
//! Worlds are mutated only through the world state manager; this crate
//! defines the shape, not the behavior.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::WorldStatus;
use crate::ids::{EntityId, WorldId};

// ---------------------------------------------------------------------------
// Entity state
// ---------------------------------------------------------------------------

/// A relationship between two characters.
///
/// Symmetry (if A relates to B, B relates to A) is a consistency-validation
/// concern, not a construction-time guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Free-form label for the relationship ("friend", "rival", ...).
    pub kind: String,
    /// Signed strength in `[-1.0, 1.0]`; negative is adversarial.
    pub strength: f64,
}

impl Relationship {
    /// Create a relationship with the strength clamped to `[-1.0, 1.0]`.
    pub fn new(kind: impl Into<String>, strength: f64) -> Self {
        Self {
            kind: kind.into(),
            strength: strength.clamp(-1.0, 1.0),
        }
    }
}

/// Mutable state of a character within a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CharacterState {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Open-ended trait map handed to content generation.
    pub traits: BTreeMap<String, serde_json::Value>,
    /// Relationships keyed by the other character's ID.
    pub relationships: BTreeMap<EntityId, Relationship>,
}

/// Mutable state of a location within a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LocationState {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Open-ended attribute map.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Mutable state of an object within a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ObjectState {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Open-ended attribute map.
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// The location holding this object, when placed.
    pub location: Option<EntityId>,
}

// ---------------------------------------------------------------------------
// Flags and schedule
// ---------------------------------------------------------------------------

/// Per-world evolution configuration.
///
/// Event rates are per-simulated-day trigger probabilities; they are
/// clamped to `[0.0, 1.0]` at draw time, so out-of-range stored values
/// degrade gracefully instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldFlags {
    /// Whether `evolve_world` is allowed to mutate this world at all.
    pub auto_evolution: bool,
    /// Multiplier from elapsed days to simulated evolution days; must be
    /// positive.
    pub evolution_speed: f64,
    /// Per-day event trigger probability for characters.
    pub character_event_rate: f64,
    /// Per-day event trigger probability for locations.
    pub location_event_rate: f64,
    /// Per-day event trigger probability for objects.
    pub object_event_rate: f64,
    /// Cap on generated events per simulated day across all entities.
    pub max_events_per_day: u32,
    /// Whether season boundaries generate world-wide events.
    pub seasonal_evolution: bool,
    /// Whether character pairs periodically generate relationship events.
    pub relationship_evolution: bool,
    /// Reduced-rate mode used while no player is present.
    pub background_processing: bool,
    /// Rate multiplier applied while `background_processing` is set.
    pub background_rate_scale: f64,
    /// Cap on retained events per entity timeline; oldest are trimmed.
    pub max_timeline_events: usize,
}

impl Default for WorldFlags {
    fn default() -> Self {
        Self {
            auto_evolution: true,
            evolution_speed: 1.0,
            character_event_rate: 0.15,
            location_event_rate: 0.08,
            object_event_rate: 0.05,
            max_events_per_day: 10,
            seasonal_evolution: true,
            relationship_evolution: true,
            background_processing: false,
            background_rate_scale: 0.25,
            max_timeline_events: 1000,
        }
    }
}

/// A deferred unit of evolution work queued on a world.
///
/// Tasks are drained during evolution once the simulated clock passes
/// their due time, each producing a world-milestone event on its target
/// entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionTask {
    /// Stable identifier for the task.
    pub task_id: String,
    /// The entity the task concerns.
    pub target: EntityId,
    /// What should happen when the task comes due.
    pub description: String,
    /// Simulated time at which the task becomes due.
    pub due_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// World aggregate
// ---------------------------------------------------------------------------

/// One independent simulated world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    /// Unique identifier.
    pub world_id: WorldId,
    /// Display name.
    pub world_name: String,
    /// Simulated clock; monotonic except under explicit rollback.
    pub current_time: DateTime<Utc>,
    /// Characters keyed by entity ID.
    pub active_characters: BTreeMap<EntityId, CharacterState>,
    /// Locations keyed by entity ID.
    pub active_locations: BTreeMap<EntityId, LocationState>,
    /// Objects keyed by entity ID.
    pub active_objects: BTreeMap<EntityId, ObjectState>,
    /// Evolution configuration.
    pub world_flags: WorldFlags,
    /// Deferred evolution tasks, drained when due.
    pub evolution_schedule: Vec<EvolutionTask>,
    /// Lifecycle status.
    pub world_status: WorldStatus,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the last mutation.
    pub last_updated: DateTime<Utc>,
    /// Wall-clock time of the last completed evolution cycle.
    pub last_evolution: Option<DateTime<Utc>>,
    /// Wall-clock time of the last recorded player visit.
    pub player_last_visit: Option<DateTime<Utc>>,
}

impl World {
    /// Create an empty active world with the given flags. The simulated
    /// clock starts at the creation instant.
    pub fn new(world_id: WorldId, world_name: impl Into<String>, flags: WorldFlags) -> Self {
        let now = Utc::now();
        Self {
            world_id,
            world_name: world_name.into(),
            current_time: now,
            active_characters: BTreeMap::new(),
            active_locations: BTreeMap::new(),
            active_objects: BTreeMap::new(),
            world_flags: flags,
            evolution_schedule: Vec::new(),
            world_status: WorldStatus::Active,
            created_at: now,
            last_updated: now,
            last_evolution: None,
            player_last_visit: None,
        }
    }

    /// True when an entity of any kind with this ID exists in the world.
    pub fn entity_exists(&self, entity_id: &EntityId) -> bool {
        self.active_characters.contains_key(entity_id)
            || self.active_locations.contains_key(entity_id)
            || self.active_objects.contains_key(entity_id)
    }

    /// Total number of entities across all three maps.
    pub fn entity_count(&self) -> usize {
        self.active_characters
            .len()
            .saturating_add(self.active_locations.len())
            .saturating_add(self.active_objects.len())
    }

    /// Record a mutation instant on the aggregate.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_world_is_active_and_empty() {
        let world = World::new(WorldId::new("W1"), "Thornvale", WorldFlags::default());
        assert_eq!(world.world_status, WorldStatus::Active);
        assert_eq!(world.entity_count(), 0);
        assert!(world.last_evolution.is_none());
        assert_eq!(world.current_time, world.created_at);
    }

    #[test]
    fn entity_exists_checks_all_three_maps() {
        let mut world = World::new(WorldId::new("W1"), "Thornvale", WorldFlags::default());
        world
            .active_characters
            .insert(EntityId::from("elena"), CharacterState::default());
        world
            .active_locations
            .insert(EntityId::from("mill"), LocationState::default());
        world
            .active_objects
            .insert(EntityId::from("lantern"), ObjectState::default());

        assert!(world.entity_exists(&EntityId::from("elena")));
        assert!(world.entity_exists(&EntityId::from("mill")));
        assert!(world.entity_exists(&EntityId::from("lantern")));
        assert!(!world.entity_exists(&EntityId::from("ghost")));
        assert_eq!(world.entity_count(), 3);
    }

    #[test]
    fn relationship_strength_is_clamped() {
        let rel = Relationship::new("rival", -3.5);
        assert!((rel.strength - (-1.0)).abs() < f64::EPSILON);
        let rel = Relationship::new("friend", 2.0);
        assert!((rel.strength - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn world_round_trips_serde() {
        let mut world = World::new(WorldId::new("W1"), "Thornvale", WorldFlags::default());
        world.active_characters.insert(
            EntityId::from("elena"),
            CharacterState {
                name: "Elena".to_owned(),
                description: "A miller's daughter.".to_owned(),
                traits: BTreeMap::new(),
                relationships: BTreeMap::new(),
            },
        );
        let json = serde_json::to_value(&world).unwrap();
        let restored: World = serde_json::from_value(json).unwrap();
        assert_eq!(restored, world);
    }
}
