//! The world state manager: owner of every active world.
//!
//! All state is instance-owned, never global: the manager holds an index
//! from world id to an owned, individually locked world slot (the
//! aggregate plus its timeline engine), the collaborator handles, the
//! recovery coordinator, the health monitor, and a seeded random source.
//! Constructing two managers side by side (as the tests do) yields two
//! fully independent engines.
//!
//! Concurrency: mutating operations lock exactly one world's slot, so
//! distinct worlds evolve in parallel while each world sees at most one
//! writer. Readers receive cloned snapshots and can never observe a
//! half-applied mutation.
//!
//! `evolve_world` follows a checkpoint-then-mutate-then-commit-or-
//! rollback discipline: a checkpoint is taken before any state change,
//! and any failure during the cycle restores that checkpoint, so the
//! cycle is all-or-nothing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use chrono::{Duration, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use everworld_recovery::{
    DEFAULT_MAX_CHECKPOINTS, ErrorContext, HealthMonitor, RecoveryCoordinator,
};
use everworld_store::{
    CacheAdmin, StoreError, TimelineDocument, WorldCache, WorldDocument, WorldStore,
    world_state_key,
};
use everworld_timeline::TimelineEngine;
use everworld_types::{
    CharacterState, EntityId, EntityKind, ErrorStatistics, EventKind, EvolutionResult,
    EvolutionTask, LocationState, ObjectState, RecoveryResult, Relationship, TimelineEvent,
    ValidationResult, World, WorldId, WorldStatus, WorldSummary,
};

use crate::config::{EvolutionParams, WorldConfig};
use crate::error::EngineError;
use crate::evolution::run_evolution_cycle;
use crate::narrative::{NarrativeSource, StubNarrative};
use crate::validation::validate_slot;

/// Time-to-live for cached world documents.
const CACHE_TTL: Option<std::time::Duration> = Some(std::time::Duration::from_secs(3600));

/// One world's in-memory state: the aggregate plus its timelines.
///
/// Serialized as `{"world": ..., "timelines": ...}`; checkpoint
/// snapshots and the recovery layer rely on that field layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WorldSlot {
    /// The world aggregate.
    pub world: World,
    /// The timelines owned by the world's entities.
    pub timelines: TimelineEngine,
}

/// One mutation operation applied by [`WorldStateManager::update_world_state`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldChange {
    /// Add a character and seed its timeline with an introduction event.
    AddCharacter {
        /// Unique entity id.
        entity_id: EntityId,
        /// Display name.
        name: String,
        /// Free-form description.
        description: String,
    },
    /// Add a location and seed its timeline.
    AddLocation {
        /// Unique entity id.
        entity_id: EntityId,
        /// Display name.
        name: String,
        /// Free-form description.
        description: String,
    },
    /// Add an object, optionally placed at a known location, and seed
    /// its timeline.
    AddObject {
        /// Unique entity id.
        entity_id: EntityId,
        /// Display name.
        name: String,
        /// Free-form description.
        description: String,
        /// Initial placement, which must name a known location.
        location: Option<EntityId>,
    },
    /// Update a character's description and merge trait values.
    ModifyCharacter {
        /// The character to update.
        entity_id: EntityId,
        /// Replacement description, when present.
        description: Option<String>,
        /// Trait keys to merge in.
        set_traits: BTreeMap<String, serde_json::Value>,
    },
    /// Update a location's description and merge attribute values.
    ModifyLocation {
        /// The location to update.
        entity_id: EntityId,
        /// Replacement description, when present.
        description: Option<String>,
        /// Attribute keys to merge in.
        set_attributes: BTreeMap<String, serde_json::Value>,
    },
    /// Update an object's description or move it to a known location.
    ModifyObject {
        /// The object to update.
        entity_id: EntityId,
        /// Replacement description, when present.
        description: Option<String>,
        /// New placement, which must name a known location.
        move_to: Option<EntityId>,
    },
    /// Create or replace the symmetric relationship between two
    /// characters.
    SetRelationship {
        /// One side of the relationship.
        from: EntityId,
        /// The other side.
        to: EntityId,
        /// Free-form label.
        kind: String,
        /// Signed strength, clamped to `[-1, 1]`.
        strength: f64,
    },
    /// Queue a deferred evolution task targeting a known entity.
    ScheduleTask {
        /// The task to queue.
        task: EvolutionTask,
    },
    /// Change the world's lifecycle status.
    SetStatus {
        /// The new status.
        status: WorldStatus,
    },
    /// Record a player visit now; clears background processing.
    RecordPlayerVisit,
}

/// Orchestrates initialization, mutation, evolution, and validation of
/// every world it owns.
pub struct WorldStateManager {
    worlds: RwLock<BTreeMap<WorldId, Arc<Mutex<WorldSlot>>>>,
    store: Arc<dyn WorldStore>,
    cache: Arc<dyn CacheAdmin>,
    coordinator: Mutex<RecoveryCoordinator>,
    health: Arc<Mutex<HealthMonitor>>,
    narrative: Box<dyn NarrativeSource>,
    rng: Mutex<SmallRng>,
}

impl core::fmt::Debug for WorldStateManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorldStateManager")
            .field("worlds", &self.world_count())
            .finish_non_exhaustive()
    }
}

impl WorldStateManager {
    /// Create a manager over the given collaborators, seeding the random
    /// source for reproducible evolution runs.
    pub fn new(store: Arc<dyn WorldStore>, cache: Arc<dyn CacheAdmin>, seed: u64) -> Self {
        let health = Arc::new(Mutex::new(HealthMonitor::new()));
        let coordinator = RecoveryCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&health),
            DEFAULT_MAX_CHECKPOINTS,
        );
        Self {
            worlds: RwLock::new(BTreeMap::new()),
            store,
            cache,
            coordinator: Mutex::new(coordinator),
            health,
            narrative: Box::new(StubNarrative::new()),
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Replace the narrative source (builder style).
    #[must_use]
    pub fn with_narrative(mut self, narrative: impl NarrativeSource + 'static) -> Self {
        self.narrative = Box::new(narrative);
        self
    }

    // =========================================================================
    // Initialization and lookup
    // =========================================================================

    /// Validate `config`, create the world aggregate with one timeline
    /// per initial entity, persist everything, and register the world in
    /// the active index.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a rejected configuration,
    /// [`EngineError::WorldExists`] for a duplicate id, and
    /// [`EngineError::Store`] when persistence fails (after routing the
    /// failure through recovery).
    pub fn initialize_world(
        &self,
        world_id: &WorldId,
        config: &WorldConfig,
    ) -> Result<World, EngineError> {
        if world_id.is_empty() {
            return Err(EngineError::validation("world_id must be non-empty"));
        }
        config.validate().map_err(EngineError::validation)?;

        if self.worlds_read().contains_key(world_id)
            || self.store.load_world_state(world_id)?.is_some()
        {
            return Err(EngineError::WorldExists {
                world_id: world_id.clone(),
            });
        }

        let mut world = World::new(world_id.clone(), config.world_name.clone(), config.to_flags());
        let mut timelines = TimelineEngine::new(config.max_timeline_events);
        let genesis = world.current_time;

        for seed in &config.initial_characters {
            let entity_id = EntityId::from(seed.entity_id.as_str());
            world.active_characters.insert(
                entity_id.clone(),
                CharacterState {
                    name: seed.name.clone(),
                    description: seed.description.clone(),
                    ..CharacterState::default()
                },
            );
            self.seed_timeline(
                &mut timelines,
                &world.world_name,
                &entity_id,
                &seed.name,
                EntityKind::Character,
                EventKind::CharacterIntroduction,
                genesis,
            )?;
        }
        for seed in &config.initial_locations {
            let entity_id = EntityId::from(seed.entity_id.as_str());
            world.active_locations.insert(
                entity_id.clone(),
                LocationState {
                    name: seed.name.clone(),
                    description: seed.description.clone(),
                    ..LocationState::default()
                },
            );
            self.seed_timeline(
                &mut timelines,
                &world.world_name,
                &entity_id,
                &seed.name,
                EntityKind::Location,
                EventKind::EnvironmentalChange,
                genesis,
            )?;
        }
        for seed in &config.initial_objects {
            let entity_id = EntityId::from(seed.entity_id.as_str());
            world.active_objects.insert(
                entity_id.clone(),
                ObjectState {
                    name: seed.name.clone(),
                    description: seed.description.clone(),
                    ..ObjectState::default()
                },
            );
            self.seed_timeline(
                &mut timelines,
                &world.world_name,
                &entity_id,
                &seed.name,
                EntityKind::Object,
                EventKind::ObjectModification,
                genesis,
            )?;
        }

        let slot = WorldSlot { world, timelines };
        if let Err(store_error) = self.persist_slot(&slot, None) {
            self.route_store_failure(world_id, "initialize_world", &store_error);
            return Err(store_error.into());
        }

        let created = slot.world.clone();
        self.worlds_write()
            .insert(world_id.clone(), Arc::new(Mutex::new(slot)));

        info!(
            world_id = %world_id,
            world_name = created.world_name,
            characters = created.active_characters.len(),
            locations = created.active_locations.len(),
            objects = created.active_objects.len(),
            "World initialized"
        );
        Ok(created)
    }

    /// Cache-aside lookup: the in-memory index first, then the cache
    /// collaborator, then the persistence collaborator (repopulating the
    /// faster layers on the way back). A missing world is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on persistence failure and
    /// [`EngineError::CorruptState`] when a persisted world no longer
    /// parses (both after routing through recovery).
    pub fn get_world_state(&self, world_id: &WorldId) -> Result<Option<World>, EngineError> {
        let Some(slot) = self.ensure_loaded(world_id)? else {
            return Ok(None);
        };
        let slot = lock_slot(&slot);
        Ok(Some(slot.world.clone()))
    }

    /// Drop a world from the in-memory index, leaving persisted and
    /// cached state untouched. Returns whether the world was resident.
    pub fn release_world(&self, world_id: &WorldId) -> bool {
        self.worlds_write().remove(world_id).is_some()
    }

    /// Number of worlds resident in the in-memory index.
    pub fn world_count(&self) -> usize {
        self.worlds_read().len()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Apply an ordered list of mutation operations atomically: all
    /// operations are applied to a working copy, persisted once, and
    /// only then made visible to readers. Returns `false` (mutating
    /// nothing) when the world is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] or
    /// [`EngineError::UnknownEntity`] when an operation is rejected, and
    /// [`EngineError::Store`] when the single persist fails; in every
    /// error case the visible world is unchanged.
    pub fn update_world_state(
        &self,
        world_id: &WorldId,
        changes: &[WorldChange],
    ) -> Result<bool, EngineError> {
        let Some(slot_arc) = self.ensure_loaded(world_id)? else {
            debug!(world_id = %world_id, "update_world_state on unknown world");
            return Ok(false);
        };

        let mut slot = lock_slot(&slot_arc);
        let mut working = slot.clone();
        for change in changes {
            self.apply_change(&mut working, change)?;
        }
        working.world.touch();

        if let Err(store_error) = self.persist_slot(&working, None) {
            self.route_store_failure(world_id, "update_world_state", &store_error);
            return Err(store_error.into());
        }
        *slot = working;
        debug!(world_id = %world_id, changes = changes.len(), "World updated");
        Ok(true)
    }

    /// Apply one change to a working copy. Any error leaves the working
    /// copy abandoned by the caller.
    fn apply_change(&self, slot: &mut WorldSlot, change: &WorldChange) -> Result<(), EngineError> {
        let now = slot.world.current_time;
        match change {
            WorldChange::AddCharacter {
                entity_id,
                name,
                description,
            } => {
                self.require_fresh(slot, entity_id)?;
                slot.world.active_characters.insert(
                    entity_id.clone(),
                    CharacterState {
                        name: name.clone(),
                        description: description.clone(),
                        ..CharacterState::default()
                    },
                );
                let world_name = slot.world.world_name.clone();
                self.seed_timeline(
                    &mut slot.timelines,
                    &world_name,
                    entity_id,
                    name,
                    EntityKind::Character,
                    EventKind::CharacterIntroduction,
                    now,
                )
            }
            WorldChange::AddLocation {
                entity_id,
                name,
                description,
            } => {
                self.require_fresh(slot, entity_id)?;
                slot.world.active_locations.insert(
                    entity_id.clone(),
                    LocationState {
                        name: name.clone(),
                        description: description.clone(),
                        ..LocationState::default()
                    },
                );
                let world_name = slot.world.world_name.clone();
                self.seed_timeline(
                    &mut slot.timelines,
                    &world_name,
                    entity_id,
                    name,
                    EntityKind::Location,
                    EventKind::EnvironmentalChange,
                    now,
                )
            }
            WorldChange::AddObject {
                entity_id,
                name,
                description,
                location,
            } => {
                self.require_fresh(slot, entity_id)?;
                if let Some(location) = location {
                    require_location(slot, location)?;
                }
                slot.world.active_objects.insert(
                    entity_id.clone(),
                    ObjectState {
                        name: name.clone(),
                        description: description.clone(),
                        location: location.clone(),
                        ..ObjectState::default()
                    },
                );
                let world_name = slot.world.world_name.clone();
                self.seed_timeline(
                    &mut slot.timelines,
                    &world_name,
                    entity_id,
                    name,
                    EntityKind::Object,
                    EventKind::ObjectModification,
                    now,
                )
            }
            WorldChange::ModifyCharacter {
                entity_id,
                description,
                set_traits,
            } => {
                let world_id = slot.world.world_id.clone();
                let character = slot
                    .world
                    .active_characters
                    .get_mut(entity_id)
                    .ok_or_else(|| EngineError::UnknownEntity {
                        world_id,
                        entity_id: entity_id.clone(),
                    })?;
                if let Some(description) = description {
                    character.description = description.clone();
                }
                for (key, value) in set_traits {
                    character.traits.insert(key.clone(), value.clone());
                }
                Ok(())
            }
            WorldChange::ModifyLocation {
                entity_id,
                description,
                set_attributes,
            } => {
                let world_id = slot.world.world_id.clone();
                let location = slot
                    .world
                    .active_locations
                    .get_mut(entity_id)
                    .ok_or_else(|| EngineError::UnknownEntity {
                        world_id,
                        entity_id: entity_id.clone(),
                    })?;
                if let Some(description) = description {
                    location.description = description.clone();
                }
                for (key, value) in set_attributes {
                    location.attributes.insert(key.clone(), value.clone());
                }
                Ok(())
            }
            WorldChange::ModifyObject {
                entity_id,
                description,
                move_to,
            } => {
                if let Some(destination) = move_to {
                    require_location(slot, destination)?;
                }
                let world_id = slot.world.world_id.clone();
                let object = slot
                    .world
                    .active_objects
                    .get_mut(entity_id)
                    .ok_or_else(|| EngineError::UnknownEntity {
                        world_id,
                        entity_id: entity_id.clone(),
                    })?;
                if let Some(description) = description {
                    object.description = description.clone();
                }
                if let Some(destination) = move_to {
                    object.location = Some(destination.clone());
                }
                Ok(())
            }
            WorldChange::SetRelationship {
                from,
                to,
                kind,
                strength,
            } => {
                for side in [from, to] {
                    if !slot.world.active_characters.contains_key(side) {
                        return Err(EngineError::UnknownEntity {
                            world_id: slot.world.world_id.clone(),
                            entity_id: side.clone(),
                        });
                    }
                }
                let relationship = Relationship::new(kind.clone(), *strength);
                if let Some(character) = slot.world.active_characters.get_mut(from) {
                    character
                        .relationships
                        .insert(to.clone(), relationship.clone());
                }
                if let Some(character) = slot.world.active_characters.get_mut(to) {
                    character.relationships.insert(from.clone(), relationship);
                }
                Ok(())
            }
            WorldChange::ScheduleTask { task } => {
                if !slot.world.entity_exists(&task.target) {
                    return Err(EngineError::UnknownEntity {
                        world_id: slot.world.world_id.clone(),
                        entity_id: task.target.clone(),
                    });
                }
                slot.world.evolution_schedule.push(task.clone());
                Ok(())
            }
            WorldChange::SetStatus { status } => {
                slot.world.world_status = *status;
                Ok(())
            }
            WorldChange::RecordPlayerVisit => {
                slot.world.player_last_visit = Some(Utc::now());
                slot.world.world_flags.background_processing = false;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Evolution
    // =========================================================================

    /// Advance a world's simulated clock by `time_delta`, generating
    /// probabilistic history for its entities. All-or-nothing: a
    /// checkpoint is taken before any mutation and restored on failure.
    /// Never panics or propagates; everything lands in the returned
    /// [`EvolutionResult`].
    pub fn evolve_world(&self, world_id: &WorldId, time_delta: Duration) -> EvolutionResult {
        let started = Instant::now();
        let mut result = self.evolve_world_inner(world_id, time_delta);
        result.execution_time = started.elapsed();
        result
    }

    fn evolve_world_inner(&self, world_id: &WorldId, time_delta: Duration) -> EvolutionResult {
        if time_delta < Duration::zero() {
            return EvolutionResult::failure(format!(
                "invalid time delta for world {world_id}: must be non-negative"
            ));
        }

        let slot_arc = match self.ensure_loaded(world_id) {
            Ok(Some(slot)) => slot,
            Ok(None) => {
                return EvolutionResult::failure(format!("world {world_id} not found"));
            }
            Err(engine_error) => {
                return EvolutionResult::failure(format!(
                    "world {world_id} could not be loaded: {engine_error}"
                ));
            }
        };
        let mut slot = lock_slot(&slot_arc);

        if slot.world.world_status != WorldStatus::Active {
            let mut result = EvolutionResult::new();
            result.push_warning(format!(
                "world {world_id} is {:?}; evolution skipped",
                slot.world.world_status
            ));
            return result;
        }
        if !slot.world.world_flags.auto_evolution {
            let mut result = EvolutionResult::new();
            result.push_warning(format!(
                "auto evolution is disabled for world {world_id}; no state was changed"
            ));
            return result;
        }

        // Checkpoint before any mutation.
        let snapshot = match serde_json::to_value(&*slot) {
            Ok(snapshot) => snapshot,
            Err(serialize_error) => {
                return EvolutionResult::failure(format!(
                    "could not snapshot world {world_id}: {serialize_error}"
                ));
            }
        };
        let checkpoint = {
            let mut coordinator = self.coordinator_lock();
            match coordinator.rollback_mut().create_checkpoint(world_id, snapshot) {
                Ok(checkpoint) => checkpoint,
                Err(recovery_error) => {
                    return EvolutionResult::failure(format!(
                        "could not checkpoint world {world_id}: {recovery_error}"
                    ));
                }
            }
        };

        let mut result = EvolutionResult::new();
        let cycle = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            run_evolution_cycle(&mut slot, time_delta, &mut rng, self.narrative.as_ref())
        }
        .and_then(|outcome| {
            self.persist_slot(&slot, Some(&outcome.touched))
                .map_err(EngineError::from)
                .map(|()| outcome)
        });

        match cycle {
            Ok(outcome) => {
                result.events_generated = outcome.events_generated;
                result.characters_evolved = count_u32(outcome.characters_evolved.len());
                result.locations_changed = count_u32(outcome.locations_changed.len());
                result.objects_modified = count_u32(outcome.objects_modified.len());
                for warning in outcome.warnings {
                    result.push_warning(warning);
                }
                info!(
                    world_id = %world_id,
                    days = time_delta.num_days(),
                    events = result.events_generated,
                    characters = result.characters_evolved,
                    "Evolution cycle committed"
                );
            }
            Err(engine_error) => {
                // All-or-nothing: restore the pre-cycle snapshot.
                match serde_json::from_value::<WorldSlot>(
                    checkpoint.world_state_snapshot.clone(),
                ) {
                    Ok(previous) => {
                        *slot = previous;
                        result.push_warning(format!(
                            "rolled back world {world_id} to checkpoint {}",
                            checkpoint.checkpoint_id
                        ));
                    }
                    Err(restore_error) => {
                        result.push_error(format!(
                            "checkpoint restore failed for world {world_id}: {restore_error}"
                        ));
                    }
                }
                result.push_error(engine_error.to_string());

                let component = match &engine_error {
                    EngineError::Timeline(_) => "timeline",
                    EngineError::Store(_) => "persistence",
                    _ => "world",
                };
                let context = ErrorContext::component(component)
                    .for_world(world_id.clone())
                    .during("evolve_world");
                let recovery = self
                    .coordinator_lock()
                    .handle_error(&engine_error.to_string(), &context);
                for action in &recovery.actions_taken {
                    result.push_warning(format!("recovery: {action}"));
                }
                if !recovery.success {
                    for error in &recovery.errors {
                        result.push_error(format!("recovery: {error}"));
                    }
                }
                warn!(
                    world_id = %world_id,
                    error = %engine_error,
                    recovered = recovery.success,
                    "Evolution cycle rolled back"
                );
            }
        }
        result
    }

    // =========================================================================
    // Validation and summaries
    // =========================================================================

    /// Check a world's internal consistency. Never fails: an unknown
    /// world yields an invalid result with a data-integrity issue, and
    /// persistently failing health probes are folded into the findings.
    pub fn validate_world_consistency(&self, world_id: &WorldId) -> ValidationResult {
        let loaded = match self.ensure_loaded(world_id) {
            Ok(loaded) => loaded,
            Err(engine_error) => {
                let mut result = ValidationResult::new();
                result
                    .data_integrity_issues
                    .push(format!("world state could not be loaded: {engine_error}"));
                result.recompute();
                return result;
            }
        };
        let Some(slot_arc) = loaded else {
            let mut result = ValidationResult::new();
            result
                .data_integrity_issues
                .push("World state not found".to_owned());
            result.recompute();
            return result;
        };

        let slot = lock_slot(&slot_arc);
        let mut result = validate_slot(&slot);
        drop(slot);

        let health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        for issue in health.detect_degradation() {
            result.data_integrity_issues.push(issue);
        }
        result.recompute();
        result
    }

    /// A compact view of one world, or `None` when unknown.
    pub fn get_world_summary(&self, world_id: &WorldId) -> Option<WorldSummary> {
        let slot_arc = self.ensure_loaded(world_id).ok().flatten()?;
        let slot = lock_slot(&slot_arc);
        Some(WorldSummary {
            world_id: slot.world.world_id.clone(),
            world_name: slot.world.world_name.clone(),
            world_status: slot.world.world_status,
            current_time: slot.world.current_time,
            character_count: slot.world.active_characters.len(),
            location_count: slot.world.active_locations.len(),
            object_count: slot.world.active_objects.len(),
            total_timeline_events: slot.timelines.total_events(),
            pending_task_count: slot.world.evolution_schedule.len(),
            last_evolution: slot.world.last_evolution,
            player_last_visit: slot.world.player_last_visit,
        })
    }

    /// A snapshot of one entity's timeline, or `None` when the world or
    /// entity is unknown.
    pub fn get_entity_timeline(
        &self,
        world_id: &WorldId,
        entity_id: &EntityId,
    ) -> Option<everworld_timeline::Timeline> {
        let slot_arc = self.ensure_loaded(world_id).ok().flatten()?;
        let slot = lock_slot(&slot_arc);
        slot.timelines.get_timeline(entity_id).cloned()
    }

    /// Events for one entity within the half-open range `[start, end)`,
    /// oldest first. Empty for unknown worlds or entities.
    pub fn query_entity_events(
        &self,
        world_id: &WorldId,
        entity_id: &EntityId,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> Vec<TimelineEvent> {
        let Ok(Some(slot_arc)) = self.ensure_loaded(world_id) else {
            return Vec::new();
        };
        let slot = lock_slot(&slot_arc);
        slot.timelines
            .query_range(entity_id, start, end)
            .cloned()
            .collect()
    }

    /// Read the evolution-related subset of a world's flags.
    pub fn get_evolution_parameters(&self, world_id: &WorldId) -> Option<EvolutionParams> {
        let slot_arc = self.ensure_loaded(world_id).ok().flatten()?;
        let slot = lock_slot(&slot_arc);
        Some(EvolutionParams::from(&slot.world.world_flags))
    }

    /// Write the evolution-related subset of a world's flags. Returns
    /// `false` when the world is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for rejected parameters and
    /// [`EngineError::Store`] when the persist fails.
    pub fn configure_evolution_parameters(
        &self,
        world_id: &WorldId,
        params: &EvolutionParams,
    ) -> Result<bool, EngineError> {
        params.validate().map_err(EngineError::validation)?;
        let Some(slot_arc) = self.ensure_loaded(world_id)? else {
            return Ok(false);
        };
        let mut slot = lock_slot(&slot_arc);
        let mut working = slot.clone();
        params.apply_to(&mut working.world.world_flags);
        working.world.touch();

        if let Err(store_error) = self.persist_slot(&working, None) {
            self.route_store_failure(world_id, "configure_evolution_parameters", &store_error);
            return Err(store_error.into());
        }
        *slot = working;
        Ok(true)
    }

    // =========================================================================
    // Health and recovery facade
    // =========================================================================

    /// Register a named boolean health probe.
    pub fn register_health_check(
        &self,
        name: impl Into<String>,
        probe: impl Fn() -> bool + Send + Sync + 'static,
    ) {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register_health_check(name, probe);
    }

    /// Execute every registered probe, recording outcomes.
    pub fn run_health_checks(&self) -> BTreeMap<String, bool> {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .run_health_checks()
    }

    /// Fraction of probes passing on the most recent run.
    pub fn get_system_health_score(&self) -> f64 {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_system_health_score()
    }

    /// Checks failing persistently across the recent run window.
    pub fn detect_degradation(&self) -> Vec<String> {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect_degradation()
    }

    /// Register a component-specific fallback handler with the recovery
    /// coordinator.
    pub fn register_fallback_handler(
        &self,
        component: impl Into<String>,
        handler: impl everworld_recovery::FallbackHandler + 'static,
    ) {
        self.coordinator_lock()
            .register_fallback_handler(component, handler);
    }

    /// Route a failure through classification and ordered recovery.
    pub fn handle_error(&self, error_text: &str, context: &ErrorContext) -> RecoveryResult {
        self.coordinator_lock().handle_error(error_text, context)
    }

    /// Fault counts by kind, recency, and outcome.
    pub fn get_error_statistics(&self) -> ErrorStatistics {
        self.coordinator_lock().get_error_statistics()
    }

    /// Prune aged error history and checkpoints.
    pub fn cleanup_old_data(&self, max_age_days: i64) -> everworld_recovery::CleanupReport {
        self.coordinator_lock().cleanup_old_data(max_age_days)
    }

    /// Components currently degraded by recovery strategies.
    pub fn degraded_components(&self) -> Vec<String> {
        self.coordinator_lock().degraded_components()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Index lookup with cache-aside loading: index, then cache, then
    /// store (repopulating on the way back). `Ok(None)` when the world
    /// exists nowhere.
    fn ensure_loaded(
        &self,
        world_id: &WorldId,
    ) -> Result<Option<Arc<Mutex<WorldSlot>>>, EngineError> {
        if let Some(slot) = self.worlds_read().get(world_id).cloned() {
            return Ok(Some(slot));
        }

        // Cache probe; damage here is survivable, so it degrades to a
        // store read after being routed through recovery.
        let cached: Option<World> = match self.cache.get(&world_state_key(world_id)) {
            Ok(Some(value)) => match serde_json::from_value::<World>(value) {
                Ok(world) => Some(world),
                Err(parse_error) => {
                    let context = ErrorContext::component("cache")
                        .for_world(world_id.clone())
                        .during("get_world_state");
                    let _ = self.coordinator_lock().handle_error(
                        &format!("cache entry for world {world_id} is corrupt: {parse_error}"),
                        &context,
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(cache_error) => {
                warn!(world_id = %world_id, error = %cache_error, "Cache read failed; falling back to store");
                None
            }
        };

        let world = if let Some(world) = cached {
            Some(world)
        } else {
            match self.store.load_world_state(world_id) {
                Ok(Some(document)) => match serde_json::from_value::<World>(document.full_state) {
                    Ok(world) => Some(world),
                    Err(parse_error) => {
                        let context = ErrorContext::component("world")
                            .for_world(world_id.clone())
                            .during("get_world_state");
                        let _ = self.coordinator_lock().handle_error(
                            &format!("persisted world {world_id} does not parse: {parse_error}"),
                            &context,
                        );
                        return Err(EngineError::CorruptState {
                            world_id: world_id.clone(),
                            reason: parse_error.to_string(),
                        });
                    }
                },
                Ok(None) => None,
                Err(store_error) => {
                    self.route_store_failure(world_id, "get_world_state", &store_error);
                    return Err(store_error.into());
                }
            }
        };
        let Some(world) = world else {
            return Ok(None);
        };

        let mut timelines = TimelineEngine::new(world.world_flags.max_timeline_events);
        match self.store.load_timelines(world_id) {
            Ok(documents) => {
                for document in documents {
                    timelines.create_timeline(&document.entity_id, document.entity_type);
                    for event in document.events {
                        if let Err(timeline_error) =
                            timelines.append_event(&document.entity_id, event)
                        {
                            let context = ErrorContext::component("timeline")
                                .for_world(world_id.clone())
                                .during("get_world_state");
                            let _ = self
                                .coordinator_lock()
                                .handle_error(&timeline_error.to_string(), &context);
                            return Err(timeline_error.into());
                        }
                    }
                }
            }
            Err(store_error) => {
                self.route_store_failure(world_id, "get_world_state", &store_error);
                return Err(store_error.into());
            }
        }

        if let Ok(value) = serde_json::to_value(&world) {
            let _ = self.cache.set(&world_state_key(world_id), value, CACHE_TTL);
        }

        let mut index = self.worlds_write();
        let slot = index
            .entry(world_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(WorldSlot { world, timelines })));
        Ok(Some(Arc::clone(slot)))
    }

    /// Persist a slot: the world document, the timeline documents (all,
    /// or just the touched subset), and the cache copy (best effort).
    fn persist_slot(
        &self,
        slot: &WorldSlot,
        touched: Option<&std::collections::BTreeSet<EntityId>>,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(&slot.world)?;
        let document = WorldDocument::new(slot.world.world_id.clone(), value.clone());
        if !self.store.update_world_state(&document)? {
            self.store.save_world_state(&document)?;
        }

        for (entity_id, timeline) in slot.timelines.iter() {
            if touched.is_none_or(|set| set.contains(entity_id)) {
                self.store.save_timeline(&TimelineDocument {
                    world_id: slot.world.world_id.clone(),
                    entity_id: entity_id.clone(),
                    entity_type: timeline.entity_type,
                    events: timeline.events().to_vec(),
                })?;
            }
        }

        if let Err(cache_error) =
            self.cache
                .set(&world_state_key(&slot.world.world_id), value, CACHE_TTL)
        {
            warn!(
                world_id = %slot.world.world_id,
                error = %cache_error,
                "Cache write failed after persist"
            );
        }
        Ok(())
    }

    /// Seed a freshly created entity's timeline with its genesis event.
    #[allow(clippy::too_many_arguments)]
    fn seed_timeline(
        &self,
        timelines: &mut TimelineEngine,
        world_name: &str,
        entity_id: &EntityId,
        entity_name: &str,
        entity_type: EntityKind,
        event_kind: EventKind,
        at: chrono::DateTime<Utc>,
    ) -> Result<(), EngineError> {
        timelines.create_timeline(entity_id, entity_type);
        let description = self
            .narrative
            .describe_event(world_name, entity_name, event_kind, at);
        let event = TimelineEvent::new(entity_id.clone(), entity_type, event_kind, at, description);
        timelines.append_event(entity_id, event)?;
        Ok(())
    }

    /// Reject an add for an id any entity already uses.
    fn require_fresh(&self, slot: &WorldSlot, entity_id: &EntityId) -> Result<(), EngineError> {
        if entity_id.is_empty() {
            return Err(EngineError::validation("entity_id must be non-empty"));
        }
        if slot.world.entity_exists(entity_id) {
            return Err(EngineError::validation(format!(
                "entity {entity_id} already exists in world {}",
                slot.world.world_id
            )));
        }
        Ok(())
    }

    /// Route a persistence failure through the recovery coordinator.
    fn route_store_failure(&self, world_id: &WorldId, operation: &str, error: &StoreError) {
        let context = ErrorContext::component("persistence")
            .for_world(world_id.clone())
            .during(operation);
        let recovery = self.coordinator_lock().handle_error(&error.to_string(), &context);
        debug!(
            world_id = %world_id,
            operation,
            recovered = recovery.success,
            "Persistence failure routed through recovery"
        );
    }

    fn coordinator_lock(&self) -> MutexGuard<'_, RecoveryCoordinator> {
        self.coordinator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn worlds_read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<WorldId, Arc<Mutex<WorldSlot>>>> {
        self.worlds.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn worlds_write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<WorldId, Arc<Mutex<WorldSlot>>>> {
        self.worlds.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Require that an id names a known location.
fn require_location(slot: &WorldSlot, location: &EntityId) -> Result<(), EngineError> {
    if slot.world.active_locations.contains_key(location) {
        Ok(())
    } else {
        Err(EngineError::UnknownEntity {
            world_id: slot.world.world_id.clone(),
            entity_id: location.clone(),
        })
    }
}

/// Lock one world slot, surviving poisoning.
fn lock_slot(slot: &Arc<Mutex<WorldSlot>>) -> MutexGuard<'_, WorldSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Saturating set-size-to-counter conversion.
fn count_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use everworld_store::{MemoryWorldCache, MemoryWorldStore};

    use crate::config::EntitySeed;

    use super::*;

    fn make_manager() -> (Arc<MemoryWorldStore>, Arc<MemoryWorldCache>, WorldStateManager) {
        let store = Arc::new(MemoryWorldStore::new());
        let cache = Arc::new(MemoryWorldCache::new());
        let manager = WorldStateManager::new(
            Arc::clone(&store) as Arc<dyn WorldStore>,
            Arc::clone(&cache) as Arc<dyn CacheAdmin>,
            42,
        );
        (store, cache, manager)
    }

    fn basic_config() -> WorldConfig {
        let mut config = WorldConfig::named("Thornvale");
        config.initial_characters.push(EntitySeed::new("elena", "Elena"));
        config.initial_characters.push(EntitySeed::new("marta", "Marta"));
        config.initial_locations.push(EntitySeed::new("mill", "The Old Mill"));
        config.initial_objects.push(EntitySeed::new("lantern", "Brass Lantern"));
        config
    }

    #[test]
    fn initialize_rejects_invalid_config() {
        let (_store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");

        let mut config = basic_config();
        config.world_name = String::new();
        assert!(matches!(
            manager.initialize_world(&world_id, &config),
            Err(EngineError::Validation { .. })
        ));

        let mut config = basic_config();
        config.evolution_speed = -1.0;
        assert!(manager.initialize_world(&world_id, &config).is_err());

        let mut config = basic_config();
        config.max_timeline_events = 0;
        assert!(manager.initialize_world(&world_id, &config).is_err());

        // Nothing was created by the rejected attempts.
        assert_eq!(manager.world_count(), 0);
        assert!(manager.get_world_state(&world_id).unwrap().is_none());
    }

    #[test]
    fn initialize_creates_entities_and_genesis_events() {
        let (store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");

        let world = manager.initialize_world(&world_id, &basic_config()).unwrap();
        assert_eq!(world.active_characters.len(), 2);
        assert_eq!(world.active_locations.len(), 1);
        assert_eq!(world.active_objects.len(), 1);
        assert!(store.contains(&world_id));

        let summary = manager.get_world_summary(&world_id).unwrap();
        // One genesis event per seeded entity.
        assert_eq!(summary.total_timeline_events, 4);
        assert_eq!(summary.pending_task_count, 0);

        let timeline = manager
            .get_entity_timeline(&world_id, &EntityId::from("elena"))
            .unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(
            timeline.last_event().unwrap().event_type,
            EventKind::CharacterIntroduction
        );
    }

    #[test]
    fn duplicate_initialize_fails() {
        let (_store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");
        let _ = manager.initialize_world(&world_id, &basic_config()).unwrap();
        assert!(matches!(
            manager.initialize_world(&world_id, &basic_config()),
            Err(EngineError::WorldExists { .. })
        ));
    }

    #[test]
    fn get_world_state_is_cache_aside() {
        let (_store, cache, manager) = make_manager();
        let world_id = WorldId::new("W1");
        let _ = manager.initialize_world(&world_id, &basic_config()).unwrap();

        // Drop from the in-memory index; the world must come back from
        // the cache/store layers.
        assert!(manager.release_world(&world_id));
        assert_eq!(manager.world_count(), 0);

        let reloaded = manager.get_world_state(&world_id).unwrap().unwrap();
        assert_eq!(reloaded.world_name, "Thornvale");
        assert_eq!(manager.world_count(), 1);

        // Timelines come back too.
        let summary = manager.get_world_summary(&world_id).unwrap();
        assert_eq!(summary.total_timeline_events, 4);

        // Cache was repopulated along the way.
        assert!(cache.get(&world_state_key(&world_id)).unwrap().is_some());
    }

    #[test]
    fn update_unknown_world_returns_false() {
        let (_store, _cache, manager) = make_manager();
        let applied = manager
            .update_world_state(&WorldId::new("ghost"), &[WorldChange::RecordPlayerVisit])
            .unwrap();
        assert!(!applied);
    }

    #[test]
    fn update_is_all_or_nothing() {
        let (_store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");
        let _ = manager.initialize_world(&world_id, &basic_config()).unwrap();

        let changes = vec![
            WorldChange::AddCharacter {
                entity_id: EntityId::from("rook"),
                name: "Rook".to_owned(),
                description: String::new(),
            },
            // Fails: unknown entity.
            WorldChange::ModifyCharacter {
                entity_id: EntityId::from("nobody"),
                description: Some("gone".to_owned()),
                set_traits: BTreeMap::new(),
            },
        ];
        assert!(manager.update_world_state(&world_id, &changes).is_err());

        // The first change did not leak through.
        let world = manager.get_world_state(&world_id).unwrap().unwrap();
        assert!(!world.active_characters.contains_key(&EntityId::from("rook")));
    }

    #[test]
    fn update_applies_ordered_changes() {
        let (_store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");
        let _ = manager.initialize_world(&world_id, &basic_config()).unwrap();

        let changes = vec![
            WorldChange::AddLocation {
                entity_id: EntityId::from("chapel"),
                name: "Hillside Chapel".to_owned(),
                description: String::new(),
            },
            WorldChange::ModifyObject {
                entity_id: EntityId::from("lantern"),
                description: None,
                move_to: Some(EntityId::from("chapel")),
            },
            WorldChange::SetRelationship {
                from: EntityId::from("elena"),
                to: EntityId::from("marta"),
                kind: "friend".to_owned(),
                strength: 0.6,
            },
            WorldChange::RecordPlayerVisit,
        ];
        assert!(manager.update_world_state(&world_id, &changes).unwrap());

        let world = manager.get_world_state(&world_id).unwrap().unwrap();
        assert_eq!(
            world
                .active_objects
                .get(&EntityId::from("lantern"))
                .unwrap()
                .location,
            Some(EntityId::from("chapel"))
        );
        // Relationship is symmetric.
        assert!(
            world
                .active_characters
                .get(&EntityId::from("elena"))
                .unwrap()
                .relationships
                .contains_key(&EntityId::from("marta"))
        );
        assert!(
            world
                .active_characters
                .get(&EntityId::from("marta"))
                .unwrap()
                .relationships
                .contains_key(&EntityId::from("elena"))
        );
        assert!(world.player_last_visit.is_some());
    }

    #[test]
    fn evolve_rolls_back_on_persistence_failure() {
        let (store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");
        let mut config = basic_config();
        // Guarantee events so the failed persist has something to lose.
        config.character_event_rate = 1.0;
        let created = manager.initialize_world(&world_id, &config).unwrap();
        let before_events = manager.get_world_summary(&world_id).unwrap().total_timeline_events;

        store.set_failing(true);
        let result = manager.evolve_world(&world_id, Duration::days(7));
        store.set_failing(false);

        assert!(!result.success);
        assert!(!result.errors.is_empty());

        // All-or-nothing: clock and timelines are back at the checkpoint.
        let world = manager.get_world_state(&world_id).unwrap().unwrap();
        assert_eq!(world.current_time, created.current_time);
        let summary = manager.get_world_summary(&world_id).unwrap();
        assert_eq!(summary.total_timeline_events, before_events);
    }

    #[test]
    fn scheduled_task_fires_during_evolution() {
        let (_store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");
        let created = manager.initialize_world(&world_id, &basic_config()).unwrap();

        let task = EvolutionTask {
            task_id: "festival".to_owned(),
            target: EntityId::from("mill"),
            description: "The harvest festival fills the mill yard.".to_owned(),
            due_time: created.current_time + Duration::days(2),
        };
        let _ = manager
            .update_world_state(&world_id, &[WorldChange::ScheduleTask { task }])
            .unwrap();

        let result = manager.evolve_world(&world_id, Duration::days(7));
        assert!(result.success);

        let summary = manager.get_world_summary(&world_id).unwrap();
        assert_eq!(summary.pending_task_count, 0);

        let events = manager.query_entity_events(
            &world_id,
            &EntityId::from("mill"),
            created.current_time,
            created.current_time + Duration::days(8),
        );
        assert!(
            events
                .iter()
                .any(|e| e.event_type == EventKind::WorldMilestone)
        );
    }

    #[test]
    fn configure_parameters_round_trips() {
        let (_store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");
        let _ = manager.initialize_world(&world_id, &basic_config()).unwrap();

        let mut params = manager.get_evolution_parameters(&world_id).unwrap();
        params.evolution_speed = 3.0;
        params.background_processing = true;
        assert!(manager.configure_evolution_parameters(&world_id, &params).unwrap());

        let read_back = manager.get_evolution_parameters(&world_id).unwrap();
        assert!((read_back.evolution_speed - 3.0).abs() < f64::EPSILON);
        assert!(read_back.background_processing);

        // Unknown worlds configure nothing.
        assert!(
            !manager
                .configure_evolution_parameters(&WorldId::new("ghost"), &params)
                .unwrap()
        );

        // Invalid parameters are rejected before mutation.
        params.evolution_speed = 0.0;
        assert!(manager.configure_evolution_parameters(&world_id, &params).is_err());
    }

    #[test]
    fn paused_world_skips_evolution() {
        let (_store, _cache, manager) = make_manager();
        let world_id = WorldId::new("W1");
        let created = manager.initialize_world(&world_id, &basic_config()).unwrap();
        let _ = manager
            .update_world_state(
                &world_id,
                &[WorldChange::SetStatus {
                    status: WorldStatus::Paused,
                }],
            )
            .unwrap();

        let result = manager.evolve_world(&world_id, Duration::days(3));
        assert!(result.success);
        assert!(!result.warnings.is_empty());
        let world = manager.get_world_state(&world_id).unwrap().unwrap();
        assert_eq!(world.current_time, created.current_time);
    }
}
