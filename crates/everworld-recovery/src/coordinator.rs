//! Fault classification and ordered recovery-strategy dispatch.
//!
//! Every internal failure arrives here as plain text plus an
//! [`ErrorContext`]. The classifier maps it onto one [`ErrorKind`]; a
//! static table maps each kind onto an ordered list of
//! [`RecoveryStrategy`] values; and a registry of [`RecoveryAction`]
//! implementations (one per strategy tag, behind a single-method
//! contract) attempts them in order, stopping at the first success.
//! Failed attempts accumulate as warnings; only an exhausted strategy
//! list produces errors, so a [`RecoveryResult`] never carries both
//! `success = true` and a non-empty error list.
//!
//! # Snapshot layout
//!
//! Checkpoint snapshots are opaque JSON, but strategies that persist a
//! restored world expect an object with a `world` field holding the
//! serialized aggregate (falling back to the whole snapshot when the
//! field is absent).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use everworld_store::{CacheAdmin, WorldDocument, WorldStore};
use everworld_types::{
    ErrorKind, ErrorStatistics, RecoveryResult, RecoveryStrategy, World, WorldFlags, WorldId,
};

use crate::health::HealthMonitor;
use crate::rollback::RollbackManager;

/// Maximum retained error-history records.
const MAX_ERROR_HISTORY: usize = 200;

/// Window used for the recent-error count in statistics.
const RECENT_ERROR_WINDOW_MINUTES: i64 = 60;

// ---------------------------------------------------------------------------
// Context and classification
// ---------------------------------------------------------------------------

/// Where a failure came from: which component, which world, which
/// operation. Classification consults the component when the message
/// alone is ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// The reporting component ("timeline", "character", "cache", ...).
    pub component: String,
    /// The affected world, when one is known.
    pub world_id: Option<WorldId>,
    /// The operation that observed the failure.
    pub operation: Option<String>,
}

impl ErrorContext {
    /// Context for a named component.
    pub fn component(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            world_id: None,
            operation: None,
        }
    }

    /// Attach the affected world.
    #[must_use]
    pub fn for_world(mut self, world_id: WorldId) -> Self {
        self.world_id = Some(world_id);
        self
    }

    /// Attach the observing operation.
    #[must_use]
    pub fn during(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }
}

/// Classify a failure into one [`ErrorKind`].
///
/// Pure: identical inputs always yield the identical kind. Message
/// patterns are matched first; when none match, the context's component
/// decides; the final default is [`ErrorKind::DataInconsistency`].
pub fn classify_error(error_text: &str, context: &ErrorContext) -> ErrorKind {
    let message = error_text.to_lowercase();

    if message.contains("timeline")
        || message.contains("chronological")
        || message.contains("out of order")
    {
        return ErrorKind::TimelineCorruption;
    }
    if message.contains("validation") || message.contains("invalid") {
        return ErrorKind::ValidationFailure;
    }
    if message.contains("cache") {
        return ErrorKind::CacheCorruption;
    }
    if message.contains("persist") || message.contains("storage") || message.contains("database") {
        return ErrorKind::PersistenceFailure;
    }
    if message.contains("overload") || message.contains("capacity") || message.contains("exhausted")
    {
        return ErrorKind::SystemOverload;
    }
    if message.contains("network") || message.contains("connection") || message.contains("timeout")
    {
        return ErrorKind::NetworkFailure;
    }
    if message.contains("dependency") {
        return ErrorKind::DependencyFailure;
    }

    match context.component.to_lowercase().as_str() {
        "character" => ErrorKind::CharacterStateCorruption,
        "world" => ErrorKind::WorldStateCorruption,
        "timeline" => ErrorKind::TimelineCorruption,
        "cache" => ErrorKind::CacheCorruption,
        "persistence" | "store" => ErrorKind::PersistenceFailure,
        _ => ErrorKind::DataInconsistency,
    }
}

/// The ordered recovery strategies attempted for each fault kind.
pub const fn strategies_for(kind: ErrorKind) -> &'static [RecoveryStrategy] {
    use RecoveryStrategy as S;
    match kind {
        ErrorKind::TimelineCorruption => &[S::Rollback, S::Rebuild, S::GracefulDegradation],
        ErrorKind::CharacterStateCorruption => {
            &[S::ResetToCheckpoint, S::Rebuild, S::GracefulDegradation]
        }
        ErrorKind::WorldStateCorruption => {
            &[S::Rollback, S::SystemRestart, S::GracefulDegradation]
        }
        ErrorKind::DataInconsistency => &[S::DataRepair, S::Rollback, S::Rebuild],
        ErrorKind::PersistenceFailure => &[S::FallbackMode, S::GracefulDegradation],
        ErrorKind::CacheCorruption => &[S::CacheInvalidation, S::FallbackMode],
        ErrorKind::ValidationFailure => &[S::DataRepair, S::Rollback, S::FallbackMode],
        ErrorKind::SystemOverload => &[S::GracefulDegradation, S::FallbackMode],
        ErrorKind::NetworkFailure => &[S::FallbackMode, S::GracefulDegradation],
        ErrorKind::DependencyFailure => &[S::FallbackMode, S::GracefulDegradation],
    }
}

// ---------------------------------------------------------------------------
// Fallback handlers and the recovery-action contract
// ---------------------------------------------------------------------------

/// A component-specific fallback activated by degradation strategies.
pub trait FallbackHandler: Send + Sync {
    /// Switch the component onto its fallback path. Returns a
    /// description of what is now serving the component.
    fn activate(&self, context: &ErrorContext) -> String;
}

impl<F> FallbackHandler for F
where
    F: Fn(&ErrorContext) -> String + Send + Sync,
{
    fn activate(&self, context: &ErrorContext) -> String {
        self(context)
    }
}

/// Mutable collaborator access handed to a recovery action for one
/// attempt.
pub struct RecoveryEnv<'a> {
    /// Checkpoint history.
    pub rollback: &'a mut RollbackManager,
    /// Registered fallback handlers keyed by component.
    pub fallbacks: &'a BTreeMap<String, Box<dyn FallbackHandler>>,
    /// Components currently degraded.
    pub degraded: &'a mut BTreeSet<String>,
    /// Persistence collaborator.
    pub store: &'a dyn WorldStore,
    /// Cache collaborator.
    pub cache: &'a dyn CacheAdmin,
}

/// The common contract every recovery strategy implements.
///
/// One attempt per invocation: record actions, warnings, and flags on
/// `out`, and return whether the strategy succeeded. Failures are
/// recorded as warnings by the implementation, not errors -- the
/// coordinator decides when the whole attempt chain is exhausted.
pub trait RecoveryAction: Send + Sync {
    /// Attempt this strategy once.
    fn attempt(
        &self,
        context: &ErrorContext,
        env: &mut RecoveryEnv<'_>,
        out: &mut RecoveryResult,
    ) -> bool;
}

/// Extract the serialized world aggregate from a checkpoint snapshot.
fn snapshot_world_value(snapshot: &serde_json::Value) -> serde_json::Value {
    snapshot
        .get("world")
        .cloned()
        .unwrap_or_else(|| snapshot.clone())
}

/// Persist the world held in a checkpoint back through the store.
fn persist_checkpoint_world(
    world_id: &WorldId,
    snapshot: &serde_json::Value,
    env: &RecoveryEnv<'_>,
) -> Result<(), String> {
    let document = WorldDocument::new(world_id.clone(), snapshot_world_value(snapshot));
    env.store
        .save_world_state(&document)
        .map_err(|e| e.to_string())
}

/// Rollback to the most recent checkpoint ([`RecoveryStrategy::Rollback`]
/// and [`RecoveryStrategy::ResetToCheckpoint`]).
struct RollbackAction {
    strategy: RecoveryStrategy,
}

impl RecoveryAction for RollbackAction {
    fn attempt(
        &self,
        context: &ErrorContext,
        env: &mut RecoveryEnv<'_>,
        out: &mut RecoveryResult,
    ) -> bool {
        let Some(world_id) = context.world_id.as_ref() else {
            out.push_warning(format!("{} skipped: no world in context", self.strategy));
            return false;
        };
        match env.rollback.rollback_to_checkpoint(world_id, None) {
            Ok(checkpoint) => {
                if let Err(save_error) =
                    persist_checkpoint_world(world_id, &checkpoint.world_state_snapshot, env)
                {
                    out.push_warning(format!(
                        "{} could not persist restored state: {save_error}",
                        self.strategy
                    ));
                    return false;
                }
                out.push_action(format!(
                    "restored world {world_id} from checkpoint {}",
                    checkpoint.checkpoint_id
                ));
                true
            }
            Err(rollback_error) => {
                out.push_warning(format!("{} failed: {rollback_error}", self.strategy));
                false
            }
        }
    }
}

/// Reconstruct a minimal valid state from remaining consistent data
/// ([`RecoveryStrategy::Rebuild`]).
struct RebuildAction;

impl RecoveryAction for RebuildAction {
    fn attempt(
        &self,
        context: &ErrorContext,
        env: &mut RecoveryEnv<'_>,
        out: &mut RecoveryResult,
    ) -> bool {
        let Some(world_id) = context.world_id.as_ref() else {
            out.push_warning("rebuild skipped: no world in context");
            return false;
        };
        let loaded = match env.store.load_world_state(world_id) {
            Ok(loaded) => loaded,
            Err(load_error) => {
                out.push_warning(format!("rebuild could not read persisted state: {load_error}"));
                return false;
            }
        };
        let Some(document) = loaded else {
            out.push_warning(format!("rebuild skipped: no persisted state for {world_id}"));
            return false;
        };

        let mut world = match serde_json::from_value::<World>(document.full_state) {
            Ok(world) => world,
            Err(_parse_error) => {
                // The persisted aggregate is beyond salvage: fall back to
                // a minimal default world under the same id.
                World::new(
                    world_id.clone(),
                    format!("{world_id} (rebuilt)"),
                    WorldFlags::default(),
                )
            }
        };

        let repairs = repair_world(&mut world);
        world.evolution_schedule.clear();
        world.touch();

        let rebuilt = match serde_json::to_value(&world) {
            Ok(value) => value,
            Err(serialize_error) => {
                out.push_warning(format!("rebuild could not serialize state: {serialize_error}"));
                return false;
            }
        };
        if let Err(save_error) = env
            .store
            .save_world_state(&WorldDocument::new(world_id.clone(), rebuilt))
        {
            out.push_warning(format!("rebuild could not persist state: {save_error}"));
            return false;
        }

        out.data_recovered = true;
        out.push_action(format!(
            "rebuilt world {world_id} from remaining consistent data ({} records repaired)",
            repairs.len()
        ));
        true
    }
}

/// Disable the failing subsystem and activate its fallback
/// ([`RecoveryStrategy::GracefulDegradation`]).
struct GracefulDegradationAction;

impl RecoveryAction for GracefulDegradationAction {
    fn attempt(
        &self,
        context: &ErrorContext,
        env: &mut RecoveryEnv<'_>,
        out: &mut RecoveryResult,
    ) -> bool {
        env.degraded.insert(context.component.clone());
        out.push_action(format!("disabled component '{}'", context.component));

        if let Some(handler) = env.fallbacks.get(&context.component) {
            let description = handler.activate(context);
            out.fallback_active = true;
            out.push_action(format!(
                "activated fallback for '{}': {description}",
                context.component
            ));
        } else {
            out.push_warning(format!(
                "component '{}' degraded without a fallback handler",
                context.component
            ));
        }
        true
    }
}

/// Drop cached views of the affected world
/// ([`RecoveryStrategy::CacheInvalidation`]).
struct CacheInvalidationAction;

impl RecoveryAction for CacheInvalidationAction {
    fn attempt(
        &self,
        context: &ErrorContext,
        env: &mut RecoveryEnv<'_>,
        out: &mut RecoveryResult,
    ) -> bool {
        let Some(world_id) = context.world_id.as_ref() else {
            out.push_warning("cache invalidation skipped: no world in context");
            return false;
        };
        match env.cache.invalidate_world(world_id) {
            Ok(removed) => {
                out.push_action(format!(
                    "invalidated {removed} cached views of world {world_id}"
                ));
                true
            }
            Err(cache_error) => {
                out.push_warning(format!("cache invalidation failed: {cache_error}"));
                false
            }
        }
    }
}

/// Apply component-specific sanitation to salvage malformed records
/// ([`RecoveryStrategy::DataRepair`]).
struct DataRepairAction;

impl RecoveryAction for DataRepairAction {
    fn attempt(
        &self,
        context: &ErrorContext,
        env: &mut RecoveryEnv<'_>,
        out: &mut RecoveryResult,
    ) -> bool {
        let Some(world_id) = context.world_id.as_ref() else {
            out.push_warning("data repair skipped: no world in context");
            return false;
        };
        let loaded = match env.store.load_world_state(world_id) {
            Ok(loaded) => loaded,
            Err(load_error) => {
                out.push_warning(format!("data repair could not read state: {load_error}"));
                return false;
            }
        };
        let Some(document) = loaded else {
            out.push_warning(format!("data repair skipped: no persisted state for {world_id}"));
            return false;
        };
        let mut world = match serde_json::from_value::<World>(document.full_state) {
            Ok(world) => world,
            Err(parse_error) => {
                out.push_warning(format!(
                    "data repair cannot parse persisted state: {parse_error}"
                ));
                return false;
            }
        };

        let repairs = repair_world(&mut world);
        world.touch();
        let repaired = match serde_json::to_value(&world) {
            Ok(value) => value,
            Err(serialize_error) => {
                out.push_warning(format!("data repair could not serialize: {serialize_error}"));
                return false;
            }
        };
        if let Err(save_error) = env
            .store
            .save_world_state(&WorldDocument::new(world_id.clone(), repaired))
        {
            out.push_warning(format!("data repair could not persist: {save_error}"));
            return false;
        }

        out.data_recovered = true;
        if repairs.is_empty() {
            out.push_action(format!("data repair found no malformed records in {world_id}"));
        } else {
            for repair in &repairs {
                out.push_action(format!("repaired: {repair}"));
            }
        }
        true
    }
}

/// Route the component through its registered fallback handler
/// ([`RecoveryStrategy::FallbackMode`]). Unlike graceful degradation,
/// this fails when no handler is registered.
struct FallbackModeAction;

impl RecoveryAction for FallbackModeAction {
    fn attempt(
        &self,
        context: &ErrorContext,
        env: &mut RecoveryEnv<'_>,
        out: &mut RecoveryResult,
    ) -> bool {
        let Some(handler) = env.fallbacks.get(&context.component) else {
            out.push_warning(format!(
                "fallback mode unavailable: no handler registered for '{}'",
                context.component
            ));
            return false;
        };
        let description = handler.activate(context);
        out.fallback_active = true;
        out.push_action(format!(
            "fallback mode active for '{}': {description}",
            context.component
        ));
        true
    }
}

/// Re-initialize the world from its latest durable checkpoint or default
/// configuration ([`RecoveryStrategy::SystemRestart`]).
struct SystemRestartAction;

impl RecoveryAction for SystemRestartAction {
    fn attempt(
        &self,
        context: &ErrorContext,
        env: &mut RecoveryEnv<'_>,
        out: &mut RecoveryResult,
    ) -> bool {
        let Some(world_id) = context.world_id.as_ref() else {
            out.push_warning("system restart skipped: no world in context");
            return false;
        };

        if let Some(checkpoint) = env.rollback.latest_checkpoint(world_id).cloned() {
            match persist_checkpoint_world(world_id, &checkpoint.world_state_snapshot, env) {
                Ok(()) => {
                    out.data_recovered = true;
                    out.push_action(format!(
                        "re-initialized world {world_id} from checkpoint {}",
                        checkpoint.checkpoint_id
                    ));
                    return true;
                }
                Err(save_error) => {
                    out.push_warning(format!(
                        "system restart could not persist checkpoint state: {save_error}"
                    ));
                    return false;
                }
            }
        }

        let fresh = World::new(world_id.clone(), world_id.as_str(), WorldFlags::default());
        let value = match serde_json::to_value(&fresh) {
            Ok(value) => value,
            Err(serialize_error) => {
                out.push_warning(format!("system restart could not serialize: {serialize_error}"));
                return false;
            }
        };
        match env
            .store
            .save_world_state(&WorldDocument::new(world_id.clone(), value))
        {
            Ok(()) => {
                out.push_action(format!(
                    "re-initialized world {world_id} with default configuration"
                ));
                true
            }
            Err(save_error) => {
                out.push_warning(format!("system restart could not persist: {save_error}"));
                false
            }
        }
    }
}

/// Sanitize a world aggregate in place, returning a description of each
/// repair applied.
///
/// Repairs: relationship strengths clamped to `[-1, 1]`, relationships
/// to unknown characters dropped, and object placements pointing at
/// unknown locations cleared.
pub fn repair_world(world: &mut World) -> Vec<String> {
    let mut repairs = Vec::new();

    let known_characters: BTreeSet<_> = world.active_characters.keys().cloned().collect();
    for (character_id, character) in &mut world.active_characters {
        let mut dangling = Vec::new();
        for (other_id, relationship) in &mut character.relationships {
            if !known_characters.contains(other_id) {
                dangling.push(other_id.clone());
                continue;
            }
            if relationship.strength < -1.0 || relationship.strength > 1.0 {
                relationship.strength = relationship.strength.clamp(-1.0, 1.0);
                repairs.push(format!(
                    "clamped relationship strength {character_id} -> {other_id}"
                ));
            }
        }
        for other_id in dangling {
            character.relationships.remove(&other_id);
            repairs.push(format!(
                "dropped relationship {character_id} -> unknown character {other_id}"
            ));
        }
    }

    let known_locations: BTreeSet<_> = world.active_locations.keys().cloned().collect();
    for (object_id, object) in &mut world.active_objects {
        if let Some(location) = object.location.clone()
            && !known_locations.contains(&location)
        {
            object.location = None;
            repairs.push(format!(
                "cleared placement of object {object_id} at unknown location {location}"
            ));
        }
    }

    repairs
}

/// Build the default strategy-keyed action registry.
fn default_actions() -> BTreeMap<RecoveryStrategy, Box<dyn RecoveryAction>> {
    let mut actions: BTreeMap<RecoveryStrategy, Box<dyn RecoveryAction>> = BTreeMap::new();
    actions.insert(
        RecoveryStrategy::Rollback,
        Box::new(RollbackAction {
            strategy: RecoveryStrategy::Rollback,
        }),
    );
    actions.insert(
        RecoveryStrategy::ResetToCheckpoint,
        Box::new(RollbackAction {
            strategy: RecoveryStrategy::ResetToCheckpoint,
        }),
    );
    actions.insert(RecoveryStrategy::Rebuild, Box::new(RebuildAction));
    actions.insert(
        RecoveryStrategy::GracefulDegradation,
        Box::new(GracefulDegradationAction),
    );
    actions.insert(
        RecoveryStrategy::CacheInvalidation,
        Box::new(CacheInvalidationAction),
    );
    actions.insert(RecoveryStrategy::DataRepair, Box::new(DataRepairAction));
    actions.insert(RecoveryStrategy::FallbackMode, Box::new(FallbackModeAction));
    actions.insert(RecoveryStrategy::SystemRestart, Box::new(SystemRestartAction));
    actions
}

// ---------------------------------------------------------------------------
// History and statistics
// ---------------------------------------------------------------------------

/// One handled fault in the bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When the fault was handled.
    pub at: DateTime<Utc>,
    /// The classified kind.
    pub error_type: ErrorKind,
    /// The reporting component.
    pub component: String,
    /// The original failure text.
    pub message: String,
    /// Whether recovery succeeded.
    pub recovered: bool,
}

/// Counts removed by [`RecoveryCoordinator::cleanup_old_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CleanupReport {
    /// Error-history records pruned.
    pub errors_removed: usize,
    /// Checkpoints pruned by the rollback manager.
    pub checkpoints_removed: usize,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Classifies failures and dispatches ordered recovery strategies.
pub struct RecoveryCoordinator {
    rollback: RollbackManager,
    health: Arc<Mutex<HealthMonitor>>,
    fallbacks: BTreeMap<String, Box<dyn FallbackHandler>>,
    degraded: BTreeSet<String>,
    actions: BTreeMap<RecoveryStrategy, Box<dyn RecoveryAction>>,
    history: VecDeque<ErrorRecord>,
    store: Arc<dyn WorldStore>,
    cache: Arc<dyn CacheAdmin>,
}

impl core::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("degraded", &self.degraded)
            .field("history_len", &self.history.len())
            .field("fallback_components", &self.fallbacks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RecoveryCoordinator {
    /// Create a coordinator over the given collaborators with the default
    /// action registry.
    pub fn new(
        store: Arc<dyn WorldStore>,
        cache: Arc<dyn CacheAdmin>,
        health: Arc<Mutex<HealthMonitor>>,
        max_checkpoints: usize,
    ) -> Self {
        Self {
            rollback: RollbackManager::new(max_checkpoints),
            health,
            fallbacks: BTreeMap::new(),
            degraded: BTreeSet::new(),
            actions: default_actions(),
            history: VecDeque::new(),
            store,
            cache,
        }
    }

    /// Register a component-specific fallback handler.
    pub fn register_fallback_handler(
        &mut self,
        component: impl Into<String>,
        handler: impl FallbackHandler + 'static,
    ) {
        self.fallbacks.insert(component.into(), Box::new(handler));
    }

    /// Replace the action behind one strategy tag.
    pub fn register_recovery_action(
        &mut self,
        strategy: RecoveryStrategy,
        action: impl RecoveryAction + 'static,
    ) {
        self.actions.insert(strategy, Box::new(action));
    }

    /// Classify a failure and attempt its mapped strategies in order,
    /// stopping at the first success. Always returns a
    /// [`RecoveryResult`]; never propagates.
    pub fn handle_error(&mut self, error_text: &str, context: &ErrorContext) -> RecoveryResult {
        let started = Instant::now();
        let kind = classify_error(error_text, context);
        let mut result = RecoveryResult::new(kind);

        warn!(
            component = %context.component,
            world_id = ?context.world_id,
            error_type = %kind,
            error = error_text,
            "Handling classified fault"
        );

        let mut recovered_by = None;
        for strategy in strategies_for(kind) {
            let Some(action) = self.actions.get(strategy) else {
                result.push_warning(format!("no action registered for strategy {strategy}"));
                continue;
            };
            let mut env = RecoveryEnv {
                rollback: &mut self.rollback,
                fallbacks: &self.fallbacks,
                degraded: &mut self.degraded,
                store: self.store.as_ref(),
                cache: self.cache.as_ref(),
            };
            if action.attempt(context, &mut env, &mut result) {
                recovered_by = Some(*strategy);
                break;
            }
        }

        match recovered_by {
            Some(strategy) => {
                result.success = true;
                info!(error_type = %kind, strategy = %strategy, "Fault recovered");
            }
            None => {
                result.push_error(format!(
                    "all recovery strategies exhausted for {kind}: {error_text}"
                ));
                warn!(error_type = %kind, "All recovery strategies exhausted");
            }
        }

        // Persistent probe failures are reported alongside whatever
        // happened here, so the caller sees the whole picture.
        {
            let health = self
                .health
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for issue in health.detect_degradation() {
                result.push_warning(issue);
            }
        }

        self.history.push_back(ErrorRecord {
            at: Utc::now(),
            error_type: kind,
            component: context.component.clone(),
            message: error_text.to_owned(),
            recovered: result.success,
        });
        while self.history.len() > MAX_ERROR_HISTORY {
            self.history.pop_front();
        }

        result.recovery_time = started.elapsed();
        result
    }

    /// Counts of handled faults by kind, recency, and outcome.
    pub fn get_error_statistics(&self) -> ErrorStatistics {
        let cutoff = Utc::now() - Duration::minutes(RECENT_ERROR_WINDOW_MINUTES);
        let mut stats = ErrorStatistics {
            total: u64::try_from(self.history.len()).unwrap_or(u64::MAX),
            ..ErrorStatistics::default()
        };
        for record in &self.history {
            let entry = stats.by_kind.entry(record.error_type).or_insert(0);
            *entry = entry.saturating_add(1);
            if record.at >= cutoff {
                stats.recent = stats.recent.saturating_add(1);
            }
            if record.recovered {
                stats.recovered = stats.recovered.saturating_add(1);
            }
        }
        stats
    }

    /// Prune the error history and delegate checkpoint pruning to the
    /// rollback manager.
    pub fn cleanup_old_data(&mut self, max_age_days: i64) -> CleanupReport {
        let cutoff = Utc::now() - Duration::days(max_age_days.max(0));
        let before = self.history.len();
        self.history.retain(|record| record.at >= cutoff);
        CleanupReport {
            errors_removed: before.saturating_sub(self.history.len()),
            checkpoints_removed: self.rollback.cleanup_old_checkpoints(max_age_days),
        }
    }

    /// Components currently degraded.
    pub fn degraded_components(&self) -> Vec<String> {
        self.degraded.iter().cloned().collect()
    }

    /// True when the component has been degraded and not restored.
    pub fn is_degraded(&self, component: &str) -> bool {
        self.degraded.contains(component)
    }

    /// Restore a previously degraded component.
    pub fn restore_component(&mut self, component: &str) -> bool {
        self.degraded.remove(component)
    }

    /// Access the checkpoint history.
    pub const fn rollback(&self) -> &RollbackManager {
        &self.rollback
    }

    /// Mutable access to the checkpoint history (used by the world state
    /// manager's checkpoint-then-mutate discipline).
    pub const fn rollback_mut(&mut self) -> &mut RollbackManager {
        &mut self.rollback
    }

    /// The retained error history, oldest first.
    pub fn error_history(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.history.iter()
    }
}
