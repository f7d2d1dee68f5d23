//! The evolution cycle: advancing a world's simulated clock and
//! probabilistically generating history for its entities.
//!
//! One cycle covers one requested `time_delta`. The delta is scaled by
//! the world's `evolution_speed` into a number of simulated days, which
//! are processed in month-sized chunks to bound per-call cost for very
//! large spans. Each simulated day draws per-entity triggers against the
//! configured category rates (clamped to `[0, 1]`, scaled down while
//! background processing is active) under a shared per-day event cap.
//! Relationship drift runs on a weekly cadence, seasonal events fire on
//! season boundaries, and due scheduled tasks are drained into
//! world-milestone events.
//!
//! The clock advances by the full `time_delta` exactly once at the end
//! of the cycle, whether or not any events were generated. The caller
//! owns the checkpoint-then-commit-or-rollback discipline around this
//! function; any error returned here leaves the caller responsible for
//! restoring the pre-cycle snapshot.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, Utc};
use rand::Rng;
use rand::rngs::SmallRng;
use tracing::debug;

use everworld_types::{EntityId, EntityKind, EventKind, Relationship, TimelineEvent, World};

use crate::error::EngineError;
use crate::manager::WorldSlot;
use crate::narrative::NarrativeSource;

/// Simulated days processed per chunk.
const CHUNK_DAYS: u64 = 30;

/// Cadence (in simulated days) of relationship drift between pairs.
const RELATIONSHIP_CADENCE_DAYS: u64 = 7;

/// Share of triggered character events upgraded to personal milestones.
const MILESTONE_SHARE: f64 = 0.1;

/// Largest relationship drift applied in one step.
const RELATIONSHIP_DRIFT: f64 = 0.1;

/// What one evolution cycle did, before it is folded into the caller's
/// result struct.
#[derive(Debug, Default)]
pub(crate) struct CycleOutcome {
    /// Total events appended.
    pub events_generated: u32,
    /// Characters that received at least one event.
    pub characters_evolved: BTreeSet<EntityId>,
    /// Locations that received at least one event.
    pub locations_changed: BTreeSet<EntityId>,
    /// Objects that received at least one event.
    pub objects_modified: BTreeSet<EntityId>,
    /// Every entity whose timeline changed (superset of the above).
    pub touched: BTreeSet<EntityId>,
    /// Non-fatal findings for the caller's warning list.
    pub warnings: Vec<String>,
}

impl CycleOutcome {
    fn record(&mut self, entity_id: &EntityId, kind: EntityKind) {
        match kind {
            EntityKind::Character => {
                self.characters_evolved.insert(entity_id.clone());
            }
            EntityKind::Location => {
                self.locations_changed.insert(entity_id.clone());
            }
            EntityKind::Object => {
                self.objects_modified.insert(entity_id.clone());
            }
        }
        self.touched.insert(entity_id.clone());
        self.events_generated = self.events_generated.saturating_add(1);
    }
}

/// A per-day probability: the configured rate clamped into `[0, 1]`
/// after background scaling, with non-finite values degraded to zero.
fn clamped_rate(rate: f64, scale: f64) -> f64 {
    let scaled = rate * scale;
    if scaled.is_finite() { scaled.clamp(0.0, 1.0) } else { 0.0 }
}

/// Season index (0-3) of a simulated instant, by calendar quarter.
fn season_of(at: DateTime<Utc>) -> u32 {
    at.month0() / 3
}

/// Run one evolution cycle over a locked world slot.
///
/// # Errors
///
/// Returns [`EngineError::Timeline`] if an append is rejected and
/// [`EngineError::Validation`] if the delta overflows the simulated
/// clock. The world may be partially mutated on error; the caller rolls
/// back to its checkpoint.
#[allow(clippy::too_many_lines)]
pub(crate) fn run_evolution_cycle(
    slot: &mut WorldSlot,
    time_delta: Duration,
    rng: &mut SmallRng,
    narrative: &dyn NarrativeSource,
) -> Result<CycleOutcome, EngineError> {
    let start = slot.world.current_time;
    let end = start
        .checked_add_signed(time_delta)
        .ok_or_else(|| EngineError::validation("time delta overflows the simulated clock"))?;

    let mut outcome = CycleOutcome::default();
    let effective_days = effective_days(time_delta, slot.world.world_flags.evolution_speed);
    let step_seconds = i64::try_from(effective_days.max(1))
        .map_or(0, |days| time_delta.num_seconds().checked_div(days).unwrap_or(0));

    let background_scale = if slot.world.world_flags.background_processing {
        slot.world.world_flags.background_rate_scale.clamp(0.0, 1.0)
    } else {
        1.0
    };
    let character_rate =
        clamped_rate(slot.world.world_flags.character_event_rate, background_scale);
    let location_rate = clamped_rate(slot.world.world_flags.location_event_rate, background_scale);
    let object_rate = clamped_rate(slot.world.world_flags.object_event_rate, background_scale);

    let mut capped_days = 0_u64;
    let mut previous_cursor = start;
    let mut day = 0_u64;
    while day < effective_days {
        let chunk_end = day.saturating_add(CHUNK_DAYS).min(effective_days);
        debug!(
            world_id = %slot.world.world_id,
            chunk_start = day,
            chunk_end,
            "Processing evolution chunk"
        );

        while day < chunk_end {
            let offset = step_seconds.saturating_mul(
                i64::try_from(day).unwrap_or(i64::MAX).saturating_add(1),
            );
            let cursor = start
                .checked_add_signed(Duration::try_seconds(offset).unwrap_or_else(Duration::zero))
                .unwrap_or(end)
                .min(end);

            let cap = slot.world.world_flags.max_events_per_day;
            let mut events_today = 0_u32;

            generate_category_events(
                slot,
                EntityKind::Character,
                character_rate,
                cursor,
                cap,
                &mut events_today,
                rng,
                narrative,
                &mut outcome,
            )?;
            generate_category_events(
                slot,
                EntityKind::Location,
                location_rate,
                cursor,
                cap,
                &mut events_today,
                rng,
                narrative,
                &mut outcome,
            )?;
            generate_category_events(
                slot,
                EntityKind::Object,
                object_rate,
                cursor,
                cap,
                &mut events_today,
                rng,
                narrative,
                &mut outcome,
            )?;

            if slot.world.world_flags.relationship_evolution
                && day.checked_rem(RELATIONSHIP_CADENCE_DAYS)
                    == Some(RELATIONSHIP_CADENCE_DAYS.saturating_sub(1))
            {
                evolve_relationship_pair(slot, cursor, cap, &mut events_today, rng, narrative, &mut outcome)?;
            }

            if slot.world.world_flags.seasonal_evolution && season_of(previous_cursor) != season_of(cursor)
            {
                generate_seasonal_events(slot, cursor, cap, &mut events_today, narrative, &mut outcome)?;
            }

            drain_due_tasks(slot, cursor, &mut outcome)?;

            if events_today >= cap && cap > 0 {
                capped_days = capped_days.saturating_add(1);
            }
            previous_cursor = cursor;
            day = day.saturating_add(1);
        }
    }

    if capped_days > 0 {
        outcome.warnings.push(format!(
            "event cap of {} reached on {capped_days} simulated day(s)",
            slot.world.world_flags.max_events_per_day
        ));
    }

    // The clock advances by the full delta exactly once, events or not.
    slot.world.current_time = end;
    slot.world.last_evolution = Some(Utc::now());
    slot.world.touch();

    Ok(outcome)
}

/// Scale the requested delta into whole simulated days.
fn effective_days(time_delta: Duration, evolution_speed: f64) -> u64 {
    let days = time_delta.num_days();
    if days <= 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss)]
    let scaled = (days as f64) * evolution_speed.max(0.0);
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        scaled.floor().min(9.0e15) as u64
    }
}

/// Draw triggers for every entity of one category on one simulated day.
#[allow(clippy::too_many_arguments)]
fn generate_category_events(
    slot: &mut WorldSlot,
    kind: EntityKind,
    rate: f64,
    cursor: DateTime<Utc>,
    cap: u32,
    events_today: &mut u32,
    rng: &mut SmallRng,
    narrative: &dyn NarrativeSource,
    outcome: &mut CycleOutcome,
) -> Result<(), EngineError> {
    if rate <= 0.0 {
        return Ok(());
    }

    let entities: Vec<(EntityId, String)> = match kind {
        EntityKind::Character => slot
            .world
            .active_characters
            .iter()
            .map(|(id, c)| (id.clone(), display_name(&c.name, id)))
            .collect(),
        EntityKind::Location => slot
            .world
            .active_locations
            .iter()
            .map(|(id, l)| (id.clone(), display_name(&l.name, id)))
            .collect(),
        EntityKind::Object => slot
            .world
            .active_objects
            .iter()
            .map(|(id, o)| (id.clone(), display_name(&o.name, id)))
            .collect(),
    };

    for (entity_id, entity_name) in entities {
        if *events_today >= cap {
            return Ok(());
        }
        if !rng.random_bool(rate) {
            continue;
        }

        let event_kind = if kind == EntityKind::Character && rng.random_bool(MILESTONE_SHARE) {
            EventKind::PersonalMilestone
        } else {
            EventKind::for_entity(kind)
        };
        let description =
            narrative.describe_event(&slot.world.world_name, &entity_name, event_kind, cursor);
        let event = TimelineEvent::new(entity_id.clone(), kind, event_kind, cursor, description);
        slot.timelines.append_event(&entity_id, event)?;

        outcome.record(&entity_id, kind);
        *events_today = events_today.saturating_add(1);
    }
    Ok(())
}

/// Drift the relationship between one randomly chosen character pair and
/// record a relationship-change event on both timelines.
fn evolve_relationship_pair(
    slot: &mut WorldSlot,
    cursor: DateTime<Utc>,
    cap: u32,
    events_today: &mut u32,
    rng: &mut SmallRng,
    narrative: &dyn NarrativeSource,
    outcome: &mut CycleOutcome,
) -> Result<(), EngineError> {
    let ids: Vec<EntityId> = slot.world.active_characters.keys().cloned().collect();
    if ids.len() < 2 || events_today.saturating_add(2) > cap {
        return Ok(());
    }

    let first = rng.random_range(0..ids.len());
    let mut second = rng.random_range(0..ids.len().saturating_sub(1));
    if second >= first {
        second = second.saturating_add(1);
    }
    let (Some(a), Some(b)) = (ids.get(first).cloned(), ids.get(second).cloned()) else {
        return Ok(());
    };

    let drift = rng.random_range(-RELATIONSHIP_DRIFT..=RELATIONSHIP_DRIFT);
    adjust_relationship(&mut slot.world, &a, &b, drift);
    adjust_relationship(&mut slot.world, &b, &a, drift);

    for (this, _other) in [(&a, &b), (&b, &a)] {
        let name = slot
            .world
            .active_characters
            .get(this)
            .map_or_else(|| this.to_string(), |c| display_name(&c.name, this));
        let description = narrative.describe_event(
            &slot.world.world_name,
            &name,
            EventKind::RelationshipChange,
            cursor,
        );
        let event = TimelineEvent::new(
            this.clone(),
            EntityKind::Character,
            EventKind::RelationshipChange,
            cursor,
            description,
        );
        slot.timelines.append_event(this, event)?;
        outcome.record(this, EntityKind::Character);
        *events_today = events_today.saturating_add(1);
    }
    Ok(())
}

/// Nudge (or create) the relationship from `from` toward `to`.
fn adjust_relationship(world: &mut World, from: &EntityId, to: &EntityId, drift: f64) {
    if let Some(character) = world.active_characters.get_mut(from) {
        let relationship = character
            .relationships
            .entry(to.clone())
            .or_insert_with(|| Relationship::new("acquaintance", 0.0));
        relationship.strength = (relationship.strength + drift).clamp(-1.0, 1.0);
    }
}

/// On a season boundary, mark every location with a seasonal-shift event.
fn generate_seasonal_events(
    slot: &mut WorldSlot,
    cursor: DateTime<Utc>,
    cap: u32,
    events_today: &mut u32,
    narrative: &dyn NarrativeSource,
    outcome: &mut CycleOutcome,
) -> Result<(), EngineError> {
    let locations: Vec<(EntityId, String)> = slot
        .world
        .active_locations
        .iter()
        .map(|(id, l)| (id.clone(), display_name(&l.name, id)))
        .collect();

    for (entity_id, entity_name) in locations {
        if *events_today >= cap {
            return Ok(());
        }
        let description = narrative.describe_event(
            &slot.world.world_name,
            &entity_name,
            EventKind::SeasonalShift,
            cursor,
        );
        let event = TimelineEvent::new(
            entity_id.clone(),
            EntityKind::Location,
            EventKind::SeasonalShift,
            cursor,
            description,
        );
        slot.timelines.append_event(&entity_id, event)?;
        outcome.record(&entity_id, EntityKind::Location);
        *events_today = events_today.saturating_add(1);
    }
    Ok(())
}

/// Drain scheduled tasks that have come due, each producing a
/// world-milestone event on its target entity. Deferred work fires
/// regardless of the per-day cap.
fn drain_due_tasks(
    slot: &mut WorldSlot,
    cursor: DateTime<Utc>,
    outcome: &mut CycleOutcome,
) -> Result<(), EngineError> {
    let due: Vec<_> = slot
        .world
        .evolution_schedule
        .iter()
        .filter(|task| task.due_time <= cursor)
        .cloned()
        .collect();
    if due.is_empty() {
        return Ok(());
    }
    slot.world.evolution_schedule.retain(|task| task.due_time > cursor);

    for task in due {
        let Some(kind) = entity_kind_of(&slot.world, &task.target) else {
            outcome.warnings.push(format!(
                "scheduled task '{}' targets unknown entity {}",
                task.task_id, task.target
            ));
            continue;
        };
        let event = TimelineEvent::new(
            task.target.clone(),
            kind,
            EventKind::WorldMilestone,
            cursor,
            task.description.clone(),
        );
        slot.timelines.append_event(&task.target, event)?;
        outcome.record(&task.target, kind);
    }
    Ok(())
}

/// Which category map an entity lives in, if any.
fn entity_kind_of(world: &World, entity_id: &EntityId) -> Option<EntityKind> {
    if world.active_characters.contains_key(entity_id) {
        Some(EntityKind::Character)
    } else if world.active_locations.contains_key(entity_id) {
        Some(EntityKind::Location)
    } else if world.active_objects.contains_key(entity_id) {
        Some(EntityKind::Object)
    } else {
        None
    }
}

/// Prefer the display name; fall back to the id for unnamed entities.
fn display_name(name: &str, entity_id: &EntityId) -> String {
    if name.trim().is_empty() {
        entity_id.to_string()
    } else {
        name.to_owned()
    }
}
