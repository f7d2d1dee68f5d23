//! Per-entity append-only event logs for the Everworld engine.
//!
//! Each entity in a world owns exactly one [`Timeline`]: an ordered
//! sequence of immutable [`TimelineEvent`] records. The engine enforces
//! the single invariant everything downstream depends on: event
//! timestamps are non-decreasing within a timeline. An append that would
//! break chronological order is rejected and classified upstream as
//! timeline corruption.
//!
//! Timelines are created lazily on first append or explicitly alongside
//! entity creation, and are owned exclusively by the [`TimelineEngine`];
//! the world state manager references them, never copies them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use everworld_types::{EntityId, EntityKind, TimelineEvent};

/// Errors that can occur during timeline operations.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// An append would violate the chronological-order invariant.
    #[error(
        "timeline for {entity_id} would break chronological order: \
         event at {attempted} precedes last event at {last}"
    )]
    OutOfOrder {
        /// The entity whose timeline rejected the append.
        entity_id: EntityId,
        /// Timestamp of the last appended event.
        last: DateTime<Utc>,
        /// Timestamp of the rejected event.
        attempted: DateTime<Utc>,
    },

    /// The event named a different entity than the append target.
    #[error("timeline append for {expected} received an event for {found}")]
    EntityMismatch {
        /// The entity the caller addressed.
        expected: EntityId,
        /// The entity named inside the event.
        found: EntityId,
    },
}

/// The ordered event history owned by a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// The entity this history belongs to.
    pub entity_id: EntityId,
    /// The kind of entity.
    pub entity_type: EntityKind,
    /// Events in non-decreasing timestamp order.
    events: Vec<TimelineEvent>,
}

impl Timeline {
    /// Create an empty timeline for an entity.
    pub const fn new(entity_id: EntityId, entity_type: EntityKind) -> Self {
        Self {
            entity_id,
            entity_type,
            events: Vec::new(),
        }
    }

    /// The full event sequence, oldest first.
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// The most recently appended event, if any.
    pub fn last_event(&self) -> Option<&TimelineEvent> {
        self.events.last()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events have been appended (or all were trimmed).
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Owner of every timeline in one world.
///
/// `max_events` bounds each timeline: when an append pushes a timeline
/// over the cap, the oldest events are trimmed (FIFO) so exactly
/// `max_events` remain. A cap of zero disables trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEngine {
    timelines: BTreeMap<EntityId, Timeline>,
    max_events: usize,
}

impl TimelineEngine {
    /// Create an engine whose timelines retain at most `max_events`
    /// events each.
    pub const fn new(max_events: usize) -> Self {
        Self {
            timelines: BTreeMap::new(),
            max_events,
        }
    }

    /// Create a timeline for an entity. Idempotent: if the entity already
    /// has a timeline it is returned unchanged (the original entity kind
    /// wins).
    pub fn create_timeline(&mut self, entity_id: &EntityId, entity_type: EntityKind) -> &Timeline {
        self.timelines
            .entry(entity_id.clone())
            .or_insert_with(|| Timeline::new(entity_id.clone(), entity_type))
    }

    /// Append an event to an entity's timeline, creating the timeline
    /// lazily when absent.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::EntityMismatch`] if `event.entity_id`
    /// differs from `entity_id`, and [`TimelineError::OutOfOrder`] if the
    /// event's timestamp is strictly earlier than the last appended
    /// event's.
    pub fn append_event(
        &mut self,
        entity_id: &EntityId,
        event: TimelineEvent,
    ) -> Result<(), TimelineError> {
        if event.entity_id != *entity_id {
            return Err(TimelineError::EntityMismatch {
                expected: entity_id.clone(),
                found: event.entity_id,
            });
        }

        let timeline = self
            .timelines
            .entry(entity_id.clone())
            .or_insert_with(|| Timeline::new(entity_id.clone(), event.entity_type));

        if let Some(last) = timeline.events.last()
            && event.timestamp < last.timestamp
        {
            return Err(TimelineError::OutOfOrder {
                entity_id: entity_id.clone(),
                last: last.timestamp,
                attempted: event.timestamp,
            });
        }

        timeline.events.push(event);

        if self.max_events > 0 && timeline.events.len() > self.max_events {
            let excess = timeline.events.len().saturating_sub(self.max_events);
            timeline.events.drain(..excess);
            debug!(entity_id = %entity_id, trimmed = excess, "Trimmed oldest timeline events");
        }

        Ok(())
    }

    /// Look up an entity's timeline.
    pub fn get_timeline(&self, entity_id: &EntityId) -> Option<&Timeline> {
        self.timelines.get(entity_id)
    }

    /// Remove an entity's timeline entirely, returning it if present.
    /// Used when rebuilding a world from partial data.
    pub fn remove_timeline(&mut self, entity_id: &EntityId) -> Option<Timeline> {
        self.timelines.remove(entity_id)
    }

    /// Events for an entity within the half-open range `[start, end)`.
    ///
    /// A bounded, restartable scan: the start position is located by
    /// binary search over the ordered sequence, and iteration stops at
    /// the first event at or past `end`. Unknown entities yield an empty
    /// iterator.
    pub fn query_range<'a>(
        &'a self,
        entity_id: &EntityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a TimelineEvent> + 'a {
        let tail: &[TimelineEvent] = self.timelines.get(entity_id).map_or(&[], |timeline| {
            let lo = timeline
                .events
                .partition_point(|event| event.timestamp < start);
            timeline.events.get(lo..).unwrap_or(&[])
        });
        tail.iter().take_while(move |event| event.timestamp < end)
    }

    /// Iterate over all timelines, keyed by entity.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Timeline)> {
        self.timelines.iter()
    }

    /// Number of timelines held.
    pub fn timeline_count(&self) -> usize {
        self.timelines.len()
    }

    /// Total retained events across every timeline.
    pub fn total_events(&self) -> usize {
        self.timelines
            .values()
            .fold(0_usize, |acc, t| acc.saturating_add(t.events.len()))
    }

    /// The per-timeline retention cap (zero = unbounded).
    pub const fn max_events(&self) -> usize {
        self.max_events
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use everworld_types::EventKind;

    use super::*;

    fn entity() -> EntityId {
        EntityId::from("elena")
    }

    fn event_at(at: DateTime<Utc>, description: &str) -> TimelineEvent {
        TimelineEvent::new(
            entity(),
            EntityKind::Character,
            EventKind::DailyLife,
            at,
            description,
        )
    }

    #[test]
    fn create_timeline_is_idempotent() {
        let mut engine = TimelineEngine::new(100);
        engine.create_timeline(&entity(), EntityKind::Character);
        engine.create_timeline(&entity(), EntityKind::Object);
        assert_eq!(engine.timeline_count(), 1);
        // The original kind wins.
        assert_eq!(
            engine.get_timeline(&entity()).unwrap().entity_type,
            EntityKind::Character
        );
    }

    #[test]
    fn append_creates_timeline_lazily() {
        let mut engine = TimelineEngine::new(100);
        let now = Utc::now();
        engine.append_event(&entity(), event_at(now, "wakes early")).unwrap();
        assert_eq!(engine.timeline_count(), 1);
        assert_eq!(engine.get_timeline(&entity()).unwrap().len(), 1);
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let mut engine = TimelineEngine::new(100);
        let now = Utc::now();
        engine.append_event(&entity(), event_at(now, "first")).unwrap();

        let earlier = now - Duration::hours(1);
        let result = engine.append_event(&entity(), event_at(earlier, "stale"));
        assert!(matches!(result, Err(TimelineError::OutOfOrder { .. })));
        // The rejected event left no trace.
        assert_eq!(engine.get_timeline(&entity()).unwrap().len(), 1);
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut engine = TimelineEngine::new(100);
        let now = Utc::now();
        engine.append_event(&entity(), event_at(now, "first")).unwrap();
        engine.append_event(&entity(), event_at(now, "same instant")).unwrap();
        assert_eq!(engine.get_timeline(&entity()).unwrap().len(), 2);
    }

    #[test]
    fn entity_mismatch_is_rejected() {
        let mut engine = TimelineEngine::new(100);
        let other = EntityId::from("marta");
        let result = engine.append_event(&other, event_at(Utc::now(), "misaddressed"));
        assert!(matches!(result, Err(TimelineError::EntityMismatch { .. })));
        assert_eq!(engine.timeline_count(), 0);
    }

    #[test]
    fn oldest_events_are_trimmed_past_cap() {
        let mut engine = TimelineEngine::new(3);
        let base = Utc::now();
        for i in 0..5_i64 {
            engine
                .append_event(&entity(), event_at(base + Duration::minutes(i), &format!("e{i}")))
                .unwrap();
        }
        let timeline = engine.get_timeline(&entity()).unwrap();
        assert_eq!(timeline.len(), 3);
        // The three newest remain.
        assert_eq!(timeline.events().first().unwrap().description, "e2");
        assert_eq!(timeline.last_event().unwrap().description, "e4");
    }

    #[test]
    fn query_range_is_half_open_and_restartable() {
        let mut engine = TimelineEngine::new(100);
        let base = Utc::now();
        for i in 0..10_i64 {
            engine
                .append_event(&entity(), event_at(base + Duration::days(i), &format!("day{i}")))
                .unwrap();
        }

        let start = base + Duration::days(2);
        let end = base + Duration::days(5);
        let hits: Vec<_> = engine
            .query_range(&entity(), start, end)
            .map(|e| e.description.clone())
            .collect();
        assert_eq!(hits, vec!["day2", "day3", "day4"]);

        // Restartable: a second identical scan sees the same events.
        let again: Vec<_> = engine
            .query_range(&entity(), start, end)
            .map(|e| e.description.clone())
            .collect();
        assert_eq!(again, hits);
    }

    #[test]
    fn query_range_on_unknown_entity_is_empty() {
        let engine = TimelineEngine::new(100);
        let now = Utc::now();
        assert_eq!(engine.query_range(&entity(), now, now + Duration::days(1)).count(), 0);
    }

    #[test]
    fn totals_span_all_timelines() {
        let mut engine = TimelineEngine::new(100);
        let now = Utc::now();
        engine.append_event(&entity(), event_at(now, "one")).unwrap();

        let mill = EntityId::from("mill");
        let mill_event = TimelineEvent::new(
            mill.clone(),
            EntityKind::Location,
            EventKind::EnvironmentalChange,
            now,
            "the wheel turns",
        );
        engine.append_event(&mill, mill_event).unwrap();

        assert_eq!(engine.timeline_count(), 2);
        assert_eq!(engine.total_events(), 2);
    }

    #[test]
    fn engine_round_trips_serde() {
        let mut engine = TimelineEngine::new(50);
        engine.append_event(&entity(), event_at(Utc::now(), "persisted")).unwrap();

        let json = serde_json::to_string(&engine).unwrap();
        let restored: TimelineEngine = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, engine);
        assert_eq!(restored.max_events(), 50);
    }
}
