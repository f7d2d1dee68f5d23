//! Immutable timeline event records.
//!
//! Every entity in a world owns an append-only timeline of these records.
//! Once appended, an event is never edited or removed (timelines may trim
//! their oldest records when over capacity, but individual records never
//! change).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EntityKind, EventKind};
use crate::ids::{EntityId, EventId};

/// One immutable record in an entity's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Unique identifier for this event.
    pub event_id: EventId,
    /// The entity whose timeline this event belongs to.
    pub entity_id: EntityId,
    /// The kind of entity the timeline belongs to.
    pub entity_type: EntityKind,
    /// Category of the event.
    pub event_type: EventKind,
    /// Simulated time at which the event occurred. Timestamps are
    /// non-decreasing within a timeline.
    pub timestamp: DateTime<Utc>,
    /// Events that causally precede this one, if any.
    pub caused_by: Vec<EventId>,
    /// Human-readable description of what happened.
    pub description: String,
    /// Opaque payload handed to downstream content generation.
    pub payload: serde_json::Value,
}

impl TimelineEvent {
    /// Create a new event with a fresh [`EventId`], no causal references,
    /// and an empty payload.
    pub fn new(
        entity_id: EntityId,
        entity_type: EntityKind,
        event_type: EventKind,
        timestamp: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            entity_id,
            entity_type,
            event_type,
            timestamp,
            caused_by: Vec::new(),
            description: description.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a causal reference to a prior event.
    #[must_use]
    pub fn caused_by(mut self, prior: EventId) -> Self {
        self.caused_by.push(prior);
        self
    }

    /// Attach an opaque payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
