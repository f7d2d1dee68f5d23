//! Shared type definitions for the Everworld living-world engine.
//!
//! This crate is the single source of truth for all types used across the
//! Everworld workspace: identifiers, closed enumerations, the world
//! aggregate, timeline events, and the result structs returned by the
//! engine's operations.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes (string-keyed worlds/entities,
//!   UUID-keyed events/checkpoints)
//! - [`enums`] -- Closed enumerations (entity kinds, event kinds, world
//!   status, fault taxonomy, recovery strategies)
//! - [`world`] -- The world aggregate and its entity state maps
//! - [`events`] -- Immutable timeline event records
//! - [`results`] -- Operation result structs (evolution, validation,
//!   recovery, summaries, checkpoints)

pub mod enums;
pub mod events;
pub mod ids;
pub mod results;
pub mod world;

// Re-export all public types at crate root for convenience.
pub use enums::{EntityKind, ErrorKind, EventKind, RecoveryStrategy, WorldStatus};
pub use events::TimelineEvent;
pub use ids::{CheckpointId, EntityId, EventId, WorldId};
pub use results::{
    ErrorStatistics, EvolutionResult, RecoveryResult, SystemCheckpoint, ValidationResult,
    WorldSummary,
};
pub use world::{
    CharacterState, EvolutionTask, LocationState, ObjectState, Relationship, World, WorldFlags,
};
