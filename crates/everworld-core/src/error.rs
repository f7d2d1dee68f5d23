//! Error types for the world state manager.
//!
//! Expected failure modes are explicit values, not unwinding: callers
//! match on the variant, and operation boundaries route the message
//! through the recovery coordinator before surfacing it. A missing
//! world is never an error (lookups return `None`); these variants are
//! for rejected input and collaborator failures.

use everworld_types::{EntityId, WorldId};

/// Errors that can occur in world state manager operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Input or configuration was rejected before any mutation.
    #[error("validation failed: {reason}")]
    Validation {
        /// What was rejected and why.
        reason: String,
    },

    /// `initialize_world` was called for an id that already exists.
    #[error("world {world_id} already exists")]
    WorldExists {
        /// The conflicting world id.
        world_id: WorldId,
    },

    /// A mutation addressed an entity the world does not contain.
    #[error("world {world_id} has no entity {entity_id}")]
    UnknownEntity {
        /// The world addressed.
        world_id: WorldId,
        /// The missing entity.
        entity_id: EntityId,
    },

    /// A persisted or cached world state no longer parses.
    #[error("world {world_id} state is corrupt: {reason}")]
    CorruptState {
        /// The affected world.
        world_id: WorldId,
        /// Why the state was rejected.
        reason: String,
    },

    /// A timeline operation failed.
    #[error(transparent)]
    Timeline(#[from] everworld_timeline::TimelineError),

    /// A persistence or cache collaborator failed.
    #[error(transparent)]
    Store(#[from] everworld_store::StoreError),

    /// A recovery-layer operation failed.
    #[error(transparent)]
    Recovery(#[from] everworld_recovery::RecoveryError),

    /// A world or snapshot could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Shorthand for a validation rejection.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}
