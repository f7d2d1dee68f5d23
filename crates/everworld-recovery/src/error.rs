//! Error types for the recovery layer.
//!
//! These are the expected failure modes of recovery itself: a rollback
//! with nothing to roll back to, a strategy invoked without the context
//! it needs, a fallback requested where none is registered.

use everworld_types::{CheckpointId, WorldId};

/// Errors that can occur during rollback and recovery operations.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// A checkpoint operation addressed a world with an empty identifier.
    #[error("checkpoint rejected: world id must be non-empty")]
    EmptyWorldId,

    /// A rollback was requested for a world that holds no checkpoints.
    #[error("no checkpoints exist for world {world_id}")]
    NoCheckpoints {
        /// The world without checkpoints.
        world_id: WorldId,
    },

    /// A rollback named a checkpoint the manager does not hold.
    #[error("checkpoint {checkpoint_id} not found for world {world_id}")]
    CheckpointNotFound {
        /// The world addressed.
        world_id: WorldId,
        /// The missing checkpoint.
        checkpoint_id: CheckpointId,
    },

    /// A strategy that needs a world id was invoked without one.
    #[error("recovery strategy requires a world id but the context carries none")]
    MissingWorldContext,

    /// A fallback was requested for a component with no registered handler.
    #[error("no fallback handler registered for component {component}")]
    NoFallbackHandler {
        /// The component without a handler.
        component: String,
    },

    /// A collaborator call failed during recovery.
    #[error("collaborator error during recovery: {0}")]
    Store(#[from] everworld_store::StoreError),

    /// A snapshot could not be serialized or deserialized.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
