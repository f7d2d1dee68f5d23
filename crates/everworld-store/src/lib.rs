//! Persistence and cache collaborator contracts for the Everworld engine.
//!
//! Durable persistence and caching are external collaborators: this crate
//! specifies their contracts and ships in-memory reference implementations
//! used by tests and the demo binary. The engine only ever talks to the
//! traits; production backends live behind the same seams.
//!
//! All collaborator calls are synchronous and blocking. Retry and timeout
//! policy belongs to the backend; failures surface to the engine as
//! [`StoreError`] values for the recovery coordinator to classify.
//!
//! # Cache key patterns
//!
//! | Pattern | Description |
//! |---------|-------------|
//! | `world:{id}:state` | Serialized world document |
//! | `world:{id}:summary` | Cached summary view |

pub mod error;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use everworld_types::{EntityId, EntityKind, TimelineEvent, WorldId};

pub use error::StoreError;
pub use memory::{MemoryWorldCache, MemoryWorldStore};

// ---------------------------------------------------------------------------
// Persisted documents
// ---------------------------------------------------------------------------

/// The persisted layout of one world.
///
/// The aggregate itself travels as opaque JSON so the storage contract
/// does not chase the domain model's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDocument {
    /// The world this document describes.
    pub world_id: WorldId,
    /// Full serialized world state.
    pub full_state: serde_json::Value,
    /// Wall-clock time the document was written.
    pub saved_at: DateTime<Utc>,
}

impl WorldDocument {
    /// Wrap a serialized world state, stamped now.
    pub fn new(world_id: WorldId, full_state: serde_json::Value) -> Self {
        Self {
            world_id,
            full_state,
            saved_at: Utc::now(),
        }
    }
}

/// The persisted layout of one entity's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDocument {
    /// The world owning the entity.
    pub world_id: WorldId,
    /// The entity whose history this is.
    pub entity_id: EntityId,
    /// The kind of entity.
    pub entity_type: EntityKind,
    /// Events in non-decreasing timestamp order.
    pub events: Vec<TimelineEvent>,
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// The persistence collaborator contract.
pub trait WorldStore: Send + Sync {
    /// Write (or overwrite) a world document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the backend fails.
    fn save_world_state(&self, document: &WorldDocument) -> Result<(), StoreError>;

    /// Load a world document, or `None` when no such world is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the backend fails; a missing
    /// world is not an error.
    fn load_world_state(&self, world_id: &WorldId) -> Result<Option<WorldDocument>, StoreError>;

    /// Update an existing world document. Returns `false` (without
    /// writing) when the world is not persisted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the backend fails.
    fn update_world_state(&self, document: &WorldDocument) -> Result<bool, StoreError>;

    /// Write (or overwrite) one entity's timeline document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the backend fails.
    fn save_timeline(&self, document: &TimelineDocument) -> Result<(), StoreError>;

    /// Load every timeline document belonging to a world.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the backend fails.
    fn load_timelines(&self, world_id: &WorldId) -> Result<Vec<TimelineDocument>, StoreError>;
}

/// The cache collaborator contract.
pub trait WorldCache: Send + Sync {
    /// Read a cached value, honoring expiry. A missing or expired key is
    /// `None`, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the backend fails.
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Write a value with an optional time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the backend fails.
    fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<std::time::Duration>,
    ) -> Result<(), StoreError>;

    /// Remove a single key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the backend fails.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Administrative cache operations used by the cache-invalidation
/// recovery strategy.
pub trait CacheAdmin: WorldCache {
    /// Drop every cached view of a world. Returns the number of entries
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the backend fails.
    fn invalidate_world(&self, world_id: &WorldId) -> Result<u64, StoreError>;
}

/// Cache key for a world's serialized state.
pub fn world_state_key(world_id: &WorldId) -> String {
    format!("world:{world_id}:state")
}

/// Common key prefix for every cached view of a world.
pub fn world_key_prefix(world_id: &WorldId) -> String {
    format!("world:{world_id}:")
}
