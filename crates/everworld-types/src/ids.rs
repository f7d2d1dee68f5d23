//! Identifier newtypes for worlds, entities, events, and checkpoints.
//!
//! Worlds and entities are keyed by caller-supplied strings (they arrive
//! from outside the engine and must survive round-trips through persisted
//! documents unchanged). Events and checkpoints are generated inside the
//! engine and use UUID v7 (time-ordered) so that freshly created records
//! sort roughly by creation time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a caller-supplied [`String`] key.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a caller-supplied identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Return the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_string_id! {
    /// Unique identifier for an independent simulated world.
    WorldId
}

define_string_id! {
    /// Unique identifier for an entity (character, location, or object)
    /// within a world.
    EntityId
}

define_id! {
    /// Unique identifier for a timeline event.
    EventId
}

define_id! {
    /// Unique identifier for a rollback checkpoint.
    CheckpointId
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_round_trip_serde_transparently() {
        let id = WorldId::new("W1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"W1\"");
        let restored: WorldId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, id);
    }

    #[test]
    fn string_id_display_matches_input() {
        let id = EntityId::from("elena");
        assert_eq!(id.to_string(), "elena");
        assert_eq!(id.as_str(), "elena");
        assert!(!id.is_empty());
    }

    #[test]
    fn empty_string_id_reports_empty() {
        let id = WorldId::new("");
        assert!(id.is_empty());
    }

    #[test]
    fn uuid_ids_are_unique_and_ordered_types() {
        let a = EventId::new();
        let b = EventId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn uuid_id_display_matches_uuid() {
        let id = CheckpointId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
