//! Bounded checkpoint history and rollback per world.
//!
//! The rollback manager owns every [`SystemCheckpoint`] in the process.
//! Each world keeps a FIFO-bounded deque of checkpoints: creating one
//! past the cap evicts the oldest. Rolling back returns a clone of the
//! requested checkpoint; applying it (restoring in-memory state,
//! persisting the restored document) is the caller's responsibility,
//! so the history survives repeated rollbacks to the same point.

use std::collections::{BTreeMap, VecDeque};

use chrono::{Duration, Utc};
use tracing::{debug, info};

use everworld_types::{CheckpointId, SystemCheckpoint, WorldId};

use crate::error::RecoveryError;

/// Default number of checkpoints retained per world.
pub const DEFAULT_MAX_CHECKPOINTS: usize = 10;

/// Owner of bounded per-world checkpoint history.
#[derive(Debug)]
pub struct RollbackManager {
    checkpoints: BTreeMap<WorldId, VecDeque<SystemCheckpoint>>,
    max_checkpoints: usize,
}

impl Default for RollbackManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHECKPOINTS)
    }
}

impl RollbackManager {
    /// Create a manager retaining at most `max_checkpoints` per world
    /// (a cap of zero is raised to one; a checkpoint that can never be
    /// held could never be rolled back to).
    pub fn new(max_checkpoints: usize) -> Self {
        Self {
            checkpoints: BTreeMap::new(),
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    /// Snapshot a world's state into a new checkpoint, evicting the
    /// oldest checkpoint when the world's history is at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::EmptyWorldId`] for an empty world id.
    pub fn create_checkpoint(
        &mut self,
        world_id: &WorldId,
        snapshot: serde_json::Value,
    ) -> Result<SystemCheckpoint, RecoveryError> {
        if world_id.is_empty() {
            return Err(RecoveryError::EmptyWorldId);
        }

        let checkpoint = SystemCheckpoint {
            checkpoint_id: CheckpointId::new(),
            world_id: world_id.clone(),
            timestamp: Utc::now(),
            world_state_snapshot: snapshot,
        };

        let history = self.checkpoints.entry(world_id.clone()).or_default();
        history.push_back(checkpoint.clone());
        while history.len() > self.max_checkpoints {
            if let Some(evicted) = history.pop_front() {
                debug!(
                    world_id = %world_id,
                    checkpoint_id = %evicted.checkpoint_id,
                    "Evicted oldest checkpoint"
                );
            }
        }

        debug!(
            world_id = %world_id,
            checkpoint_id = %checkpoint.checkpoint_id,
            held = history.len(),
            "Created checkpoint"
        );
        Ok(checkpoint)
    }

    /// Return the checkpoint to roll back to: the most recently created
    /// one when `checkpoint_id` is `None`, otherwise the exact match.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::NoCheckpoints`] when the world holds no
    /// checkpoints, or [`RecoveryError::CheckpointNotFound`] when the
    /// named checkpoint is not held.
    pub fn rollback_to_checkpoint(
        &self,
        world_id: &WorldId,
        checkpoint_id: Option<&CheckpointId>,
    ) -> Result<SystemCheckpoint, RecoveryError> {
        let history = self
            .checkpoints
            .get(world_id)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RecoveryError::NoCheckpoints {
                world_id: world_id.clone(),
            })?;

        let checkpoint = match checkpoint_id {
            None => history.back(),
            Some(id) => history.iter().find(|c| c.checkpoint_id == *id),
        };

        checkpoint.cloned().map_or_else(
            || {
                checkpoint_id.map_or_else(
                    || {
                        Err(RecoveryError::NoCheckpoints {
                            world_id: world_id.clone(),
                        })
                    },
                    |id| {
                        Err(RecoveryError::CheckpointNotFound {
                            world_id: world_id.clone(),
                            checkpoint_id: *id,
                        })
                    },
                )
            },
            |c| {
                info!(
                    world_id = %world_id,
                    checkpoint_id = %c.checkpoint_id,
                    "Rolling back to checkpoint"
                );
                Ok(c)
            },
        )
    }

    /// The most recently created checkpoint for a world, if any.
    pub fn latest_checkpoint(&self, world_id: &WorldId) -> Option<&SystemCheckpoint> {
        self.checkpoints.get(world_id).and_then(VecDeque::back)
    }

    /// Number of checkpoints held for a world.
    pub fn checkpoint_count(&self, world_id: &WorldId) -> usize {
        self.checkpoints.get(world_id).map_or(0, VecDeque::len)
    }

    /// Remove checkpoints older than `max_age_days` across all worlds.
    /// Returns the number removed.
    pub fn cleanup_old_checkpoints(&mut self, max_age_days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(max_age_days.max(0));
        let mut removed = 0_usize;

        for history in self.checkpoints.values_mut() {
            let before = history.len();
            history.retain(|c| c.timestamp >= cutoff);
            removed = removed.saturating_add(before.saturating_sub(history.len()));
        }
        self.checkpoints.retain(|_, history| !history.is_empty());

        if removed > 0 {
            info!(removed, max_age_days, "Cleaned up aged checkpoints");
        }
        removed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn world() -> WorldId {
        WorldId::new("W1")
    }

    #[test]
    fn checkpoint_history_is_fifo_bounded() {
        let mut manager = RollbackManager::new(3);
        let mut created = Vec::new();
        for i in 0..5 {
            let cp = manager
                .create_checkpoint(&world(), serde_json::json!({ "revision": i }))
                .unwrap();
            created.push(cp);
        }

        // Exactly max_checkpoints remain, and they are the newest.
        assert_eq!(manager.checkpoint_count(&world()), 3);
        let oldest_kept = created.get(2).unwrap();
        assert!(
            manager
                .rollback_to_checkpoint(&world(), Some(&oldest_kept.checkpoint_id))
                .is_ok()
        );
        let evicted = created.first().unwrap();
        assert!(matches!(
            manager.rollback_to_checkpoint(&world(), Some(&evicted.checkpoint_id)),
            Err(RecoveryError::CheckpointNotFound { .. })
        ));
    }

    #[test]
    fn parameterless_rollback_returns_most_recent() {
        let mut manager = RollbackManager::default();
        let _first = manager
            .create_checkpoint(&world(), serde_json::json!({"n": 1}))
            .unwrap();
        let last = manager
            .create_checkpoint(&world(), serde_json::json!({"n": 2}))
            .unwrap();

        let restored = manager.rollback_to_checkpoint(&world(), None).unwrap();
        assert_eq!(restored.checkpoint_id, last.checkpoint_id);
        assert_eq!(restored.world_state_snapshot["n"], 2);
    }

    #[test]
    fn rollback_without_checkpoints_fails() {
        let manager = RollbackManager::default();
        assert!(matches!(
            manager.rollback_to_checkpoint(&world(), None),
            Err(RecoveryError::NoCheckpoints { .. })
        ));
    }

    #[test]
    fn rollback_keeps_history_intact() {
        let mut manager = RollbackManager::default();
        let _ = manager
            .create_checkpoint(&world(), serde_json::json!({}))
            .unwrap();
        let _ = manager.rollback_to_checkpoint(&world(), None).unwrap();
        let _ = manager.rollback_to_checkpoint(&world(), None).unwrap();
        assert_eq!(manager.checkpoint_count(&world()), 1);
    }

    #[test]
    fn empty_world_id_is_rejected() {
        let mut manager = RollbackManager::default();
        assert!(matches!(
            manager.create_checkpoint(&WorldId::new(""), serde_json::json!({})),
            Err(RecoveryError::EmptyWorldId)
        ));
    }

    #[test]
    fn cleanup_removes_aged_checkpoints() {
        let mut manager = RollbackManager::default();
        let cp = manager
            .create_checkpoint(&world(), serde_json::json!({}))
            .unwrap();
        // Nothing is older than one day.
        assert_eq!(manager.cleanup_old_checkpoints(1), 0);
        assert_eq!(manager.checkpoint_count(&world()), 1);
        // Everything is older than a negative threshold's cutoff (now).
        assert_eq!(manager.cleanup_old_checkpoints(0), 1);
        assert_eq!(manager.checkpoint_count(&world()), 0);
        assert!(matches!(
            manager.rollback_to_checkpoint(&world(), Some(&cp.checkpoint_id)),
            Err(RecoveryError::NoCheckpoints { .. })
        ));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut manager = RollbackManager::new(0);
        let _ = manager
            .create_checkpoint(&world(), serde_json::json!({}))
            .unwrap();
        assert_eq!(manager.checkpoint_count(&world()), 1);
    }
}
