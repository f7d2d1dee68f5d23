//! Result structs returned by the engine's operations.
//!
//! These are plain data carriers: one is created per operation call and
//! handed back to the caller with everything that happened during the
//! call, including accumulated errors and warnings. The constructors
//! enforce the one cross-field invariant (a recorded error forces
//! `success = false`).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ErrorKind, WorldStatus};
use crate::ids::{CheckpointId, WorldId};

// ---------------------------------------------------------------------------
// Evolution
// ---------------------------------------------------------------------------

/// Aggregated outcome of one `evolve_world` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EvolutionResult {
    /// Whether the cycle committed. A non-empty `errors` list forces
    /// this to `false`.
    pub success: bool,
    /// Total timeline events generated this cycle.
    pub events_generated: u32,
    /// Characters that received at least one event.
    pub characters_evolved: u32,
    /// Locations that received at least one event.
    pub locations_changed: u32,
    /// Objects that received at least one event.
    pub objects_modified: u32,
    /// Errors encountered; non-empty implies `success == false`.
    pub errors: Vec<String>,
    /// Non-fatal findings surfaced to the caller.
    pub warnings: Vec<String>,
    /// Wall-clock duration of the call.
    pub execution_time: Duration,
}

impl EvolutionResult {
    /// A fresh result that will report success unless an error is pushed.
    pub fn new() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A result that failed before any work happened.
    pub fn failure(error: impl Into<String>) -> Self {
        let mut result = Self::new();
        result.push_error(error);
        result
    }

    /// Record an error; forces `success = false`.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.success = false;
    }

    /// Record a non-fatal warning.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Findings from one `validate_world_consistency` call.
///
/// `is_valid` is the conjunction of all five issue lists being empty;
/// call [`ValidationResult::recompute`] after filling lists directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when every issue list below is empty.
    pub is_valid: bool,
    /// Timeline ordering violations.
    pub timeline_issues: Vec<String>,
    /// Character state problems.
    pub character_issues: Vec<String>,
    /// Location state problems.
    pub location_issues: Vec<String>,
    /// Relationship asymmetries and dangling references.
    pub relationship_issues: Vec<String>,
    /// Cross-record integrity problems, including degraded health checks.
    pub data_integrity_issues: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    /// A fresh, currently-valid result.
    pub const fn new() -> Self {
        Self {
            is_valid: true,
            timeline_issues: Vec::new(),
            character_issues: Vec::new(),
            location_issues: Vec::new(),
            relationship_issues: Vec::new(),
            data_integrity_issues: Vec::new(),
        }
    }

    /// Recompute `is_valid` from the issue lists.
    pub fn recompute(&mut self) {
        self.is_valid = self.timeline_issues.is_empty()
            && self.character_issues.is_empty()
            && self.location_issues.is_empty()
            && self.relationship_issues.is_empty()
            && self.data_integrity_issues.is_empty();
    }

    /// Total number of recorded issues across all lists.
    pub fn issue_count(&self) -> usize {
        self.timeline_issues
            .len()
            .saturating_add(self.character_issues.len())
            .saturating_add(self.location_issues.len())
            .saturating_add(self.relationship_issues.len())
            .saturating_add(self.data_integrity_issues.len())
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// An immutable point-in-time snapshot of a world usable for rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemCheckpoint {
    /// Unique checkpoint identifier.
    pub checkpoint_id: CheckpointId,
    /// The world this checkpoint captures.
    pub world_id: WorldId,
    /// Wall-clock creation time.
    pub timestamp: DateTime<Utc>,
    /// Opaque copy of the world's serializable state at that instant.
    pub world_state_snapshot: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// Structured outcome of one `handle_error` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecoveryResult {
    /// Whether any strategy succeeded. A recorded error forces `false`.
    pub success: bool,
    /// Every remedial action taken, in order.
    pub actions_taken: Vec<String>,
    /// Non-fatal findings, including failed intermediate strategies.
    pub warnings: Vec<String>,
    /// Errors encountered; non-empty implies `success == false`.
    pub errors: Vec<String>,
    /// True when a strategy restored or salvaged data.
    pub data_recovered: bool,
    /// True when a fallback handler is now serving the component.
    pub fallback_active: bool,
    /// Wall-clock duration of the recovery attempt.
    pub recovery_time: Duration,
    /// The classified fault this result responds to.
    pub error_type: Option<ErrorKind>,
}

impl RecoveryResult {
    /// A fresh, not-yet-successful result for the given fault.
    pub fn new(error_type: ErrorKind) -> Self {
        Self {
            error_type: Some(error_type),
            ..Self::default()
        }
    }

    /// Record a remedial action.
    pub fn push_action(&mut self, action: impl Into<String>) {
        self.actions_taken.push(action.into());
    }

    /// Record a non-fatal finding.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Record an error; forces `success = false`.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.success = false;
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// A compact, read-only view of one world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSummary {
    /// The summarized world.
    pub world_id: WorldId,
    /// Display name.
    pub world_name: String,
    /// Lifecycle status.
    pub world_status: WorldStatus,
    /// Current simulated time.
    pub current_time: DateTime<Utc>,
    /// Number of characters.
    pub character_count: usize,
    /// Number of locations.
    pub location_count: usize,
    /// Number of objects.
    pub object_count: usize,
    /// Total timeline events across all owned timelines.
    pub total_timeline_events: usize,
    /// Deferred evolution tasks not yet due.
    pub pending_task_count: usize,
    /// Wall-clock time of the last completed evolution cycle.
    pub last_evolution: Option<DateTime<Utc>>,
    /// Wall-clock time of the last recorded player visit.
    pub player_last_visit: Option<DateTime<Utc>>,
}

/// Per-kind and recent fault counts reported by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorStatistics {
    /// Total faults handled since startup (bounded by history pruning).
    pub total: u64,
    /// Fault counts keyed by classified kind.
    pub by_kind: BTreeMap<ErrorKind, u64>,
    /// Faults handled within the recent-error window.
    pub recent: u64,
    /// How many of the recorded faults were recovered successfully.
    pub recovered: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn evolution_error_forces_failure() {
        let mut result = EvolutionResult::new();
        assert!(result.success);
        result.push_warning("auto evolution disabled");
        assert!(result.success);
        result.push_error("timeline append failed");
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn validation_recompute_tracks_all_lists() {
        let mut result = ValidationResult::new();
        assert!(result.is_valid);
        result.relationship_issues.push("one-way bond".to_owned());
        result.recompute();
        assert!(!result.is_valid);
        assert_eq!(result.issue_count(), 1);

        result.relationship_issues.clear();
        result.recompute();
        assert!(result.is_valid);
    }

    #[test]
    fn recovery_error_forces_failure() {
        let mut result = RecoveryResult::new(ErrorKind::CacheCorruption);
        result.success = true;
        result.push_error("no fallback registered");
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorKind::CacheCorruption));
    }
}
