//! Checkpoint rollback, health monitoring, and fault recovery for the
//! Everworld engine.
//!
//! Failure handling here is value-driven, not unwinding-driven: lower
//! layers return explicit error values, the coordinator classifies them
//! into a closed fault taxonomy, and a registry of strategy
//! implementations attempts remediation in a declared order. The
//! coordinator always answers with a structured result; nothing
//! propagates past it.
//!
//! # Modules
//!
//! - [`rollback`] -- Bounded per-world checkpoint history (FIFO
//!   eviction) and rollback retrieval.
//! - [`health`] -- Named boolean probes, panic-isolated execution, run
//!   history, and persistent-failure detection.
//! - [`coordinator`] -- Fault classification, the static strategy
//!   table, the recovery-action registry, fallback handlers, and the
//!   bounded error history.
//! - [`error`] -- [`RecoveryError`], the expected failure modes of
//!   recovery itself.

pub mod coordinator;
pub mod error;
pub mod health;
pub mod rollback;

pub use coordinator::{
    CleanupReport, ErrorContext, ErrorRecord, FallbackHandler, RecoveryAction,
    RecoveryCoordinator, RecoveryEnv, classify_error, repair_world, strategies_for,
};
pub use error::RecoveryError;
pub use health::HealthMonitor;
pub use rollback::{DEFAULT_MAX_CHECKPOINTS, RollbackManager};
