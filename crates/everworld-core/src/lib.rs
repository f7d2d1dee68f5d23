//! World state manager for the Everworld living-world engine.
//!
//! This crate orchestrates everything the engine does to a world:
//! initialization from a validated configuration, ordered mutation,
//! clock-advancing evolution with probabilistic event generation,
//! consistency validation, and summaries. Failures at operation
//! boundaries are routed through the recovery coordinator rather than
//! propagated, so callers always receive a structured outcome.
//!
//! # Modules
//!
//! - [`config`] -- [`WorldConfig`] / [`EvolutionParams`] and YAML loading.
//! - [`manager`] -- [`WorldStateManager`] and the [`WorldChange`]
//!   mutation operations.
//! - [`narrative`] -- The [`NarrativeSource`] collaborator trait and its
//!   deterministic stub.
//! - [`error`] -- [`EngineError`].
//!
//! The evolution cycle and consistency checks live in private modules
//! behind the manager's API.
//!
//! [`WorldConfig`]: config::WorldConfig
//! [`EvolutionParams`]: config::EvolutionParams
//! [`WorldStateManager`]: manager::WorldStateManager
//! [`WorldChange`]: manager::WorldChange
//! [`NarrativeSource`]: narrative::NarrativeSource
//! [`EngineError`]: error::EngineError

pub mod config;
pub mod error;
mod evolution;
pub mod manager;
pub mod narrative;
mod validation;

pub use config::{ConfigError, EntitySeed, EvolutionParams, WorldConfig};
pub use error::EngineError;
pub use manager::{WorldChange, WorldStateManager};
pub use narrative::{NarrativeSource, StubNarrative};
