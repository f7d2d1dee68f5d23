//! Demo engine binary for the Everworld living-world engine.
//!
//! Wires the world state manager to the in-memory collaborator
//! implementations, initializes one world from a YAML configuration,
//! evolves it over a requested span, and logs the outcome.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `everworld-config.yaml` (or argv\[1\]),
//!    falling back to a built-in demo world when the file is absent
//! 3. Build the manager over in-memory store and cache
//! 4. Initialize the world and record a player visit
//! 5. Evolve the world by the requested number of days (argv\[2\], default 7)
//! 6. Log the evolution result, consistency verdict, and summary
//!
//! Usage: `everworld-engine [config.yaml] [days]`

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use everworld_core::{EntitySeed, WorldChange, WorldConfig, WorldStateManager};
use everworld_store::{CacheAdmin, MemoryWorldCache, MemoryWorldStore, WorldStore};
use everworld_types::WorldId;

/// Default configuration path when argv does not name one.
const DEFAULT_CONFIG_PATH: &str = "everworld-config.yaml";

/// Default evolution span in days.
const DEFAULT_DAYS: i64 = 7;

/// Random seed for the demo run.
const DEMO_SEED: u64 = 20_260_807;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if initialization, evolution, or validation fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("everworld-engine starting");

    // 2. Load configuration.
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let days: i64 = args
        .next()
        .map(|raw| raw.parse())
        .transpose()?
        .unwrap_or(DEFAULT_DAYS);

    let config = load_config(Path::new(&config_path))?;
    info!(
        world_name = config.world_name,
        characters = config.initial_characters.len(),
        locations = config.initial_locations.len(),
        objects = config.initial_objects.len(),
        evolution_speed = config.evolution_speed,
        "Configuration loaded"
    );

    // 3. Build the manager over in-memory collaborators.
    let store = Arc::new(MemoryWorldStore::new());
    let cache = Arc::new(MemoryWorldCache::new());
    let manager = WorldStateManager::new(
        Arc::clone(&store) as Arc<dyn WorldStore>,
        cache as Arc<dyn CacheAdmin>,
        DEMO_SEED,
    );
    manager.register_health_check("store", {
        let store = Arc::clone(&store);
        move || store.world_count() < 10_000
    });

    // 4. Initialize the world and record a player visit.
    let world_id = WorldId::new("demo");
    let world = manager.initialize_world(&world_id, &config)?;
    info!(
        world_id = %world.world_id,
        current_time = %world.current_time,
        entities = world.entity_count(),
        "World initialized"
    );
    let _ = manager.update_world_state(&world_id, &[WorldChange::RecordPlayerVisit])?;

    // 5. Evolve.
    let result = manager.evolve_world(&world_id, chrono::Duration::days(days));
    info!(
        success = result.success,
        days,
        events_generated = result.events_generated,
        characters_evolved = result.characters_evolved,
        locations_changed = result.locations_changed,
        objects_modified = result.objects_modified,
        execution_ms = u64::try_from(result.execution_time.as_millis()).unwrap_or(u64::MAX),
        "Evolution finished"
    );
    for warning in &result.warnings {
        warn!(warning = %warning, "Evolution warning");
    }
    if !result.success {
        for error in &result.errors {
            tracing::error!(error = %error, "Evolution error");
        }
        return Err("evolution failed".into());
    }

    // 6. Validate and summarize.
    let validation = manager.validate_world_consistency(&world_id);
    info!(is_valid = validation.is_valid, issues = validation.issue_count(), "Consistency checked");
    if !validation.is_valid {
        return Err("world failed consistency validation".into());
    }

    if let Some(summary) = manager.get_world_summary(&world_id) {
        info!(
            world_name = summary.world_name,
            current_time = %summary.current_time,
            characters = summary.character_count,
            locations = summary.location_count,
            objects = summary.object_count,
            timeline_events = summary.total_timeline_events,
            pending_tasks = summary.pending_task_count,
            "World summary"
        );
    }

    info!("everworld-engine finished");
    Ok(())
}

/// Load the world configuration, falling back to a built-in demo world
/// when the file does not exist.
fn load_config(path: &Path) -> Result<WorldConfig, everworld_core::ConfigError> {
    if path.exists() {
        WorldConfig::from_file(path)
    } else {
        warn!(path = %path.display(), "Config file not found; using built-in demo world");
        Ok(demo_config())
    }
}

/// The built-in demo world used when no configuration file is present.
fn demo_config() -> WorldConfig {
    let mut config = WorldConfig::named("Thornvale");
    config.initial_characters.push(EntitySeed {
        entity_id: "elena".to_owned(),
        name: "Elena".to_owned(),
        description: "The miller's daughter, quietly ambitious.".to_owned(),
    });
    config.initial_characters.push(EntitySeed {
        entity_id: "marta".to_owned(),
        name: "Marta".to_owned(),
        description: "A traveling herbalist who stayed.".to_owned(),
    });
    config.initial_locations.push(EntitySeed {
        entity_id: "mill".to_owned(),
        name: "The Old Mill".to_owned(),
        description: "Creaking waterwheel on the east brook.".to_owned(),
    });
    config.initial_objects.push(EntitySeed {
        entity_id: "lantern".to_owned(),
        name: "Brass Lantern".to_owned(),
        description: "Dented, but it has never gone out.".to_owned(),
    });
    config
}
