//! End-to-end scenarios across the whole engine: initialization,
//! evolution, validation, health degradation, and fault recovery, all
//! over the in-memory collaborator implementations.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Duration;

use everworld_core::{EntitySeed, WorldChange, WorldConfig, WorldStateManager};
use everworld_recovery::ErrorContext;
use everworld_store::{CacheAdmin, MemoryWorldCache, MemoryWorldStore, WorldStore};
use everworld_types::{EntityId, ErrorKind, EventKind, WorldId};

fn make_manager(seed: u64) -> (Arc<MemoryWorldStore>, WorldStateManager) {
    let store = Arc::new(MemoryWorldStore::new());
    let cache = Arc::new(MemoryWorldCache::new());
    let manager = WorldStateManager::new(
        Arc::clone(&store) as Arc<dyn WorldStore>,
        cache as Arc<dyn CacheAdmin>,
        seed,
    );
    (store, manager)
}

fn standard_config() -> WorldConfig {
    let mut config = WorldConfig::named("Thornvale");
    config.initial_characters.push(EntitySeed::new("elena", "Elena"));
    config.initial_characters.push(EntitySeed::new("marta", "Marta"));
    config.initial_locations.push(EntitySeed::new("mill", "The Old Mill"));
    config.initial_objects.push(EntitySeed::new("lantern", "Brass Lantern"));
    config
}

#[test]
fn initialize_evolve_validate_round_trip() {
    let (_store, manager) = make_manager(7);
    let world_id = WorldId::new("W1");

    let created = manager.initialize_world(&world_id, &standard_config()).unwrap();
    let result = manager.evolve_world(&world_id, Duration::days(7));

    assert!(result.success, "evolution failed: {:?}", result.errors);
    let world = manager.get_world_state(&world_id).unwrap().unwrap();
    assert_eq!(world.current_time, created.current_time + Duration::days(7));

    let validation = manager.validate_world_consistency(&world_id);
    assert!(validation.is_valid, "unexpected issues: {validation:?}");
}

#[test]
fn evolving_unknown_world_creates_nothing() {
    let (store, manager) = make_manager(7);
    let result = manager.evolve_world(&WorldId::new("nowhere"), Duration::days(1));

    assert!(!result.success);
    assert!(!result.errors.is_empty());
    assert_eq!(result.events_generated, 0);
    assert_eq!(manager.world_count(), 0);
    assert_eq!(store.world_count(), 0);
}

#[test]
fn disabled_auto_evolution_freezes_the_world() {
    let (_store, manager) = make_manager(7);
    let world_id = WorldId::new("W1");
    let mut config = standard_config();
    config.auto_evolution = false;
    config.character_event_rate = 1.0;
    let created = manager.initialize_world(&world_id, &config).unwrap();
    let before_events = manager.get_world_summary(&world_id).unwrap().total_timeline_events;

    let result = manager.evolve_world(&world_id, Duration::days(30));

    assert!(result.success);
    assert!(!result.warnings.is_empty());
    assert_eq!(result.events_generated, 0);

    let world = manager.get_world_state(&world_id).unwrap().unwrap();
    assert_eq!(world.current_time, created.current_time);
    let summary = manager.get_world_summary(&world_id).unwrap();
    assert_eq!(summary.total_timeline_events, before_events);
}

#[test]
fn timelines_stay_chronological_across_repeated_evolution() {
    let (_store, manager) = make_manager(99);
    let world_id = WorldId::new("W1");
    let mut config = standard_config();
    config.character_event_rate = 1.0;
    config.location_event_rate = 1.0;
    config.object_event_rate = 1.0;
    let created = manager.initialize_world(&world_id, &config).unwrap();

    for _ in 0..5 {
        let result = manager.evolve_world(&world_id, Duration::days(10));
        assert!(result.success, "evolution failed: {:?}", result.errors);
    }

    let world = manager.get_world_state(&world_id).unwrap().unwrap();
    assert_eq!(world.current_time, created.current_time + Duration::days(50));

    for entity in ["elena", "marta", "mill", "lantern"] {
        let timeline = manager
            .get_entity_timeline(&world_id, &EntityId::from(entity))
            .unwrap();
        assert!(timeline.len() > 1, "no generated history for {entity}");
        for pair in timeline.events().windows(2) {
            assert!(
                pair[0].timestamp <= pair[1].timestamp,
                "timeline for {entity} is out of order"
            );
        }
    }

    let validation = manager.validate_world_consistency(&world_id);
    assert!(validation.is_valid, "unexpected issues: {validation:?}");
}

#[test]
fn evolution_respects_daily_event_cap() {
    let (_store, manager) = make_manager(3);
    let world_id = WorldId::new("W1");
    let mut config = standard_config();
    config.character_event_rate = 1.0;
    config.location_event_rate = 1.0;
    config.object_event_rate = 1.0;
    config.max_events_per_day = 2;
    let _ = manager.initialize_world(&world_id, &config).unwrap();

    let days = 10;
    let result = manager.evolve_world(&world_id, Duration::days(days));
    assert!(result.success);
    // At most cap * days probabilistic events (scheduled tasks exempt).
    assert!(result.events_generated <= 2 * u32::try_from(days).unwrap());
    assert!(result.warnings.iter().any(|w| w.contains("event cap")));
}

#[test]
fn background_processing_slows_history_down() {
    let world_id = WorldId::new("W1");
    let mut foreground_config = standard_config();
    foreground_config.character_event_rate = 0.8;
    let mut background_config = foreground_config.clone();
    background_config.background_rate_scale = 0.05;

    let (_store, foreground) = make_manager(11);
    let _ = foreground.initialize_world(&world_id, &foreground_config).unwrap();
    let fg = foreground.evolve_world(&world_id, Duration::days(60));

    let (_store, background) = make_manager(11);
    let _ = background.initialize_world(&world_id, &background_config).unwrap();
    let mut params = background.get_evolution_parameters(&world_id).unwrap();
    params.background_processing = true;
    assert!(background.configure_evolution_parameters(&world_id, &params).unwrap());
    let bg = background.evolve_world(&world_id, Duration::days(60));

    assert!(fg.success && bg.success);
    assert!(
        bg.events_generated < fg.events_generated,
        "background ({}) should generate less history than foreground ({})",
        bg.events_generated,
        fg.events_generated
    );
}

#[test]
fn persistent_health_failure_is_detected_and_folded_into_validation() {
    let (_store, manager) = make_manager(7);
    let world_id = WorldId::new("W1");
    let _ = manager.initialize_world(&world_id, &standard_config()).unwrap();

    manager.register_health_check("disk", || false);
    manager.register_health_check("clock", || true);

    for _ in 0..3 {
        let _ = manager.run_health_checks();
    }

    assert!((manager.get_system_health_score() - 0.5).abs() < f64::EPSILON);
    let issues = manager.detect_degradation();
    assert!(issues.iter().any(|issue| issue.contains("disk")));

    let validation = manager.validate_world_consistency(&world_id);
    assert!(!validation.is_valid);
    assert!(
        validation
            .data_integrity_issues
            .iter()
            .any(|issue| issue.contains("disk"))
    );
}

#[test]
fn fault_handling_flows_through_classification_and_statistics() {
    let (_store, manager) = make_manager(7);
    let world_id = WorldId::new("W1");
    let _ = manager.initialize_world(&world_id, &standard_config()).unwrap();

    let context = ErrorContext::component("world")
        .for_world(world_id.clone())
        .during("nightly-audit");
    let result = manager.handle_error("validation failed: relationship asymmetry", &context);

    assert_eq!(result.error_type, Some(ErrorKind::ValidationFailure));
    // DataRepair is first in the table for validation failures and
    // succeeds against the persisted world.
    assert!(result.success);
    assert!(result.data_recovered);

    let stats = manager.get_error_statistics();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.recovered, 1);
    assert_eq!(
        stats.by_kind.get(&ErrorKind::ValidationFailure).copied(),
        Some(1)
    );

    let report = manager.cleanup_old_data(0);
    assert_eq!(report.errors_removed, 1);
}

#[test]
fn seeded_managers_evolve_identically() {
    let world_id = WorldId::new("W1");
    let mut config = standard_config();
    config.character_event_rate = 0.5;

    let run = |seed: u64| {
        let (_store, manager) = make_manager(seed);
        let _ = manager.initialize_world(&world_id, &config).unwrap();
        let result = manager.evolve_world(&world_id, Duration::days(30));
        assert!(result.success);
        result.events_generated
    };

    assert_eq!(run(1234), run(1234));
    // Different seeds are allowed to differ (and with these rates,
    // almost always do); the engine only promises same-seed stability.
}

#[test]
fn relationship_evolution_creates_symmetric_bonds() {
    let (_store, manager) = make_manager(21);
    let world_id = WorldId::new("W1");
    let mut config = standard_config();
    config.character_event_rate = 0.0;
    config.location_event_rate = 0.0;
    config.object_event_rate = 0.0;
    config.seasonal_evolution = false;
    let created = manager.initialize_world(&world_id, &config).unwrap();

    let result = manager.evolve_world(&world_id, Duration::days(30));
    assert!(result.success);

    // Weekly cadence over 30 days guarantees relationship events.
    let elena_events = manager.query_entity_events(
        &world_id,
        &EntityId::from("elena"),
        created.current_time,
        created.current_time + Duration::days(31),
    );
    assert!(
        elena_events
            .iter()
            .any(|e| e.event_type == EventKind::RelationshipChange)
    );

    let validation = manager.validate_world_consistency(&world_id);
    assert!(validation.is_valid, "asymmetric bond: {validation:?}");
}

#[test]
fn archived_worlds_are_retained_not_destroyed() {
    let (store, manager) = make_manager(7);
    let world_id = WorldId::new("W1");
    let _ = manager.initialize_world(&world_id, &standard_config()).unwrap();

    let applied = manager
        .update_world_state(
            &world_id,
            &[WorldChange::SetStatus {
                status: everworld_types::WorldStatus::Archived,
            }],
        )
        .unwrap();
    assert!(applied);

    // Still present everywhere, just no longer evolving.
    assert!(store.contains(&world_id));
    let world = manager.get_world_state(&world_id).unwrap().unwrap();
    assert_eq!(world.world_status, everworld_types::WorldStatus::Archived);
    let result = manager.evolve_world(&world_id, Duration::days(1));
    assert!(result.success);
    assert_eq!(result.events_generated, 0);
}
