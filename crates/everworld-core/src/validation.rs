//! World consistency validation.
//!
//! Validation never fails: every finding is a string in one of the
//! result's issue lists, and `is_valid` is simply their conjunction.
//! Checks cover timeline ordering, entity cross-references, relationship
//! symmetry, flag sanity, and (folded in by the manager) persistently
//! failing health probes.

use everworld_types::ValidationResult;

use crate::manager::WorldSlot;

/// Validate one locked world slot. Health findings are appended by the
/// caller, which owns the monitor.
pub(crate) fn validate_slot(slot: &WorldSlot) -> ValidationResult {
    let mut result = ValidationResult::new();
    let world = &slot.world;

    // Timeline monotonicity, and timelines orphaned from their entity.
    for (entity_id, timeline) in slot.timelines.iter() {
        for pair in timeline.events().windows(2) {
            if let [earlier, later] = pair
                && later.timestamp < earlier.timestamp
            {
                result.timeline_issues.push(format!(
                    "timeline for {entity_id} is out of chronological order at event {}",
                    later.event_id
                ));
            }
        }
        if !world.entity_exists(entity_id) {
            result
                .data_integrity_issues
                .push(format!("timeline exists for unknown entity {entity_id}"));
        }
    }

    // Characters: naming and relationship integrity.
    for (character_id, character) in &world.active_characters {
        if character.name.trim().is_empty() {
            result
                .character_issues
                .push(format!("character {character_id} has no name"));
        }
        for (other_id, relationship) in &character.relationships {
            match world.active_characters.get(other_id) {
                None => result.relationship_issues.push(format!(
                    "character {character_id} relates to unknown character {other_id}"
                )),
                Some(other) => {
                    if !other.relationships.contains_key(character_id) {
                        result.relationship_issues.push(format!(
                            "relationship {character_id} -> {other_id} is not reciprocated"
                        ));
                    }
                }
            }
            if relationship.strength < -1.0 || relationship.strength > 1.0 {
                result.relationship_issues.push(format!(
                    "relationship {character_id} -> {other_id} has out-of-range strength {}",
                    relationship.strength
                ));
            }
        }
    }

    // Locations.
    for (location_id, location) in &world.active_locations {
        if location.name.trim().is_empty() {
            result
                .location_issues
                .push(format!("location {location_id} has no name"));
        }
    }

    // Objects: placements must reference known locations.
    for (object_id, object) in &world.active_objects {
        if let Some(location) = &object.location
            && !world.active_locations.contains_key(location)
        {
            result.data_integrity_issues.push(format!(
                "object {object_id} is placed at unknown location {location}"
            ));
        }
    }

    // Flag sanity.
    if !world.world_flags.evolution_speed.is_finite() || world.world_flags.evolution_speed <= 0.0 {
        result.data_integrity_issues.push(format!(
            "evolution_speed is not positive and finite: {}",
            world.world_flags.evolution_speed
        ));
    }

    result.recompute();
    result
}
