//! Configuration surface for world initialization and evolution tuning.
//!
//! A [`WorldConfig`] mirrors the YAML document accepted by the engine
//! binary; every field has a serde default so partial files load. The
//! struct is validated explicitly at `initialize_world` rather than at
//! parse time, so a config can be assembled programmatically and checked
//! once at the boundary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use everworld_types::WorldFlags;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// One initial entity named by a world configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EntitySeed {
    /// Unique entity id within the world.
    pub entity_id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl EntitySeed {
    /// Convenience constructor for tests and programmatic setup.
    pub fn new(entity_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: name.into(),
            description: String::new(),
        }
    }
}

/// Full configuration accepted by `initialize_world`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Human-readable world name; must be non-empty.
    #[serde(default)]
    pub world_name: String,

    /// Characters present at creation.
    #[serde(default)]
    pub initial_characters: Vec<EntitySeed>,

    /// Locations present at creation.
    #[serde(default)]
    pub initial_locations: Vec<EntitySeed>,

    /// Objects present at creation.
    #[serde(default)]
    pub initial_objects: Vec<EntitySeed>,

    /// Multiplier from elapsed days to simulated evolution days; must be
    /// positive and finite.
    #[serde(default = "default_evolution_speed")]
    pub evolution_speed: f64,

    /// Whether `evolve_world` may mutate the world.
    #[serde(default = "default_true")]
    pub auto_evolution: bool,

    /// Cap on retained events per entity timeline; must be positive.
    #[serde(default = "default_max_timeline_events")]
    pub max_timeline_events: usize,

    /// Per-day event trigger probability for characters.
    #[serde(default = "default_character_event_rate")]
    pub character_event_rate: f64,

    /// Per-day event trigger probability for locations.
    #[serde(default = "default_location_event_rate")]
    pub location_event_rate: f64,

    /// Per-day event trigger probability for objects.
    #[serde(default = "default_object_event_rate")]
    pub object_event_rate: f64,

    /// Cap on generated events per simulated day across all entities.
    #[serde(default = "default_max_events_per_day")]
    pub max_events_per_day: u32,

    /// Whether season boundaries generate world-wide events.
    #[serde(default = "default_true")]
    pub seasonal_evolution: bool,

    /// Whether character pairs periodically generate relationship events.
    #[serde(default = "default_true")]
    pub relationship_evolution: bool,

    /// Rate multiplier applied while background processing is active;
    /// must lie in `[0, 1]`.
    #[serde(default = "default_background_rate_scale")]
    pub background_rate_scale: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            world_name: String::new(),
            initial_characters: Vec::new(),
            initial_locations: Vec::new(),
            initial_objects: Vec::new(),
            evolution_speed: default_evolution_speed(),
            auto_evolution: true,
            max_timeline_events: default_max_timeline_events(),
            character_event_rate: default_character_event_rate(),
            location_event_rate: default_location_event_rate(),
            object_event_rate: default_object_event_rate(),
            max_events_per_day: default_max_events_per_day(),
            seasonal_evolution: true,
            relationship_evolution: true,
            background_rate_scale: default_background_rate_scale(),
        }
    }
}

impl WorldConfig {
    /// A default configuration with the given name (the only field
    /// without a usable default).
    pub fn named(world_name: impl Into<String>) -> Self {
        Self {
            world_name: world_name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yml::from_str(&contents)?)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Check the configuration against the engine's invariants.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a human-readable reason.
    pub fn validate(&self) -> Result<(), String> {
        if self.world_name.trim().is_empty() {
            return Err("world_name must be non-empty".to_owned());
        }
        if !self.evolution_speed.is_finite() || self.evolution_speed <= 0.0 {
            return Err(format!(
                "evolution_speed must be positive and finite, got {}",
                self.evolution_speed
            ));
        }
        if self.max_timeline_events == 0 {
            return Err("max_timeline_events must be positive".to_owned());
        }
        for (field, rate) in [
            ("character_event_rate", self.character_event_rate),
            ("location_event_rate", self.location_event_rate),
            ("object_event_rate", self.object_event_rate),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(format!("{field} must be non-negative and finite, got {rate}"));
            }
        }
        if !self.background_rate_scale.is_finite()
            || self.background_rate_scale < 0.0
            || self.background_rate_scale > 1.0
        {
            return Err(format!(
                "background_rate_scale must lie in [0, 1], got {}",
                self.background_rate_scale
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for seed in self
            .initial_characters
            .iter()
            .chain(&self.initial_locations)
            .chain(&self.initial_objects)
        {
            if seed.entity_id.trim().is_empty() {
                return Err(format!("entity '{}' has an empty entity_id", seed.name));
            }
            if !seen.insert(seed.entity_id.as_str()) {
                return Err(format!("duplicate entity_id '{}'", seed.entity_id));
            }
        }
        Ok(())
    }

    /// The per-world flag set this configuration describes.
    pub fn to_flags(&self) -> WorldFlags {
        WorldFlags {
            auto_evolution: self.auto_evolution,
            evolution_speed: self.evolution_speed,
            character_event_rate: self.character_event_rate,
            location_event_rate: self.location_event_rate,
            object_event_rate: self.object_event_rate,
            max_events_per_day: self.max_events_per_day,
            seasonal_evolution: self.seasonal_evolution,
            relationship_evolution: self.relationship_evolution,
            background_processing: false,
            background_rate_scale: self.background_rate_scale,
            max_timeline_events: self.max_timeline_events,
        }
    }
}

/// The evolution-related subset of a world's flags, read and written
/// through `configure_evolution_parameters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionParams {
    /// See [`WorldFlags::auto_evolution`].
    pub auto_evolution: bool,
    /// See [`WorldFlags::evolution_speed`].
    pub evolution_speed: f64,
    /// See [`WorldFlags::character_event_rate`].
    pub character_event_rate: f64,
    /// See [`WorldFlags::location_event_rate`].
    pub location_event_rate: f64,
    /// See [`WorldFlags::object_event_rate`].
    pub object_event_rate: f64,
    /// See [`WorldFlags::max_events_per_day`].
    pub max_events_per_day: u32,
    /// See [`WorldFlags::seasonal_evolution`].
    pub seasonal_evolution: bool,
    /// See [`WorldFlags::relationship_evolution`].
    pub relationship_evolution: bool,
    /// See [`WorldFlags::background_processing`].
    pub background_processing: bool,
    /// See [`WorldFlags::background_rate_scale`].
    pub background_rate_scale: f64,
}

impl From<&WorldFlags> for EvolutionParams {
    fn from(flags: &WorldFlags) -> Self {
        Self {
            auto_evolution: flags.auto_evolution,
            evolution_speed: flags.evolution_speed,
            character_event_rate: flags.character_event_rate,
            location_event_rate: flags.location_event_rate,
            object_event_rate: flags.object_event_rate,
            max_events_per_day: flags.max_events_per_day,
            seasonal_evolution: flags.seasonal_evolution,
            relationship_evolution: flags.relationship_evolution,
            background_processing: flags.background_processing,
            background_rate_scale: flags.background_rate_scale,
        }
    }
}

impl EvolutionParams {
    /// Check the parameters against the engine's invariants.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a human-readable reason.
    pub fn validate(&self) -> Result<(), String> {
        if !self.evolution_speed.is_finite() || self.evolution_speed <= 0.0 {
            return Err(format!(
                "evolution_speed must be positive and finite, got {}",
                self.evolution_speed
            ));
        }
        for (field, rate) in [
            ("character_event_rate", self.character_event_rate),
            ("location_event_rate", self.location_event_rate),
            ("object_event_rate", self.object_event_rate),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(format!("{field} must be non-negative and finite, got {rate}"));
            }
        }
        if !self.background_rate_scale.is_finite()
            || self.background_rate_scale < 0.0
            || self.background_rate_scale > 1.0
        {
            return Err(format!(
                "background_rate_scale must lie in [0, 1], got {}",
                self.background_rate_scale
            ));
        }
        Ok(())
    }

    /// Write these parameters into a world's flag set, leaving the
    /// non-evolution fields untouched.
    pub fn apply_to(&self, flags: &mut WorldFlags) {
        flags.auto_evolution = self.auto_evolution;
        flags.evolution_speed = self.evolution_speed;
        flags.character_event_rate = self.character_event_rate;
        flags.location_event_rate = self.location_event_rate;
        flags.object_event_rate = self.object_event_rate;
        flags.max_events_per_day = self.max_events_per_day;
        flags.seasonal_evolution = self.seasonal_evolution;
        flags.relationship_evolution = self.relationship_evolution;
        flags.background_processing = self.background_processing;
        flags.background_rate_scale = self.background_rate_scale;
    }
}

const fn default_true() -> bool {
    true
}

const fn default_evolution_speed() -> f64 {
    1.0
}

const fn default_max_timeline_events() -> usize {
    1000
}

const fn default_character_event_rate() -> f64 {
    0.15
}

const fn default_location_event_rate() -> f64 {
    0.08
}

const fn default_object_event_rate() -> f64 {
    0.05
}

const fn default_max_events_per_day() -> u32 {
    10
}

const fn default_background_rate_scale() -> f64 {
    0.25
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_once_named() {
        assert!(WorldConfig::default().validate().is_err());
        assert!(WorldConfig::named("Thornvale").validate().is_ok());
    }

    #[test]
    fn rejects_bad_speed_and_caps() {
        let mut config = WorldConfig::named("Thornvale");
        config.evolution_speed = 0.0;
        assert!(config.validate().unwrap_err().contains("evolution_speed"));

        let mut config = WorldConfig::named("Thornvale");
        config.evolution_speed = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = WorldConfig::named("Thornvale");
        config.max_timeline_events = 0;
        assert!(config.validate().unwrap_err().contains("max_timeline_events"));
    }

    #[test]
    fn rejects_duplicate_and_empty_seed_ids() {
        let mut config = WorldConfig::named("Thornvale");
        config.initial_characters.push(EntitySeed::new("elena", "Elena"));
        config.initial_objects.push(EntitySeed::new("elena", "A statue of Elena"));
        assert!(config.validate().unwrap_err().contains("duplicate"));

        let mut config = WorldConfig::named("Thornvale");
        config.initial_locations.push(EntitySeed::new("", "The Mill"));
        assert!(config.validate().unwrap_err().contains("empty entity_id"));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = WorldConfig::parse(
            "world_name: Thornvale\ninitial_characters:\n  - entity_id: elena\n    name: Elena\n",
        )
        .unwrap();
        assert_eq!(config.world_name, "Thornvale");
        assert_eq!(config.initial_characters.len(), 1);
        assert!((config.evolution_speed - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.max_events_per_day, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn params_round_trip_through_flags() {
        let config = WorldConfig::named("Thornvale");
        let mut flags = config.to_flags();
        let mut params = EvolutionParams::from(&flags);
        params.evolution_speed = 2.5;
        params.background_processing = true;
        params.apply_to(&mut flags);
        assert!((flags.evolution_speed - 2.5).abs() < f64::EPSILON);
        assert!(flags.background_processing);
        // Non-evolution fields are untouched.
        assert_eq!(flags.max_timeline_events, 1000);
    }

    #[test]
    fn params_validation_mirrors_config() {
        let flags = WorldConfig::named("T").to_flags();
        let mut params = EvolutionParams::from(&flags);
        assert!(params.validate().is_ok());
        params.background_rate_scale = 1.5;
        assert!(params.validate().is_err());
    }
}
