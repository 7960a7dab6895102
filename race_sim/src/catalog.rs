//! Static reference data: circuits, weather conditions, weather transitions
//! and strategy archetypes.
//!
//! The catalog is loaded once, validated, and shared read-only between every
//! trial of a Monte Carlo batch.

use std::{
    collections::{BTreeMap, HashSet},
    env, fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SelectionError;

pub const BUILTIN_RACE_CATALOG: &str = include_str!("data/race_catalog.json");

const PREFERENCE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Permanent,
    StreetCircuit,
    Technical,
    Mixed,
    HighSpeed,
}

impl TrackType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TrackType::Permanent => "permanent",
            TrackType::StreetCircuit => "street_circuit",
            TrackType::Technical => "technical",
            TrackType::Mixed => "mixed",
            TrackType::HighSpeed => "high_speed",
        }
    }

    /// Tracks where a slipstream within a few tenths reliably converts into a pass.
    pub const fn favors_close_passes(&self) -> bool {
        matches!(self, TrackType::HighSpeed | TrackType::Permanent)
    }
}

/// Broad tire category a weather condition calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TireFamily {
    Dry,
    Intermediate,
    Wet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TireCompound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
}

impl TireCompound {
    pub const DRY: [TireCompound; 3] = [TireCompound::Soft, TireCompound::Medium, TireCompound::Hard];

    pub const fn family(self) -> TireFamily {
        match self {
            TireCompound::Soft | TireCompound::Medium | TireCompound::Hard => TireFamily::Dry,
            TireCompound::Intermediate => TireFamily::Intermediate,
            TireCompound::Wet => TireFamily::Wet,
        }
    }

    /// The compound fitted when conditions dictate a wet-weather family.
    pub const fn for_wet_family(family: TireFamily) -> Option<TireCompound> {
        match family {
            TireFamily::Dry => None,
            TireFamily::Intermediate => Some(TireCompound::Intermediate),
            TireFamily::Wet => Some(TireCompound::Wet),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            TireCompound::Soft => "soft",
            TireCompound::Medium => "medium",
            TireCompound::Hard => "hard",
            TireCompound::Intermediate => "intermediate",
            TireCompound::Wet => "wet",
        }
    }
}

impl fmt::Display for TireCompound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative weights over the three dry compounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompoundPreference {
    pub soft: f64,
    pub medium: f64,
    pub hard: f64,
}

impl CompoundPreference {
    pub fn weight(&self, compound: TireCompound) -> f64 {
        match compound {
            TireCompound::Soft => self.soft,
            TireCompound::Medium => self.medium,
            TireCompound::Hard => self.hard,
            TireCompound::Intermediate | TireCompound::Wet => 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.soft + self.medium + self.hard
    }

    pub fn blend(&self, other: &CompoundPreference) -> CompoundPreference {
        CompoundPreference {
            soft: (self.soft + other.soft) / 2.0,
            medium: (self.medium + other.medium) / 2.0,
            hard: (self.hard + other.hard) / 2.0,
        }
    }
}

impl Default for CompoundPreference {
    fn default() -> Self {
        Self {
            soft: 0.33,
            medium: 0.33,
            hard: 0.34,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circuit {
    pub name: String,
    pub track_type: TrackType,
    pub length_km: f64,
    pub laps: u32,
    pub straight_speed_importance: f64,
    pub cornering_importance: f64,
    pub braking_demands: f64,
    pub tire_wear_severity: f64,
    pub downforce_sensitivity: f64,
    pub overtaking_difficulty: f64,
    pub weather_susceptibility: f64,
    #[serde(default)]
    pub tire_compound_preference: CompoundPreference,
}

impl Circuit {
    fn weights(&self) -> [(&'static str, f64); 7] {
        [
            ("straight_speed_importance", self.straight_speed_importance),
            ("cornering_importance", self.cornering_importance),
            ("braking_demands", self.braking_demands),
            ("tire_wear_severity", self.tire_wear_severity),
            ("downforce_sensitivity", self.downforce_sensitivity),
            ("overtaking_difficulty", self.overtaking_difficulty),
            ("weather_susceptibility", self.weather_susceptibility),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub name: String,
    #[serde(default = "default_track_temp")]
    pub track_temp_celsius: f64,
    #[serde(default = "default_air_temp")]
    pub air_temp_celsius: f64,
    pub grip_multiplier: f64,
    pub hp_multiplier: f64,
    pub downforce_multiplier: f64,
    pub tire_wear_modifier: f64,
    pub driver_error_chance_modifier: f64,
    #[serde(default)]
    pub variability: f64,
    #[serde(default = "default_tire_family")]
    pub tire_type_recommendation: TireFamily,
    #[serde(default = "default_adaptability_modifier")]
    pub adaptability_modifier: f64,
}

fn default_track_temp() -> f64 {
    30.0
}

fn default_air_temp() -> f64 {
    25.0
}

fn default_tire_family() -> TireFamily {
    TireFamily::Dry
}

fn default_adaptability_modifier() -> f64 {
    0.2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcumenKind {
    Aggressive,
    Balanced,
    Conservative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyArchetype {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub applies_acumen: AcumenKind,
    #[serde(default = "default_planned_stops")]
    pub planned_stops: u32,
    #[serde(default)]
    pub tire_compound_preference: CompoundPreference,
    #[serde(default)]
    pub weather_adaptability: f64,
    #[serde(default)]
    pub safety_car_opportunist: bool,
}

fn default_planned_stops() -> u32 {
    1
}

impl StrategyArchetype {
    pub fn is_aggressive(&self) -> bool {
        self.applies_acumen == AcumenKind::Aggressive
    }
}

/// Unnormalised `from -> {to: weight}` rows of the weather Markov chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeatherTransitionTable(pub BTreeMap<String, BTreeMap<String, f64>>);

impl WeatherTransitionTable {
    pub fn row(&self, from: &str) -> Option<&BTreeMap<String, f64>> {
        self.0.get(from)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RaceCatalog {
    pub version: u32,
    pub circuits: Vec<Circuit>,
    pub weather: Vec<WeatherCondition>,
    pub weather_transitions: WeatherTransitionTable,
    pub strategies: Vec<StrategyArchetype>,
}

impl RaceCatalog {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_RACE_CATALOG).expect("builtin race catalog should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: RaceCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn circuit(&self, name: &str) -> Option<&Circuit> {
        self.circuits
            .iter()
            .find(|circuit| circuit.name.eq_ignore_ascii_case(name))
    }

    pub fn weather(&self, name: &str) -> Option<&WeatherCondition> {
        self.weather
            .iter()
            .find(|condition| condition.name.eq_ignore_ascii_case(name))
    }

    pub fn strategy(&self, name: &str) -> Option<&StrategyArchetype> {
        self.strategies.iter().find(|strategy| strategy.name == name)
    }

    /// Resolves a user-facing circuit selector: a 1-based index, an exact
    /// name, or a fragment matching exactly one circuit name.
    pub fn select_circuit(&self, selector: &str) -> Result<&Circuit, SelectionError> {
        let selector = selector.trim();
        if let Ok(index) = selector.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|idx| self.circuits.get(idx))
                .ok_or(SelectionError::CircuitIndexOutOfRange {
                    index,
                    available: self.circuits.len(),
                });
        }
        if let Some(circuit) = self.circuit(selector) {
            return Ok(circuit);
        }
        let needle = selector.to_ascii_lowercase();
        let matches: Vec<&Circuit> = self
            .circuits
            .iter()
            .filter(|circuit| circuit.name.to_ascii_lowercase().contains(&needle))
            .collect();
        match matches.as_slice() {
            [single] => Ok(single),
            [] => Err(SelectionError::UnknownCircuit(selector.to_string())),
            _ => Err(SelectionError::AmbiguousCircuit {
                selector: selector.to_string(),
                candidates: matches.iter().map(|c| c.name.clone()).collect(),
            }),
        }
    }

    pub fn select_weather(&self, name: &str) -> Result<&WeatherCondition, SelectionError> {
        self.weather(name.trim())
            .ok_or_else(|| SelectionError::UnknownWeather(name.to_string()))
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.circuits.is_empty() {
            return Err(CatalogError::Empty { kind: "circuit" });
        }
        if self.weather.is_empty() {
            return Err(CatalogError::Empty { kind: "weather" });
        }
        if self.strategies.is_empty() {
            return Err(CatalogError::Empty { kind: "strategy" });
        }

        let mut seen = HashSet::new();
        for circuit in &self.circuits {
            if !seen.insert(circuit.name.to_ascii_lowercase()) {
                return Err(CatalogError::Duplicate {
                    kind: "circuit",
                    name: circuit.name.clone(),
                });
            }
            if circuit.laps == 0 || !(circuit.length_km > 0.0) {
                return Err(CatalogError::OutOfRange {
                    owner: circuit.name.clone(),
                    field: "laps/length_km",
                    value: circuit.length_km,
                });
            }
            for (field, value) in circuit.weights() {
                check_unit(&circuit.name, field, value)?;
            }
            check_preference(&circuit.name, &circuit.tire_compound_preference)?;
        }

        let mut weather_names = HashSet::new();
        let mut folded_weather = HashSet::new();
        for condition in &self.weather {
            // Lookups ignore case, so "dry" and "Dry" would shadow each other.
            if !folded_weather.insert(condition.name.to_ascii_lowercase()) {
                return Err(CatalogError::Duplicate {
                    kind: "weather",
                    name: condition.name.clone(),
                });
            }
            weather_names.insert(condition.name.clone());
            check_unit(&condition.name, "variability", condition.variability)?;
            if !(condition.grip_multiplier > 0.0) {
                return Err(CatalogError::OutOfRange {
                    owner: condition.name.clone(),
                    field: "grip_multiplier",
                    value: condition.grip_multiplier,
                });
            }
        }

        for (from, row) in &self.weather_transitions.0 {
            if !weather_names.contains(from) {
                return Err(CatalogError::UnknownWeather {
                    from: from.clone(),
                    to: None,
                });
            }
            for (to, weight) in row {
                if !weather_names.contains(to) {
                    return Err(CatalogError::UnknownWeather {
                        from: from.clone(),
                        to: Some(to.clone()),
                    });
                }
                if !(*weight >= 0.0) {
                    return Err(CatalogError::OutOfRange {
                        owner: format!("{from} -> {to}"),
                        field: "transition_weight",
                        value: *weight,
                    });
                }
            }
        }

        let mut strategy_names = HashSet::new();
        for strategy in &self.strategies {
            if !strategy_names.insert(strategy.name.clone()) {
                return Err(CatalogError::Duplicate {
                    kind: "strategy",
                    name: strategy.name.clone(),
                });
            }
            if !(1..=3).contains(&strategy.planned_stops) {
                return Err(CatalogError::OutOfRange {
                    owner: strategy.name.clone(),
                    field: "planned_stops",
                    value: strategy.planned_stops as f64,
                });
            }
            check_unit(
                &strategy.name,
                "weather_adaptability",
                strategy.weather_adaptability,
            )?;
            check_preference(&strategy.name, &strategy.tire_compound_preference)?;
        }
        Ok(())
    }
}

fn check_unit(owner: &str, field: &'static str, value: f64) -> Result<(), CatalogError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CatalogError::OutOfRange {
            owner: owner.to_string(),
            field,
            value,
        })
    }
}

fn check_preference(owner: &str, preference: &CompoundPreference) -> Result<(), CatalogError> {
    let weights = [preference.soft, preference.medium, preference.hard];
    if weights.iter().any(|w| !(*w >= 0.0)) || (preference.total() - 1.0).abs() > PREFERENCE_TOLERANCE
    {
        return Err(CatalogError::InvalidPreference {
            owner: owner.to_string(),
            total: preference.total(),
        });
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse race catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read race catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("race catalog has no {kind} entries")]
    Empty { kind: &'static str },
    #[error("duplicate {kind} entry {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("{owner}: {field} = {value} is out of range")]
    OutOfRange {
        owner: String,
        field: &'static str,
        value: f64,
    },
    #[error("{owner}: tire compound preference sums to {total}, expected 1.0")]
    InvalidPreference { owner: String, total: f64 },
    #[error("weather transition {from} -> {to:?} references an unknown condition")]
    UnknownWeather { from: String, to: Option<String> },
}

pub fn load_race_catalog_from_env() -> Arc<RaceCatalog> {
    let Some(path) = env::var("RACE_CATALOG_PATH").ok().map(PathBuf::from) else {
        tracing::info!(target: "race_sim::catalog", "race_catalog.loaded=builtin");
        return RaceCatalog::builtin();
    };

    match RaceCatalog::from_file(&path) {
        Ok(catalog) => {
            tracing::info!(
                target: "race_sim::catalog",
                path = %path.display(),
                circuits = catalog.circuits.len(),
                "race_catalog.loaded=file"
            );
            Arc::new(catalog)
        }
        Err(err) => {
            tracing::warn!(
                target: "race_sim::catalog",
                path = %path.display(),
                error = %err,
                "race_catalog.load_failed"
            );
            RaceCatalog::builtin()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_complete() {
        let catalog = RaceCatalog::builtin();
        assert_eq!(catalog.circuits.len(), 24);
        assert_eq!(catalog.weather.len(), 5);
        assert_eq!(catalog.strategies.len(), 10);
        let monaco = catalog.circuit("Circuit de Monaco").expect("monaco");
        assert_eq!(monaco.laps, 78);
        assert_eq!(monaco.track_type, TrackType::StreetCircuit);
        let heavy = catalog.weather("heavy rain").expect("heavy rain");
        assert_eq!(heavy.tire_type_recommendation, TireFamily::Wet);
    }

    #[test]
    fn transition_rows_may_omit_self() {
        let catalog = RaceCatalog::builtin();
        let dry = catalog.weather_transitions.row("Dry").expect("dry row");
        assert!(!dry.contains_key("Dry"));
        let light = catalog.weather_transitions.row("Light Rain").expect("light row");
        assert!(light.contains_key("Light Rain"));
    }

    #[test]
    fn circuit_selection_accepts_index_name_and_fragment() {
        let catalog = RaceCatalog::builtin();
        assert_eq!(
            catalog.select_circuit("1").unwrap().name,
            "Bahrain International Circuit"
        );
        assert_eq!(catalog.select_circuit("suzuka").unwrap().laps, 53);
        assert!(matches!(
            catalog.select_circuit("0"),
            Err(SelectionError::CircuitIndexOutOfRange { .. })
        ));
        assert!(matches!(
            catalog.select_circuit("99"),
            Err(SelectionError::CircuitIndexOutOfRange { .. })
        ));
        assert!(matches!(
            catalog.select_circuit("Nürburgring"),
            Err(SelectionError::UnknownCircuit(_))
        ));
        assert!(matches!(
            catalog.select_circuit("Circuit"),
            Err(SelectionError::AmbiguousCircuit { .. })
        ));
    }

    #[test]
    fn rejects_dangling_transition() {
        let json = r#"{
            "circuits": [{
                "name": "Test Ring", "track_type": "permanent", "length_km": 4.0, "laps": 10,
                "straight_speed_importance": 0.5, "cornering_importance": 0.5,
                "braking_demands": 0.5, "tire_wear_severity": 0.5,
                "downforce_sensitivity": 0.5, "overtaking_difficulty": 0.5,
                "weather_susceptibility": 0.5,
                "tire_compound_preference": {"soft": 0.3, "medium": 0.4, "hard": 0.3}
            }],
            "weather": [{
                "name": "Dry", "grip_multiplier": 1.0, "hp_multiplier": 1.0,
                "downforce_multiplier": 1.0, "tire_wear_modifier": 0.0,
                "driver_error_chance_modifier": 0.0
            }],
            "weather_transitions": {"Dry": {"Snow": 1.0}},
            "strategies": [{"name": "Plain", "applies_acumen": "balanced"}]
        }"#;
        let err = RaceCatalog::from_json_str(json).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownWeather { .. }), "{err}");
    }

    #[test]
    fn rejects_preference_that_does_not_sum_to_one() {
        let mut catalog = (*RaceCatalog::builtin()).clone();
        catalog.circuits[0].tire_compound_preference.hard = 0.9;
        assert!(matches!(
            catalog.validate(),
            Err(CatalogError::InvalidPreference { .. })
        ));
    }

    #[test]
    fn rejects_weather_names_differing_only_in_case() {
        let mut catalog = (*RaceCatalog::builtin()).clone();
        let mut shadow = catalog.weather("Dry").unwrap().clone();
        shadow.name = "dry".to_string();
        catalog.weather.push(shadow);
        match catalog.validate() {
            Err(CatalogError::Duplicate { kind, name }) => {
                assert_eq!(kind, "weather");
                assert_eq!(name, "dry");
            }
            other => panic!("expected duplicate weather, got {other:?}"),
        }
    }
}
