use std::{
    collections::BTreeMap,
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::catalog::TrackType;

pub const BUILTIN_RACE_MODEL_CONFIG: &str = include_str!("data/race_model_config.json");

/// Tunable constants for every per-lap subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RaceModelConfig {
    lap_time: LapTimeConfig,
    tires: TireConfig,
    pit: PitConfig,
    incidents: IncidentConfig,
    safety_car: SafetyCarConfig,
    overtake: OvertakeConfig,
    track: TrackEvolutionConfig,
    monte_carlo: MonteCarloConfig,
}

impl RaceModelConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_RACE_MODEL_CONFIG)
                .expect("builtin race model config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, RaceModelConfigError> {
        let config: RaceModelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, RaceModelConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| RaceModelConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = RaceModelConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn lap_time(&self) -> &LapTimeConfig {
        &self.lap_time
    }

    pub fn tires(&self) -> &TireConfig {
        &self.tires
    }

    pub fn pit(&self) -> &PitConfig {
        &self.pit
    }

    pub fn incidents(&self) -> &IncidentConfig {
        &self.incidents
    }

    pub fn safety_car(&self) -> &SafetyCarConfig {
        &self.safety_car
    }

    pub fn overtake(&self) -> &OvertakeConfig {
        &self.overtake
    }

    pub fn track(&self) -> &TrackEvolutionConfig {
        &self.track
    }

    pub fn monte_carlo(&self) -> &MonteCarloConfig {
        &self.monte_carlo
    }

    /// Checks the values a trial samples from. Every chance must lie in
    /// `[0, 1]` and every `low..=high` range must be ordered.
    pub fn validate(&self) -> Result<(), RaceModelConfigError> {
        let lap = &self.lap_time;
        check_non_negative("lap_time", "variability_jitter", lap.variability_jitter)?;
        check_non_negative("lap_time", "floor_fraction", lap.floor_fraction)?;

        let tires = &self.tires;
        check_positive("tires", "wear_divisor", tires.wear_divisor)?;
        check_probability("tires", "graining_base_chance", tires.graining_base_chance)?;
        check_positive("tires", "graining_reference_temp_c", tires.graining_reference_temp_c)?;

        let pit = &self.pit;
        check_non_negative("pit", "jitter_s", pit.jitter_s)?;
        check_probability("pit", "error_chance_scale", pit.error_chance_scale)?;
        check_range("pit", "error_min_s..error_max_s", pit.error_min_s, pit.error_max_s)?;

        let incidents = &self.incidents;
        for (field, value) in [
            ("mechanical_base_chance", incidents.mechanical_base_chance),
            ("damage_base_chance", incidents.damage_base_chance),
            ("error_base_chance", incidents.error_base_chance),
            ("crash_share", incidents.crash_share),
            ("moderate_share", incidents.moderate_share),
        ] {
            check_probability("incidents", field, value)?;
        }
        if incidents.crash_share + incidents.moderate_share > 1.0 {
            return Err(invalid(
                "incidents",
                "crash_share + moderate_share",
                "exceeds 1.0",
            ));
        }
        check_range(
            "incidents",
            "damage_multiplier_min..damage_multiplier_max",
            incidents.damage_multiplier_min,
            incidents.damage_multiplier_max,
        )?;
        let [low, high] = incidents.moderate_loss_s;
        check_range("incidents", "moderate_loss_s", low, high)?;
        let [low, high] = incidents.minor_loss_s;
        check_range("incidents", "minor_loss_s", low, high)?;

        let safety_car = &self.safety_car;
        for chance in safety_car.deployment_chance.values() {
            check_probability("safety_car", "deployment_chance", *chance)?;
        }
        check_non_negative("safety_car", "pace_jitter_s", safety_car.pace_jitter_s)?;
        if safety_car.min_laps > safety_car.max_laps {
            return Err(invalid("safety_car", "min_laps..max_laps", "low bound above high bound"));
        }

        if self.monte_carlo.max_trials == 0 {
            return Err(invalid("monte_carlo", "max_trials", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(
    section: &'static str,
    field: &'static str,
    reason: impl Into<String>,
) -> RaceModelConfigError {
    RaceModelConfigError::Invalid {
        section,
        field,
        reason: reason.into(),
    }
}

fn check_probability(
    section: &'static str,
    field: &'static str,
    value: f64,
) -> Result<(), RaceModelConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(section, field, format!("= {value} is not a probability")))
    }
}

fn check_non_negative(
    section: &'static str,
    field: &'static str,
    value: f64,
) -> Result<(), RaceModelConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(section, field, format!("= {value} must be finite and non-negative")))
    }
}

fn check_positive(
    section: &'static str,
    field: &'static str,
    value: f64,
) -> Result<(), RaceModelConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(section, field, format!("= {value} must be positive")))
    }
}

fn check_range(
    section: &'static str,
    field: &'static str,
    low: f64,
    high: f64,
) -> Result<(), RaceModelConfigError> {
    if low.is_finite() && high.is_finite() && low <= high {
        Ok(())
    } else {
        Err(invalid(section, field, format!("range {low}..={high} is inverted or not finite")))
    }
}

#[derive(Debug, Error)]
pub enum RaceModelConfigError {
    #[error("failed to parse race model config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read race model config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid race model config: {section}.{field} {reason}")]
    Invalid {
        section: &'static str,
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LapTimeConfig {
    pub seconds_per_km: f64,
    pub performance_offset: f64,
    pub hp_straight_share: f64,
    pub skill_time_factor: f64,
    pub wet_mitigation_factor: f64,
    pub adaptability_grip_factor: f64,
    pub consistency_deviation_scale: f64,
    pub acumen_reference: f64,
    pub acumen_credit_scale: f64,
    pub variability_jitter: f64,
    pub floor_fraction: f64,
}

impl Default for LapTimeConfig {
    fn default() -> Self {
        Self {
            seconds_per_km: 38.0,
            performance_offset: 0.5,
            hp_straight_share: 0.7,
            skill_time_factor: 0.05,
            wet_mitigation_factor: 0.5,
            adaptability_grip_factor: 0.1,
            consistency_deviation_scale: 0.5,
            acumen_reference: 0.7,
            acumen_credit_scale: 0.1,
            variability_jitter: 0.01,
            floor_fraction: 0.8,
        }
    }
}

/// One segment of the superlinear wear penalty curve.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WearBand {
    pub upper: f64,
    pub exponent: f64,
    pub coefficient: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TireConfig {
    pub wear_resistance_offset: f64,
    pub management_relief: f64,
    pub wear_divisor: f64,
    pub wear_bands: Vec<WearBand>,
    pub graining_base_chance: f64,
    pub graining_reference_temp_c: f64,
    pub graining_initial_penalty_s: f64,
    pub graining_recurring_penalty_s: f64,
}

impl TireConfig {
    /// Returns the band covering `wear`; wear beyond the last band uses the last band.
    pub fn band_for(&self, wear: f64) -> Option<&WearBand> {
        self.wear_bands
            .iter()
            .find(|band| wear <= band.upper)
            .or_else(|| self.wear_bands.last())
    }
}

impl Default for TireConfig {
    fn default() -> Self {
        Self {
            wear_resistance_offset: 1.1,
            management_relief: 0.5,
            wear_divisor: 100.0,
            wear_bands: vec![
                WearBand {
                    upper: 0.5,
                    exponent: 2.0,
                    coefficient: 5.0,
                },
                WearBand {
                    upper: 0.8,
                    exponent: 2.5,
                    coefficient: 7.5,
                },
                WearBand {
                    upper: 1.0,
                    exponent: 3.0,
                    coefficient: 10.0,
                },
            ],
            graining_base_chance: 0.01,
            graining_reference_temp_c: 30.0,
            graining_initial_penalty_s: 1.5,
            graining_recurring_penalty_s: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PitConfig {
    pub base_cost_s: f64,
    pub pit_speed_relief_s: f64,
    pub jitter_s: f64,
    pub error_chance_scale: f64,
    pub error_min_s: f64,
    pub error_max_s: f64,
    pub forced_wear: f64,
    pub safety_car_wear: f64,
    pub safety_car_acumen: f64,
    pub window_half_width: u32,
    pub closing_laps: u32,
    pub scheduled_wear: f64,
    pub stint_overrun_fraction: f64,
    pub stint_overrun_wear: f64,
    pub aggressive_overrun_wear: f64,
    pub durable_bias_remaining_fraction: f64,
    pub durable_bias_wear: f64,
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            base_cost_s: 23.0,
            pit_speed_relief_s: 2.0,
            jitter_s: 0.5,
            error_chance_scale: 0.02,
            error_min_s: 2.0,
            error_max_s: 6.0,
            forced_wear: 0.95,
            safety_car_wear: 0.4,
            safety_car_acumen: 0.75,
            window_half_width: 5,
            closing_laps: 5,
            scheduled_wear: 0.5,
            stint_overrun_fraction: 0.8,
            stint_overrun_wear: 0.3,
            aggressive_overrun_wear: 0.7,
            durable_bias_remaining_fraction: 0.333,
            durable_bias_wear: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IncidentConfig {
    pub mechanical_base_chance: f64,
    pub mechanical_deficit_scale: f64,
    pub aggressive_mechanical_factor: f64,
    pub damage_base_chance: f64,
    pub damage_deficit_scale: f64,
    pub damage_aggressive_bonus: f64,
    pub damage_high_wear: f64,
    pub damage_high_wear_bonus: f64,
    pub damage_multiplier_min: f64,
    pub damage_multiplier_max: f64,
    pub error_base_chance: f64,
    pub error_consistency_offset: f64,
    pub weather_error_weight: f64,
    pub error_variability_scale: f64,
    pub error_wear_threshold: f64,
    pub error_wear_scale: f64,
    pub error_aggressive_bonus: f64,
    pub crash_share: f64,
    pub moderate_share: f64,
    pub moderate_loss_s: [f64; 2],
    pub minor_loss_s: [f64; 2],
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            mechanical_base_chance: 0.0005,
            mechanical_deficit_scale: 0.001,
            aggressive_mechanical_factor: 1.2,
            damage_base_chance: 0.0008,
            damage_deficit_scale: 0.0005,
            damage_aggressive_bonus: 0.0004,
            damage_high_wear: 0.8,
            damage_high_wear_bonus: 0.0006,
            damage_multiplier_min: 1.003,
            damage_multiplier_max: 1.012,
            error_base_chance: 0.001,
            error_consistency_offset: 1.5,
            weather_error_weight: 1.0,
            error_variability_scale: 0.0005,
            error_wear_threshold: 0.7,
            error_wear_scale: 0.002,
            error_aggressive_bonus: 0.0005,
            crash_share: 0.1,
            moderate_share: 0.3,
            moderate_loss_s: [5.0, 10.0],
            minor_loss_s: [2.0, 5.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyCarConfig {
    pub deployment_chance: BTreeMap<TrackType, f64>,
    pub min_laps: u32,
    pub max_laps: u32,
    pub opening_laps: u32,
    pub closing_laps: u32,
    pub pace_multiplier: f64,
    pub pace_jitter_s: f64,
    pub restart_gap_s: f64,
}

impl SafetyCarConfig {
    pub fn deployment_chance_for(&self, track_type: TrackType) -> f64 {
        self.deployment_chance
            .get(&track_type)
            .copied()
            .unwrap_or(0.5)
            .clamp(0.0, 1.0)
    }
}

impl Default for SafetyCarConfig {
    fn default() -> Self {
        let deployment_chance = BTreeMap::from([
            (TrackType::Permanent, 0.5),
            (TrackType::StreetCircuit, 0.7),
            (TrackType::Technical, 0.5),
            (TrackType::Mixed, 0.5),
            (TrackType::HighSpeed, 0.4),
        ]);
        Self {
            deployment_chance,
            min_laps: 2,
            max_laps: 3,
            opening_laps: 2,
            closing_laps: 5,
            pace_multiplier: 1.4,
            pace_jitter_s: 0.5,
            restart_gap_s: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OvertakeConfig {
    pub gap_threshold_s: f64,
    pub base_chance: f64,
    pub pace_weight: f64,
    pub skill_weight: f64,
    pub difficulty_weight: f64,
    pub leader_protection: f64,
    pub tire_wear_weight: f64,
    pub close_gap_s: f64,
    pub close_gap_bonus: f64,
    pub defender_consistency_weight: f64,
    pub aggressive_bonus: f64,
    pub swap_margin_s: f64,
    pub team_order_gap_s: f64,
    pub team_order_quiet_laps: u32,
}

impl Default for OvertakeConfig {
    fn default() -> Self {
        Self {
            gap_threshold_s: 1.0,
            base_chance: 0.3,
            pace_weight: 0.2,
            skill_weight: 0.3,
            difficulty_weight: 0.4,
            leader_protection: 0.1,
            tire_wear_weight: 0.1,
            close_gap_s: 0.5,
            close_gap_bonus: 0.05,
            defender_consistency_weight: 0.1,
            aggressive_bonus: 0.05,
            swap_margin_s: 0.1,
            team_order_gap_s: 2.0,
            team_order_quiet_laps: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackEvolutionConfig {
    pub rubber_rate: f64,
    pub reference_field: f64,
    pub max_grip_bonus: f64,
    pub wet_retention: f64,
    pub intermediate_retention: f64,
}

impl Default for TrackEvolutionConfig {
    fn default() -> Self {
        Self {
            rubber_rate: 0.01,
            reference_field: 20.0,
            max_grip_bonus: 0.015,
            wet_retention: 0.1,
            intermediate_retention: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub max_trials: u32,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            max_trials: 1_000_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RaceModelConfigMetadata {
    path: Option<PathBuf>,
}

impl RaceModelConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_race_model_config_from_env() -> (Arc<RaceModelConfig>, RaceModelConfigMetadata) {
    let override_path = env::var("RACE_MODEL_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/race_model_config.json");

    let candidates: Vec<PathBuf> = match override_path {
        Some(ref path) => vec![path.clone()],
        None => vec![default_path.clone()],
    };

    for path in candidates {
        match RaceModelConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "race_sim::config",
                    path = %path.display(),
                    "race_model_config.loaded=file"
                );
                return (Arc::new(config), RaceModelConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "race_sim::config",
                    path = %path.display(),
                    error = %err,
                    "race_model_config.load_failed"
                );
            }
        }
    }

    let config = RaceModelConfig::builtin();
    tracing::info!(
        target: "race_sim::config",
        "race_model_config.loaded=builtin"
    );
    (config, RaceModelConfigMetadata::new(None))
}
