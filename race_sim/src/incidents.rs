use rand::Rng;

use crate::{
    catalog::WeatherCondition,
    competitor::{Competitor, RetirementReason},
    config::IncidentConfig,
    features::SimFeatures,
};

#[derive(Debug, Clone, Copy)]
pub struct IncidentContext<'a> {
    pub weather: &'a WeatherCondition,
    pub lap: u32,
    pub features: SimFeatures,
    pub config: &'a IncidentConfig,
}

/// Driver mistake severity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverError {
    Crash,
    Moderate(f64),
    Minor(f64),
}

impl DriverError {
    pub fn time_lost(&self) -> f64 {
        match self {
            DriverError::Crash => 0.0,
            DriverError::Moderate(lost) | DriverError::Minor(lost) => *lost,
        }
    }
}

/// What happened to one competitor during the incident phase of a lap.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IncidentReport {
    pub retirement: Option<RetirementReason>,
    /// Multiplier installed by fresh minor damage.
    pub damage: Option<f64>,
    pub driver_error: Option<DriverError>,
}

impl IncidentReport {
    pub fn is_quiet(&self) -> bool {
        *self == IncidentReport::default()
    }
}

fn reliability_deficits(competitor: &Competitor) -> (f64, f64) {
    let car = &competitor.profile.car;
    (
        (1.0 - car.engine_reliability).max(0.0),
        (1.0 - car.brake_durability).max(0.0),
    )
}

pub fn mechanical_failure_chance(
    competitor: &Competitor,
    features: SimFeatures,
    config: &IncidentConfig,
) -> f64 {
    let (engine, brakes) = reliability_deficits(competitor);
    let mut chance = config.mechanical_base_chance + (engine + brakes) * config.mechanical_deficit_scale;
    if features.contains(SimFeatures::STRATEGY_RISK) && competitor.is_aggressive() {
        chance *= config.aggressive_mechanical_factor;
    }
    chance.clamp(0.0, 1.0)
}

pub fn minor_damage_chance(competitor: &Competitor, config: &IncidentConfig) -> f64 {
    let (engine, brakes) = reliability_deficits(competitor);
    let mut chance = config.damage_base_chance + (engine + brakes) * config.damage_deficit_scale;
    if competitor.is_aggressive() {
        chance += config.damage_aggressive_bonus;
    }
    if competitor.tires.wear() > config.damage_high_wear {
        chance += config.damage_high_wear_bonus;
    }
    chance.clamp(0.0, 1.0)
}

pub fn driver_error_chance(
    competitor: &Competitor,
    weather: &WeatherCondition,
    features: SimFeatures,
    config: &IncidentConfig,
) -> f64 {
    let consistency = competitor.profile.driver.consistency;
    let mut chance = config.error_base_chance * (config.error_consistency_offset - consistency)
        + weather.driver_error_chance_modifier * config.weather_error_weight;
    if features.contains(SimFeatures::STRATEGY_RISK) {
        chance += weather.variability * config.error_variability_scale;
        chance += (competitor.tires.wear() - config.error_wear_threshold).max(0.0)
            * config.error_wear_scale;
        if competitor.is_aggressive() {
            chance += config.error_aggressive_bonus;
        }
    }
    chance.clamp(0.0, 1.0)
}

/// Rolls mechanical failure, minor damage and driver error for one
/// competitor and applies the consequences to its state.
pub fn check_incidents<R: Rng + ?Sized>(
    competitor: &mut Competitor,
    ctx: &IncidentContext<'_>,
    rng: &mut R,
) -> IncidentReport {
    let mut report = IncidentReport::default();
    if competitor.is_retired() {
        return report;
    }
    let cfg = ctx.config;

    if rng.gen::<f64>() < mechanical_failure_chance(competitor, ctx.features, cfg) {
        let (engine, brakes) = reliability_deficits(competitor);
        let total = engine + brakes;
        let engine_share = if total > 0.0 { engine / total } else { 0.5 };
        let reason = if rng.gen::<f64>() < engine_share {
            RetirementReason::EngineFailure
        } else {
            RetirementReason::BrakeFailure
        };
        competitor.retire(reason, ctx.lap);
        report.retirement = Some(reason);
        return report;
    }

    if ctx.features.contains(SimFeatures::MINOR_DAMAGE)
        && competitor.damage_multiplier.is_none()
        && rng.gen::<f64>() < minor_damage_chance(competitor, cfg)
    {
        let multiplier = rng.gen_range(cfg.damage_multiplier_min..=cfg.damage_multiplier_max);
        competitor.damage_multiplier = Some(multiplier);
        report.damage = Some(multiplier);
    }

    if rng.gen::<f64>() < driver_error_chance(competitor, ctx.weather, ctx.features, cfg) {
        let severity = rng.gen::<f64>();
        let error = if severity < cfg.crash_share {
            DriverError::Crash
        } else if severity < cfg.crash_share + cfg.moderate_share {
            let [low, high] = cfg.moderate_loss_s;
            DriverError::Moderate(rng.gen_range(low..=high))
        } else {
            let [low, high] = cfg.minor_loss_s;
            DriverError::Minor(rng.gen_range(low..=high))
        };
        match error {
            DriverError::Crash => {
                competitor.retire(RetirementReason::DriverError, ctx.lap);
                report.retirement = Some(RetirementReason::DriverError);
            }
            DriverError::Moderate(lost) | DriverError::Minor(lost) => {
                competitor.race_time_s += lost;
            }
        }
        report.driver_error = Some(error);
    }
    report
}
