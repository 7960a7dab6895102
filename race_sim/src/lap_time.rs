//! Per-lap time model.
//!
//! A lap starts from a circuit base time scaled by car performance, then
//! layers driver skill, grip, tire state and noise on top. Tire wear is
//! advanced as part of the lap so the penalty reflects the rubber the lap
//! was actually driven on.

use std::sync::Arc;

use rand::Rng;

use crate::{
    catalog::{Circuit, TireCompound, TireFamily, WeatherCondition},
    competitor::Competitor,
    config::{LapTimeConfig, RaceModelConfig, TireConfig},
    features::SimFeatures,
};

/// Everything outside the competitor that shapes a lap.
#[derive(Debug, Clone, Copy)]
pub struct LapContext<'a> {
    pub circuit: &'a Circuit,
    pub weather: &'a WeatherCondition,
    pub weather_changed: bool,
    /// Fractional lap time reduction from rubbered-in track.
    pub rubber_bonus: f64,
    pub features: SimFeatures,
    pub config: &'a RaceModelConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapOutcome {
    pub time_s: f64,
    /// Graining started on this lap.
    pub graining_started: bool,
}

pub fn base_lap_time(circuit: &Circuit, config: &LapTimeConfig) -> f64 {
    circuit.length_km * config.seconds_per_km
}

/// Weighted car performance for the circuit's demands under the given weather.
pub fn performance_index(
    competitor: &Competitor,
    circuit: &Circuit,
    weather: &WeatherCondition,
    config: &LapTimeConfig,
) -> f64 {
    let car = &competitor.profile.car;
    let straight = car.engine_hp * weather.hp_multiplier * config.hp_straight_share
        + car.drag * (1.0 - config.hp_straight_share);
    let cornering = car.downforce * weather.downforce_multiplier;
    let braking = car.brake_stopping_power;

    let total_weight =
        circuit.straight_speed_importance + circuit.cornering_importance + circuit.braking_demands;
    if total_weight <= 0.0 {
        return 1.0;
    }
    (straight * circuit.straight_speed_importance
        + cornering * circuit.cornering_importance
        + braking * circuit.braking_demands)
        / total_weight
}

pub const fn compound_wear_factor(compound: TireCompound) -> f64 {
    match compound {
        TireCompound::Soft => 1.2,
        TireCompound::Medium => 1.0,
        TireCompound::Hard => 0.9,
        TireCompound::Intermediate => 1.1,
        TireCompound::Wet => 1.05,
    }
}

/// Pace multiplier for a compound; rain tires are quick only in the
/// conditions they were built for.
pub fn compound_pace_factor(compound: TireCompound, recommended: TireFamily) -> f64 {
    match compound {
        TireCompound::Soft => 0.98,
        TireCompound::Medium => 1.0,
        TireCompound::Hard => 1.02,
        TireCompound::Intermediate if recommended == TireFamily::Intermediate => 0.95,
        TireCompound::Intermediate => 1.05,
        TireCompound::Wet if recommended == TireFamily::Wet => 0.90,
        TireCompound::Wet => 1.10,
    }
}

/// Seconds lost to worn tires.
pub fn wear_penalty(wear: f64, config: &TireConfig) -> f64 {
    config
        .band_for(wear)
        .map(|band| band.coefficient * wear.powf(band.exponent))
        .unwrap_or(0.0)
}

/// Wear added by one lap, before clamping.
pub fn wear_increment(competitor: &Competitor, ctx: &LapContext<'_>) -> f64 {
    let tires = ctx.config.tires();
    let driver = &competitor.profile.driver;
    let car = &competitor.profile.car;

    let raw = ctx.circuit.tire_wear_severity
        * (tires.wear_resistance_offset - car.tire_wear_resistance)
        * (1.0 - driver.tire_management * tires.management_relief)
        + ctx.weather.tire_wear_modifier;
    let mut increment = (raw / tires.wear_divisor).max(0.0);
    if ctx.features.contains(SimFeatures::COMPOUND_MODEL) {
        increment *= compound_wear_factor(competitor.tires.compound);
    }
    increment
}

/// Simulates one green-flag lap: returns its time and advances the tire state.
pub fn compute_lap_time<R: Rng + ?Sized>(
    competitor: &mut Competitor,
    ctx: &LapContext<'_>,
    rng: &mut R,
) -> LapOutcome {
    let lap_cfg = ctx.config.lap_time();
    let tire_cfg = ctx.config.tires();
    let profile = Arc::clone(&competitor.profile);
    let driver = &profile.driver;
    let base = base_lap_time(ctx.circuit, lap_cfg);

    let performance = performance_index(competitor, ctx.circuit, ctx.weather, lap_cfg);
    let mut time = base / (performance + lap_cfg.performance_offset);
    time *= 1.0 - driver.skill * lap_cfg.skill_time_factor;

    let grip_multiplier = ctx.weather.grip_multiplier;
    let mut grip = grip_multiplier
        + (1.0 - grip_multiplier) * driver.wet_weather_ability * lap_cfg.wet_mitigation_factor;
    if ctx.weather_changed && ctx.features.contains(SimFeatures::WEATHER_ADAPTABILITY) {
        grip += competitor.strategy.weather_adaptability
            * ctx.weather.adaptability_modifier
            * lap_cfg.adaptability_grip_factor;
    }
    if grip > 0.0 {
        time /= grip;
    }
    if ctx.features.contains(SimFeatures::TRACK_EVOLUTION) {
        time *= 1.0 - ctx.rubber_bonus;
    }

    let increment = wear_increment(competitor, ctx);
    competitor.tires.add_wear(increment);
    competitor.tires.laps_on_tires += 1;
    let wear = competitor.tires.wear();
    time += wear_penalty(wear, tire_cfg);

    if ctx.features.contains(SimFeatures::COMPOUND_MODEL) {
        time *= compound_pace_factor(
            competitor.tires.compound,
            ctx.weather.tire_type_recommendation,
        );
    }

    let mut graining_started = false;
    if ctx.features.contains(SimFeatures::GRAINING) {
        if competitor.tires.graining {
            time += tire_cfg.graining_recurring_penalty_s;
        } else {
            let chance = tire_cfg.graining_base_chance
                * wear
                * (1.5 - driver.tire_management)
                * ctx.weather.track_temp_celsius
                / tire_cfg.graining_reference_temp_c;
            if rng.gen::<f64>() < chance {
                competitor.tires.graining = true;
                graining_started = true;
                time += tire_cfg.graining_initial_penalty_s;
            }
        }
    }

    let spread = (1.0 - driver.consistency) * lap_cfg.consistency_deviation_scale;
    if spread > 0.0 {
        time += rng.gen_range(-spread..=spread);
    }

    time -= (competitor.effective_acumen - lap_cfg.acumen_reference) * lap_cfg.acumen_credit_scale;
    time *= competitor.damage_factor();

    if ctx.features.contains(SimFeatures::COMPOUND_MODEL)
        && lap_cfg.variability_jitter > 0.0
        && rng.gen::<f64>() < ctx.weather.variability
    {
        time *= rng.gen_range(1.0 - lap_cfg.variability_jitter..=1.0 + lap_cfg.variability_jitter);
    }

    LapOutcome {
        time_s: time.max(base * lap_cfg.floor_fraction),
        graining_started,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::RaceCatalog, competitor::fixtures::competitor};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn context<'a>(
        catalog: &'a RaceCatalog,
        config: &'a RaceModelConfig,
        weather: &str,
        features: SimFeatures,
    ) -> LapContext<'a> {
        LapContext {
            circuit: catalog.circuit("Silverstone Circuit").unwrap(),
            weather: catalog.weather(weather).unwrap(),
            weather_changed: false,
            rubber_bonus: 0.0,
            features,
            config,
        }
    }

    #[test]
    fn wear_penalty_is_banded() {
        let tires = TireConfig::default();
        assert_eq!(wear_penalty(0.0, &tires), 0.0);
        assert!((wear_penalty(0.4, &tires) - 5.0 * 0.16).abs() < 1e-12);
        assert!((wear_penalty(0.7, &tires) - 7.5 * 0.7f64.powf(2.5)).abs() < 1e-12);
        assert!((wear_penalty(1.0, &tires) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn lap_advances_wear_and_stint() {
        let catalog = RaceCatalog::builtin();
        let config = RaceModelConfig::default();
        let ctx = context(&catalog, &config, "Dry", SimFeatures::empty());
        let mut racer = competitor("A", 1);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let expected = wear_increment(&racer, &ctx);
        compute_lap_time(&mut racer, &ctx, &mut rng);
        assert!((racer.tires.wear() - expected).abs() < 1e-12);
        assert_eq!(racer.tires.laps_on_tires, 1);
    }

    #[test]
    fn lap_time_never_drops_below_floor() {
        let catalog = RaceCatalog::builtin();
        let config = RaceModelConfig::default();
        let ctx = context(&catalog, &config, "Dry", SimFeatures::all());
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut racer = competitor("A", 1);
        {
            let profile = std::sync::Arc::make_mut(&mut racer.profile);
            profile.car.engine_hp = 50.0;
            profile.car.downforce = 50.0;
        }
        let floor = base_lap_time(ctx.circuit, config.lap_time()) * 0.8;
        for _ in 0..20 {
            let outcome = compute_lap_time(&mut racer, &ctx, &mut rng);
            assert!(outcome.time_s >= floor);
        }
    }

    #[test]
    fn rain_is_slower_than_dry() {
        let catalog = RaceCatalog::builtin();
        let config = RaceModelConfig::default();
        let dry = context(&catalog, &config, "Dry", SimFeatures::empty());
        let wet = context(&catalog, &config, "Heavy Rain", SimFeatures::empty());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let dry_time = compute_lap_time(&mut competitor("A", 1), &dry, &mut rng).time_s;
        let wet_time = compute_lap_time(&mut competitor("A", 1), &wet, &mut rng).time_s;
        assert!(wet_time > dry_time + 10.0, "{dry_time} vs {wet_time}");
    }

    #[test]
    fn rain_tires_only_pay_off_in_their_conditions() {
        assert_eq!(
            compound_pace_factor(TireCompound::Wet, TireFamily::Wet),
            0.90
        );
        assert_eq!(
            compound_pace_factor(TireCompound::Wet, TireFamily::Dry),
            1.10
        );
        assert_eq!(
            compound_pace_factor(TireCompound::Intermediate, TireFamily::Intermediate),
            0.95
        );
        assert_eq!(compound_wear_factor(TireCompound::Soft), 1.2);
    }

    #[test]
    fn graining_penalty_recurs_once_started() {
        let catalog = RaceCatalog::builtin();
        let config = RaceModelConfig::default();
        let plain = context(&catalog, &config, "Dry", SimFeatures::empty());
        let graining = context(&catalog, &config, "Dry", SimFeatures::GRAINING);

        let steady = |grid| {
            let mut racer = competitor("A", grid);
            std::sync::Arc::make_mut(&mut racer.profile).driver.consistency = 1.0;
            racer
        };
        let mut clean = steady(1);
        let mut grained = steady(2);
        grained.tires.graining = true;

        let clean_time = compute_lap_time(&mut clean, &plain, &mut ChaCha8Rng::seed_from_u64(5)).time_s;
        let outcome = compute_lap_time(&mut grained, &graining, &mut ChaCha8Rng::seed_from_u64(5));
        assert!(!outcome.graining_started);
        assert!((outcome.time_s - clean_time - 0.3).abs() < 1e-9);
    }
}
