use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use serde::Serialize;

use crate::{
    catalog::{Circuit, CompoundPreference, StrategyArchetype, TireCompound, WeatherCondition},
    competitor::{Competitor, RaceStatus},
    config::PitConfig,
    features::SimFeatures,
};

const DURABLE_BIAS: [(TireCompound, f64); 3] = [
    (TireCompound::Soft, 0.7),
    (TireCompound::Medium, 1.2),
    (TireCompound::Hard, 1.5),
];

/// Why a competitor came in, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PitReason {
    SafetyCarWindow,
    WornOut,
    WrongCompound,
    Scheduled,
    AggressiveOverrun,
}

impl PitReason {
    /// Discretionary stops are skipped in the closing laps.
    pub const fn is_discretionary(&self) -> bool {
        matches!(self, PitReason::Scheduled | PitReason::AggressiveOverrun)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PitContext<'a> {
    pub circuit: &'a Circuit,
    pub weather: &'a WeatherCondition,
    pub lap: u32,
    pub total_laps: u32,
    pub caution: bool,
    pub features: SimFeatures,
    pub config: &'a PitConfig,
}

impl PitContext<'_> {
    fn remaining_laps(&self) -> u32 {
        self.total_laps.saturating_sub(self.lap)
    }

    fn in_closing_laps(&self) -> bool {
        self.lap > self.total_laps.saturating_sub(self.config.closing_laps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitStopOutcome {
    pub reason: PitReason,
    /// Total stationary plus pit-lane time, including any error.
    pub duration_s: f64,
    pub error_s: Option<f64>,
    pub compound: TireCompound,
}

/// Lap around which the `index`-th (1-based) of `planned_stops` stops is due.
pub fn scheduled_target(total_laps: u32, planned_stops: u32, index: u32) -> u32 {
    let stint = total_laps as f64 / (planned_stops + 1) as f64;
    (stint * index as f64).floor() as u32
}

pub fn scheduled_targets(total_laps: u32, planned_stops: u32) -> Vec<u32> {
    (1..=planned_stops)
        .map(|index| scheduled_target(total_laps, planned_stops, index))
        .collect()
}

pub fn decide_pit_stop(competitor: &Competitor, ctx: &PitContext<'_>) -> Option<PitReason> {
    if competitor.is_retired() {
        return None;
    }
    let cfg = ctx.config;
    let wear = competitor.tires.wear();
    let lap = ctx.lap;

    let opportunist = competitor.strategy.safety_car_opportunist
        || competitor.effective_acumen >= cfg.safety_car_acumen;
    let mid_race = lap > cfg.window_half_width
        && lap < ctx.total_laps.saturating_sub(cfg.closing_laps);
    if ctx.caution && opportunist && wear > cfg.safety_car_wear && mid_race {
        return Some(PitReason::SafetyCarWindow);
    }
    if wear > cfg.forced_wear {
        return Some(PitReason::WornOut);
    }
    if competitor.tires.compound.family() != ctx.weather.tire_type_recommendation {
        return Some(PitReason::WrongCompound);
    }
    if ctx.in_closing_laps() {
        return None;
    }

    let planned = competitor.strategy.planned_stops;
    if competitor.pit_stops < planned {
        let next = competitor.pit_stops + 1;
        let target = scheduled_target(ctx.total_laps, planned, next) as i64;
        let half = cfg.window_half_width as i64;
        let lap = lap as i64;
        let stint = ctx.total_laps as f64 / (planned + 1) as f64;
        let overrun = competitor.tires.laps_on_tires as f64 > cfg.stint_overrun_fraction * stint
            && wear > cfg.stint_overrun_wear;
        if lap >= target - half && lap < target + half && (wear > cfg.scheduled_wear || overrun) {
            return Some(PitReason::Scheduled);
        }
    }

    if ctx.features.contains(SimFeatures::STRATEGY_RISK)
        && competitor.is_aggressive()
        && competitor.tires.compound == TireCompound::Soft
        && wear > cfg.aggressive_overrun_wear
    {
        return Some(PitReason::AggressiveOverrun);
    }
    None
}

/// Services the car: charges the stop to race time, fits new tires and
/// marks the lap as a pit lap.
pub fn execute_pit_stop<R: Rng + ?Sized>(
    competitor: &mut Competitor,
    reason: PitReason,
    ctx: &PitContext<'_>,
    rng: &mut R,
) -> PitStopOutcome {
    let cfg = ctx.config;
    let speed = competitor.profile.team.pit_stop_speed;
    let mut duration = cfg.base_cost_s - speed * cfg.pit_speed_relief_s;
    let mut error_s = None;

    if ctx.features.contains(SimFeatures::PIT_VARIANCE) {
        if cfg.jitter_s > 0.0 {
            duration += rng.gen_range(-cfg.jitter_s..=cfg.jitter_s);
        }
        let error_chance = cfg.error_chance_scale * (1.0 - speed);
        if rng.gen::<f64>() < error_chance {
            let lost = rng.gen_range(cfg.error_min_s..=cfg.error_max_s);
            duration += lost;
            error_s = Some(lost);
        }
    }
    let duration = duration.max(0.0);

    let compound = choose_compound(
        ctx.circuit,
        &competitor.strategy,
        ctx.weather,
        ctx.remaining_laps(),
        ctx.total_laps,
        competitor.tires.wear(),
        cfg,
        rng,
    );

    competitor.race_time_s += duration;
    competitor.pit_stops += 1;
    competitor.tires.refit(compound);
    competitor.status = RaceStatus::Pitting;

    PitStopOutcome {
        reason,
        duration_s: duration,
        error_s,
        compound,
    }
}

/// Picks the compound fitted at a stop.
#[allow(clippy::too_many_arguments)]
pub fn choose_compound<R: Rng + ?Sized>(
    circuit: &Circuit,
    strategy: &StrategyArchetype,
    weather: &WeatherCondition,
    remaining_laps: u32,
    total_laps: u32,
    outgoing_wear: f64,
    config: &PitConfig,
    rng: &mut R,
) -> TireCompound {
    if let Some(compound) = TireCompound::for_wet_family(weather.tire_type_recommendation) {
        return compound;
    }
    let preference = circuit
        .tire_compound_preference
        .blend(&strategy.tire_compound_preference);
    let durable = (remaining_laps as f64) < total_laps as f64 * config.durable_bias_remaining_fraction
        || outgoing_wear > config.durable_bias_wear;
    draw_dry_compound(&preference, durable, rng)
}

pub fn choose_starting_compound<R: Rng + ?Sized>(
    circuit: &Circuit,
    strategy: &StrategyArchetype,
    weather: &WeatherCondition,
    rng: &mut R,
) -> TireCompound {
    if let Some(compound) = TireCompound::for_wet_family(weather.tire_type_recommendation) {
        return compound;
    }
    let preference = circuit
        .tire_compound_preference
        .blend(&strategy.tire_compound_preference);
    draw_dry_compound(&preference, false, rng)
}

fn draw_dry_compound<R: Rng + ?Sized>(
    preference: &CompoundPreference,
    durable: bool,
    rng: &mut R,
) -> TireCompound {
    let weights = DURABLE_BIAS.map(|(compound, bias)| {
        let weight = preference.weight(compound).max(0.0);
        if durable {
            weight * bias
        } else {
            weight
        }
    });
    match WeightedIndex::new(weights) {
        Ok(index) => TireCompound::DRY[index.sample(rng)],
        Err(_) => TireCompound::Medium,
    }
}
