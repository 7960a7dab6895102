//! Lap-to-lap weather changes and track rubber build-up.

use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use tracing::trace;

use crate::{
    catalog::{Circuit, RaceCatalog, TireFamily, WeatherCondition},
    config::TrackEvolutionConfig,
    features::SimFeatures,
};

/// Active weather for a race in progress.
#[derive(Debug, Clone, Copy)]
pub struct WeatherState<'a> {
    current: &'a WeatherCondition,
    changed: bool,
}

impl<'a> WeatherState<'a> {
    pub fn new(initial: &'a WeatherCondition) -> Self {
        Self {
            current: initial,
            changed: false,
        }
    }

    pub fn current(&self) -> &'a WeatherCondition {
        self.current
    }

    /// Whether the condition switched at the start of the current lap.
    pub fn changed_this_lap(&self) -> bool {
        self.changed
    }

    /// Rolls for a change at lap start. Returns the previous condition when
    /// the weather actually moved.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        catalog: &'a RaceCatalog,
        circuit: &Circuit,
        features: SimFeatures,
        rng: &mut R,
    ) -> Option<&'a WeatherCondition> {
        self.changed = false;
        if !features.contains(SimFeatures::WEATHER_TRANSITIONS) {
            return None;
        }
        let next = evaluate_transition(catalog, self.current, circuit.weather_susceptibility, rng)?;
        let previous = self.current;
        trace!(
            target: "race_sim::weather",
            from = %previous.name,
            to = %next.name,
            "weather.changed"
        );
        self.current = next;
        self.changed = true;
        Some(previous)
    }
}

/// One Markov step. `None` when no change happens: the roll failed, the
/// row is missing or empty, or the draw landed on the current condition.
pub fn evaluate_transition<'a, R: Rng + ?Sized>(
    catalog: &'a RaceCatalog,
    current: &WeatherCondition,
    susceptibility: f64,
    rng: &mut R,
) -> Option<&'a WeatherCondition> {
    let chance = (current.variability * susceptibility).clamp(0.0, 1.0);
    if chance <= 0.0 || rng.gen::<f64>() >= chance {
        return None;
    }
    let row = catalog.weather_transitions.row(&current.name)?;
    let (names, weights): (Vec<&String>, Vec<f64>) =
        row.iter().map(|(name, weight)| (name, *weight)).unzip();
    let index = WeightedIndex::new(&weights).ok()?;
    let drawn = names[index.sample(rng)];
    if *drawn == current.name {
        return None;
    }
    catalog.weather(drawn)
}

/// Rubber laid down on the racing line, in `[0, 1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackState {
    rubber: f64,
}

impl TrackState {
    pub fn rubber(&self) -> f64 {
        self.rubber
    }

    /// Grows rubber by one lap's worth of running cars.
    pub fn evolve(&mut self, running: usize, config: &TrackEvolutionConfig) {
        let traffic = running as f64 / config.reference_field.max(1.0);
        self.rubber += traffic * config.rubber_rate * (1.0 - self.rubber);
        self.rubber = self.rubber.clamp(0.0, 1.0);
    }

    /// Rain washes rubber off the line.
    pub fn wash(&mut self, condition: &WeatherCondition, config: &TrackEvolutionConfig) {
        match condition.tire_type_recommendation {
            TireFamily::Wet => self.rubber *= config.wet_retention,
            TireFamily::Intermediate => self.rubber *= config.intermediate_retention,
            TireFamily::Dry => {}
        }
    }

    pub fn grip_bonus(&self, config: &TrackEvolutionConfig) -> f64 {
        self.rubber * config.max_grip_bonus
    }
}
