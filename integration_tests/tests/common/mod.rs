#![allow(dead_code)]

use std::sync::Arc;

use race_sim::{
    setup_trial, Circuit, Competitor, CompetitorTemplate, RaceEnvironment, RosterSource,
    SimFeatures, TireCompound, WeatherCondition,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub fn environment(enhanced: bool) -> RaceEnvironment {
    RaceEnvironment::builtin(SimFeatures::from_enhanced(enhanced))
}

pub fn templates() -> Vec<Arc<CompetitorTemplate>> {
    RosterSource::builtin().assemble().templates
}

pub fn circuit<'a>(env: &'a RaceEnvironment, selector: &str) -> &'a Circuit {
    env.catalog
        .select_circuit(selector)
        .expect("circuit in builtin catalog")
}

pub fn weather<'a>(env: &'a RaceEnvironment, name: &str) -> &'a WeatherCondition {
    env.catalog
        .select_weather(name)
        .expect("weather in builtin catalog")
}

/// The builtin field on a shuffled grid, plus the RNG that set it up.
pub fn field(
    env: &RaceEnvironment,
    circuit: &Circuit,
    weather: &WeatherCondition,
    seed: u64,
) -> (Vec<Competitor>, ChaCha8Rng) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let competitors = setup_trial(&templates(), &env.catalog.strategies, circuit, weather, &mut rng);
    (competitors, rng)
}

/// An entry built from the first builtin template after `edit`.
pub fn custom_competitor(
    env: &RaceEnvironment,
    grid: usize,
    edit: impl FnOnce(&mut CompetitorTemplate),
) -> Competitor {
    let mut template = (*templates()[0]).clone();
    edit(&mut template);
    let strategy = env.catalog.strategies[0].clone();
    Competitor::new(Arc::new(template), strategy, grid, TireCompound::Medium)
}
