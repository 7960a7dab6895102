//! Monte Carlo batch driver.
//!
//! Trials are split across weather scenarios, each given its own ChaCha8
//! stream derived from the master seed, and run in parallel on rayon. Every
//! worker folds outcomes into a local [`ResultsAggregator`]; the partial
//! aggregators are merged at the end.

use std::{collections::HashSet, sync::Arc, time::Instant};

use crossbeam_channel::{bounded, Receiver};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    aggregate::{projected_classification, CompetitorSummary, ProjectedEntry, ResultsAggregator},
    catalog::{Circuit, StrategyArchetype, WeatherCondition},
    competitor::{Competitor, CompetitorTemplate},
    error::SelectionError,
    features::SimFeatures,
    hashing::trial_seed,
    metrics::{MetricsAverages, RaceMetrics},
    pit::choose_starting_compound,
    race::{run_trial_with, RaceEnvironment, TrialOptions, TrialOutcome},
};

const STREAM_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonteCarloPlan {
    pub trials: u64,
    pub master_seed: u64,
    pub record_events: bool,
}

impl MonteCarloPlan {
    pub fn new(trials: u64, master_seed: u64) -> Self {
        Self {
            trials,
            master_seed,
            record_events: false,
        }
    }
}

/// A starting weather condition and its share of the trials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherScenario {
    pub name: String,
    pub weight: f64,
}

impl WeatherScenario {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    /// Equal weights over the named conditions.
    pub fn even<I, S>(names: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(|name| Self::new(name, 1.0)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioAllocation {
    pub weather: String,
    pub trials: u64,
}

/// A finished trial as delivered by [`stream_monte_carlo`].
#[derive(Debug, Clone, Serialize)]
pub struct TrialRecord {
    pub weather: String,
    pub trial_index: u64,
    pub seed: u64,
    pub outcome: TrialOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub circuit: String,
    pub enhanced: bool,
    pub features: SimFeatures,
    pub trials: u64,
    pub master_seed: u64,
    pub scenarios: Vec<ScenarioAllocation>,
    pub summaries: Vec<CompetitorSummary>,
    pub projected: Vec<ProjectedEntry>,
    pub metrics: RaceMetrics,
    pub averages: MetricsAverages,
}

/// Splits `total` trials by scenario weight using largest remainder; ties
/// go to the earlier scenario. Non-positive weights get nothing.
pub fn partition_trials(total: u64, scenarios: &[WeatherScenario]) -> Vec<u64> {
    let weight = |scenario: &WeatherScenario| {
        if scenario.weight.is_finite() && scenario.weight > 0.0 {
            scenario.weight
        } else {
            0.0
        }
    };
    let total_weight: f64 = scenarios.iter().map(weight).sum();
    if total_weight <= 0.0 {
        return vec![0; scenarios.len()];
    }

    let quotas: Vec<f64> = scenarios
        .iter()
        .map(|scenario| total as f64 * weight(scenario) / total_weight)
        .collect();
    let mut counts: Vec<u64> = quotas.iter().map(|quota| quota.floor() as u64).collect();
    let assigned: u64 = counts.iter().sum();
    let mut leftover = total.saturating_sub(assigned);

    let mut by_remainder: Vec<usize> = (0..scenarios.len())
        .filter(|&idx| weight(&scenarios[idx]) > 0.0)
        .collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for idx in by_remainder.into_iter().cycle() {
        if leftover == 0 {
            break;
        }
        counts[idx] += 1;
        leftover -= 1;
    }
    counts
}

/// Builds the field for one trial: a shuffled grid, a random strategy per
/// entry and a starting compound suited to the weather.
pub fn setup_trial<R: Rng + ?Sized>(
    templates: &[Arc<CompetitorTemplate>],
    strategies: &[StrategyArchetype],
    circuit: &Circuit,
    weather: &WeatherCondition,
    rng: &mut R,
) -> Vec<Competitor> {
    let mut grid: Vec<usize> = (1..=templates.len()).collect();
    grid.shuffle(rng);
    templates
        .iter()
        .zip(grid)
        .filter_map(|(template, grid_position)| {
            let strategy = strategies.choose(rng)?.clone();
            let compound = choose_starting_compound(circuit, &strategy, weather, rng);
            Some(Competitor::new(
                Arc::clone(template),
                strategy,
                grid_position,
                compound,
            ))
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct TrialJob {
    scenario: usize,
    trial_index: u64,
}

struct PreparedBatch<'a> {
    weathers: Vec<&'a WeatherCondition>,
    allocations: Vec<ScenarioAllocation>,
    jobs: Vec<TrialJob>,
}

fn prepare<'a>(
    env: &'a RaceEnvironment,
    plan: &MonteCarloPlan,
    scenarios: &[WeatherScenario],
    templates: &[Arc<CompetitorTemplate>],
) -> Result<PreparedBatch<'a>, SelectionError> {
    let max = env.config.monte_carlo().max_trials;
    if plan.trials == 0 || plan.trials > max as u64 {
        return Err(SelectionError::TrialCount {
            requested: plan.trials,
            max,
        });
    }
    if templates.len() < 2 {
        return Err(SelectionError::FieldTooSmall(templates.len()));
    }
    let mut names = HashSet::new();
    for template in templates {
        if !names.insert(template.name()) {
            return Err(SelectionError::DuplicateCompetitor(template.name().to_string()));
        }
    }

    let weathers = scenarios
        .iter()
        .map(|scenario| env.catalog.select_weather(&scenario.name))
        .collect::<Result<Vec<_>, _>>()?;
    let mut resolved = HashSet::new();
    for weather in &weathers {
        if !resolved.insert(weather.name.as_str()) {
            return Err(SelectionError::DuplicateScenario(weather.name.clone()));
        }
    }
    let counts = partition_trials(plan.trials, scenarios);
    if counts.iter().sum::<u64>() == 0 {
        return Err(SelectionError::NoScenarios);
    }

    let allocations = weathers
        .iter()
        .zip(&counts)
        .map(|(weather, &trials)| ScenarioAllocation {
            weather: weather.name.clone(),
            trials,
        })
        .collect();
    let jobs = counts
        .iter()
        .enumerate()
        .flat_map(|(scenario, &count)| {
            (0..count).map(move |trial_index| TrialJob {
                scenario,
                trial_index,
            })
        })
        .collect();

    Ok(PreparedBatch {
        weathers,
        allocations,
        jobs,
    })
}

fn run_job(
    env: &RaceEnvironment,
    plan: &MonteCarloPlan,
    circuit: &Circuit,
    weather: &WeatherCondition,
    templates: &[Arc<CompetitorTemplate>],
    job: TrialJob,
) -> (u64, TrialOutcome) {
    let seed = trial_seed(plan.master_seed, &weather.name, job.trial_index);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let competitors = setup_trial(templates, &env.catalog.strategies, circuit, weather, &mut rng);
    let options = TrialOptions {
        record_events: plan.record_events,
    };
    let outcome = run_trial_with(env, circuit, weather, competitors, options, &mut rng);
    (seed, outcome)
}

/// Runs the whole batch and returns the aggregated report.
pub fn run_monte_carlo(
    env: &RaceEnvironment,
    plan: &MonteCarloPlan,
    circuit: &Circuit,
    scenarios: &[WeatherScenario],
    templates: &[Arc<CompetitorTemplate>],
) -> Result<MonteCarloReport, SelectionError> {
    let batch = prepare(env, plan, scenarios, templates)?;
    let field_size = templates.len();
    info!(
        target: "race_sim::monte_carlo",
        circuit = %circuit.name,
        trials = plan.trials,
        field = field_size,
        enhanced = env.features.is_enhanced(),
        "monte_carlo.started"
    );
    let started = Instant::now();

    let aggregator = batch
        .jobs
        .par_iter()
        .fold(
            || ResultsAggregator::new(field_size),
            |mut acc, job| {
                let weather = batch.weathers[job.scenario];
                let (_, outcome) = run_job(env, plan, circuit, weather, templates, *job);
                acc.record(&outcome);
                acc
            },
        )
        .reduce(|| ResultsAggregator::new(field_size), ResultsAggregator::merged);

    let summaries = aggregator.summarize();
    let projected = projected_classification(&summaries);
    let metrics = *aggregator.metrics();
    info!(
        target: "race_sim::monte_carlo",
        trials = aggregator.trials(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "monte_carlo.completed"
    );

    Ok(MonteCarloReport {
        circuit: circuit.name.clone(),
        enhanced: env.features.is_enhanced(),
        features: env.features,
        trials: aggregator.trials(),
        master_seed: plan.master_seed,
        scenarios: batch.allocations,
        summaries,
        projected,
        averages: metrics.averages(),
        metrics,
    })
}

/// Runs the batch on the rayon pool in the background and streams each
/// finished trial. The channel closes once every trial has been sent or the
/// receiver is dropped. Delivery order is not deterministic; the outcomes
/// themselves are.
pub fn stream_monte_carlo(
    env: &RaceEnvironment,
    plan: &MonteCarloPlan,
    circuit: &Circuit,
    scenarios: &[WeatherScenario],
    templates: &[Arc<CompetitorTemplate>],
) -> Result<Receiver<TrialRecord>, SelectionError> {
    let batch = prepare(env, plan, scenarios, templates)?;
    let weathers: Vec<WeatherCondition> = batch.weathers.into_iter().cloned().collect();
    let jobs = batch.jobs;
    let env = env.clone();
    let plan = *plan;
    let circuit = circuit.clone();
    let templates = templates.to_vec();

    let (sender, receiver) = bounded(STREAM_CAPACITY);
    rayon::spawn(move || {
        let delivered = jobs.par_iter().try_for_each_with(sender, |sender, job| {
            let weather = &weathers[job.scenario];
            let (seed, outcome) = run_job(&env, &plan, &circuit, weather, &templates, *job);
            sender.send(TrialRecord {
                weather: weather.name.clone(),
                trial_index: job.trial_index,
                seed,
                outcome,
            })
        });
        if delivered.is_err() {
            warn!(
                target: "race_sim::monte_carlo",
                "monte_carlo.stream_receiver_dropped"
            );
        }
    });
    Ok(receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::RosterSource;

    #[test]
    fn equal_weights_give_remainder_to_first_scenarios() {
        let scenarios = WeatherScenario::even(["Dry", "Light Rain", "Heavy Rain", "Hot", "Cold"]);
        assert_eq!(partition_trials(1000, &scenarios), vec![200; 5]);
        assert_eq!(partition_trials(7, &scenarios), vec![2, 2, 1, 1, 1]);
        assert_eq!(partition_trials(3, &scenarios), vec![1, 1, 1, 0, 0]);
    }

    #[test]
    fn weighted_partition_uses_largest_remainder() {
        let scenarios = vec![
            WeatherScenario::new("Dry", 7.0),
            WeatherScenario::new("Light Rain", 2.0),
            WeatherScenario::new("Heavy Rain", 1.0),
            WeatherScenario::new("Hot", 0.0),
        ];
        let counts = partition_trials(15, &scenarios);
        // Quotas 10.5 / 3.0 / 1.5: the two .5 remainders tie, earlier wins.
        assert_eq!(counts, vec![11, 3, 1, 0]);
        assert_eq!(counts.iter().sum::<u64>(), 15);
    }

    #[test]
    fn setup_shuffles_grid_into_a_permutation() {
        let env = RaceEnvironment::builtin(SimFeatures::all());
        let templates = RosterSource::builtin().assemble().templates;
        let circuit = &env.catalog.circuits[0];
        let weather = env.catalog.weather("Dry").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let field = setup_trial(&templates, &env.catalog.strategies, circuit, weather, &mut rng);

        let mut grid: Vec<usize> = field.iter().map(|c| c.grid_position).collect();
        grid.sort_unstable();
        assert_eq!(grid, (1..=templates.len()).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_bad_selections_before_running() {
        let env = RaceEnvironment::builtin(SimFeatures::all());
        let templates = RosterSource::builtin().assemble().templates;
        let circuit = &env.catalog.circuits[0];
        let dry = WeatherScenario::even(["Dry"]);

        let zero = run_monte_carlo(&env, &MonteCarloPlan::new(0, 1), circuit, &dry, &templates);
        assert!(matches!(zero, Err(SelectionError::TrialCount { .. })));

        let snow = WeatherScenario::even(["Snow"]);
        let unknown = run_monte_carlo(&env, &MonteCarloPlan::new(5, 1), circuit, &snow, &templates);
        assert!(matches!(unknown, Err(SelectionError::UnknownWeather(_))));

        let none = run_monte_carlo(&env, &MonteCarloPlan::new(5, 1), circuit, &[], &templates);
        assert!(matches!(none, Err(SelectionError::NoScenarios)));

        let twice = WeatherScenario::even(["Dry", "dry"]);
        let duplicate = run_monte_carlo(&env, &MonteCarloPlan::new(4, 7), circuit, &twice, &templates);
        assert_eq!(duplicate.unwrap_err(), SelectionError::DuplicateScenario("Dry".to_string()));
        assert!(stream_monte_carlo(&env, &MonteCarloPlan::new(2, 7), circuit, &twice, &templates).is_err());

        let solo = run_monte_carlo(&env, &MonteCarloPlan::new(5, 1), circuit, &dry, &templates[..1]);
        assert!(matches!(solo, Err(SelectionError::FieldTooSmall(1))));
    }

    #[test]
    fn stream_delivers_every_trial() {
        let env = RaceEnvironment::builtin(SimFeatures::all());
        let templates = RosterSource::builtin().assemble().templates;
        let circuit = env.catalog.circuit("Circuit Zandvoort").unwrap();
        let scenarios = WeatherScenario::even(["Dry", "Cold"]);
        let receiver = stream_monte_carlo(
            &env,
            &MonteCarloPlan::new(6, 7),
            circuit,
            &scenarios,
            &templates,
        )
        .unwrap();

        let records: Vec<TrialRecord> = receiver.iter().collect();
        assert_eq!(records.len(), 6);
        let mut aggregator = ResultsAggregator::new(templates.len());
        for record in &records {
            aggregator.record(&record.outcome);
        }
        assert_eq!(aggregator.trials(), 6);
    }
}
