//! Lap-by-lap race orchestration.
//!
//! A [`RaceSession`] owns the mutable state of one trial: the competitors,
//! the active weather, track rubber and the safety car. Each call to
//! [`RaceSession::step_lap`] runs the subsystems in a fixed order so a
//! seeded RNG replays the same race exactly.

use std::{cmp::Ordering, sync::Arc};

use rand::Rng;
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    aggregate::points_for_position,
    catalog::{Circuit, RaceCatalog, WeatherCondition},
    competitor::{Competitor, RaceStatus, RetirementReason},
    config::RaceModelConfig,
    features::SimFeatures,
    incidents::{check_incidents, DriverError, IncidentContext},
    lap_time::{base_lap_time, compute_lap_time, LapContext},
    metrics::RaceMetrics,
    overtake::{assign_positions, overtake_sweep, running_order, OvertakeContext, PassKind},
    pit::{decide_pit_stop, execute_pit_stop, PitContext},
    race_log::{RaceEvent, RaceEventKind, RaceLog},
    safety_car::{caution_lap_time, compress_field, SafetyCar},
    weather::{TrackState, WeatherState},
};

/// Shared, read-only inputs for every trial of a batch.
#[derive(Debug, Clone)]
pub struct RaceEnvironment {
    pub catalog: Arc<RaceCatalog>,
    pub config: Arc<RaceModelConfig>,
    pub features: SimFeatures,
}

impl RaceEnvironment {
    pub fn new(catalog: Arc<RaceCatalog>, config: Arc<RaceModelConfig>, features: SimFeatures) -> Self {
        Self {
            catalog,
            config,
            features,
        }
    }

    pub fn builtin(features: SimFeatures) -> Self {
        Self::new(RaceCatalog::builtin(), RaceModelConfig::builtin(), features)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialOptions {
    pub record_events: bool,
}

/// One row of a trial's final classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedEntry {
    pub position: usize,
    pub name: String,
    pub team: String,
    pub grid_position: usize,
    pub strategy: String,
    pub laps_completed: u32,
    pub race_time_s: f64,
    pub pit_stops: u32,
    pub retirement: Option<(RetirementReason, u32)>,
    pub points: u32,
}

impl ClassifiedEntry {
    pub fn is_finisher(&self) -> bool {
        self.retirement.is_none()
    }

    pub fn status_label(&self) -> &'static str {
        match self.retirement {
            None => "Finished",
            Some((reason, _)) => reason.label(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialOutcome {
    pub circuit: String,
    pub starting_weather: String,
    pub final_weather: String,
    pub classification: Vec<ClassifiedEntry>,
    pub metrics: RaceMetrics,
    pub events: Vec<RaceEvent>,
}

impl TrialOutcome {
    pub fn winner(&self) -> Option<&ClassifiedEntry> {
        self.classification.first().filter(|entry| entry.is_finisher())
    }
}

pub struct RaceSession<'a> {
    env: &'a RaceEnvironment,
    circuit: &'a Circuit,
    starting_weather: &'a WeatherCondition,
    weather: WeatherState<'a>,
    track: TrackState,
    safety_car: SafetyCar,
    competitors: Vec<Competitor>,
    lap: u32,
    metrics: RaceMetrics,
    log: RaceLog,
}

impl<'a> RaceSession<'a> {
    pub fn new(
        env: &'a RaceEnvironment,
        circuit: &'a Circuit,
        weather: &'a WeatherCondition,
        mut competitors: Vec<Competitor>,
        options: TrialOptions,
    ) -> Self {
        competitors.sort_by_key(|competitor| competitor.grid_position);
        for competitor in &mut competitors {
            competitor.position = competitor.grid_position;
        }
        Self {
            env,
            circuit,
            starting_weather: weather,
            weather: WeatherState::new(weather),
            track: TrackState::default(),
            safety_car: SafetyCar::Green,
            competitors,
            lap: 0,
            metrics: RaceMetrics {
                trials: 1,
                ..RaceMetrics::default()
            },
            log: RaceLog::new(options.record_events),
        }
    }

    pub fn lap(&self) -> u32 {
        self.lap
    }

    pub fn total_laps(&self) -> u32 {
        self.circuit.laps
    }

    pub fn is_finished(&self) -> bool {
        self.lap >= self.circuit.laps
    }

    pub fn competitors(&self) -> &[Competitor] {
        &self.competitors
    }

    pub fn competitors_mut(&mut self) -> &mut [Competitor] {
        &mut self.competitors
    }

    pub fn weather(&self) -> &'a WeatherCondition {
        self.weather.current()
    }

    pub fn track(&self) -> &TrackState {
        &self.track
    }

    pub fn safety_car(&self) -> SafetyCar {
        self.safety_car
    }

    pub fn set_safety_car(&mut self, safety_car: SafetyCar) {
        self.safety_car = safety_car;
    }

    pub fn metrics(&self) -> &RaceMetrics {
        &self.metrics
    }

    pub fn events(&self) -> &[RaceEvent] {
        self.log.events()
    }

    /// Simulates the next lap. Does nothing once the race distance is done.
    pub fn step_lap<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.is_finished() {
            return;
        }
        self.lap += 1;
        let lap = self.lap;
        let env = self.env;
        let config: &'a RaceModelConfig = &env.config;
        let catalog: &'a RaceCatalog = &env.catalog;
        let features = env.features;
        let total_laps = self.circuit.laps;

        let retirement_last_lap = self
            .competitors
            .iter()
            .any(|competitor| matches!(competitor.retirement(), Some((_, retired)) if retired + 1 == lap));
        if let Some(laps) = self.safety_car.evaluate_deployment(
            lap,
            total_laps,
            retirement_last_lap,
            self.circuit.track_type,
            config.safety_car(),
            rng,
        ) {
            self.metrics.safety_car_periods += 1;
            self.log.record(lap, || RaceEventKind::SafetyCarDeployed { laps });
        }
        let caution = self.safety_car.is_deployed();

        if let Some(previous) = self.weather.advance(catalog, self.circuit, features, rng) {
            let current = self.weather.current();
            self.metrics.weather_changes += 1;
            self.log.record(lap, || RaceEventKind::WeatherChange {
                from: previous.name.clone(),
                to: current.name.clone(),
            });
            if features.contains(SimFeatures::TRACK_EVOLUTION) {
                self.track.wash(current, config.track());
            }
        }
        if features.contains(SimFeatures::TRACK_EVOLUTION) {
            let running = self.competitors.iter().filter(|c| c.is_running()).count();
            self.track.evolve(running, config.track());
        }

        let weather = self.weather.current();
        let lap_ctx = LapContext {
            circuit: self.circuit,
            weather,
            weather_changed: self.weather.changed_this_lap(),
            rubber_bonus: self.track.grip_bonus(config.track()),
            features,
            config,
        };
        let incident_ctx = IncidentContext {
            weather,
            lap,
            features,
            config: config.incidents(),
        };
        let pit_ctx = PitContext {
            circuit: self.circuit,
            weather,
            lap,
            total_laps,
            caution,
            features,
            config: config.pit(),
        };
        let base_lap = base_lap_time(self.circuit, config.lap_time());

        for idx in running_order(&self.competitors) {
            let competitor = &mut self.competitors[idx];
            competitor.status = if caution {
                RaceStatus::SafetyCar
            } else {
                RaceStatus::Racing
            };

            let report = check_incidents(competitor, &incident_ctx, rng);
            if let Some(multiplier) = report.damage {
                self.metrics.minor_damage += 1;
                self.log.record(lap, || RaceEventKind::MinorDamage {
                    competitor: competitor.name().to_string(),
                    multiplier,
                });
            }
            if let Some(error) = report.driver_error {
                self.metrics.driver_errors += 1;
                if error != DriverError::Crash {
                    self.log.record(lap, || RaceEventKind::DriverError {
                        competitor: competitor.name().to_string(),
                        lost_s: error.time_lost(),
                    });
                }
            }
            if let Some(reason) = report.retirement {
                self.metrics.retirements += 1;
                self.log.record(lap, || RaceEventKind::Retirement {
                    competitor: competitor.name().to_string(),
                    from_position: competitor.position,
                    reason,
                });
                trace!(
                    target: "race_sim::race",
                    lap,
                    competitor = competitor.name(),
                    reason = reason.label(),
                    "race.retirement"
                );
                continue;
            }

            if let Some(reason) = decide_pit_stop(competitor, &pit_ctx) {
                let from_position = competitor.position;
                let stop = execute_pit_stop(competitor, reason, &pit_ctx, rng);
                self.metrics.pit_stops += 1;
                self.log.record(lap, || RaceEventKind::PitStop {
                    competitor: competitor.name().to_string(),
                    from_position,
                    duration_s: stop.duration_s,
                    compound: stop.compound,
                    reason,
                });
                if let Some(lost_s) = stop.error_s {
                    self.metrics.pit_errors += 1;
                    self.log.record(lap, || RaceEventKind::PitError {
                        competitor: competitor.name().to_string(),
                        lost_s,
                    });
                }
            }

            let outcome = compute_lap_time(competitor, &lap_ctx, rng);
            if outcome.graining_started {
                self.log.record(lap, || RaceEventKind::Graining {
                    competitor: competitor.name().to_string(),
                });
            }
            let lap_time = if caution {
                caution_lap_time(base_lap, config.safety_car(), rng)
            } else {
                outcome.time_s
            };
            competitor.race_time_s += lap_time;
            competitor.laps_completed += 1;
        }

        if caution {
            self.metrics.safety_car_laps += 1;
            if self.safety_car.complete_lap() {
                compress_field(&mut self.competitors, config.safety_car().restart_gap_s);
                self.log.record(lap, || RaceEventKind::SafetyCarIn);
            }
        }

        let order = running_order(&self.competitors);
        assign_positions(&mut self.competitors, &order);

        if !caution {
            let overtake_ctx = OvertakeContext {
                circuit: self.circuit,
                lap,
                total_laps,
                features,
                config: config.overtake(),
            };
            for pass in overtake_sweep(&mut self.competitors, &overtake_ctx, rng) {
                let attacker = &self.competitors[pass.attacker];
                let defender = &self.competitors[pass.defender];
                match pass.kind {
                    PassKind::Overtake => {
                        self.metrics.overtakes += 1;
                        self.log.record(lap, || RaceEventKind::Overtake {
                            attacker: attacker.name().to_string(),
                            defender: defender.name().to_string(),
                            position: pass.position,
                        });
                    }
                    PassKind::TeamOrder => {
                        self.metrics.team_orders += 1;
                        self.log.record(lap, || RaceEventKind::TeamOrder {
                            team: attacker.team_name().to_string(),
                            yielding: defender.name().to_string(),
                            promoted: attacker.name().to_string(),
                        });
                    }
                }
            }
        }

        self.metrics.laps += 1;
        trace!(
            target: "race_sim::race",
            lap,
            caution,
            weather = %self.weather.current().name,
            running = order.len(),
            "race.lap_completed"
        );
    }

    pub fn run_to_completion<R: Rng + ?Sized>(mut self, rng: &mut R) -> TrialOutcome {
        while !self.is_finished() {
            self.step_lap(rng);
        }
        self.finish()
    }

    /// Classifies the field as it stands.
    pub fn finish(mut self) -> TrialOutcome {
        self.competitors.sort_by(classification_order);
        let classification: Vec<ClassifiedEntry> = self
            .competitors
            .iter_mut()
            .enumerate()
            .map(|(slot, competitor)| {
                let position = slot + 1;
                competitor.position = position;
                let retirement = competitor.retirement();
                ClassifiedEntry {
                    position,
                    name: competitor.name().to_string(),
                    team: competitor.team_name().to_string(),
                    grid_position: competitor.grid_position,
                    strategy: competitor.strategy.name.clone(),
                    laps_completed: competitor.laps_completed,
                    race_time_s: competitor.race_time_s,
                    pit_stops: competitor.pit_stops,
                    retirement,
                    points: if retirement.is_none() {
                        points_for_position(position)
                    } else {
                        0
                    },
                }
            })
            .collect();

        debug!(
            target: "race_sim::race",
            circuit = %self.circuit.name,
            winner = classification.first().map(|entry| entry.name.as_str()).unwrap_or("-"),
            retirements = self.metrics.retirements,
            "trial.completed"
        );

        TrialOutcome {
            circuit: self.circuit.name.clone(),
            starting_weather: self.starting_weather.name.clone(),
            final_weather: self.weather.current().name.clone(),
            classification,
            metrics: self.metrics,
            events: self.log.into_events(),
        }
    }
}

/// Finishers first, then by laps completed (desc) and race time (asc).
pub fn classification_order(a: &Competitor, b: &Competitor) -> Ordering {
    a.is_retired()
        .cmp(&b.is_retired())
        .then(b.laps_completed.cmp(&a.laps_completed))
        .then(a.race_time_s.total_cmp(&b.race_time_s))
        .then(a.grid_position.cmp(&b.grid_position))
}

/// Simulates one full race without recording events.
pub fn run_trial<R: Rng + ?Sized>(
    env: &RaceEnvironment,
    circuit: &Circuit,
    weather: &WeatherCondition,
    competitors: Vec<Competitor>,
    rng: &mut R,
) -> TrialOutcome {
    run_trial_with(env, circuit, weather, competitors, TrialOptions::default(), rng)
}

pub fn run_trial_with<R: Rng + ?Sized>(
    env: &RaceEnvironment,
    circuit: &Circuit,
    weather: &WeatherCondition,
    competitors: Vec<Competitor>,
    options: TrialOptions,
    rng: &mut R,
) -> TrialOutcome {
    RaceSession::new(env, circuit, weather, competitors, options).run_to_completion(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::competitor::fixtures::competitor;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn field(size: usize) -> Vec<Competitor> {
        (1..=size)
            .map(|grid| competitor(&format!("Driver {grid}"), grid))
            .collect()
    }

    #[test]
    fn every_finisher_completes_race_distance() {
        let env = RaceEnvironment::builtin(SimFeatures::all());
        let circuit = env.catalog.circuit("Silverstone Circuit").unwrap();
        let weather = env.catalog.weather("Dry").unwrap();
        let outcome = run_trial(&env, circuit, weather, field(6), &mut ChaCha8Rng::seed_from_u64(1));

        assert_eq!(outcome.classification.len(), 6);
        for entry in outcome.classification.iter().filter(|e| e.is_finisher()) {
            assert_eq!(entry.laps_completed, circuit.laps);
        }
        let positions: Vec<usize> = outcome.classification.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(outcome.metrics.laps, circuit.laps as u64);
    }

    #[test]
    fn retired_entries_rank_behind_finishers() {
        let env = RaceEnvironment::builtin(SimFeatures::empty());
        let circuit = env.catalog.circuit("Hungaroring").unwrap();
        let weather = env.catalog.weather("Dry").unwrap();
        let mut session = RaceSession::new(&env, circuit, weather, field(4), TrialOptions::default());
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        session.step_lap(&mut rng);
        session.competitors_mut()[0].retire(RetirementReason::EngineFailure, 1);
        let outcome = session.run_to_completion(&mut rng);

        let last = outcome.classification.last().unwrap();
        assert_eq!(last.name, "Driver 1");
        assert_eq!(last.points, 0);
        assert_eq!(last.status_label(), "Engine Failure");
        let first_retired = outcome
            .classification
            .iter()
            .position(|e| !e.is_finisher())
            .unwrap();
        assert!(outcome.classification[first_retired..]
            .iter()
            .all(|e| !e.is_finisher()));
    }

    #[test]
    fn event_log_is_opt_in() {
        let env = RaceEnvironment::builtin(SimFeatures::all());
        let circuit = env.catalog.circuit("Circuit de Monaco").unwrap();
        let weather = env.catalog.weather("Heavy Rain").unwrap();
        let quiet = run_trial(&env, circuit, weather, field(8), &mut ChaCha8Rng::seed_from_u64(3));
        assert!(quiet.events.is_empty());

        let logged = run_trial_with(
            &env,
            circuit,
            weather,
            field(8),
            TrialOptions { record_events: true },
            &mut ChaCha8Rng::seed_from_u64(3),
        );
        // Medium starters have to switch to wets.
        assert!(logged
            .events
            .iter()
            .any(|event| matches!(event.kind, RaceEventKind::PitStop { .. })));
        assert_eq!(quiet.classification, logged.classification);
    }

    fn certain_safety_car_env() -> RaceEnvironment {
        let config = RaceModelConfig::from_json_str(
            r#"{
                "incidents": {
                    "mechanical_base_chance": 0.0,
                    "mechanical_deficit_scale": 0.0,
                    "damage_base_chance": 0.0,
                    "damage_deficit_scale": 0.0,
                    "damage_aggressive_bonus": 0.0,
                    "damage_high_wear_bonus": 0.0,
                    "error_base_chance": 0.0,
                    "error_variability_scale": 0.0,
                    "error_wear_scale": 0.0,
                    "error_aggressive_bonus": 0.0,
                    "weather_error_weight": 0.0
                },
                "safety_car": {
                    "deployment_chance": {
                        "permanent": 1.0,
                        "street_circuit": 1.0,
                        "technical": 1.0,
                        "mixed": 1.0,
                        "high_speed": 1.0
                    }
                }
            }"#,
        )
        .unwrap();
        RaceEnvironment::new(RaceCatalog::builtin(), Arc::new(config), SimFeatures::empty())
    }

    #[test]
    fn retirement_brings_out_the_safety_car_next_lap() {
        let env = certain_safety_car_env();
        let circuit = env.catalog.circuit("Silverstone Circuit").unwrap();
        let weather = env.catalog.weather("Dry").unwrap();
        let options = TrialOptions { record_events: true };
        let mut session = RaceSession::new(&env, circuit, weather, field(6), options);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..5 {
            session.step_lap(&mut rng);
        }
        assert_eq!(session.safety_car(), SafetyCar::Green);
        session.competitors_mut()[0].retire(RetirementReason::EngineFailure, 5);
        session.step_lap(&mut rng);

        assert!(matches!(session.safety_car(), SafetyCar::Caution { .. }));
        assert_eq!(session.metrics().safety_car_periods, 1);
        assert_eq!(session.metrics().safety_car_laps, 1);
        assert!(session
            .events()
            .iter()
            .any(|event| event.lap == 6 && matches!(event.kind, RaceEventKind::SafetyCarDeployed { .. })));
    }

    #[test]
    fn older_retirement_does_not_deploy_the_safety_car() {
        let env = certain_safety_car_env();
        let circuit = env.catalog.circuit("Silverstone Circuit").unwrap();
        let weather = env.catalog.weather("Dry").unwrap();
        let mut session = RaceSession::new(&env, circuit, weather, field(6), TrialOptions::default());
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..5 {
            session.step_lap(&mut rng);
        }
        session.competitors_mut()[0].retire(RetirementReason::EngineFailure, 4);
        session.step_lap(&mut rng);

        assert_eq!(session.safety_car(), SafetyCar::Green);
        assert_eq!(session.metrics().safety_car_periods, 0);
    }

    #[test]
    fn caution_laps_are_neutralised() {
        let env = RaceEnvironment::builtin(SimFeatures::empty());
        let circuit = env.catalog.circuit("Silverstone Circuit").unwrap();
        let weather = env.catalog.weather("Dry").unwrap();
        let mut session = RaceSession::new(&env, circuit, weather, field(3), TrialOptions::default());
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        session.step_lap(&mut rng);
        let before: Vec<f64> = session.competitors().iter().map(|c| c.race_time_s).collect();
        session.set_safety_car(SafetyCar::Caution { laps_remaining: 2 });
        session.step_lap(&mut rng);

        assert_eq!(session.safety_car(), SafetyCar::Caution { laps_remaining: 1 });
        assert_eq!(session.metrics().safety_car_laps, 1);
        let base = base_lap_time(circuit, env.config.lap_time());
        for (racer, start) in session.competitors().iter().zip(before) {
            if racer.is_running() {
                assert_eq!(racer.status, RaceStatus::SafetyCar);
                assert!(racer.race_time_s - start >= base * 1.4 - 0.5);
            }
        }
    }
}
