//! Monte Carlo motorsport race simulator.
//!
//! Simulates a race lap by lap for a field of competitors: lap times, tire
//! wear and pit stops, weather changes, incidents, the safety car and
//! overtaking. [`run_monte_carlo`] repeats the race thousands of times
//! across weather scenarios and aggregates finishing statistics per
//! competitor. Every trial is driven by a seeded RNG, so a master seed
//! reproduces the whole batch.

pub mod aggregate;
pub mod catalog;
pub mod competitor;
pub mod config;
pub mod error;
pub mod features;
pub mod hashing;
pub mod incidents;
pub mod lap_time;
pub mod metrics;
pub mod monte_carlo;
pub mod overtake;
pub mod pit;
pub mod race;
pub mod race_log;
pub mod roster;
pub mod safety_car;
pub mod weather;

pub use aggregate::{
    points_for_position, projected_classification, CompetitorSummary, ProjectedEntry,
    ResultsAggregator,
};
pub use catalog::{
    load_race_catalog_from_env, AcumenKind, CatalogError, Circuit, CompoundPreference, RaceCatalog,
    StrategyArchetype, TireCompound, TireFamily, TrackType, WeatherCondition,
    WeatherTransitionTable,
};
pub use competitor::{
    CarProfile, Competitor, CompetitorTemplate, DriverProfile, RaceStatus, RetirementReason,
    TeamProfile, TireState,
};
pub use config::{
    load_race_model_config_from_env, RaceModelConfig, RaceModelConfigError,
    RaceModelConfigMetadata,
};
pub use error::{ConfigurationError, SelectionError};
pub use features::SimFeatures;
pub use metrics::{MetricsAverages, RaceMetrics};
pub use monte_carlo::{
    partition_trials, run_monte_carlo, setup_trial, stream_monte_carlo, MonteCarloPlan,
    MonteCarloReport, ScenarioAllocation, TrialRecord, WeatherScenario,
};
pub use race::{
    run_trial, run_trial_with, ClassifiedEntry, RaceEnvironment, RaceSession, TrialOptions,
    TrialOutcome,
};
pub use race_log::{RaceEvent, RaceEventKind};
pub use roster::{CarRecord, DriverRecord, RosterBuild, RosterSource, TeamRecord};
pub use safety_car::SafetyCar;
