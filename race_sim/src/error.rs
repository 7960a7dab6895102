//! Error types surfaced at the simulation boundary.
//!
//! Nothing inside a running trial returns an error: retirements, damage and
//! driver mistakes are race outcomes recorded on the competitor. These types
//! cover bad input detected before the first lap is simulated.

use thiserror::Error;

/// Rejected user selections (circuit, weather, trial count, field).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("circuit index {index} is out of range (1-{available})")]
    CircuitIndexOutOfRange { index: usize, available: usize },
    #[error("unknown circuit '{0}'")]
    UnknownCircuit(String),
    #[error("circuit selector '{selector}' matches several circuits: {candidates:?}")]
    AmbiguousCircuit {
        selector: String,
        candidates: Vec<String>,
    },
    #[error("unknown weather condition '{0}'")]
    UnknownWeather(String),
    #[error("trial count must be between 1 and {max}, got {requested}")]
    TrialCount { requested: u64, max: u32 },
    /// Two scenarios naming the same condition would replay identical trials.
    #[error("weather condition '{0}' is listed in more than one scenario")]
    DuplicateScenario(String),
    #[error("at least one weather scenario with a positive weight is required")]
    NoScenarios,
    #[error("the field needs at least two competitors, got {0}")]
    FieldTooSmall(usize),
    #[error("duplicate competitor name '{0}'")]
    DuplicateCompetitor(String),
}

/// Incomplete or inconsistent roster data for a single competitor.
///
/// Assembly keeps going past these: the affected driver is left out of the
/// field and the issue is reported alongside the competitors that made it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("driver '{driver}' references team '{team}' with no team record")]
    MissingTeam { driver: String, team: String },
    #[error("driver '{driver}' references team '{team}' with no car record")]
    MissingCar { driver: String, team: String },
    #[error("driver '{driver}' is missing attribute '{field}'")]
    MissingAttribute { driver: String, field: &'static str },
    #[error("driver '{driver}' attribute '{field}' = {value} is out of range")]
    AttributeOutOfRange {
        driver: String,
        field: &'static str,
        value: f64,
    },
    #[error("driver record without a name")]
    UnnamedDriver,
    #[error("driver '{driver}' appears more than once")]
    DuplicateDriver { driver: String },
}
