use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::catalog::{AcumenKind, StrategyArchetype, TireCompound};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub name: String,
    pub skill: f64,
    pub consistency: f64,
    pub tire_management: f64,
    pub wet_weather_ability: f64,
    pub overtaking_skill: f64,
    pub defending_skill: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    pub name: String,
    pub pit_stop_speed: f64,
    pub strategy_acumen: f64,
    pub aggressive_acumen: f64,
    pub balanced_acumen: f64,
    pub conservative_acumen: f64,
}

impl TeamProfile {
    pub fn acumen_for(&self, kind: AcumenKind) -> f64 {
        match kind {
            AcumenKind::Aggressive => self.aggressive_acumen,
            AcumenKind::Balanced => self.balanced_acumen,
            AcumenKind::Conservative => self.conservative_acumen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarProfile {
    pub overall_score: f64,
    pub engine_hp: f64,
    pub engine_reliability: f64,
    pub downforce: f64,
    pub drag: f64,
    pub brake_stopping_power: f64,
    pub brake_durability: f64,
    pub tire_wear_resistance: f64,
}

/// Everything about an entry that stays fixed for a whole Monte Carlo batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorTemplate {
    pub driver: DriverProfile,
    pub team: TeamProfile,
    pub car: CarProfile,
}

impl CompetitorTemplate {
    pub fn name(&self) -> &str {
        &self.driver.name
    }

    pub fn team_name(&self) -> &str {
        &self.team.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetirementReason {
    EngineFailure,
    /// Brake or chassis failure.
    BrakeFailure,
    DriverError,
}

impl RetirementReason {
    pub const fn label(&self) -> &'static str {
        match self {
            RetirementReason::EngineFailure => "Engine Failure",
            RetirementReason::BrakeFailure => "Brakes/Chassis Failure",
            RetirementReason::DriverError => "Driver Error",
        }
    }
}

impl fmt::Display for RetirementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the competitor did on the lap just simulated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RaceStatus {
    Racing,
    Pitting,
    SafetyCar,
    /// Terminal. `lap` is the lap during which the car stopped.
    Retired { reason: RetirementReason, lap: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TireState {
    pub compound: TireCompound,
    wear: f64,
    pub laps_on_tires: u32,
    pub graining: bool,
}

impl TireState {
    pub fn fresh(compound: TireCompound) -> Self {
        Self {
            compound,
            wear: 0.0,
            laps_on_tires: 0,
            graining: false,
        }
    }

    pub fn wear(&self) -> f64 {
        self.wear
    }

    /// Sets wear, clamped into `[0, 1]`.
    pub fn set_wear(&mut self, wear: f64) {
        self.wear = if wear.is_nan() { 0.0 } else { wear.clamp(0.0, 1.0) };
    }

    pub fn add_wear(&mut self, delta: f64) {
        self.set_wear(self.wear + delta);
    }

    pub fn refit(&mut self, compound: TireCompound) {
        *self = TireState::fresh(compound);
    }
}

/// Mutable per-trial race state wrapped around a shared template.
#[derive(Debug, Clone)]
pub struct Competitor {
    pub profile: Arc<CompetitorTemplate>,
    pub strategy: StrategyArchetype,
    pub effective_acumen: f64,
    pub grid_position: usize,
    pub position: usize,
    pub race_time_s: f64,
    pub laps_completed: u32,
    pub pit_stops: u32,
    pub tires: TireState,
    pub damage_multiplier: Option<f64>,
    pub status: RaceStatus,
}

impl Competitor {
    pub fn new(
        profile: Arc<CompetitorTemplate>,
        strategy: StrategyArchetype,
        grid_position: usize,
        starting_compound: TireCompound,
    ) -> Self {
        let effective_acumen = profile.team.acumen_for(strategy.applies_acumen);
        Self {
            profile,
            strategy,
            effective_acumen,
            grid_position,
            position: grid_position,
            race_time_s: 0.0,
            laps_completed: 0,
            pit_stops: 0,
            tires: TireState::fresh(starting_compound),
            damage_multiplier: None,
            status: RaceStatus::Racing,
        }
    }

    pub fn name(&self) -> &str {
        self.profile.name()
    }

    pub fn team_name(&self) -> &str {
        self.profile.team_name()
    }

    pub fn is_retired(&self) -> bool {
        matches!(self.status, RaceStatus::Retired { .. })
    }

    pub fn is_running(&self) -> bool {
        !self.is_retired()
    }

    pub fn retirement(&self) -> Option<(RetirementReason, u32)> {
        match self.status {
            RaceStatus::Retired { reason, lap } => Some((reason, lap)),
            _ => None,
        }
    }

    /// No-op on an already retired competitor.
    pub fn retire(&mut self, reason: RetirementReason, lap: u32) {
        if self.is_running() {
            self.status = RaceStatus::Retired { reason, lap };
        }
    }

    pub fn damage_factor(&self) -> f64 {
        self.damage_multiplier.unwrap_or(1.0)
    }

    pub fn is_aggressive(&self) -> bool {
        self.strategy.is_aggressive()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn wear_is_clamped() {
        let mut tires = TireState::fresh(TireCompound::Soft);
        tires.add_wear(1.7);
        assert_eq!(tires.wear(), 1.0);
        tires.add_wear(-3.0);
        assert_eq!(tires.wear(), 0.0);
        tires.set_wear(f64::NAN);
        assert_eq!(tires.wear(), 0.0);
    }

    #[test]
    fn effective_acumen_follows_strategy_kind() {
        let racer = Competitor::new(
            Arc::new(template("A", "T")),
            strategy("Push", AcumenKind::Aggressive, 2),
            1,
            TireCompound::Soft,
        );
        assert_eq!(racer.effective_acumen, 0.7);
        assert!(racer.is_aggressive());
    }

    #[test]
    fn retirement_is_terminal() {
        let mut racer = competitor("A", 3);
        racer.retire(RetirementReason::EngineFailure, 12);
        racer.retire(RetirementReason::DriverError, 20);
        assert_eq!(
            racer.retirement(),
            Some((RetirementReason::EngineFailure, 12))
        );
        assert!(!racer.is_running());
    }
}
