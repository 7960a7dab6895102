use std::fmt;

use serde::Serialize;

use crate::{catalog::TireCompound, competitor::RetirementReason, pit::PitReason};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RaceEventKind {
    Overtake {
        attacker: String,
        defender: String,
        position: usize,
    },
    PitStop {
        competitor: String,
        from_position: usize,
        duration_s: f64,
        compound: TireCompound,
        reason: PitReason,
    },
    PitError {
        competitor: String,
        lost_s: f64,
    },
    Retirement {
        competitor: String,
        from_position: usize,
        reason: RetirementReason,
    },
    MinorDamage {
        competitor: String,
        multiplier: f64,
    },
    DriverError {
        competitor: String,
        lost_s: f64,
    },
    Graining {
        competitor: String,
    },
    SafetyCarDeployed {
        laps: u32,
    },
    SafetyCarIn,
    WeatherChange {
        from: String,
        to: String,
    },
    TeamOrder {
        team: String,
        yielding: String,
        promoted: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceEvent {
    pub lap: u32,
    #[serde(flatten)]
    pub kind: RaceEventKind,
}

impl fmt::Display for RaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lap {:>3}: ", self.lap)?;
        match &self.kind {
            RaceEventKind::Overtake {
                attacker,
                defender,
                position,
            } => write!(f, "{attacker} passes {defender} for P{position}"),
            RaceEventKind::PitStop {
                competitor,
                from_position,
                duration_s,
                compound,
                reason,
            } => write!(
                f,
                "{competitor} pits from P{from_position} ({reason:?}), {duration_s:.2}s, fits {compound}"
            ),
            RaceEventKind::PitError { competitor, lost_s } => {
                write!(f, "{competitor} loses {lost_s:.2}s with a slow stop")
            }
            RaceEventKind::Retirement {
                competitor,
                from_position,
                reason,
            } => write!(f, "{competitor} retires from P{from_position}: {reason}"),
            RaceEventKind::MinorDamage {
                competitor,
                multiplier,
            } => write!(f, "{competitor} picks up damage (x{multiplier:.3} lap time)"),
            RaceEventKind::DriverError { competitor, lost_s } => {
                write!(f, "{competitor} makes a mistake, loses {lost_s:.2}s")
            }
            RaceEventKind::Graining { competitor } => {
                write!(f, "{competitor} reports graining")
            }
            RaceEventKind::SafetyCarDeployed { laps } => {
                write!(f, "Safety car deployed for {laps} laps")
            }
            RaceEventKind::SafetyCarIn => f.write_str("Safety car in this lap"),
            RaceEventKind::WeatherChange { from, to } => {
                write!(f, "Weather changes from {from} to {to}")
            }
            RaceEventKind::TeamOrder {
                team,
                yielding,
                promoted,
            } => write!(f, "{team} tells {yielding} to let {promoted} through"),
        }
    }
}

/// Append-only event list for one trial. Disabled logs drop every event so
/// Monte Carlo batches do not pay for string formatting.
#[derive(Debug, Clone, Default)]
pub struct RaceLog {
    enabled: bool,
    events: Vec<RaceEvent>,
}

impl RaceLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Builds the event lazily so disabled logs never allocate.
    pub fn record(&mut self, lap: u32, kind: impl FnOnce() -> RaceEventKind) {
        if self.enabled {
            self.events.push(RaceEvent { lap, kind: kind() });
        }
    }

    pub fn events(&self) -> &[RaceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RaceEvent> {
        self.events
    }
}
