use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Optional model behaviours layered over the basic race engine.
    ///
    /// The basic model runs with no flags; the enhanced model enables all of
    /// them. Individual flags can be toggled to isolate a behaviour.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SimFeatures: u32 {
        /// Markov weather changes between laps.
        const WEATHER_TRANSITIONS = 1 << 0;
        /// Compound-specific pace and wear factors plus weather jitter.
        const COMPOUND_MODEL = 1 << 1;
        /// Strategy adaptability grip bonus on laps where the weather changed.
        const WEATHER_ADAPTABILITY = 1 << 2;
        const GRAINING = 1 << 3;
        /// Pit-stop duration jitter and pit-lane errors.
        const PIT_VARIANCE = 1 << 4;
        const MINOR_DAMAGE = 1 << 5;
        /// Leader protection, tire delta, track type, defender consistency.
        const OVERTAKE_MODIFIERS = 1 << 6;
        /// Rubber build-up and rain wash-off.
        const TRACK_EVOLUTION = 1 << 7;
        const TEAM_ORDERS = 1 << 8;
        /// Extra failure, error and overtaking risk for aggressive strategies.
        const STRATEGY_RISK = 1 << 9;
    }
}

impl SimFeatures {
    pub fn from_enhanced(enhanced: bool) -> Self {
        if enhanced {
            SimFeatures::all()
        } else {
            SimFeatures::empty()
        }
    }

    pub fn is_enhanced(&self) -> bool {
        self.is_all()
    }
}

impl Default for SimFeatures {
    fn default() -> Self {
        SimFeatures::all()
    }
}
