use rand::Rng;
use serde::Serialize;

use crate::{catalog::TrackType, competitor::Competitor, config::SafetyCarConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SafetyCar {
    #[default]
    Green,
    Caution {
        laps_remaining: u32,
    },
}

impl SafetyCar {
    pub fn is_deployed(&self) -> bool {
        matches!(self, SafetyCar::Caution { .. })
    }

    /// Lap-start check. Deploys only under green, inside the eligible part
    /// of the race, and when a car stopped on the previous lap. Returns the
    /// deployment length when the car comes out.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_deployment<R: Rng + ?Sized>(
        &mut self,
        lap: u32,
        total_laps: u32,
        retirement_last_lap: bool,
        track_type: TrackType,
        config: &SafetyCarConfig,
        rng: &mut R,
    ) -> Option<u32> {
        if self.is_deployed() || !retirement_last_lap {
            return None;
        }
        let eligible =
            lap > config.opening_laps && lap < total_laps.saturating_sub(config.closing_laps);
        if !eligible || rng.gen::<f64>() >= config.deployment_chance_for(track_type) {
            return None;
        }
        let max_laps = config.max_laps.max(config.min_laps).max(1);
        let laps = rng.gen_range(config.min_laps.max(1)..=max_laps);
        *self = SafetyCar::Caution {
            laps_remaining: laps,
        };
        Some(laps)
    }

    /// Lap-end countdown. Returns true when the caution ended on this lap.
    pub fn complete_lap(&mut self) -> bool {
        match self {
            SafetyCar::Green => false,
            SafetyCar::Caution { laps_remaining } => {
                *laps_remaining = laps_remaining.saturating_sub(1);
                if *laps_remaining == 0 {
                    *self = SafetyCar::Green;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Neutralised lap time behind the safety car.
pub fn caution_lap_time<R: Rng + ?Sized>(base_lap: f64, config: &SafetyCarConfig, rng: &mut R) -> f64 {
    let jitter = if config.pace_jitter_s > 0.0 {
        rng.gen_range(-config.pace_jitter_s..=config.pace_jitter_s)
    } else {
        0.0
    };
    base_lap * config.pace_multiplier + jitter
}

/// Bunches running cars behind the leader at fixed gaps, keeping their order.
pub fn compress_field(competitors: &mut [Competitor], restart_gap_s: f64) {
    let mut running: Vec<usize> = (0..competitors.len())
        .filter(|&idx| competitors[idx].is_running())
        .collect();
    running.sort_by(|&a, &b| {
        competitors[a]
            .race_time_s
            .total_cmp(&competitors[b].race_time_s)
    });
    let Some(&leader) = running.first() else {
        return;
    };
    let leader_time = competitors[leader].race_time_s;
    for (slot, &idx) in running.iter().enumerate() {
        competitors[idx].race_time_s = leader_time + slot as f64 * restart_gap_s;
    }
}
