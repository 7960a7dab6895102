use serde::Serialize;

/// Event counters for one trial, or summed over many.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RaceMetrics {
    pub trials: u64,
    pub laps: u64,
    pub safety_car_periods: u64,
    pub safety_car_laps: u64,
    pub weather_changes: u64,
    pub pit_stops: u64,
    pub pit_errors: u64,
    pub overtakes: u64,
    pub team_orders: u64,
    pub retirements: u64,
    pub driver_errors: u64,
    pub minor_damage: u64,
}

/// Per-trial averages of [`RaceMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricsAverages {
    pub safety_car_periods: f64,
    pub weather_changes: f64,
    pub pit_stops: f64,
    pub overtakes: f64,
    pub team_orders: f64,
    pub retirements: f64,
}

impl RaceMetrics {
    pub fn merge(&mut self, other: &RaceMetrics) {
        self.trials += other.trials;
        self.laps += other.laps;
        self.safety_car_periods += other.safety_car_periods;
        self.safety_car_laps += other.safety_car_laps;
        self.weather_changes += other.weather_changes;
        self.pit_stops += other.pit_stops;
        self.pit_errors += other.pit_errors;
        self.overtakes += other.overtakes;
        self.team_orders += other.team_orders;
        self.retirements += other.retirements;
        self.driver_errors += other.driver_errors;
        self.minor_damage += other.minor_damage;
    }

    pub fn averages(&self) -> MetricsAverages {
        if self.trials == 0 {
            return MetricsAverages::default();
        }
        let per_trial = |count: u64| count as f64 / self.trials as f64;
        MetricsAverages {
            safety_car_periods: per_trial(self.safety_car_periods),
            weather_changes: per_trial(self.weather_changes),
            pit_stops: per_trial(self.pit_stops),
            overtakes: per_trial(self.overtakes),
            team_orders: per_trial(self.team_orders),
            retirements: per_trial(self.retirements),
        }
    }
}
