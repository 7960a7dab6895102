//! Driver, team and car records joined into competitor templates.
//!
//! Record field names follow the tabular source layout so the same structs
//! deserialize from JSON and CSV rows alike.

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    competitor::{CarProfile, CompetitorTemplate, DriverProfile, TeamProfile},
    error::ConfigurationError,
};

pub const BUILTIN_ROSTER: &str = include_str!("data/roster.json");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverRecord {
    #[serde(default)]
    pub driver_name: String,
    #[serde(default)]
    pub team_name: String,
    pub skill: Option<f64>,
    pub consistency: Option<f64>,
    pub tire_management: Option<f64>,
    pub wet_weather_ability: Option<f64>,
    pub overtaking_skill: Option<f64>,
    pub defending_skill: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamRecord {
    #[serde(default)]
    pub team_name: String,
    pub team_pit_stop_speed: Option<f64>,
    pub team_strategy_acumen: Option<f64>,
    pub strategy_aggressive_acumen: Option<f64>,
    pub strategy_balanced_acumen: Option<f64>,
    pub strategy_conservative_acumen: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarRecord {
    #[serde(rename = "Team Name", default)]
    pub team_name: String,
    #[serde(rename = "Overall_Car_Score")]
    pub overall_score: Option<f64>,
    #[serde(rename = "Engine_HP_Final")]
    pub engine_hp: Option<f64>,
    #[serde(rename = "Engine_REL_Final")]
    pub engine_reliability: Option<f64>,
    #[serde(rename = "ChassisAero_DF_Final")]
    pub downforce: Option<f64>,
    #[serde(rename = "ChassisAero_DR_Final")]
    pub drag: Option<f64>,
    #[serde(rename = "Brakes_SP_Final")]
    pub brake_stopping_power: Option<f64>,
    #[serde(rename = "Brakes_DUR_Final")]
    pub brake_durability: Option<f64>,
    #[serde(rename = "Tires_WR_Final")]
    pub tire_wear_resistance: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterSource {
    pub drivers: Vec<DriverRecord>,
    pub teams: Vec<TeamRecord>,
    pub cars: Vec<CarRecord>,
}

/// Competitors that passed validation plus the reasons others were dropped.
#[derive(Debug, Clone, Default)]
pub struct RosterBuild {
    pub templates: Vec<Arc<CompetitorTemplate>>,
    pub excluded: Vec<ConfigurationError>,
}

impl RosterSource {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_ROSTER).expect("builtin roster should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Joins drivers to their team and car by team name. Incomplete entries
    /// are excluded and logged, never fatal.
    pub fn assemble(&self) -> RosterBuild {
        let mut build = RosterBuild::default();
        let mut seen = HashSet::new();

        for record in &self.drivers {
            match self.assemble_driver(record) {
                Ok(template) => {
                    if seen.insert(template.driver.name.clone()) {
                        build.templates.push(Arc::new(template));
                    } else {
                        build.excluded.push(ConfigurationError::DuplicateDriver {
                            driver: template.driver.name,
                        });
                    }
                }
                Err(err) => build.excluded.push(err),
            }
        }

        for issue in &build.excluded {
            warn!(target: "race_sim::roster", error = %issue, "roster.competitor_excluded");
        }
        build
    }

    fn assemble_driver(&self, record: &DriverRecord) -> Result<CompetitorTemplate, ConfigurationError> {
        let name = record.driver_name.trim();
        if name.is_empty() {
            return Err(ConfigurationError::UnnamedDriver);
        }
        let team_name = record.team_name.trim();
        let team = self
            .teams
            .iter()
            .find(|team| team.team_name.trim() == team_name)
            .filter(|_| !team_name.is_empty())
            .ok_or_else(|| ConfigurationError::MissingTeam {
                driver: name.to_string(),
                team: team_name.to_string(),
            })?;
        let car = self
            .cars
            .iter()
            .find(|car| car.team_name.trim() == team_name)
            .ok_or_else(|| ConfigurationError::MissingCar {
                driver: name.to_string(),
                team: team_name.to_string(),
            })?;

        let unit = |field: &'static str, value: Option<f64>| unit_attr(name, field, value);
        let magnitude = |field: &'static str, value: Option<f64>| magnitude_attr(name, field, value);

        let driver = DriverProfile {
            name: name.to_string(),
            skill: unit("skill", record.skill)?,
            consistency: unit("consistency", record.consistency)?,
            tire_management: unit("tire_management", record.tire_management)?,
            wet_weather_ability: unit("wet_weather_ability", record.wet_weather_ability)?,
            overtaking_skill: unit("overtaking_skill", record.overtaking_skill)?,
            defending_skill: unit("defending_skill", record.defending_skill)?,
        };

        let base_acumen = unit("team_strategy_acumen", team.team_strategy_acumen)?;
        let team = TeamProfile {
            name: team_name.to_string(),
            pit_stop_speed: unit("team_pit_stop_speed", team.team_pit_stop_speed)?,
            strategy_acumen: base_acumen,
            aggressive_acumen: unit(
                "strategy_aggressive_acumen",
                team.strategy_aggressive_acumen.or(Some(base_acumen)),
            )?,
            balanced_acumen: unit(
                "strategy_balanced_acumen",
                team.strategy_balanced_acumen.or(Some(base_acumen)),
            )?,
            conservative_acumen: unit(
                "strategy_conservative_acumen",
                team.strategy_conservative_acumen.or(Some(base_acumen)),
            )?,
        };

        let car = CarProfile {
            overall_score: magnitude("Overall_Car_Score", car.overall_score)?,
            engine_hp: magnitude("Engine_HP_Final", car.engine_hp)?,
            engine_reliability: unit("Engine_REL_Final", car.engine_reliability)?,
            downforce: magnitude("ChassisAero_DF_Final", car.downforce)?,
            drag: magnitude("ChassisAero_DR_Final", car.drag)?,
            brake_stopping_power: magnitude("Brakes_SP_Final", car.brake_stopping_power)?,
            brake_durability: unit("Brakes_DUR_Final", car.brake_durability)?,
            tire_wear_resistance: unit("Tires_WR_Final", car.tire_wear_resistance)?,
        };

        Ok(CompetitorTemplate { driver, team, car })
    }
}

fn unit_attr(driver: &str, field: &'static str, value: Option<f64>) -> Result<f64, ConfigurationError> {
    let value = value.ok_or_else(|| ConfigurationError::MissingAttribute {
        driver: driver.to_string(),
        field,
    })?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigurationError::AttributeOutOfRange {
            driver: driver.to_string(),
            field,
            value,
        })
    }
}

fn magnitude_attr(
    driver: &str,
    field: &'static str,
    value: Option<f64>,
) -> Result<f64, ConfigurationError> {
    let value = value.ok_or_else(|| ConfigurationError::MissingAttribute {
        driver: driver.to_string(),
        field,
    })?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigurationError::AttributeOutOfRange {
            driver: driver.to_string(),
            field,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_roster_is_complete() {
        let build = RosterSource::builtin().assemble();
        assert_eq!(build.templates.len(), 20);
        assert!(build.excluded.is_empty(), "{:?}", build.excluded);
    }

    #[test]
    fn incomplete_driver_is_excluded_not_fatal() {
        let mut source = RosterSource::builtin();
        source.drivers[0].skill = None;
        source.drivers[1].team_name = "Phantom Racing".to_string();
        source.drivers[2].consistency = Some(1.4);

        let build = source.assemble();
        assert_eq!(build.templates.len(), 17);
        assert_eq!(build.excluded.len(), 3);
        assert!(matches!(
            build.excluded[0],
            ConfigurationError::MissingAttribute { field: "skill", .. }
        ));
        assert!(matches!(
            build.excluded[1],
            ConfigurationError::MissingTeam { .. }
        ));
        assert!(matches!(
            build.excluded[2],
            ConfigurationError::AttributeOutOfRange {
                field: "consistency",
                ..
            }
        ));
    }

    #[test]
    fn team_without_car_is_reported() {
        let mut source = RosterSource::builtin();
        let team = source.drivers[0].team_name.clone();
        source.cars.retain(|car| car.team_name != team);
        let build = source.assemble();
        assert_eq!(build.templates.len(), 18);
        assert!(build
            .excluded
            .iter()
            .all(|err| matches!(err, ConfigurationError::MissingCar { .. })));
    }

    #[test]
    fn specific_acumen_falls_back_to_team_base() {
        let mut source = RosterSource::builtin();
        source.teams[0].strategy_aggressive_acumen = None;
        let base = source.teams[0].team_strategy_acumen.unwrap();
        let build = source.assemble();
        assert_eq!(build.templates[0].team.aggressive_acumen, base);
    }

    #[test]
    fn duplicate_driver_names_keep_first_entry() {
        let mut source = RosterSource::builtin();
        let copy = source.drivers[0].clone();
        source.drivers.push(copy);
        let build = source.assemble();
        assert_eq!(build.templates.len(), 20);
        assert!(matches!(
            build.excluded.as_slice(),
            [ConfigurationError::DuplicateDriver { .. }]
        ));
    }
}
