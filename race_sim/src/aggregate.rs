//! Championship points and Monte Carlo result aggregation.
//!
//! Tallies are plain integer counters, so merging partial aggregators from
//! different worker threads gives the same totals in any order.

use std::{cmp::Ordering, collections::BTreeMap};

use serde::Serialize;

use crate::{metrics::RaceMetrics, race::TrialOutcome};

pub const POINTS_TABLE: [u32; 10] = [25, 18, 15, 12, 10, 8, 6, 4, 2, 1];

/// Longest projected classification reported.
pub const PROJECTED_DEPTH: usize = 20;

/// Points for a classified finishing position; 0 outside the top ten.
pub fn points_for_position(position: usize) -> u32 {
    position
        .checked_sub(1)
        .and_then(|idx| POINTS_TABLE.get(idx))
        .copied()
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CompetitorTally {
    team: String,
    starts: u64,
    total_points: u64,
    dnfs: u64,
    /// Index `p - 1` counts finishes in position `p`; the last slot counts DNFs.
    histogram: Vec<u64>,
}

impl CompetitorTally {
    fn merge(&mut self, other: &CompetitorTally) {
        if self.team.is_empty() {
            self.team = other.team.clone();
        }
        self.starts += other.starts;
        self.total_points += other.total_points;
        self.dnfs += other.dnfs;
        if self.histogram.len() < other.histogram.len() {
            self.histogram.resize(other.histogram.len(), 0);
        }
        for (slot, count) in other.histogram.iter().enumerate() {
            self.histogram[slot] += count;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsAggregator {
    field_size: usize,
    trials: u64,
    tallies: BTreeMap<String, CompetitorTally>,
    metrics: RaceMetrics,
}

impl ResultsAggregator {
    pub fn new(field_size: usize) -> Self {
        Self {
            field_size,
            trials: 0,
            tallies: BTreeMap::new(),
            metrics: RaceMetrics::default(),
        }
    }

    pub fn field_size(&self) -> usize {
        self.field_size
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    pub fn metrics(&self) -> &RaceMetrics {
        &self.metrics
    }

    pub fn record(&mut self, outcome: &TrialOutcome) {
        self.trials += 1;
        self.metrics.merge(&outcome.metrics);
        let dnf_slot = self.field_size;
        for entry in &outcome.classification {
            let tally = self.tallies.entry(entry.name.clone()).or_default();
            if tally.team.is_empty() {
                tally.team = entry.team.clone();
            }
            if tally.histogram.len() < dnf_slot + 1 {
                tally.histogram.resize(dnf_slot + 1, 0);
            }
            tally.starts += 1;
            tally.total_points += entry.points as u64;
            let slot = if entry.is_finisher() {
                entry.position.clamp(1, dnf_slot.max(1)) - 1
            } else {
                tally.dnfs += 1;
                dnf_slot
            };
            tally.histogram[slot] += 1;
        }
    }

    /// Adds another aggregator's counts into this one.
    pub fn merge(&mut self, other: &ResultsAggregator) {
        self.field_size = self.field_size.max(other.field_size);
        self.trials += other.trials;
        self.metrics.merge(&other.metrics);
        for (name, tally) in &other.tallies {
            self.tallies.entry(name.clone()).or_default().merge(tally);
        }
    }

    pub fn merged(mut self, other: ResultsAggregator) -> Self {
        self.merge(&other);
        self
    }

    /// Per-competitor statistics in reporting order.
    pub fn summarize(&self) -> Vec<CompetitorSummary> {
        let field = self.field_size;
        let mut summaries: Vec<CompetitorSummary> = self
            .tallies
            .iter()
            .map(|(name, tally)| {
                let starts = tally.starts.max(1) as f64;
                let pct = |count: u64| count as f64 / starts * 100.0;
                let mut histogram = tally.histogram.clone();
                histogram.resize(field + 1, 0);

                let (modal_index, modal_count) = histogram
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((field, 0), |best, (idx, count)| {
                        if count > best.1 {
                            (idx, count)
                        } else {
                            best
                        }
                    });

                CompetitorSummary {
                    name: name.clone(),
                    team: tally.team.clone(),
                    starts: tally.starts,
                    modal_position: modal_index + 1,
                    modal_is_dnf: modal_index == field,
                    modal_count,
                    average_points: tally.total_points as f64 / starts,
                    dnf_rate_pct: pct(tally.dnfs),
                    position_probabilities_pct: histogram[..field].iter().map(|&c| pct(c)).collect(),
                }
            })
            .collect();
        summaries.sort_by(summary_order);
        summaries
    }
}

fn summary_order(a: &CompetitorSummary, b: &CompetitorSummary) -> Ordering {
    a.modal_position
        .cmp(&b.modal_position)
        .then(b.modal_count.cmp(&a.modal_count))
        .then(b.average_points.total_cmp(&a.average_points))
        .then_with(|| a.name.cmp(&b.name))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitorSummary {
    pub name: String,
    pub team: String,
    pub starts: u64,
    /// Most frequent result; `field + 1` when that is a DNF.
    pub modal_position: usize,
    pub modal_is_dnf: bool,
    pub modal_count: u64,
    pub average_points: f64,
    pub dnf_rate_pct: f64,
    /// Chance of finishing P1..P{field}, in percent.
    pub position_probabilities_pct: Vec<f64>,
}

impl CompetitorSummary {
    pub fn modal_label(&self) -> String {
        if self.modal_is_dnf {
            "DNF".to_string()
        } else {
            format!("P{}", self.modal_position)
        }
    }

    pub fn position_probability(&self, position: usize) -> f64 {
        position
            .checked_sub(1)
            .and_then(|idx| self.position_probabilities_pct.get(idx))
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedEntry {
    pub position: usize,
    pub name: String,
    pub team: String,
    pub points: u32,
}

/// Reads the sorted summary as a race result: rank `n` takes position `n`
/// and its points.
pub fn projected_classification(summaries: &[CompetitorSummary]) -> Vec<ProjectedEntry> {
    summaries
        .iter()
        .take(PROJECTED_DEPTH)
        .enumerate()
        .map(|(idx, summary)| ProjectedEntry {
            position: idx + 1,
            name: summary.name.clone(),
            team: summary.team.clone(),
            points: points_for_position(idx + 1),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        competitor::RetirementReason,
        race::{ClassifiedEntry, TrialOutcome},
    };

    fn entry(position: usize, name: &str, retired: bool) -> ClassifiedEntry {
        ClassifiedEntry {
            position,
            name: name.to_string(),
            team: format!("{name} Team"),
            grid_position: position,
            strategy: "Balanced".to_string(),
            laps_completed: if retired { 10 } else { 50 },
            race_time_s: 5000.0 + position as f64,
            pit_stops: 1,
            retirement: retired.then_some((RetirementReason::EngineFailure, 10)),
            points: if retired { 0 } else { points_for_position(position) },
        }
    }

    fn outcome(order: &[(&str, bool)]) -> TrialOutcome {
        TrialOutcome {
            circuit: "Test".to_string(),
            starting_weather: "Dry".to_string(),
            final_weather: "Dry".to_string(),
            classification: order
                .iter()
                .enumerate()
                .map(|(idx, (name, retired))| entry(idx + 1, name, *retired))
                .collect(),
            metrics: RaceMetrics {
                trials: 1,
                ..RaceMetrics::default()
            },
            events: Vec::new(),
        }
    }

    #[test]
    fn points_table() {
        let points: Vec<u32> = (0..=11).map(points_for_position).collect();
        insta::assert_debug_snapshot!(points, @r###"
        [
            0,
            25,
            18,
            15,
            12,
            10,
            8,
            6,
            4,
            2,
            1,
            0,
        ]
        "###);
    }

    #[test]
    fn summary_reports_mode_points_and_dnf_rate() {
        let mut agg = ResultsAggregator::new(3);
        agg.record(&outcome(&[("A", false), ("B", false), ("C", true)]));
        agg.record(&outcome(&[("A", false), ("C", false), ("B", false)]));
        agg.record(&outcome(&[("B", false), ("A", false), ("C", true)]));
        agg.record(&outcome(&[("A", false), ("B", false), ("C", false)]));

        let summary = agg.summarize();
        let names: Vec<&str> = summary.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        let a = &summary[0];
        assert_eq!((a.modal_position, a.modal_count), (1, 3));
        assert_eq!(a.average_points, (25.0 * 3.0 + 18.0) / 4.0);
        assert_eq!(a.position_probability(1), 75.0);

        let c = &summary[2];
        assert_eq!(c.dnf_rate_pct, 50.0);
        assert!(c.modal_is_dnf);
        assert_eq!(c.modal_label(), "DNF");
        let total: f64 = c.position_probabilities_pct.iter().sum::<f64>() + c.dnf_rate_pct;
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn mode_ties_go_to_the_better_position() {
        let mut agg = ResultsAggregator::new(2);
        agg.record(&outcome(&[("A", false), ("B", false)]));
        agg.record(&outcome(&[("B", false), ("A", false)]));
        let summary = agg.summarize();
        assert!(summary.iter().all(|s| s.modal_position == 1));
        assert_eq!(summary[0].name, "A");
    }

    #[test]
    fn merge_order_does_not_matter() {
        let trials = [
            outcome(&[("A", false), ("B", false), ("C", true)]),
            outcome(&[("C", false), ("A", false), ("B", false)]),
            outcome(&[("B", false), ("C", false), ("A", true)]),
        ];
        let mut left = ResultsAggregator::new(3);
        left.record(&trials[0]);
        let mut right = ResultsAggregator::new(3);
        right.record(&trials[1]);
        right.record(&trials[2]);

        let ab = left.clone().merged(right.clone());
        let ba = right.merged(left);
        assert_eq!(ab, ba);
        assert_eq!(ab.summarize(), ba.summarize());
        assert_eq!(ab.trials(), 3);
    }

    #[test]
    fn projection_assigns_points_by_rank() {
        let mut agg = ResultsAggregator::new(3);
        agg.record(&outcome(&[("A", false), ("B", false), ("C", false)]));
        let projected = projected_classification(&agg.summarize());
        let points: Vec<u32> = projected.iter().map(|e| e.points).collect();
        assert_eq!(points, vec![25, 18, 15]);
        assert_eq!(projected[2].team, "C Team");
    }
}
