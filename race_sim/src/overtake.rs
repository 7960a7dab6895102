//! Wheel-to-wheel passing between adjacent running cars.
//!
//! The sweep walks slot boundaries from the back of the field to the front,
//! evaluating each boundary once. The order is re-sorted after every swap,
//! so a car that just passed can attack again at the next boundary.

use rand::Rng;

use crate::{
    catalog::{Circuit, TireCompound},
    competitor::Competitor,
    config::OvertakeConfig,
    features::SimFeatures,
};

#[derive(Debug, Clone, Copy)]
pub struct OvertakeContext<'a> {
    pub circuit: &'a Circuit,
    pub lap: u32,
    pub total_laps: u32,
    pub features: SimFeatures,
    pub config: &'a OvertakeConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Overtake,
    TeamOrder,
}

/// A completed position swap. Indices point into the competitor slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pass {
    pub kind: PassKind,
    pub attacker: usize,
    pub defender: usize,
    /// Position the attacker gained.
    pub position: usize,
}

/// Chance that `attacker` completes a pass on `defender`, clamped to `[0, 1]`.
pub fn overtake_probability(
    attacker: &Competitor,
    defender: &Competitor,
    gap_s: f64,
    field_size: usize,
    ctx: &OvertakeContext<'_>,
) -> f64 {
    let cfg = ctx.config;
    let rear = &attacker.profile;
    let front = &defender.profile;

    let mut chance = cfg.base_chance
        + (rear.car.overall_score - front.car.overall_score) * cfg.pace_weight
        + (rear.driver.overtaking_skill - front.driver.defending_skill) * cfg.skill_weight
        - ctx.circuit.overtaking_difficulty * cfg.difficulty_weight;

    if ctx.features.contains(SimFeatures::OVERTAKE_MODIFIERS) {
        let field = field_size.max(1) as f64;
        let depth = (defender.position.saturating_sub(1)) as f64 / field;
        chance -= cfg.leader_protection * (1.0 - depth);
        chance += (defender.tires.wear() - attacker.tires.wear()) * cfg.tire_wear_weight;
        if gap_s < cfg.close_gap_s && ctx.circuit.track_type.favors_close_passes() {
            chance += cfg.close_gap_bonus;
        }
        chance -= (front.driver.consistency - 0.5) * cfg.defender_consistency_weight;
    }
    if ctx.features.contains(SimFeatures::STRATEGY_RISK) && attacker.is_aggressive() {
        chance += cfg.aggressive_bonus;
    }
    chance.clamp(0.0, 1.0)
}

/// Whether the pit wall tells `front` to let its faster teammate through.
pub fn team_order_swap<R: Rng + ?Sized>(
    front: &Competitor,
    rear: &Competitor,
    gap_s: f64,
    ctx: &OvertakeContext<'_>,
    rng: &mut R,
) -> bool {
    let cfg = ctx.config;
    let quiet = cfg.team_order_quiet_laps;
    if ctx.lap < quiet || ctx.lap > ctx.total_laps.saturating_sub(quiet) {
        return false;
    }
    if gap_s > cfg.team_order_gap_s {
        return false;
    }

    let fresher = rear.tires.wear() < front.tires.wear() - 0.2;
    let softer = rear.tires.compound == TireCompound::Soft && front.tires.compound != TireCompound::Soft;
    if (fresher || softer) && rear.effective_acumen > 0.7 && rng.gen::<f64>() < 0.8 {
        return true;
    }

    let split_strategy = front.strategy.planned_stops != rear.strategy.planned_stops;
    split_strategy && gap_s < 1.0 && rear.effective_acumen > 0.6 && rng.gen::<f64>() < 0.5
}

/// Running competitors ordered by race time, ties kept in slice order.
pub fn running_order(competitors: &[Competitor]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..competitors.len())
        .filter(|&idx| competitors[idx].is_running())
        .collect();
    order.sort_by(|&a, &b| {
        competitors[a]
            .race_time_s
            .total_cmp(&competitors[b].race_time_s)
            .then(a.cmp(&b))
    });
    order
}

/// Writes 1-based positions for the given running order.
pub fn assign_positions(competitors: &mut [Competitor], order: &[usize]) {
    for (slot, &idx) in order.iter().enumerate() {
        competitors[idx].position = slot + 1;
    }
}

/// One rear-to-front pass over the running order. Returns the swaps made,
/// in the order they happened.
pub fn overtake_sweep<R: Rng + ?Sized>(
    competitors: &mut [Competitor],
    ctx: &OvertakeContext<'_>,
    rng: &mut R,
) -> Vec<Pass> {
    let mut passes = Vec::new();
    let mut order = running_order(competitors);
    assign_positions(competitors, &order);
    let field_size = competitors.len();
    let swap_margin = ctx.config.swap_margin_s;

    for boundary in (1..order.len()).rev() {
        let front = order[boundary - 1];
        let rear = order[boundary];
        let gap = competitors[rear].race_time_s - competitors[front].race_time_s;
        if gap > ctx.config.gap_threshold_s {
            continue;
        }

        let mut kind = None;
        if ctx.features.contains(SimFeatures::TEAM_ORDERS)
            && competitors[front].team_name() == competitors[rear].team_name()
            && team_order_swap(&competitors[front], &competitors[rear], gap, ctx, rng)
        {
            kind = Some(PassKind::TeamOrder);
        }
        if kind.is_none() {
            let chance =
                overtake_probability(&competitors[rear], &competitors[front], gap, field_size, ctx);
            if rng.gen::<f64>() < chance {
                kind = Some(PassKind::Overtake);
            }
        }
        let Some(kind) = kind else {
            continue;
        };

        let front_time = competitors[front].race_time_s;
        let rear_time = competitors[rear].race_time_s;
        competitors[rear].race_time_s = front_time - swap_margin;
        competitors[front].race_time_s = rear_time + swap_margin;

        order = running_order(competitors);
        assign_positions(competitors, &order);
        passes.push(Pass {
            kind,
            attacker: rear,
            defender: front,
            position: competitors[rear].position,
        });
    }
    passes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::RaceCatalog,
        competitor::{fixtures::*, RetirementReason},
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn context<'a>(
        circuit: &'a Circuit,
        config: &'a OvertakeConfig,
        features: SimFeatures,
    ) -> OvertakeContext<'a> {
        OvertakeContext {
            circuit,
            lap: 20,
            total_laps: circuit.laps,
            features,
            config,
        }
    }

    #[test]
    fn equal_cars_use_base_formula() {
        let catalog = RaceCatalog::builtin();
        let circuit = catalog.circuit("Silverstone Circuit").unwrap();
        let config = OvertakeConfig::default();
        let ctx = context(circuit, &config, SimFeatures::empty());
        let front = competitor("A", 1);
        let rear = competitor("B", 2);
        let chance = overtake_probability(&rear, &front, 0.4, 20, &ctx);
        assert!((chance - (0.3 - 0.5 * 0.4)).abs() < 1e-12);
    }

    #[test]
    fn leader_is_harder_to_pass_than_midfield() {
        let catalog = RaceCatalog::builtin();
        let circuit = catalog.circuit("Hungaroring").unwrap();
        let config = OvertakeConfig::default();
        let ctx = context(circuit, &config, SimFeatures::OVERTAKE_MODIFIERS);
        let rear = competitor("B", 2);
        let mut leader = competitor("A", 1);
        leader.position = 1;
        let mut midfield = competitor("C", 11);
        midfield.position = 11;
        let on_leader = overtake_probability(&rear, &leader, 0.8, 20, &ctx);
        let on_midfield = overtake_probability(&rear, &midfield, 0.8, 20, &ctx);
        assert!(on_leader < on_midfield);
    }

    #[test]
    fn sweep_skips_distant_and_retired_cars() {
        let catalog = RaceCatalog::builtin();
        let circuit = catalog.circuit("Silverstone Circuit").unwrap();
        let config = OvertakeConfig {
            base_chance: 5.0,
            ..OvertakeConfig::default()
        };
        let ctx = context(circuit, &config, SimFeatures::empty());
        let mut field = vec![competitor("A", 1), competitor("B", 2), competitor("C", 3)];
        field[0].race_time_s = 100.0;
        field[1].race_time_s = 105.0;
        field[2].race_time_s = 100.5;
        field[2].retire(RetirementReason::EngineFailure, 3);

        let passes = overtake_sweep(&mut field, &ctx, &mut ChaCha8Rng::seed_from_u64(1));
        assert!(passes.is_empty());
        assert_eq!(field[0].position, 1);
        assert_eq!(field[1].position, 2);
    }

    #[test]
    fn passing_car_can_attack_again_at_next_boundary() {
        let catalog = RaceCatalog::builtin();
        let circuit = catalog.circuit("Autodromo Nazionale Monza").unwrap();
        let config = OvertakeConfig {
            base_chance: 5.0,
            ..OvertakeConfig::default()
        };
        let ctx = context(circuit, &config, SimFeatures::empty());
        let mut field = vec![competitor("A", 1), competitor("B", 2), competitor("C", 3)];
        field[0].race_time_s = 100.0;
        field[1].race_time_s = 100.5;
        field[2].race_time_s = 100.9;

        let passes = overtake_sweep(&mut field, &ctx, &mut ChaCha8Rng::seed_from_u64(1));
        // C passes B at the back boundary, then A at the front one.
        assert_eq!(passes.len(), 2);
        assert_eq!((passes[0].attacker, passes[0].position), (2, 2));
        assert_eq!((passes[1].attacker, passes[1].position), (2, 1));
        assert_eq!(field[2].position, 1);
        let order = running_order(&field);
        assert_eq!(order[0], 2);
    }

    #[test]
    fn team_orders_respect_quiet_laps_and_gap() {
        let catalog = RaceCatalog::builtin();
        let circuit = catalog.circuit("Silverstone Circuit").unwrap();
        let config = OvertakeConfig::default();
        let mut ctx = context(circuit, &config, SimFeatures::TEAM_ORDERS);
        let mut front = competitor("A", 1);
        let mut rear = competitor("B", 2);
        front.tires.set_wear(0.7);
        rear.tires.set_wear(0.1);
        rear.effective_acumen = 0.9;

        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let calls = (0..200)
            .filter(|_| team_order_swap(&front, &rear, 1.5, &ctx, &mut rng))
            .count();
        assert!((130..=190).contains(&calls), "{calls}");
        assert!(!team_order_swap(&front, &rear, 2.5, &ctx, &mut rng));

        ctx.lap = 4;
        assert!(!team_order_swap(&front, &rear, 0.5, &ctx, &mut rng));
        ctx.lap = circuit.laps - 4;
        assert!(!team_order_swap(&front, &rear, 0.5, &ctx, &mut rng));
    }
}
