use race_sim::{
    run_trial_with, setup_trial, RaceEnvironment, RaceEventKind, RosterSource, SimFeatures,
    TrialOptions,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[test]
fn enhanced_switch_maps_to_all_or_nothing() {
    assert_eq!(SimFeatures::from_enhanced(true), SimFeatures::all());
    assert_eq!(SimFeatures::from_enhanced(false), SimFeatures::empty());
    assert!(SimFeatures::from_enhanced(true).is_enhanced());
    assert!(!SimFeatures::from_enhanced(false).is_enhanced());
}

#[test]
fn default_features_run_the_enhanced_model() {
    let flags = SimFeatures::default();
    assert!(flags.contains(SimFeatures::WEATHER_TRANSITIONS | SimFeatures::TEAM_ORDERS));
    assert!(flags.is_enhanced());
}

#[test]
fn single_flag_does_not_make_the_model_enhanced() {
    // Toggling one behaviour isolates it; the rest stay off.
    let flags = SimFeatures::GRAINING;
    assert!(flags.intersects(SimFeatures::GRAINING | SimFeatures::MINOR_DAMAGE));
    assert!(!flags.contains(SimFeatures::MINOR_DAMAGE));
    assert!(!flags.is_enhanced());
}

#[test]
fn basic_model_keeps_weather_and_skips_enhanced_events() {
    let env = RaceEnvironment::builtin(SimFeatures::empty());
    let circuit = env.catalog.select_circuit("Spa").unwrap();
    let weather = env.catalog.select_weather("Light Rain").unwrap();
    let templates = RosterSource::builtin().assemble().templates;
    let options = TrialOptions {
        record_events: true,
    };

    for seed in 0..8u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let field = setup_trial(&templates, &env.catalog.strategies, circuit, weather, &mut rng);
        let outcome = run_trial_with(&env, circuit, weather, field, options, &mut rng);

        assert_eq!(outcome.final_weather, outcome.starting_weather);
        assert_eq!(outcome.metrics.weather_changes, 0);
        assert_eq!(outcome.metrics.team_orders, 0);
        assert_eq!(outcome.metrics.pit_errors, 0);
        assert_eq!(outcome.metrics.minor_damage, 0);
        assert!(!outcome.events.iter().any(|event| matches!(
            event.kind,
            RaceEventKind::Graining { .. }
                | RaceEventKind::WeatherChange { .. }
                | RaceEventKind::TeamOrder { .. }
        )));
    }
}
