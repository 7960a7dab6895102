use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use race_sim::{
    run_monte_carlo, run_trial, setup_trial, MonteCarloPlan, RaceEnvironment, RosterSource,
    SimFeatures, WeatherScenario,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn bench_trial(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial");
    let templates = RosterSource::builtin().assemble().templates;

    for enhanced in [false, true] {
        let env = RaceEnvironment::builtin(SimFeatures::from_enhanced(enhanced));
        let circuit = env.catalog.circuits[0].clone();
        let weather = env.catalog.weather[0].clone();
        let label = if enhanced { "enhanced" } else { "basic" };
        group.bench_with_input(BenchmarkId::new("full_race", label), &env, |b, env| {
            let mut seed = 0u64;
            b.iter_batched(
                || {
                    seed += 1;
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    let field =
                        setup_trial(&templates, &env.catalog.strategies, &circuit, &weather, &mut rng);
                    (field, rng)
                },
                |(field, mut rng)| run_trial(env, &circuit, &weather, field, &mut rng),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_monte_carlo(c: &mut Criterion) {
    let mut group = c.benchmark_group("monte_carlo");
    group.sample_size(10);
    let templates = RosterSource::builtin().assemble().templates;
    let env = RaceEnvironment::builtin(SimFeatures::all());
    let circuit = env.catalog.circuits[0].clone();
    let scenarios = WeatherScenario::even(env.catalog.weather.iter().map(|w| w.name.clone()));

    for trials in [100u64, 500] {
        group.bench_with_input(BenchmarkId::new("batch", trials), &trials, |b, &trials| {
            let plan = MonteCarloPlan::new(trials, 7);
            b.iter(|| run_monte_carlo(&env, &plan, &circuit, &scenarios, &templates))
        });
    }

    group.finish();
}

criterion_group!(trial_benches, bench_trial, bench_monte_carlo);
criterion_main!(trial_benches);
