use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use race_sim::{
    hashing::trial_seed, load_race_catalog_from_env, load_race_model_config_from_env,
    run_monte_carlo, run_trial_with, setup_trial, CarRecord, Circuit, CompetitorSummary,
    CompetitorTemplate, DriverRecord, MonteCarloPlan, MonteCarloReport, ProjectedEntry, RaceCatalog,
    RaceEnvironment, RosterSource, SimFeatures, TeamRecord, TrialOptions, TrialOutcome,
    WeatherScenario,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Monte Carlo race simulator", long_about = None)]
struct Args {
    /// Circuit name, name fragment, or 1-based index from --list-circuits
    #[arg(long, default_value = "1")]
    circuit: String,

    /// Number of simulated races
    #[arg(long, default_value_t = 1000)]
    trials: u64,

    /// Enable the enhanced model (weather changes, graining, team orders, ...)
    #[arg(long)]
    enhanced: bool,

    /// Master seed; a random one is drawn and printed when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Starting weather scenario (repeatable, defaults to every condition)
    #[arg(long = "weather")]
    weather: Vec<String>,

    /// Directory with drivers.csv, teams.csv and cars.csv
    #[arg(long)]
    roster_dir: Option<PathBuf>,

    /// Write the per-competitor summary table to this CSV file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the projected classification to this CSV file
    #[arg(long)]
    projected_output: Option<PathBuf>,

    /// Run a single race and print its classification and event log
    #[arg(long)]
    single_race: bool,

    /// Print the available circuits and exit
    #[arg(long)]
    list_circuits: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    let args = Args::parse();
    let catalog = load_race_catalog_from_env();
    if args.list_circuits {
        print_circuits(&catalog);
        return Ok(());
    }

    let (config, _) = load_race_model_config_from_env();
    let env = RaceEnvironment::new(
        Arc::clone(&catalog),
        config,
        SimFeatures::from_enhanced(args.enhanced),
    );
    let circuit = catalog
        .select_circuit(&args.circuit)
        .with_context(|| format!("Invalid circuit selection '{}'", args.circuit))?;

    let templates = load_roster(args.roster_dir.as_deref())?;
    let scenarios = weather_scenarios(&catalog, &args.weather);
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(target: "race_cli", seed, circuit = %circuit.name, "race_cli.seed");

    if args.single_race {
        let outcome = single_race(&env, circuit, &scenarios, &templates, seed)?;
        print_single_race(&outcome, seed);
        return Ok(());
    }

    let plan = MonteCarloPlan::new(args.trials, seed);
    let report = run_monte_carlo(&env, &plan, circuit, &scenarios, &templates)
        .context("Monte Carlo selection rejected")?;
    print_report(&report);

    if let Some(path) = &args.output {
        export(path, "Summary", |file| write_summary(file, &report.summaries))?;
    }
    if let Some(path) = &args.projected_output {
        export(path, "Projected classification", |file| {
            write_projected(file, &report.projected)
        })?;
    }
    Ok(())
}

fn print_circuits(catalog: &RaceCatalog) {
    for (idx, circuit) in catalog.circuits.iter().enumerate() {
        println!(
            "{:>2}. {:<40} {:>3} laps  {:?}",
            idx + 1,
            circuit.name,
            circuit.laps,
            circuit.track_type
        );
    }
}

fn weather_scenarios(catalog: &RaceCatalog, requested: &[String]) -> Vec<WeatherScenario> {
    if requested.is_empty() {
        WeatherScenario::even(catalog.weather.iter().map(|condition| condition.name.clone()))
    } else {
        WeatherScenario::even(requested.iter().cloned())
    }
}

fn load_roster(dir: Option<&Path>) -> Result<Vec<Arc<CompetitorTemplate>>> {
    let source = match dir {
        Some(dir) => RosterSource {
            drivers: read_csv::<DriverRecord>(&dir.join("drivers.csv"))?,
            teams: read_csv::<TeamRecord>(&dir.join("teams.csv"))?,
            cars: read_csv::<CarRecord>(&dir.join("cars.csv"))?,
        },
        None => RosterSource::builtin(),
    };
    let build = source.assemble();
    for issue in &build.excluded {
        warn!(target: "race_cli", error = %issue, "race_cli.competitor_excluded");
    }
    if build.templates.len() < 2 {
        bail!(
            "Roster produced {} usable competitors ({} excluded)",
            build.templates.len(),
            build.excluded.len()
        );
    }
    Ok(build.templates)
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read roster file {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());
    reader
        .deserialize()
        .enumerate()
        .map(|(row, record)| {
            record.with_context(|| format!("Malformed row {} in {}", row + 2, path.display()))
        })
        .collect()
}

fn single_race(
    env: &RaceEnvironment,
    circuit: &Circuit,
    scenarios: &[WeatherScenario],
    templates: &[Arc<CompetitorTemplate>],
    seed: u64,
) -> Result<TrialOutcome> {
    let Some(scenario) = scenarios.first() else {
        bail!("No weather scenario selected");
    };
    let weather = env
        .catalog
        .select_weather(&scenario.name)
        .context("Invalid weather selection")?;
    let mut rng = ChaCha8Rng::seed_from_u64(trial_seed(seed, &weather.name, 0));
    let competitors = setup_trial(templates, &env.catalog.strategies, circuit, weather, &mut rng);
    let options = TrialOptions {
        record_events: true,
    };
    Ok(run_trial_with(env, circuit, weather, competitors, options, &mut rng))
}

fn print_single_race(outcome: &TrialOutcome, seed: u64) {
    println!(
        "{} | start: {} | finish: {} | seed {}",
        outcome.circuit, outcome.starting_weather, outcome.final_weather, seed
    );
    println!(
        "\n{:>3}  {:<22} {:<18} {:>4} {:>5} {:>11} {:>5} {:>4}  Status",
        "Pos", "Driver", "Team", "Grid", "Laps", "Time (s)", "Stops", "Pts"
    );
    for entry in &outcome.classification {
        println!(
            "{:>3}  {:<22} {:<18} {:>4} {:>5} {:>11.3} {:>5} {:>4}  {}",
            entry.position,
            entry.name,
            entry.team,
            entry.grid_position,
            entry.laps_completed,
            entry.race_time_s,
            entry.pit_stops,
            entry.points,
            entry.status_label()
        );
    }
    if !outcome.events.is_empty() {
        println!("\nRace events:");
        for event in &outcome.events {
            println!("  {event}");
        }
    }
}

fn print_report(report: &MonteCarloReport) {
    let model = if report.enhanced { "enhanced" } else { "basic" };
    println!(
        "{} | {} trials | {} model | seed {}",
        report.circuit, report.trials, model, report.master_seed
    );
    for allocation in &report.scenarios {
        println!("  {:<14} {:>7} trials", allocation.weather, allocation.trials);
    }

    println!(
        "\n{:<22} {:<18} {:>5} {:>7} {:>8} {:>6} {:>6}",
        "Driver", "Team", "Mode", "Mode %", "Avg pts", "Win %", "DNF %"
    );
    for summary in &report.summaries {
        let starts = summary.starts.max(1) as f64;
        println!(
            "{:<22} {:<18} {:>5} {:>6.1}% {:>8.2} {:>5.1}% {:>5.1}%",
            summary.name,
            summary.team,
            summary.modal_label(),
            summary.modal_count as f64 / starts * 100.0,
            summary.average_points,
            summary.position_probability(1),
            summary.dnf_rate_pct
        );
    }

    println!("\nProjected classification:");
    for entry in &report.projected {
        println!(
            "  P{:<3} {:<22} {:<18} {:>3} pts",
            entry.position, entry.name, entry.team, entry.points
        );
    }

    let averages = &report.averages;
    println!("\nPer-race averages:");
    println!("  safety car periods {:>7.2}", averages.safety_car_periods);
    println!("  weather changes    {:>7.2}", averages.weather_changes);
    println!("  pit stops          {:>7.2}", averages.pit_stops);
    println!("  overtakes          {:>7.2}", averages.overtakes);
    println!("  team orders        {:>7.2}", averages.team_orders);
    println!("  retirements        {:>7.2}", averages.retirements);
}

fn summary_header(field_size: usize) -> Vec<String> {
    let mut header: Vec<String> = [
        "Driver",
        "Team",
        "Modal_Position",
        "Modal_Label",
        "Modal_Count",
        "Modal_Pct",
        "Avg_Points",
        "DNF_Pct",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();
    header.extend((1..=field_size).map(|position| format!("P{position}_prob")));
    header
}

/// One row per competitor with the full finishing-position distribution.
/// A DNF mode is written as `field + 1` in `Modal_Position`.
fn write_summary<W: io::Write>(writer: W, summaries: &[CompetitorSummary]) -> Result<()> {
    let field_size = summaries
        .iter()
        .map(|summary| summary.position_probabilities_pct.len())
        .max()
        .unwrap_or(0);
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(summary_header(field_size))?;
    for summary in summaries {
        let starts = summary.starts.max(1) as f64;
        let mut record = vec![
            summary.name.clone(),
            summary.team.clone(),
            summary.modal_position.to_string(),
            summary.modal_label(),
            summary.modal_count.to_string(),
            format!("{:.3}", summary.modal_count as f64 / starts * 100.0),
            format!("{:.3}", summary.average_points),
            format!("{:.3}", summary.dnf_rate_pct),
        ];
        record.extend((1..=field_size).map(|p| format!("{:.3}", summary.position_probability(p))));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct ProjectedRow<'a> {
    #[serde(rename = "Position")]
    position: usize,
    #[serde(rename = "Driver")]
    driver: &'a str,
    #[serde(rename = "Team")]
    team: &'a str,
    #[serde(rename = "Points")]
    points: u32,
}

fn write_projected<W: io::Write>(writer: W, projected: &[ProjectedEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for entry in projected {
        writer.serialize(ProjectedRow {
            position: entry.position,
            driver: &entry.name,
            team: &entry.team,
            points: entry.points,
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn export(path: &Path, what: &str, write: impl FnOnce(fs::File) -> Result<()>) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create {what} CSV at {}", path.display()))?;
    write(file).with_context(|| format!("Failed to write {what} CSV to {}", path.display()))?;
    println!("\n{what} written to {}", path.display());
    Ok(())
}
