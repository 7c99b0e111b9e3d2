//! Safety/performance race equilibrium solver binary.
//!
//! Usage:
//!   cargo run --release --bin solve_race -- [OPTIONS]
//!
//! The model comes either from a JSON file (`--model`) or from the symmetric
//! parameters on the command line. A subproblem failure is retried from a
//! randomly perturbed start up to `--retries` times.
//!
//! With `--vary <PARAM>` the binary sweeps that parameter from `--from` to
//! `--to` in `--steps` points instead, for example
//! `--vary r --from 0.02 --to 0.04 --steps 20`.

use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use br_equilibrium::equilibrium::{
    EquilibriumError, FixedPointIterator, GameSpec, IterationOutcome, JointStrategy,
    ProjectedGradient, SolveConfig,
};
use br_equilibrium::games::safety_race::{Csf, SafetyRace};
use br_equilibrium::games::scenario::{linspace, Param, Scenario};

#[derive(Parser, Debug)]
#[command(name = "solve_race", about = "Nash equilibrium of the safety/performance race")]
struct Args {
    /// Solver configuration JSON file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Use the fast preset (ignored with --config).
    #[arg(long)]
    fast: bool,

    /// Model JSON file. Overrides the symmetric parameters below.
    #[arg(long, short)]
    model: Option<PathBuf>,

    /// Number of players.
    #[arg(long, short = 'n', default_value_t = 2)]
    players: usize,

    /// Safety productivity.
    #[arg(long = "A", default_value_t = 10.0)]
    a: f64,

    /// Safety returns to scale.
    #[arg(long, default_value_t = 0.5)]
    alpha: f64,

    /// Performance productivity.
    #[arg(long = "B", default_value_t = 10.0)]
    b: f64,

    /// Performance returns to scale.
    #[arg(long, default_value_t = 0.5)]
    beta: f64,

    /// Erosion of safety by performance.
    #[arg(long, default_value_t = 0.25)]
    theta: f64,

    /// Disaster cost.
    #[arg(long, short, default_value_t = 1.0)]
    d: f64,

    /// Factor cost.
    #[arg(long, short, default_value_t = 0.1)]
    r: f64,

    /// Worker threads per round (0 = sequential).
    #[arg(long, short, default_value_t = 0)]
    threads: usize,

    /// Restarts from a perturbed start after a subproblem failure.
    #[arg(long, default_value_t = 3)]
    retries: usize,

    /// Relative size of the start perturbation.
    #[arg(long, default_value_t = 0.5)]
    perturbation: f64,

    /// Seed for the start perturbation.
    #[arg(long, short, default_value_t = 42)]
    seed: u64,

    /// Write the solution as JSON to this file.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Sweep this parameter (A, alpha, B, beta, theta, d or r).
    #[arg(long)]
    vary: Option<Param>,

    /// First sweep value.
    #[arg(long, requires = "vary")]
    from: Option<f64>,

    /// Last sweep value.
    #[arg(long, requires = "vary")]
    to: Option<f64>,

    /// Number of sweep points.
    #[arg(long, default_value_t = 20)]
    steps: usize,
}

#[derive(Debug, Serialize)]
struct RaceSolution<'a> {
    model: &'a SafetyRace,
    config: &'a SolveConfig,
    attempts: usize,
    strategies: Vec<Vec<f64>>,
    net_payoffs: Vec<f64>,
    total_safety: f64,
    outcome: &'a IterationOutcome,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SolveConfig::from_json_file(path)?,
        None if args.fast => SolveConfig::fast(),
        None => SolveConfig::default(),
    };
    if args.threads > 0 {
        config = config.with_threads(args.threads);
    }

    let race = match &args.model {
        Some(path) => {
            let race: SafetyRace = serde_json::from_reader(File::open(path)?)?;
            race.validate()?;
            race
        }
        None => SafetyRace::symmetric(
            args.players,
            args.a,
            args.alpha,
            args.b,
            args.beta,
            args.theta,
            args.d,
            args.r,
            Csf::default(),
        )?,
    };

    if let Some(param) = args.vary {
        return run_sweep(&args, param, race, &config);
    }

    println!("=================================================");
    println!("  Safety Race Equilibrium Solver");
    println!("=================================================");
    println!("Players: {}", race.d.len());
    println!("Max rounds: {}, tolerance: {:e}", config.max_rounds, config.round_tol);
    println!("Executor: {:?}", config.executor);
    println!();

    let game = GameSpec::new(race)?;
    let solver = ProjectedGradient::new();
    let iterator = FixedPointIterator::new(&game, &config, &solver)?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut start = game.default_start();
    let mut attempts = 0;

    let outcome = loop {
        attempts += 1;
        match solve_with_progress(&iterator, &config, start.clone()) {
            Ok(outcome) => break outcome,
            Err(err @ EquilibriumError::SubproblemFailed { .. }) if attempts <= args.retries => {
                log::warn!("attempt {} failed: {}; retrying from a perturbed start", attempts, err);
                start = game.default_start().perturbed(args.perturbation, &mut rng);
            }
            Err(err) => return Err(err.into()),
        }
    };

    let race = game.oracle();
    let strategies: Vec<Vec<f64>> = outcome.profile.rows().map(|row| row.to_vec()).collect();
    let net_payoffs = race.net_payoffs(&outcome.profile);
    let total_safety = race.total_safety(&outcome.profile);

    println!("\n=== Summary ===");
    println!("Converged: {}", outcome.converged());
    println!("Rounds: {}", outcome.stats.rounds);
    println!("Time: {:.2}s", outcome.stats.elapsed_seconds);
    if let Some(delta) = outcome.stats.last_delta() {
        println!("Final delta: {:.3e}", delta);
    }
    println!("Total safety: {:.4}", total_safety);
    for (i, (row, payoff)) in strategies.iter().zip(&net_payoffs).enumerate() {
        println!(
            "  player {}: x_s = {:.4}, x_p = {:.4}, payoff = {:.4}",
            i, row[0], row[1], payoff
        );
    }

    if let Some(path) = &args.output {
        let solution = RaceSolution {
            model: race,
            config: &config,
            attempts,
            strategies,
            net_payoffs,
            total_safety,
            outcome: &outcome,
        };
        let json = serde_json::to_string_pretty(&solution)?;
        File::create(path)?.write_all(json.as_bytes())?;
        println!("\nSolution exported to: {}", path.display());
    }

    Ok(())
}

fn run_sweep(
    args: &Args,
    param: Param,
    race: SafetyRace,
    config: &SolveConfig,
) -> Result<(), Box<dyn Error>> {
    let (from, to) = match (args.from, args.to) {
        (Some(from), Some(to)) => (from, to),
        _ => return Err(format!("--vary {} needs both --from and --to", param).into()),
    };
    let scenario = Scenario::new(race, param, linspace(from, to, args.steps))?;

    println!("=================================================");
    println!("  Safety Race Parameter Sweep");
    println!("=================================================");
    println!("Players: {}", scenario.base.d.len());
    println!("Varying: {} from {} to {} ({} points)", param, from, to, scenario.len());
    println!();

    let progress = ProgressBar::new(scenario.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} points")
    {
        progress.set_style(style);
    }
    let points =
        scenario.solve_with_callback(config, &ProjectedGradient::new(), |_| progress.inc(1))?;
    progress.finish_and_clear();

    println!(
        "{:>10} {:>10} {:>10} {:>12} {:>10} {:>7}",
        param.name(),
        "x_s",
        "x_p",
        "total safety",
        "payoff",
        "rounds"
    );
    for point in &points {
        let n = point.strategies.len() as f64;
        let mean = |k: usize| point.strategies.iter().map(|row| row[k]).sum::<f64>() / n;
        println!(
            "{:>10.4} {:>10.4} {:>10.4} {:>12.4} {:>10.4} {:>7}{}",
            point.value,
            mean(0),
            mean(1),
            point.total_safety,
            point.net_payoffs.iter().sum::<f64>() / n,
            point.rounds,
            if point.converged { "" } else { " (not converged)" }
        );
    }

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&points)?;
        File::create(path)?.write_all(json.as_bytes())?;
        println!("\nSweep exported to: {}", path.display());
    }

    Ok(())
}

fn solve_with_progress(
    iterator: &FixedPointIterator<'_, SafetyRace, ProjectedGradient>,
    config: &SolveConfig,
    start: JointStrategy,
) -> Result<IterationOutcome, EquilibriumError> {
    let progress = ProgressBar::new(config.max_rounds as u64);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} rounds {msg}")
    {
        progress.set_style(style);
    }

    let result = iterator.run_with_callback(start, |report| {
        progress.inc(1);
        progress.set_message(format!("delta {:.3e}", report.delta));
    });
    progress.finish_and_clear();
    result
}
