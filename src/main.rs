//! TSP Optim - Command Line Interface
//!
//! Solve a TSP instance with one engine, compare all engines over several
//! seeds, or generate random instances.

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use tsp_optim::benchmark::{run_benchmarked, Benchmark, BenchmarkConfig, TrackingAllocator};
use tsp_optim::exact::{HeldKarp, HeldKarpConfig};
use tsp_optim::heuristics::{GAConfig, GeneticAlgorithm, Normalization, ParticleSwarm, PsoConfig};
use tsp_optim::{TspInstance, TspResult, TspSolver};

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

/// 2-opt passes used by `ga-two-opt` when none are given.
const DEFAULT_TWO_OPT_PASSES: usize = 3;

#[derive(Parser)]
#[command(name = "tsp-optim")]
#[command(version = "1.0")]
#[command(about = "Exact and population-based TSP solvers with a shared benchmark harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an instance with one algorithm
    Solve {
        #[command(flatten)]
        source: InstanceSource,

        /// Seed for --random
        #[arg(long, default_value = "0")]
        instance_seed: u64,

        /// Algorithm to use
        #[arg(short, long, value_enum, default_value = "ga")]
        algorithm: Algorithm,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// JSON file with parameters for the chosen algorithm
        #[arg(short, long)]
        params: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,

        /// Write the result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compare every algorithm over several seeds
    Compare {
        #[command(flatten)]
        source: InstanceSource,

        /// Seed for --random
        #[arg(long, default_value = "0")]
        instance_seed: u64,

        /// Number of runs per stochastic algorithm
        #[arg(short, long, default_value = "10")]
        runs: usize,

        /// First seed; run i uses base_seed + i
        #[arg(long, default_value = "0")]
        base_seed: u64,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output directory for results.csv, statistics.csv and report.txt
        #[arg(short, long, default_value = "results")]
        output_dir: PathBuf,

        /// Run the seeds of each algorithm in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// Write a random Euclidean instance as a JSON matrix
    Generate {
        /// Number of cities
        #[arg(short, long)]
        cities: usize,

        /// Random seed
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct InstanceSource {
    /// JSON cost matrix file
    #[arg(long)]
    matrix: Option<PathBuf>,

    /// TSPLIB file with NODE_COORD_SECTION
    #[arg(long)]
    tsplib: Option<PathBuf>,

    /// Random Euclidean instance with this many cities
    #[arg(long)]
    random: Option<usize>,
}

/// Parameter overrides, applied on top of defaults or the --params file
#[derive(Args)]
struct EngineArgs {
    /// GA population size
    #[arg(long)]
    population: Option<usize>,
    /// GA generations
    #[arg(long)]
    generations: Option<usize>,
    /// GA crossover rate
    #[arg(long)]
    crossover_rate: Option<f64>,
    /// GA per-gene mutation rate
    #[arg(long)]
    mutation_rate: Option<f64>,
    /// GA elite count
    #[arg(long)]
    elite: Option<usize>,
    /// GA tournament size
    #[arg(long)]
    tournament: Option<usize>,
    /// 2-opt passes per offspring
    #[arg(long)]
    two_opt_passes: Option<usize>,

    /// PSO particle count
    #[arg(long)]
    particles: Option<usize>,
    /// PSO iterations
    #[arg(long)]
    iterations: Option<usize>,
    /// PSO inertia weight
    #[arg(long)]
    inertia: Option<f64>,
    /// PSO cognitive coefficient
    #[arg(long)]
    cognitive: Option<f64>,
    /// PSO social coefficient
    #[arg(long)]
    social: Option<f64>,
    /// PSO velocity clamp
    #[arg(long)]
    v_max: Option<f64>,
    /// PSO renormalization variant
    #[arg(long, value_enum)]
    normalization: Option<Normalization>,

    /// Held-Karp city cap
    #[arg(long)]
    max_cities: Option<usize>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Algorithm {
    /// Exact Held-Karp dynamic programming
    HeldKarp,
    /// Genetic Algorithm
    Ga,
    /// Genetic Algorithm with 2-opt refinement
    GaTwoOpt,
    /// Particle Swarm Optimization
    Pso,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Solve { source, instance_seed, algorithm, seed, params, engine, output, verbose } => {
            load_instance(&source, instance_seed).and_then(|instance| {
                solve_instance(&instance, algorithm, seed, params.as_deref(), &engine, output.as_deref(), verbose)
            })
        }

        Commands::Compare { source, instance_seed, runs, base_seed, engine, output_dir, parallel } => {
            load_instance(&source, instance_seed).and_then(|instance| {
                compare_algorithms(&instance, runs, base_seed, &engine, &output_dir, parallel)
            })
        }

        Commands::Generate { cities, seed, output } => generate_instance(cities, seed, &output),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_instance(source: &InstanceSource, instance_seed: u64) -> TspResult<TspInstance> {
    if let Some(path) = &source.matrix {
        println!("Loading matrix from {:?}...", path);
        TspInstance::from_json_file(path)
    } else if let Some(path) = &source.tsplib {
        println!("Loading TSPLIB instance from {:?}...", path);
        TspInstance::from_tsplib_file(path)
    } else {
        let n = source.random.unwrap_or_default();
        println!("Generating random instance with {} cities (seed {})...", n, instance_seed);
        TspInstance::random(n, instance_seed)
    }
}

fn read_params<T: DeserializeOwned + Default>(path: Option<&Path>) -> TspResult<T> {
    match path {
        Some(path) => Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?),
        None => Ok(T::default()),
    }
}

fn ga_config(params: Option<&Path>, engine: &EngineArgs, two_opt: bool) -> TspResult<GAConfig> {
    let mut config: GAConfig = read_params(params)?;
    config.population_size = engine.population.unwrap_or(config.population_size);
    config.generations = engine.generations.unwrap_or(config.generations);
    config.crossover_rate = engine.crossover_rate.unwrap_or(config.crossover_rate);
    config.mutation_rate = engine.mutation_rate.unwrap_or(config.mutation_rate);
    config.elite_count = engine.elite.unwrap_or(config.elite_count);
    config.tournament_size = engine.tournament.unwrap_or(config.tournament_size);
    config.two_opt_passes = engine.two_opt_passes.unwrap_or(config.two_opt_passes);

    if !two_opt {
        config.two_opt_passes = 0;
    } else if config.two_opt_passes == 0 {
        config.two_opt_passes = DEFAULT_TWO_OPT_PASSES;
    }
    Ok(config)
}

fn pso_config(params: Option<&Path>, engine: &EngineArgs) -> TspResult<PsoConfig> {
    let mut config: PsoConfig = read_params(params)?;
    config.num_particles = engine.particles.unwrap_or(config.num_particles);
    config.iterations = engine.iterations.unwrap_or(config.iterations);
    config.inertia = engine.inertia.unwrap_or(config.inertia);
    config.cognitive = engine.cognitive.unwrap_or(config.cognitive);
    config.social = engine.social.unwrap_or(config.social);
    config.v_max = engine.v_max.unwrap_or(config.v_max);
    config.normalization = engine.normalization.unwrap_or(config.normalization);
    Ok(config)
}

fn held_karp_config(params: Option<&Path>, engine: &EngineArgs) -> TspResult<HeldKarpConfig> {
    let mut config: HeldKarpConfig = read_params(params)?;
    config.max_cities = engine.max_cities.unwrap_or(config.max_cities);
    Ok(config)
}

fn build_solver(
    algorithm: Algorithm,
    params: Option<&Path>,
    engine: &EngineArgs,
) -> TspResult<Box<dyn TspSolver + Sync>> {
    Ok(match algorithm {
        Algorithm::HeldKarp => Box::new(HeldKarp::new(held_karp_config(params, engine)?)),
        Algorithm::Ga => Box::new(GeneticAlgorithm::new(ga_config(params, engine, false)?)),
        Algorithm::GaTwoOpt => Box::new(GeneticAlgorithm::new(ga_config(params, engine, true)?)),
        Algorithm::Pso => Box::new(ParticleSwarm::new(pso_config(params, engine)?)),
    })
}

fn solve_instance(
    instance: &TspInstance,
    algorithm: Algorithm,
    seed: u64,
    params: Option<&Path>,
    engine: &EngineArgs,
    output: Option<&Path>,
    verbose: bool,
) -> TspResult<()> {
    if verbose {
        println!("{}", instance.statistics());
    }

    let solver = build_solver(algorithm, params, engine)?;
    println!("Solving with {}...", solver.name());

    let result = run_benchmarked(solver.as_ref(), &instance.matrix, seed)?;

    println!("\n========== Results ==========");
    println!("{}", result);
    if verbose {
        println!("Tour from city 0: {:?}", result.normalized_tour());
        println!("Best-cost history: {:?}", result.best_cost_history);
    }

    if let Some(path) = output {
        serde_json::to_writer_pretty(File::create(path)?, &result)?;
        println!("\nResult saved to {:?}", path);
    }

    Ok(())
}

fn compare_algorithms(
    instance: &TspInstance,
    runs: usize,
    base_seed: u64,
    engine: &EngineArgs,
    output_dir: &Path,
    parallel: bool,
) -> TspResult<()> {
    println!("{}", instance.statistics());

    std::fs::create_dir_all(output_dir)?;

    let stochastic: Vec<Box<dyn TspSolver + Sync>> = vec![
        build_solver(Algorithm::Ga, None, engine)?,
        build_solver(Algorithm::GaTwoOpt, None, engine)?,
        build_solver(Algorithm::Pso, None, engine)?,
    ];

    let bar = ProgressBar::new((runs * stochastic.len()) as u64);
    let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);

    let config = BenchmarkConfig {
        num_runs: runs,
        base_seed,
        parallel,
    };
    let mut benchmark = Benchmark::new(config).with_progress(bar.clone());

    // Held-Karp is deterministic: one run supplies the reference cost
    let held_karp = HeldKarp::new(held_karp_config(None, engine)?);
    if instance.dimension() <= held_karp.config.max_cities {
        bar.set_message(held_karp.name().to_string());
        let outcome = run_benchmarked(&held_karp, &instance.matrix, base_seed);
        if let Some(optimum) = benchmark.record(held_karp.name(), instance, base_seed, outcome) {
            benchmark.set_best_known(&instance.name, optimum.best_cost);
        }
    } else {
        println!(
            "Skipping Held-Karp: {} cities exceeds its cap of {}",
            instance.dimension(),
            held_karp.config.max_cities
        );
    }

    for solver in &stochastic {
        bar.set_message(solver.name().to_string());
        benchmark.run_solver(solver.as_ref(), instance);
    }
    bar.finish_with_message("done");

    let results_path = output_dir.join("results.csv");
    benchmark.export_to_csv(&results_path)?;
    println!("\nResults exported to {:?}", results_path);

    let stats_path = output_dir.join("statistics.csv");
    benchmark.export_statistics_csv(&stats_path)?;
    println!("Statistics exported to {:?}", stats_path);

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output_dir.join("report.txt");
    std::fs::write(&report_path, &report)?;
    println!("Report saved to {:?}", report_path);

    Ok(())
}

fn generate_instance(cities: usize, seed: u64, output: &Path) -> TspResult<()> {
    let instance = TspInstance::random(cities, seed)?;
    instance.save_json(output)?;
    println!("Wrote {} ({} cities) to {:?}", instance.name, cities, output);
    Ok(())
}
