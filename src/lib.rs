//! TSP Optimization Library
//!
//! Exact and population-based solvers for the Traveling Salesman Problem,
//! all returning the same [`OptimizationResult`] so they can be benchmarked
//! side by side.
//!
//! # Features
//!
//! - Exact Held–Karp dynamic programming (up to ~20 cities)
//! - Genetic Algorithm with optional 2-opt refinement
//! - Particle Swarm Optimization with SPV decoding
//! - Adapter for third-party metaheuristics ([`solver::ExternalSolver`])
//! - Benchmark harness: time, peak memory, cost-evaluation counts, CSV export
//!
//! # Example
//!
//! ```no_run
//! use tsp_optim::instance::TspInstance;
//! use tsp_optim::heuristics::{GAConfig, GeneticAlgorithm};
//! use tsp_optim::benchmark::run_benchmarked;
//!
//! // Load instance
//! let instance = TspInstance::load("berlin52.tsp").unwrap();
//!
//! // GA with 2-opt refinement, seed 42
//! let ga = GeneticAlgorithm::memetic(GAConfig::default(), 3);
//! let result = run_benchmarked(&ga, &instance.matrix, 42).unwrap();
//!
//! println!("Tour cost: {:.2} after {} evaluations", result.best_cost, result.cost_function_calls);
//! ```

pub mod error;
pub mod matrix;
pub mod instance;
pub mod solution;
pub mod solver;
pub mod heuristics;
pub mod exact;
pub mod benchmark;

pub use error::{TspError, TspResult};
pub use instance::TspInstance;
pub use matrix::CostMatrix;
pub use solution::OptimizationResult;
pub use solver::TspSolver;
