//! The capability interface shared by every engine.
//!
//! Native engines (Held–Karp, GA, PSO) and third-party adapters (ACO, SA)
//! all implement [`TspSolver`], so the benchmark harness can drive and
//! compare them without knowing what they are.

use crate::error::{TspError, TspResult};
use crate::matrix::CostMatrix;
use crate::solution::{is_valid_tour, OptimizationResult};

/// A TSP engine: one `run` per call, reproducible given the seed.
pub trait TspSolver {
    /// Short display name, used as `OptimizationResult::algorithm`.
    fn name(&self) -> &str;

    /// Solve `matrix` using `seed` for every random draw.
    fn run(&self, matrix: &CostMatrix, seed: u64) -> TspResult<OptimizationResult>;
}

/// Raw output of a third-party metaheuristic.
#[derive(Debug, Clone, Default)]
pub struct ExternalRun {
    pub best_tour: Vec<usize>,
    pub best_cost_history: Vec<f64>,
    pub avg_cost_history: Option<Vec<f64>>,
    pub cost_function_calls: usize,
}

type ExternalFn = dyn Fn(&CostMatrix, u64) -> TspResult<ExternalRun> + Send + Sync;

/// Adapter placing an external library (ant colony, simulated annealing,
/// ...) behind the [`TspSolver`] contract.
///
/// The adapter does not trust the library's cost: it checks the tour is a
/// permutation and re-prices it with [`CostMatrix::tour_cost`].
pub struct ExternalSolver {
    name: String,
    run_fn: Box<ExternalFn>,
}

impl ExternalSolver {
    pub fn new<F>(name: &str, run_fn: F) -> Self
    where
        F: Fn(&CostMatrix, u64) -> TspResult<ExternalRun> + Send + Sync + 'static,
    {
        ExternalSolver {
            name: name.to_string(),
            run_fn: Box::new(run_fn),
        }
    }
}

impl TspSolver for ExternalSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, matrix: &CostMatrix, seed: u64) -> TspResult<OptimizationResult> {
        let raw = (self.run_fn)(matrix, seed)?;

        if !is_valid_tour(&raw.best_tour, matrix.dimension()) {
            return Err(TspError::invalid_input(format!(
                "{} returned a tour that is not a permutation of 0..{}",
                self.name,
                matrix.dimension()
            )));
        }

        let best_cost = matrix.tour_cost(&raw.best_tour);
        if !best_cost.is_finite() {
            return Err(TspError::infeasible(format!(
                "{} found no tour avoiding forbidden edges",
                self.name
            )));
        }

        let mut result = OptimizationResult::new(&self.name, raw.best_tour, best_cost);
        result.best_cost_history = raw.best_cost_history;
        result.avg_cost_history = raw.avg_cost_history;
        result.cost_function_calls = raw.cost_function_calls;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_matrix() -> CostMatrix {
        CostMatrix::euclidean(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]).unwrap()
    }

    #[test]
    fn test_external_result_is_repriced() {
        let solver = ExternalSolver::new("Identity", |matrix, _seed| {
            Ok(ExternalRun {
                best_tour: (0..matrix.dimension()).collect(),
                best_cost_history: vec![10.0, 4.0],
                avg_cost_history: None,
                cost_function_calls: 7,
            })
        });

        let result = solver.run(&line_matrix(), 0).unwrap();
        assert_eq!(result.algorithm, "Identity");
        assert!((result.best_cost - 4.0).abs() < 1e-12);
        assert_eq!(result.cost_function_calls, 7);
        assert_eq!(result.best_cost_history, vec![10.0, 4.0]);
    }

    #[test]
    fn test_external_bad_tour_rejected() {
        let solver = ExternalSolver::new("Broken", |_, _| {
            Ok(ExternalRun {
                best_tour: vec![0, 0, 1],
                ..Default::default()
            })
        });

        let err = solver.run(&line_matrix(), 0).unwrap_err();
        assert!(matches!(err, TspError::InvalidInput { .. }));
    }

    #[test]
    fn test_external_infeasible_reported() {
        let rows = vec![
            vec![0.0, f64::INFINITY, 1.0],
            vec![1.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ];
        let matrix = CostMatrix::new(rows).unwrap();
        let solver = ExternalSolver::new("Fixed", |_, _| {
            Ok(ExternalRun {
                best_tour: vec![0, 1, 2],
                ..Default::default()
            })
        });

        assert!(matches!(solver.run(&matrix, 0), Err(TspError::Infeasible { .. })));
    }
}
