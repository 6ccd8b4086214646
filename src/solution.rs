//! The result record every engine returns.
//!
//! `OptimizationResult` is created once per `run` call and is not modified
//! after it is handed back, apart from the benchmark harness stamping the
//! measurement window onto it.

use serde::{Deserialize, Serialize};

/// Uniform output of a TSP engine run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Algorithm that produced this result
    pub algorithm: String,
    /// Cost of `best_tour`
    pub best_cost: f64,
    /// Best tour found, a permutation of `0..n`
    pub best_tour: Vec<usize>,
    /// Best cost after each generation / iteration / DP layer
    pub best_cost_history: Vec<f64>,
    /// Mean population cost per generation (population engines only)
    pub avg_cost_history: Option<Vec<f64>>,
    /// Number of full-tour cost evaluations performed
    pub cost_function_calls: usize,
    /// Wall-clock seconds spent in `run`
    pub elapsed_time: f64,
    /// Peak heap bytes above the level at the start of the run
    pub peak_memory: u64,
}

impl OptimizationResult {
    pub fn new(algorithm: &str, best_tour: Vec<usize>, best_cost: f64) -> Self {
        OptimizationResult {
            algorithm: algorithm.to_string(),
            best_cost,
            best_tour,
            best_cost_history: Vec::new(),
            avg_cost_history: None,
            cost_function_calls: 0,
            elapsed_time: 0.0,
            peak_memory: 0,
        }
    }

    /// Number of recorded generations / iterations.
    pub fn iterations(&self) -> usize {
        self.best_cost_history.len()
    }

    /// Best tour rotated so that it starts at city 0.
    pub fn normalized_tour(&self) -> Vec<usize> {
        let mut tour = self.best_tour.clone();
        if let Some(pos) = tour.iter().position(|&c| c == 0) {
            tour.rotate_left(pos);
        }
        tour
    }
}

impl std::fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Result ({})", self.algorithm)?;
        writeln!(f, "  Cost: {:.4}", self.best_cost)?;
        writeln!(f, "  Cost evaluations: {}", self.cost_function_calls)?;
        writeln!(f, "  Time: {:.4}s", self.elapsed_time)?;
        writeln!(f, "  Peak memory: {} bytes", self.peak_memory)?;
        if !self.best_cost_history.is_empty() {
            writeln!(f, "  Iterations: {}", self.iterations())?;
        }
        writeln!(f, "  Tour: {:?}", self.best_tour)
    }
}

/// Whether `tour` is a permutation of `0..n`.
pub fn is_valid_tour(tour: &[usize], n: usize) -> bool {
    if tour.len() != n {
        return false;
    }

    let mut seen = vec![false; n];
    for &city in tour {
        if city >= n || seen[city] {
            return false;
        }
        seen[city] = true;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tour() {
        assert!(is_valid_tour(&[2, 0, 1], 3));
        assert!(!is_valid_tour(&[0, 0, 1], 3));
        assert!(!is_valid_tour(&[0, 1], 3));
        assert!(!is_valid_tour(&[0, 1, 3], 3));
    }

    #[test]
    fn test_normalized_tour() {
        let result = OptimizationResult::new("test", vec![3, 1, 0, 2], 1.0);
        assert_eq!(result.normalized_tour(), vec![0, 2, 3, 1]);
        assert_eq!(result.iterations(), 0);
    }

    #[test]
    fn test_serializes_with_histories() {
        let mut result = OptimizationResult::new("GA", vec![0, 1], 2.0);
        result.best_cost_history = vec![3.0, 2.0];
        result.avg_cost_history = Some(vec![4.0, 3.0]);
        let json = serde_json::to_string(&result).unwrap();
        let back: OptimizationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
