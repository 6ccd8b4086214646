//! Bounded best-improvement 2-opt.
//!
//! A move `(i, j)` with `i < j` reverses `tour[i..=j]`, replacing the edges
//! `tour[i-1] -> tour[i]` and `tour[j] -> tour[j+1]` (indices modulo n)
//! with `tour[i-1] -> tour[j]` and `tour[i] -> tour[j+1]`. Each pass
//! applies the single most negative move; the search stops after
//! `max_passes` passes or when no move improves the tour.
//!
//! Delta computations read the matrix directly and are not counted as
//! cost-function calls.

use crate::matrix::CostMatrix;

/// Moves must beat this margin to count as improving.
const IMPROVEMENT_EPS: f64 = 1e-10;

/// 2-opt local search with a pass cap
#[derive(Debug, Clone, Copy)]
pub struct TwoOptSearch {
    /// Maximum number of applied moves (0 disables the search)
    pub max_passes: usize,
}

impl TwoOptSearch {
    pub fn new(max_passes: usize) -> Self {
        TwoOptSearch { max_passes }
    }

    /// Cost change of reversing `tour[i..=j]`.
    ///
    /// On a symmetric matrix only the two boundary edges change. On an
    /// asymmetric matrix every edge inside the segment flips direction, so
    /// those are re-priced as well.
    pub fn delta(matrix: &CostMatrix, tour: &[usize], i: usize, j: usize) -> f64 {
        let n = tour.len();
        let prev = tour[(i + n - 1) % n];
        let next = tour[(j + 1) % n];

        let mut delta = matrix.cost(prev, tour[j]) + matrix.cost(tour[i], next)
            - matrix.cost(prev, tour[i])
            - matrix.cost(tour[j], next);

        if !matrix.is_symmetric() {
            for k in i..j {
                delta += matrix.cost(tour[k + 1], tour[k]) - matrix.cost(tour[k], tour[k + 1]);
            }
        }

        delta
    }

    /// Improve `tour` in place. Returns true if any move was applied.
    ///
    /// The result never costs more than the input.
    pub fn improve(&self, matrix: &CostMatrix, tour: &mut [usize]) -> bool {
        let n = tour.len();
        if n < 4 || self.max_passes == 0 {
            return false;
        }

        let mut improved = false;

        for _ in 0..self.max_passes {
            let mut best_delta = -IMPROVEMENT_EPS;
            let mut best_move = None;

            for i in 0..n - 1 {
                for j in i + 1..n {
                    if i == 0 && j == n - 1 {
                        continue; // Reversing the whole cycle
                    }

                    let delta = Self::delta(matrix, tour, i, j);
                    if delta < best_delta {
                        best_delta = delta;
                        best_move = Some((i, j));
                    }
                }
            }

            match best_move {
                Some((i, j)) => {
                    tour[i..=j].reverse();
                    improved = true;
                }
                None => break,
            }
        }

        improved
    }
}

impl Default for TwoOptSearch {
    fn default() -> Self {
        Self::new(10)
    }
}
