//! Cost model for the TSP engines.
//!
//! A `CostMatrix` is an immutable N×N view of directed edge costs. Entry
//! `(i, j)` is the cost of travelling from city `i` to city `j`;
//! `f64::INFINITY` marks a forbidden edge. The diagonal is never traversed
//! and is not validated.

use crate::error::{TspError, TspResult};
use serde::{Deserialize, Serialize};

/// Immutable N×N matrix of non-negative edge costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Option<f64>>>", into = "Vec<Vec<Option<f64>>>")]
pub struct CostMatrix {
    dimension: usize,
    /// Row-major costs
    data: Vec<f64>,
    symmetric: bool,
}

impl CostMatrix {
    /// Build a matrix from rows, checking shape and cost validity.
    pub fn new(rows: Vec<Vec<f64>>) -> TspResult<Self> {
        let n = rows.len();
        if n < 2 {
            return Err(TspError::invalid_input(format!(
                "cost matrix needs at least 2 cities, got {}",
                n
            )));
        }

        let mut data = Vec::with_capacity(n * n);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(TspError::invalid_input(format!(
                    "row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
            for (j, &value) in row.iter().enumerate() {
                if i == j {
                    continue;
                }
                if value.is_nan() {
                    return Err(TspError::invalid_input(format!("cost ({}, {}) is NaN", i, j)));
                }
                if value < 0.0 {
                    return Err(TspError::invalid_input(format!(
                        "cost ({}, {}) is negative: {}",
                        i, j, value
                    )));
                }
            }
            data.extend(row);
        }

        let symmetric = (0..n).all(|i| (i + 1..n).all(|j| data[i * n + j] == data[j * n + i]));

        Ok(CostMatrix { dimension: n, data, symmetric })
    }

    /// Symmetric Euclidean matrix over 2D points (diagonal 0).
    pub fn euclidean(points: &[(f64, f64)]) -> TspResult<Self> {
        let n = points.len();
        let mut rows = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let dx = points[i].0 - points[j].0;
                    let dy = points[i].1 - points[j].1;
                    rows[i][j] = (dx * dx + dy * dy).sqrt();
                }
            }
        }

        Self::new(rows)
    }

    /// Number of cities.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Directed cost from `i` to `j`.
    #[inline]
    pub fn cost(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.dimension + j]
    }

    /// True when `cost(i, j) == cost(j, i)` for every off-diagonal pair.
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Cyclic tour cost: sum of `cost(tour[i], tour[(i + 1) % n])`.
    ///
    /// Returns `f64::INFINITY` when the tour uses a forbidden edge.
    pub fn tour_cost(&self, tour: &[usize]) -> f64 {
        if tour.len() < 2 {
            return 0.0;
        }

        let mut total = 0.0;
        for window in tour.windows(2) {
            total += self.cost(window[0], window[1]);
        }
        total += self.cost(tour[tour.len() - 1], tour[0]);

        total
    }

    /// Owned rows, mainly for serialization.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.dimension).map(|row| row.to_vec()).collect()
    }
}

// JSON has no infinity: forbidden edges travel as `null`.
impl TryFrom<Vec<Vec<Option<f64>>>> for CostMatrix {
    type Error = TspError;

    fn try_from(rows: Vec<Vec<Option<f64>>>) -> TspResult<Self> {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|c| c.unwrap_or(f64::INFINITY)).collect())
            .collect();
        CostMatrix::new(rows)
    }
}

impl From<CostMatrix> for Vec<Vec<Option<f64>>> {
    fn from(matrix: CostMatrix) -> Self {
        matrix
            .data
            .chunks(matrix.dimension)
            .map(|row| row.iter().map(|&c| if c.is_finite() { Some(c) } else { None }).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> CostMatrix {
        CostMatrix::euclidean(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]).unwrap()
    }

    #[test]
    fn test_rejects_small_and_ragged() {
        assert!(matches!(
            CostMatrix::new(vec![vec![0.0]]),
            Err(TspError::InvalidInput { .. })
        ));
        assert!(matches!(
            CostMatrix::new(vec![vec![0.0, 1.0], vec![1.0]]),
            Err(TspError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        let negative = vec![vec![0.0, -1.0], vec![1.0, 0.0]];
        assert!(CostMatrix::new(negative).is_err());

        let nan = vec![vec![0.0, f64::NAN], vec![1.0, 0.0]];
        assert!(CostMatrix::new(nan).is_err());
    }

    #[test]
    fn test_diagonal_ignored() {
        let rows = vec![vec![f64::INFINITY, 2.0], vec![3.0, -5.0]];
        let matrix = CostMatrix::new(rows).unwrap();
        assert_eq!(matrix.tour_cost(&[0, 1]), 5.0);
        assert!(!matrix.is_symmetric());
    }

    #[test]
    fn test_tour_cost_square() {
        let matrix = square();
        assert!(matrix.is_symmetric());
        assert!((matrix.tour_cost(&[0, 1, 2, 3]) - 4.0).abs() < 1e-12);
        let crossing = matrix.tour_cost(&[0, 2, 1, 3]);
        assert!((crossing - (2.0 + 2.0 * 2f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn test_forbidden_edge_is_infinite() {
        let mut rows = square().to_rows();
        rows[1][2] = f64::INFINITY;
        let matrix = CostMatrix::new(rows).unwrap();
        assert_eq!(matrix.tour_cost(&[0, 1, 2, 3]), f64::INFINITY);
        // Reverse direction is still allowed
        assert!(matrix.tour_cost(&[0, 3, 2, 1]).is_finite());
    }

    #[test]
    fn test_json_round_trip_validates() {
        let json = "[[0.0, 1.0], [2.0, 0.0]]";
        let matrix: CostMatrix = serde_json::from_str(json).unwrap();
        assert_eq!(matrix.cost(1, 0), 2.0);

        let bad = "[[0.0, 1.0, 2.0], [2.0, 0.0]]";
        assert!(serde_json::from_str::<CostMatrix>(bad).is_err());

        let forbidden = "[[0.0, null, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0]]";
        let matrix: CostMatrix = serde_json::from_str(forbidden).unwrap();
        assert_eq!(matrix.cost(0, 1), f64::INFINITY);
        let back = serde_json::to_string(&matrix).unwrap();
        assert!(back.contains("null"));
    }
}
