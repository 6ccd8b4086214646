//! Held–Karp dynamic programming for the TSP.
//!
//! City 0 is the fixed start. A state is a subset `S` of the other cities
//! (bit `c - 1` stands for city `c`) plus the current endpoint `j ∈ S`.
//! `dp[S, j]` is the cheapest path that leaves 0, visits exactly `S` and
//! ends at `j`. Subsets are processed layer by layer in growing
//! cardinality.
//!
//! Time O(2ⁿ·n²), memory O(2ⁿ·n). The table is dense, so the solver
//! refuses instances above [`HeldKarpConfig::max_cities`] instead of
//! exhausting memory; about 20 cities is the practical limit.

use crate::error::{TspError, TspResult};
use crate::matrix::CostMatrix;
use crate::solution::OptimizationResult;
use crate::solver::TspSolver;
use serde::{Deserialize, Serialize};

/// Largest instance the dense table can address.
pub const HARD_MAX_CITIES: usize = 24;

/// Parent marker for unreachable states.
const NO_PARENT: u8 = u8::MAX;

/// Held–Karp solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeldKarpConfig {
    /// Refuse instances with more cities than this
    pub max_cities: usize,
}

impl Default for HeldKarpConfig {
    fn default() -> Self {
        HeldKarpConfig { max_cities: 20 }
    }
}

impl HeldKarpConfig {
    pub fn validate(&self, n: usize) -> TspResult<()> {
        if n < 2 {
            return Err(TspError::invalid_input(format!(
                "Held-Karp needs at least 2 cities, got {}",
                n
            )));
        }
        let limit = self.max_cities.min(HARD_MAX_CITIES);
        if n > limit {
            return Err(TspError::invalid_input(format!(
                "Held-Karp is limited to {} cities (O(2^n * n) memory), got {}",
                limit, n
            )));
        }
        Ok(())
    }
}

/// Exact bitmask DP solver
#[derive(Debug, Clone, Default)]
pub struct HeldKarp {
    pub config: HeldKarpConfig,
}

impl HeldKarp {
    pub fn new(config: HeldKarpConfig) -> Self {
        HeldKarp { config }
    }

    /// Provably optimal tour starting at city 0.
    ///
    /// Ties are broken towards the lowest city index, both when choosing a
    /// predecessor and when choosing the last city before returning to 0.
    pub fn solve(&self, matrix: &CostMatrix) -> TspResult<OptimizationResult> {
        let n = matrix.dimension();
        self.config.validate(n)?;

        log::info!("[HK] Solving {} cities", n);

        let m = n - 1;
        let num_masks = 1usize << m;
        let bit = |city: usize| 1usize << (city - 1);
        let idx = |mask: usize, city: usize| mask * m + (city - 1);

        let mut dp = vec![f64::INFINITY; num_masks * m];
        let mut parent = vec![NO_PARENT; num_masks * m];
        let mut history = Vec::with_capacity(n);

        // Singletons: 0 -> k
        let mut layer_min = f64::INFINITY;
        for k in 1..n {
            let cost = matrix.cost(0, k);
            dp[idx(bit(k), k)] = cost;
            parent[idx(bit(k), k)] = 0;
            layer_min = layer_min.min(cost);
        }
        history.push(layer_min);

        for size in 2..=m {
            let mut layer_min = f64::INFINITY;

            for mask in subsets_of_size(m, size) {
                for j in 1..n {
                    if mask & bit(j) == 0 {
                        continue;
                    }

                    let prev_mask = mask ^ bit(j);
                    let mut best = f64::INFINITY;
                    let mut best_k = NO_PARENT;

                    for k in 1..n {
                        if prev_mask & bit(k) == 0 {
                            continue;
                        }
                        let candidate = dp[idx(prev_mask, k)] + matrix.cost(k, j);
                        if candidate < best {
                            best = candidate;
                            best_k = k as u8;
                        }
                    }

                    dp[idx(mask, j)] = best;
                    parent[idx(mask, j)] = best_k;
                    layer_min = layer_min.min(best);
                }
            }

            log::debug!("[HK] Layer {}/{}  best partial {:.3}", size, m, layer_min);
            history.push(layer_min);
        }

        let full = num_masks - 1;
        let mut best_cost = f64::INFINITY;
        let mut last_city = None;
        let mut completions = 0;

        for j in 1..n {
            let cost = dp[idx(full, j)] + matrix.cost(j, 0);
            completions += 1;
            if cost < best_cost {
                best_cost = cost;
                last_city = Some(j);
            }
        }

        let last_city = match last_city {
            Some(j) if best_cost.is_finite() => j,
            _ => {
                return Err(TspError::infeasible(
                    "no Hamiltonian cycle avoids the forbidden edges",
                ))
            }
        };

        let tour = reconstruct(&parent, m, full, last_city)?;
        history.push(best_cost);

        log::info!("[HK] Optimal cost {:.4}", best_cost);

        let mut result = OptimizationResult::new(self.name(), tour, best_cost);
        result.best_cost_history = history;
        result.cost_function_calls = completions;
        Ok(result)
    }
}

impl TspSolver for HeldKarp {
    fn name(&self) -> &str {
        "HeldKarp"
    }

    fn run(&self, matrix: &CostMatrix, _seed: u64) -> TspResult<OptimizationResult> {
        self.solve(matrix)
    }
}

/// Walk parents back from `(full, last)` to city 0.
fn reconstruct(parent: &[u8], m: usize, full: usize, last: usize) -> TspResult<Vec<usize>> {
    let mut path = Vec::with_capacity(m + 1);
    let mut mask = full;
    let mut city = last;

    loop {
        path.push(city);
        let prev = parent[mask * m + (city - 1)];
        if prev == NO_PARENT {
            return Err(TspError::numeric_instability("Held-Karp tour reconstruction"));
        }
        if prev == 0 {
            break;
        }
        mask ^= 1 << (city - 1);
        city = prev as usize;
    }

    path.push(0);
    path.reverse();
    Ok(path)
}

/// All `bits`-wide masks with exactly `size` set bits, in increasing order.
fn subsets_of_size(bits: usize, size: usize) -> impl Iterator<Item = usize> {
    let limit = 1usize << bits;
    let first = (1usize << size) - 1;

    std::iter::successors(Some(first), move |&mask| {
        // Gosper's hack
        let lowest = mask & mask.wrapping_neg();
        let ripple = mask + lowest;
        let next = (((ripple ^ mask) >> 2) / lowest) | ripple;
        Some(next)
    })
    .take_while(move |&mask| mask < limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::is_valid_tour;
    use proptest::prelude::*;

    /// Minimum over all tours starting at 0.
    fn brute_force(matrix: &CostMatrix) -> f64 {
        fn permute(rest: &mut Vec<usize>, k: usize, matrix: &CostMatrix, best: &mut f64) {
            if k == rest.len() {
                let mut tour = vec![0];
                tour.extend_from_slice(rest);
                *best = best.min(matrix.tour_cost(&tour));
                return;
            }
            for i in k..rest.len() {
                rest.swap(k, i);
                permute(rest, k + 1, matrix, best);
                rest.swap(k, i);
            }
        }

        let mut rest: Vec<usize> = (1..matrix.dimension()).collect();
        let mut best = f64::INFINITY;
        permute(&mut rest, 0, matrix, &mut best);
        best
    }

    fn random_points(n: usize, seed: u64) -> Vec<(f64, f64)> {
        use rand::prelude::*;
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n).map(|_| (rng.gen::<f64>() * 100.0, rng.gen::<f64>() * 100.0)).collect()
    }

    #[test]
    fn test_subsets_of_size() {
        let masks: Vec<usize> = subsets_of_size(4, 2).collect();
        assert_eq!(masks, vec![0b0011, 0b0101, 0b0110, 0b1001, 0b1010, 0b1100]);
        assert_eq!(subsets_of_size(3, 3).collect::<Vec<_>>(), vec![0b111]);
    }

    #[test]
    fn test_two_cities() {
        let matrix = CostMatrix::new(vec![vec![0.0, 2.0], vec![3.0, 0.0]]).unwrap();
        let result = HeldKarp::default().solve(&matrix).unwrap();
        assert_eq!(result.best_tour, vec![0, 1]);
        assert_eq!(result.best_cost, 5.0);
        assert_eq!(result.cost_function_calls, 1);
    }

    #[test]
    fn test_ties_prefer_lowest_index() {
        let mut rows = vec![vec![1.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = 0.0;
        }
        let matrix = CostMatrix::new(rows).unwrap();

        let result = HeldKarp::default().solve(&matrix).unwrap();
        assert_eq!(result.best_cost, 4.0);
        assert_eq!(result.best_tour, vec![0, 3, 2, 1]);
    }

    #[test]
    fn test_matches_brute_force_ten_cities() {
        let matrix = CostMatrix::euclidean(&random_points(10, 7)).unwrap();
        let result = HeldKarp::default().solve(&matrix).unwrap();

        assert!(is_valid_tour(&result.best_tour, 10));
        assert!((result.best_cost - brute_force(&matrix)).abs() < 1e-9);
        assert!((matrix.tour_cost(&result.best_tour) - result.best_cost).abs() < 1e-9);
        assert_eq!(result.best_cost_history.len(), 10);
        assert_eq!(*result.best_cost_history.last().unwrap(), result.best_cost);
    }

    #[test]
    fn test_asymmetric_matches_brute_force() {
        let rows = vec![
            vec![0.0, 1.0, 9.0, 4.0, 7.0],
            vec![6.0, 0.0, 2.0, 8.0, 3.0],
            vec![5.0, 7.0, 0.0, 1.0, 9.0],
            vec![2.0, 9.0, 6.0, 0.0, 4.0],
            vec![3.0, 5.0, 8.0, 2.0, 0.0],
        ];
        let matrix = CostMatrix::new(rows).unwrap();
        let result = HeldKarp::default().solve(&matrix).unwrap();
        assert_eq!(result.best_cost, brute_force(&matrix));
    }

    #[test]
    fn test_infeasible_reported() {
        // City 2 cannot be entered from anywhere
        let inf = f64::INFINITY;
        let rows = vec![
            vec![0.0, 1.0, inf, 1.0],
            vec![1.0, 0.0, inf, 1.0],
            vec![1.0, 1.0, 0.0, 1.0],
            vec![1.0, 1.0, inf, 0.0],
        ];
        let matrix = CostMatrix::new(rows).unwrap();
        let err = HeldKarp::default().solve(&matrix).unwrap_err();
        assert!(matches!(err, TspError::Infeasible { .. }));
    }

    #[test]
    fn test_forbidden_edges_avoided() {
        let mut rows = CostMatrix::euclidean(&random_points(7, 3)).unwrap().to_rows();
        rows[0][1] = f64::INFINITY;
        rows[1][0] = f64::INFINITY;
        rows[2][5] = f64::INFINITY;
        let matrix = CostMatrix::new(rows).unwrap();

        let result = HeldKarp::default().solve(&matrix).unwrap();
        assert!(result.best_cost.is_finite());
        assert!((result.best_cost - brute_force(&matrix)).abs() < 1e-9);
    }

    #[test]
    fn test_size_limit() {
        let solver = HeldKarp::new(HeldKarpConfig { max_cities: 5 });
        let matrix = CostMatrix::euclidean(&random_points(6, 1)).unwrap();
        assert!(matches!(solver.solve(&matrix), Err(TspError::InvalidInput { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_exact_on_symmetric_matrices(
            n in 2usize..=8,
            weights in prop::collection::vec(0.0f64..100.0, 64),
        ) {
            let mut rows = vec![vec![0.0; n]; n];
            for i in 0..n {
                for j in i + 1..n {
                    rows[i][j] = weights[i * 8 + j];
                    rows[j][i] = weights[i * 8 + j];
                }
            }
            let matrix = CostMatrix::new(rows).unwrap();
            let result = HeldKarp::default().solve(&matrix).unwrap();

            prop_assert!(is_valid_tour(&result.best_tour, n));
            prop_assert_eq!(result.best_tour[0], 0);
            prop_assert!((result.best_cost - brute_force(&matrix)).abs() < 1e-9);
        }
    }
}
