//! Genetic Algorithm for the TSP.
//!
//! A generational GA over tour permutations:
//! - Tournament selection with replacement
//! - Order crossover (OX) on consecutive pairs
//! - Per-gene mutation that swaps two flagged positions
//! - Optional bounded 2-opt refinement of every offspring (memetic variant)
//! - Elitism at fixed slots
//!
//! Every random draw goes through one `ChaCha8Rng` seeded per run, so a
//! run is fully reproducible from its seed.

use crate::error::{TspError, TspResult};
use crate::heuristics::local_search::TwoOptSearch;
use crate::matrix::CostMatrix;
use crate::solution::OptimizationResult;
use crate::solver::TspSolver;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Genetic Algorithm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GAConfig {
    /// Population size
    pub population_size: usize,
    /// Number of generations
    pub generations: usize,
    /// Probability that a pair of parents is recombined
    pub crossover_rate: f64,
    /// Per-gene mutation flag probability
    pub mutation_rate: f64,
    /// Elite count (best individuals preserved)
    pub elite_count: usize,
    /// Tournament size for selection
    pub tournament_size: usize,
    /// 2-opt pass cap per offspring (0 disables refinement)
    pub two_opt_passes: usize,
}

impl Default for GAConfig {
    fn default() -> Self {
        GAConfig {
            population_size: 100,
            generations: 100,
            crossover_rate: 0.8,
            mutation_rate: 0.02,
            elite_count: 1,
            tournament_size: 3,
            two_opt_passes: 0,
        }
    }
}

impl GAConfig {
    pub fn validate(&self) -> TspResult<()> {
        let p = self.population_size;
        if p < 2 {
            return Err(TspError::invalid_input("population_size must be at least 2"));
        }
        if self.generations == 0 {
            return Err(TspError::invalid_input("generations must be at least 1"));
        }
        for (name, rate) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(TspError::invalid_input(format!(
                    "{} must be in [0, 1], got {}",
                    name, rate
                )));
            }
        }
        if self.elite_count >= p {
            return Err(TspError::invalid_input(format!(
                "elite_count ({}) must be below population_size ({})",
                self.elite_count, p
            )));
        }
        if self.tournament_size < 2 || self.tournament_size > p {
            return Err(TspError::invalid_input(format!(
                "tournament_size must be in [2, {}], got {}",
                p, self.tournament_size
            )));
        }
        Ok(())
    }
}

/// Genetic Algorithm engine. Holds parameters only; each `run` owns its
/// population.
#[derive(Debug, Clone, Default)]
pub struct GeneticAlgorithm {
    pub config: GAConfig,
}

impl GeneticAlgorithm {
    pub fn new(config: GAConfig) -> Self {
        GeneticAlgorithm { config }
    }

    /// GA with 2-opt refinement enabled.
    pub fn memetic(config: GAConfig, two_opt_passes: usize) -> Self {
        GeneticAlgorithm {
            config: GAConfig {
                two_opt_passes,
                ..config
            },
        }
    }
}

impl TspSolver for GeneticAlgorithm {
    fn name(&self) -> &str {
        if self.config.two_opt_passes > 0 {
            "GeneticAlgorithm+2opt"
        } else {
            "GeneticAlgorithm"
        }
    }

    fn run(&self, matrix: &CostMatrix, seed: u64) -> TspResult<OptimizationResult> {
        self.config.validate()?;

        log::info!(
            "[GA] {} cities, population {}, {} generations, seed {}",
            matrix.dimension(),
            self.config.population_size,
            self.config.generations,
            seed
        );

        let mut ga = GeneticRun::new(&self.config, matrix, seed);
        let mut best_cost_history = Vec::with_capacity(self.config.generations);
        let mut avg_cost_history = Vec::with_capacity(self.config.generations);

        for generation in 0..self.config.generations {
            ga.evolve();

            let (_, best_cost) = ga.best();
            let avg_cost = ga.costs.iter().sum::<f64>() / ga.costs.len() as f64;
            best_cost_history.push(best_cost);
            avg_cost_history.push(avg_cost);

            log::debug!(
                "[GA] Gen {:3}  Best {:.3}  Avg {:.3}  Diversity {:.2}",
                generation + 1,
                best_cost,
                avg_cost,
                ga.population_diversity()
            );
        }

        let (best_idx, best_cost) = ga.best();
        if !best_cost.is_finite() {
            return Err(TspError::infeasible(format!(
                "{} found no tour avoiding the forbidden edges",
                self.name()
            )));
        }

        let mut result =
            OptimizationResult::new(self.name(), ga.population[best_idx].clone(), best_cost);
        result.best_cost_history = best_cost_history;
        result.avg_cost_history = Some(avg_cost_history);
        result.cost_function_calls = ga.cost_calls;
        Ok(result)
    }
}

/// State of one GA run
struct GeneticRun<'a> {
    config: &'a GAConfig,
    matrix: &'a CostMatrix,
    population: Vec<Vec<usize>>,
    costs: Vec<f64>,
    rng: ChaCha8Rng,
    two_opt: Option<TwoOptSearch>,
    cost_calls: usize,
}

impl<'a> GeneticRun<'a> {
    fn new(config: &'a GAConfig, matrix: &'a CostMatrix, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = matrix.dimension();

        let population = (0..config.population_size)
            .map(|_| {
                let mut tour: Vec<usize> = (0..n).collect();
                tour.shuffle(&mut rng);
                tour
            })
            .collect();

        let two_opt = (config.two_opt_passes > 0).then(|| TwoOptSearch::new(config.two_opt_passes));

        GeneticRun {
            config,
            matrix,
            population,
            costs: vec![f64::INFINITY; config.population_size],
            rng,
            two_opt,
            cost_calls: 0,
        }
    }

    /// Batch evaluation of the whole population; counts one call per tour.
    fn evaluate(&mut self) {
        self.costs = self.population.iter().map(|t| self.matrix.tour_cost(t)).collect();
        self.cost_calls += self.population.len();
    }

    /// The `elite_count` cheapest tours; equal costs keep population order.
    fn elites(&self) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.population.len()).collect();
        order.sort_by_key(|&i| OrderedFloat(self.costs[i]));
        order
            .into_iter()
            .take(self.config.elite_count)
            .map(|i| self.population[i].clone())
            .collect()
    }

    /// Tournament selection: one winner per population slot.
    fn tournament_selection(&mut self) -> Vec<Vec<usize>> {
        let p = self.population.len();
        let mut selected = Vec::with_capacity(p);

        for _ in 0..p {
            let mut best_idx = self.rng.gen_range(0..p);
            for _ in 1..self.config.tournament_size {
                let idx = self.rng.gen_range(0..p);
                if self.costs[idx] < self.costs[best_idx] {
                    best_idx = idx;
                }
            }
            selected.push(self.population[best_idx].clone());
        }

        selected
    }

    /// Order Crossover (OX)
    ///
    /// Copies `parent1[start..end]` in place, then fills the remaining
    /// positions from `end` onwards (wrapping) with parent 2's cities in
    /// parent 2's order.
    fn order_crossover(&mut self, parent1: &[usize], parent2: &[usize]) -> Vec<usize> {
        let cuts = sample(&mut self.rng, parent1.len(), 2);
        let start = cuts.index(0).min(cuts.index(1));
        let end = cuts.index(0).max(cuts.index(1));
        ox_with_cuts(parent1, parent2, start, end)
    }

    /// Recombine consecutive pairs; the last odd individual pairs with the first.
    fn crossover_population(&mut self, selected: &[Vec<usize>]) -> Vec<Vec<usize>> {
        let p = selected.len();
        let mut offspring = Vec::with_capacity(p + 1);

        for i in (0..p).step_by(2) {
            let parent1 = &selected[i];
            let parent2 = &selected[(i + 1) % p];

            if self.rng.gen::<f64>() < self.config.crossover_rate {
                let child1 = self.order_crossover(parent1, parent2);
                let child2 = self.order_crossover(parent2, parent1);
                offspring.push(child1);
                offspring.push(child2);
            } else {
                offspring.push(parent1.clone());
                offspring.push(parent2.clone());
            }
        }

        offspring.truncate(p);
        offspring
    }

    /// Per-gene mutation: swap two of the flagged positions when at least
    /// two genes are flagged.
    fn mutate(&mut self, population: &mut [Vec<usize>]) {
        for tour in population.iter_mut() {
            let flagged: Vec<usize> = (0..tour.len())
                .filter(|_| self.rng.gen::<f64>() < self.config.mutation_rate)
                .collect();

            if flagged.len() >= 2 {
                let picks = sample(&mut self.rng, flagged.len(), 2);
                tour.swap(flagged[picks.index(0)], flagged[picks.index(1)]);
            }
        }
    }

    /// Create new generation
    fn evolve(&mut self) {
        self.evaluate();

        let elites = self.elites();
        let selected = self.tournament_selection();
        let mut offspring = self.crossover_population(&selected);
        self.mutate(&mut offspring);

        if let Some(two_opt) = self.two_opt {
            for tour in offspring.iter_mut() {
                two_opt.improve(self.matrix, tour);
            }
        }

        for (slot, elite) in elites.into_iter().enumerate() {
            offspring[slot] = elite;
        }

        self.population = offspring;
        self.evaluate();
    }

    /// Index and cost of the cheapest individual (lowest index on ties).
    fn best(&self) -> (usize, f64) {
        let mut best_idx = 0;
        for (i, &cost) in self.costs.iter().enumerate() {
            if cost < self.costs[best_idx] {
                best_idx = i;
            }
        }
        (best_idx, self.costs[best_idx])
    }

    /// Average number of differing positions between the first 20 individuals.
    fn population_diversity(&self) -> f64 {
        let sample_size = self.population.len().min(20);
        let mut total_diff = 0.0;
        let mut count = 0;

        for i in 0..sample_size {
            for j in i + 1..sample_size {
                let diff = self.population[i]
                    .iter()
                    .zip(self.population[j].iter())
                    .filter(|(a, b)| a != b)
                    .count();
                total_diff += diff as f64;
                count += 1;
            }
        }

        if count > 0 {
            total_diff / count as f64
        } else {
            0.0
        }
    }
}

/// OX child for fixed cut points `start < end < n`.
fn ox_with_cuts(parent1: &[usize], parent2: &[usize], start: usize, end: usize) -> Vec<usize> {
    let n = parent1.len();
    let mut child = vec![usize::MAX; n];
    let mut used = vec![false; n];

    child[start..end].copy_from_slice(&parent1[start..end]);
    for &city in &parent1[start..end] {
        used[city] = true;
    }

    let mut pos = end;
    for &city in parent2 {
        if !used[city] {
            child[pos] = city;
            used[city] = true;
            pos = (pos + 1) % n;
        }
    }

    child
}
