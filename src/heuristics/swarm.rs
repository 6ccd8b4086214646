//! Particle Swarm Optimization with SPV decoding.
//!
//! Each particle moves through ℝⁿ. Its tour is the Smallest Position Value
//! ordering of its position: cities sorted by ascending coordinate, equal
//! coordinates kept in index order. After every move positions are
//! min-max renormalized so they stay in [0, 1].

use crate::error::{TspError, TspResult};
use crate::matrix::CostMatrix;
use crate::solution::OptimizationResult;
use crate::solver::TspSolver;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Guard added to the renormalization range.
const RANGE_EPS: f64 = 1e-9;

/// Which min/max the renormalization step uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Each particle against its own min and max
    #[default]
    PerParticle,
    /// Every particle against the swarm-wide min and max
    Swarm,
}

/// Particle swarm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PsoConfig {
    pub num_particles: usize,
    pub iterations: usize,
    /// Initial velocities are drawn from [-init_velocity, init_velocity]
    pub init_velocity: f64,
    /// Inertia weight w
    pub inertia: f64,
    /// Cognitive coefficient c1
    pub cognitive: f64,
    /// Social coefficient c2
    pub social: f64,
    /// Velocity clamp
    pub v_max: f64,
    pub normalization: Normalization,
}

impl Default for PsoConfig {
    fn default() -> Self {
        PsoConfig {
            num_particles: 30,
            iterations: 100,
            init_velocity: 0.5,
            inertia: 0.7,
            cognitive: 1.5,
            social: 1.5,
            v_max: 0.5,
            normalization: Normalization::PerParticle,
        }
    }
}

impl PsoConfig {
    pub fn validate(&self) -> TspResult<()> {
        if self.num_particles == 0 {
            return Err(TspError::invalid_input("num_particles must be at least 1"));
        }
        if self.iterations == 0 {
            return Err(TspError::invalid_input("iterations must be at least 1"));
        }
        for (name, value) in [
            ("init_velocity", self.init_velocity),
            ("inertia", self.inertia),
            ("cognitive", self.cognitive),
            ("social", self.social),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TspError::invalid_input(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        if !(self.v_max.is_finite() && self.v_max > 0.0) {
            return Err(TspError::invalid_input(format!(
                "v_max must be finite and positive, got {}",
                self.v_max
            )));
        }
        Ok(())
    }
}

/// Decode a position vector into a tour: city indices in ascending order
/// of their coordinate, ties in index order.
pub fn spv_decode(position: &[f64]) -> Vec<usize> {
    let mut tour: Vec<usize> = (0..position.len()).collect();
    tour.sort_by_key(|&i| OrderedFloat(position[i]));
    tour
}

/// Particle swarm engine
#[derive(Debug, Clone, Default)]
pub struct ParticleSwarm {
    pub config: PsoConfig,
}

impl ParticleSwarm {
    pub fn new(config: PsoConfig) -> Self {
        ParticleSwarm { config }
    }
}

impl TspSolver for ParticleSwarm {
    fn name(&self) -> &str {
        "ParticleSwarm"
    }

    fn run(&self, matrix: &CostMatrix, seed: u64) -> TspResult<OptimizationResult> {
        self.config.validate()?;

        log::info!(
            "[PSO] {} cities, {} particles, {} iterations, seed {}",
            matrix.dimension(),
            self.config.num_particles,
            self.config.iterations,
            seed
        );

        let mut swarm = Swarm::new(&self.config, matrix, seed);
        let mut best_cost_history = Vec::with_capacity(self.config.iterations);
        let mut avg_cost_history = Vec::with_capacity(self.config.iterations);

        for iteration in 0..self.config.iterations {
            let avg_cost = swarm.step()?;
            let best_cost = swarm.global_best.as_ref().map_or(f64::INFINITY, |g| g.cost);
            best_cost_history.push(best_cost);
            avg_cost_history.push(avg_cost);

            log::debug!(
                "[PSO] Iter {:3}  Best {:.3}  Avg {:.3}",
                iteration + 1,
                best_cost,
                avg_cost
            );
        }

        let best = match swarm.global_best {
            Some(best) if best.cost.is_finite() => best,
            _ => {
                return Err(TspError::infeasible(
                    "ParticleSwarm found no tour avoiding the forbidden edges",
                ))
            }
        };

        let mut result = OptimizationResult::new(self.name(), best.tour, best.cost);
        result.best_cost_history = best_cost_history;
        result.avg_cost_history = Some(avg_cost_history);
        result.cost_function_calls = swarm.cost_calls;
        Ok(result)
    }
}

#[derive(Debug, Clone)]
struct Particle {
    position: Vec<f64>,
    velocity: Vec<f64>,
    best_position: Vec<f64>,
    best_cost: f64,
}

#[derive(Debug, Clone)]
struct GlobalBest {
    position: Vec<f64>,
    tour: Vec<usize>,
    cost: f64,
}

/// State of one swarm run
struct Swarm<'a> {
    config: &'a PsoConfig,
    matrix: &'a CostMatrix,
    particles: Vec<Particle>,
    global_best: Option<GlobalBest>,
    rng: ChaCha8Rng,
    cost_calls: usize,
}

impl<'a> Swarm<'a> {
    fn new(config: &'a PsoConfig, matrix: &'a CostMatrix, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = matrix.dimension();
        let v0 = config.init_velocity;

        let positions: Vec<Vec<f64>> = (0..config.num_particles)
            .map(|_| (0..n).map(|_| rng.gen::<f64>()).collect())
            .collect();
        let particles = positions
            .into_iter()
            .map(|position| {
                let velocity = (0..n)
                    .map(|_| if v0 > 0.0 { rng.gen_range(-v0..=v0) } else { 0.0 })
                    .collect();
                Particle {
                    best_position: position.clone(),
                    position,
                    velocity,
                    best_cost: f64::INFINITY,
                }
            })
            .collect();

        Swarm {
            config,
            matrix,
            particles,
            global_best: None,
            rng,
            cost_calls: 0,
        }
    }

    /// One iteration. Returns the mean cost of the decoded tours.
    fn step(&mut self) -> TspResult<f64> {
        let tours: Vec<Vec<usize>> = self.particles.iter().map(|p| spv_decode(&p.position)).collect();
        let costs: Vec<f64> = tours.iter().map(|t| self.matrix.tour_cost(t)).collect();
        self.cost_calls += costs.len();

        for (particle, &cost) in self.particles.iter_mut().zip(costs.iter()) {
            if cost < particle.best_cost {
                particle.best_cost = cost;
                particle.best_position.clone_from(&particle.position);
            }
        }

        let mut min_idx = 0;
        for (i, &cost) in costs.iter().enumerate() {
            if cost < costs[min_idx] {
                min_idx = i;
            }
        }
        let improves = self
            .global_best
            .as_ref()
            .map_or(true, |g| costs[min_idx] < g.cost);
        if improves {
            self.global_best = Some(GlobalBest {
                position: self.particles[min_idx].position.clone(),
                tour: tours[min_idx].clone(),
                cost: costs[min_idx],
            });
        }

        self.move_particles();
        self.renormalize();

        if self
            .particles
            .iter()
            .any(|p| p.position.iter().any(|x| !x.is_finite()))
        {
            return Err(TspError::numeric_instability("particle position update"));
        }

        Ok(costs.iter().sum::<f64>() / costs.len() as f64)
    }

    /// Velocity update and clamp, then `x += v`.
    fn move_particles(&mut self) {
        let PsoConfig {
            inertia,
            cognitive,
            social,
            v_max,
            ..
        } = *self.config;

        let Some(global) = self.global_best.as_ref() else {
            return;
        };

        for particle in self.particles.iter_mut() {
            for d in 0..particle.position.len() {
                let r1: f64 = self.rng.gen();
                let r2: f64 = self.rng.gen();
                let x = particle.position[d];

                let v = inertia * particle.velocity[d]
                    + cognitive * r1 * (particle.best_position[d] - x)
                    + social * r2 * (global.position[d] - x);
                let v = v.clamp(-v_max, v_max);

                particle.velocity[d] = v;
                particle.position[d] = x + v;
            }
        }
    }

    fn renormalize(&mut self) {
        match self.config.normalization {
            Normalization::PerParticle => {
                for particle in self.particles.iter_mut() {
                    let (lo, hi) = min_max(particle.position.iter().copied());
                    rescale(&mut particle.position, lo, hi);
                }
            }
            Normalization::Swarm => {
                let (lo, hi) = min_max(self.particles.iter().flat_map(|p| p.position.iter().copied()));
                for particle in self.particles.iter_mut() {
                    rescale(&mut particle.position, lo, hi);
                }
            }
        }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)))
}

fn rescale(position: &mut [f64], lo: f64, hi: f64) {
    let range = hi - lo + RANGE_EPS;
    for x in position.iter_mut() {
        *x = (*x - lo) / range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::is_valid_tour;
    use proptest::prelude::*;

    fn create_test_matrix(n: usize, seed: u64) -> CostMatrix {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let points: Vec<(f64, f64)> = (0..n)
            .map(|_| (rng.gen::<f64>() * 100.0, rng.gen::<f64>() * 100.0))
            .collect();
        CostMatrix::euclidean(&points).unwrap()
    }

    fn small_config() -> PsoConfig {
        PsoConfig {
            num_particles: 12,
            iterations: 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_spv_decode() {
        assert_eq!(spv_decode(&[0.3, 0.1, 0.9, 0.5]), vec![1, 0, 3, 2]);
        // Ties keep index order
        assert_eq!(spv_decode(&[0.5, 0.2, 0.5, 0.2]), vec![1, 3, 0, 2]);
        assert_eq!(spv_decode(&[1.0; 5]), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_particle_swarm() {
        let matrix = create_test_matrix(10, 1);
        let result = ParticleSwarm::new(small_config()).run(&matrix, 42).unwrap();

        assert!(is_valid_tour(&result.best_tour, 10));
        assert!((matrix.tour_cost(&result.best_tour) - result.best_cost).abs() < 1e-9);
        assert_eq!(result.cost_function_calls, 12 * 20);
        assert_eq!(result.best_cost_history.len(), 20);
        assert_eq!(result.algorithm, "ParticleSwarm");
    }

    #[test]
    fn test_global_best_history_non_increasing() {
        let matrix = create_test_matrix(14, 2);
        let result = ParticleSwarm::new(small_config()).run(&matrix, 3).unwrap();
        for pair in result.best_cost_history.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        let last = *result.best_cost_history.last().unwrap();
        assert_eq!(last, result.best_cost);
    }

    #[test]
    fn test_same_seed_same_run() {
        let matrix = create_test_matrix(9, 3);
        let pso = ParticleSwarm::new(small_config());
        assert_eq!(pso.run(&matrix, 8).unwrap(), pso.run(&matrix, 8).unwrap());
    }

    #[test]
    fn test_per_particle_positions_stay_in_unit_range() {
        let matrix = create_test_matrix(8, 4);
        let config = PsoConfig {
            v_max: 4.0,
            ..small_config()
        };
        let mut swarm = Swarm::new(&config, &matrix, 1);
        for _ in 0..10 {
            swarm.step().unwrap();
            for particle in &swarm.particles {
                assert!(particle.position.iter().all(|&x| (0.0..=1.0).contains(&x)));
            }
        }
    }

    #[test]
    fn test_swarm_normalization_shares_range() {
        let matrix = create_test_matrix(8, 5);
        let config = PsoConfig {
            normalization: Normalization::Swarm,
            ..small_config()
        };
        let mut swarm = Swarm::new(&config, &matrix, 2);
        swarm.step().unwrap();

        let (lo, hi) = min_max(swarm.particles.iter().flat_map(|p| p.position.iter().copied()));
        assert!(lo.abs() < 1e-12);
        assert!(hi <= 1.0 && hi > 0.99);
    }

    #[test]
    fn test_first_step_sets_global_best() {
        let matrix = create_test_matrix(6, 6);
        let config = small_config();
        let mut swarm = Swarm::new(&config, &matrix, 0);
        assert!(swarm.global_best.is_none());
        swarm.step().unwrap();
        let best = swarm.global_best.as_ref().unwrap();
        assert!(is_valid_tour(&best.tour, 6));
        assert_eq!(best.cost, matrix.tour_cost(&best.tour));
    }

    #[test]
    fn test_single_particle() {
        let matrix = create_test_matrix(5, 7);
        let config = PsoConfig {
            num_particles: 1,
            ..small_config()
        };
        let result = ParticleSwarm::new(config).run(&matrix, 0).unwrap();
        assert!(is_valid_tour(&result.best_tour, 5));
    }

    #[test]
    fn test_invalid_config() {
        let matrix = create_test_matrix(5, 8);
        let bad = [
            PsoConfig { num_particles: 0, ..Default::default() },
            PsoConfig { iterations: 0, ..Default::default() },
            PsoConfig { v_max: 0.0, ..Default::default() },
            PsoConfig { inertia: f64::NAN, ..Default::default() },
            PsoConfig { social: -1.0, ..Default::default() },
        ];
        for config in bad {
            let err = ParticleSwarm::new(config).run(&matrix, 0).unwrap_err();
            assert!(matches!(err, TspError::InvalidInput { .. }));
        }
    }

    #[test]
    fn test_infeasible_reported() {
        let inf = f64::INFINITY;
        let rows = vec![
            vec![0.0, inf, inf],
            vec![inf, 0.0, inf],
            vec![inf, inf, 0.0],
        ];
        let matrix = CostMatrix::new(rows).unwrap();
        let err = ParticleSwarm::new(small_config()).run(&matrix, 0).unwrap_err();
        assert!(matches!(err, TspError::Infeasible { .. }));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: PsoConfig =
            serde_json::from_str(r#"{"num_particles": 5, "normalization": "swarm"}"#).unwrap();
        assert_eq!(config.num_particles, 5);
        assert_eq!(config.normalization, Normalization::Swarm);
        assert_eq!(config.iterations, 100);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_decoded_tours_are_permutations(
            position in prop::collection::vec(-1.0f64..1.0, 2..30),
        ) {
            let tour = spv_decode(&position);
            prop_assert!(is_valid_tour(&tour, position.len()));
            for pair in tour.windows(2) {
                prop_assert!(position[pair[0]] <= position[pair[1]]);
            }
        }

        #[test]
        fn prop_accounting(
            n in 2usize..9,
            p in 1usize..8,
            t in 1usize..6,
            swarm_wide in any::<bool>(),
            seed in any::<u64>(),
        ) {
            let matrix = create_test_matrix(n, seed);
            let config = PsoConfig {
                num_particles: p,
                iterations: t,
                normalization: if swarm_wide { Normalization::Swarm } else { Normalization::PerParticle },
                ..Default::default()
            };
            let result = ParticleSwarm::new(config).run(&matrix, seed).unwrap();
            prop_assert!(is_valid_tour(&result.best_tour, n));
            prop_assert_eq!(result.cost_function_calls, p * t);
            prop_assert_eq!(result.best_cost_history.len(), t);
        }
    }
}
