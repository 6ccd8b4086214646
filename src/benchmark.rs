//! Benchmarking and experimentation module.
//!
//! Two layers:
//! - The measurement window: [`measure`] wraps one call and reports its
//!   wall-clock time and peak heap growth, [`run_benchmarked`] applies it
//!   to a solver run and stamps the figures onto the result.
//! - [`Benchmark`]: repeated seeded runs of several solvers on the same
//!   instance, with per-algorithm statistics, CSV export and a text report.
//!
//! Peak memory comes from [`TrackingAllocator`]. It only counts when the
//! binary installs it as `#[global_allocator]`; otherwise every window
//! reports 0 bytes.

use crate::error::{TspError, TspResult};
use crate::instance::TspInstance;
use crate::matrix::CostMatrix;
use crate::solution::OptimizationResult;
use crate::solver::TspSolver;

use indicatif::ProgressBar;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);

/// System allocator wrapper that tracks live and peak heap bytes.
///
/// ```no_run
/// use tsp_optim::benchmark::TrackingAllocator;
///
/// #[global_allocator]
/// static GLOBAL: TrackingAllocator = TrackingAllocator;
/// ```
pub struct TrackingAllocator;

impl TrackingAllocator {
    #[inline]
    fn grow(size: usize) {
        let now = ALLOCATED.fetch_add(size, Ordering::Relaxed) + size;
        PEAK.fetch_max(now, Ordering::Relaxed);
    }

    #[inline]
    fn shrink(size: usize) {
        ALLOCATED.fetch_sub(size, Ordering::Relaxed);
    }

    /// Live heap bytes right now.
    pub fn allocated() -> usize {
        ALLOCATED.load(Ordering::Relaxed)
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            Self::grow(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            Self::grow(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        Self::shrink(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            if new_size > layout.size() {
                Self::grow(new_size - layout.size());
            } else {
                Self::shrink(layout.size() - new_size);
            }
        }
        new_ptr
    }
}

/// Output of a measurement window
#[derive(Debug, Clone)]
pub struct Measured<T> {
    pub value: T,
    /// Wall-clock seconds
    pub elapsed: f64,
    /// Peak heap bytes above the level at window start
    pub peak_memory: u64,
}

/// Run `f` inside a measurement window.
///
/// Cost evaluations are not counted here; every engine keeps its own
/// counter. Windows opened concurrently share one high-water mark.
pub fn measure<T, F: FnOnce() -> T>(f: F) -> Measured<T> {
    let baseline = ALLOCATED.load(Ordering::Relaxed);
    PEAK.store(baseline, Ordering::Relaxed);

    let start = Instant::now();
    let value = f();
    let elapsed = start.elapsed().as_secs_f64();

    let peak = PEAK.load(Ordering::Relaxed).saturating_sub(baseline);
    Measured {
        value,
        elapsed,
        peak_memory: peak as u64,
    }
}

/// Run `solver` once and stamp time and peak memory onto its result.
pub fn run_benchmarked<S: TspSolver + ?Sized>(
    solver: &S,
    matrix: &CostMatrix,
    seed: u64,
) -> TspResult<OptimizationResult> {
    let measured = measure(|| solver.run(matrix, seed));
    let mut result = measured.value?;
    result.elapsed_time = measured.elapsed;
    result.peak_memory = measured.peak_memory;
    Ok(result)
}

/// One seeded run of one algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub algorithm: String,
    pub instance: String,
    pub dimension: usize,
    pub seed: u64,
    /// Best cost, absent when the run failed
    pub cost: Option<f64>,
    /// Computation time in seconds
    pub time: f64,
    pub peak_memory: u64,
    pub cost_function_calls: usize,
    pub iterations: usize,
    /// Gap to best known in percent
    pub gap_to_best: Option<f64>,
    pub error: Option<String>,
}

/// Aggregated statistics for an algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmStatistics {
    pub algorithm: String,
    pub num_runs: usize,
    pub num_succeeded: usize,
    pub avg_cost: f64,
    /// Sample standard deviation of cost (0 for a single run)
    pub std_cost: f64,
    pub best_cost: f64,
    pub worst_cost: f64,
    pub avg_time: f64,
    pub avg_calls: f64,
    pub avg_peak_memory: f64,
    pub avg_gap: Option<f64>,
}

/// Benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Number of seeded runs per algorithm
    pub num_runs: usize,
    /// Run `i` uses seed `base_seed + i`
    pub base_seed: u64,
    /// Run the seeds of one algorithm on rayon's pool
    pub parallel: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            num_runs: 5,
            base_seed: 0,
            parallel: false,
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    records: Vec<RunRecord>,
    best_known: HashMap<String, f64>,
    progress: Option<ProgressBar>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            records: Vec::new(),
            best_known: HashMap::new(),
            progress: None,
        }
    }

    /// Advance `bar` by one after every run.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Set best known solution for an instance
    pub fn set_best_known(&mut self, instance_name: &str, cost: f64) {
        self.best_known.insert(instance_name.to_string(), cost);
        self.refresh_gaps();
    }

    /// Run `solver` once per seed on `instance`.
    ///
    /// Failed runs are recorded with their error and logged; the best
    /// successful result is returned.
    pub fn run_solver<S>(&mut self, solver: &S, instance: &TspInstance) -> Option<OptimizationResult>
    where
        S: TspSolver + Sync + ?Sized,
    {
        log::info!(
            "Benchmarking {} on {} ({} runs)",
            solver.name(),
            instance.name,
            self.config.num_runs
        );

        let seeds: Vec<u64> = (0..self.config.num_runs as u64)
            .map(|i| self.config.base_seed + i)
            .collect();

        let progress = self.progress.clone();
        let run_one = |seed: u64| {
            let outcome = run_benchmarked(solver, &instance.matrix, seed);
            if let Some(bar) = &progress {
                bar.inc(1);
            }
            (seed, outcome)
        };

        let outcomes: Vec<(u64, TspResult<OptimizationResult>)> = if self.config.parallel {
            seeds.into_par_iter().map(run_one).collect()
        } else {
            seeds.into_iter().map(run_one).collect()
        };

        let mut best: Option<OptimizationResult> = None;
        for (seed, outcome) in outcomes {
            if let Some(result) = self.push_record(solver.name(), instance, seed, outcome) {
                if best.as_ref().map_or(true, |b| result.best_cost < b.best_cost) {
                    best = Some(result);
                }
            }
        }

        self.refresh_gaps();
        best
    }

    /// Record the outcome of a run made outside [`Benchmark::run_solver`],
    /// e.g. a single deterministic exact solve.
    pub fn record(
        &mut self,
        algorithm: &str,
        instance: &TspInstance,
        seed: u64,
        outcome: TspResult<OptimizationResult>,
    ) -> Option<OptimizationResult> {
        let result = self.push_record(algorithm, instance, seed, outcome);
        self.refresh_gaps();
        result
    }

    fn push_record(
        &mut self,
        algorithm: &str,
        instance: &TspInstance,
        seed: u64,
        outcome: TspResult<OptimizationResult>,
    ) -> Option<OptimizationResult> {
        let mut record = RunRecord {
            algorithm: algorithm.to_string(),
            instance: instance.name.clone(),
            dimension: instance.dimension(),
            seed,
            cost: None,
            time: 0.0,
            peak_memory: 0,
            cost_function_calls: 0,
            iterations: 0,
            gap_to_best: None,
            error: None,
        };

        let result = match outcome {
            Ok(result) => {
                record.cost = Some(result.best_cost);
                record.time = result.elapsed_time;
                record.peak_memory = result.peak_memory;
                record.cost_function_calls = result.cost_function_calls;
                record.iterations = result.iterations();
                Some(result)
            }
            Err(e) => {
                log::warn!("{} failed on {} (seed {}): {}", algorithm, instance.name, seed, e);
                record.error = Some(e.to_string());
                None
            }
        };

        self.records.push(record);
        result
    }

    /// Best known cost per instance is the lower of the value set by hand
    /// and the best cost any run reached.
    fn refresh_gaps(&mut self) {
        let mut best = self.best_known.clone();
        for record in &self.records {
            if let Some(cost) = record.cost {
                let entry = best.entry(record.instance.clone()).or_insert(cost);
                if cost < *entry {
                    *entry = cost;
                }
            }
        }

        for record in &mut self.records {
            record.gap_to_best = match (record.cost, best.get(&record.instance)) {
                (Some(cost), Some(&b)) if b > 0.0 => Some((cost - b) / b * 100.0),
                (Some(cost), Some(&b)) if cost == b => Some(0.0),
                _ => None,
            };
        }
    }

    /// Compute statistics for each algorithm, best average cost first.
    pub fn compute_statistics(&self) -> Vec<AlgorithmStatistics> {
        let mut order: Vec<&str> = Vec::new();
        let mut by_algorithm: HashMap<&str, Vec<&RunRecord>> = HashMap::new();

        for record in &self.records {
            let runs = by_algorithm.entry(&record.algorithm).or_insert_with(|| {
                order.push(&record.algorithm);
                Vec::new()
            });
            runs.push(record);
        }

        let mut statistics: Vec<AlgorithmStatistics> = order
            .into_iter()
            .filter_map(|algorithm| {
                let runs = &by_algorithm[algorithm];
                let succeeded: Vec<&RunRecord> = runs.iter().copied().filter(|r| r.cost.is_some()).collect();
                if succeeded.is_empty() {
                    return None;
                }

                let costs: Vec<f64> = succeeded.iter().filter_map(|r| r.cost).collect();
                let times: Vec<f64> = succeeded.iter().map(|r| r.time).collect();
                let calls: Vec<f64> = succeeded.iter().map(|r| r.cost_function_calls as f64).collect();
                let memory: Vec<f64> = succeeded.iter().map(|r| r.peak_memory as f64).collect();
                let gaps: Vec<f64> = succeeded.iter().filter_map(|r| r.gap_to_best).collect();

                let std_cost = if costs.len() > 1 { costs.iter().std_dev() } else { 0.0 };

                Some(AlgorithmStatistics {
                    algorithm: algorithm.to_string(),
                    num_runs: runs.len(),
                    num_succeeded: succeeded.len(),
                    avg_cost: costs.iter().mean(),
                    std_cost,
                    best_cost: costs.iter().cloned().fold(f64::INFINITY, f64::min),
                    worst_cost: costs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                    avg_time: times.iter().mean(),
                    avg_calls: calls.iter().mean(),
                    avg_peak_memory: memory.iter().mean(),
                    avg_gap: (!gaps.is_empty()).then(|| gaps.iter().mean()),
                })
            })
            .collect();

        statistics.sort_by_key(|s| OrderedFloat(s.avg_cost));
        statistics
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> TspResult<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for record in &self.records {
            writer.serialize(record)?;
        }

        writer.flush().map_err(TspError::from)
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> TspResult<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush().map_err(TspError::from)
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("          TSP Benchmark Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
        report.push_str(&format!(
            "Runs per algorithm: {} (seeds {}..{})\n\n",
            self.config.num_runs,
            self.config.base_seed,
            self.config.base_seed + self.config.num_runs as u64
        ));

        let stats = self.compute_statistics();

        report.push_str("Algorithm Performance Summary:\n");
        report.push_str("-".repeat(104).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<24} {:>8} {:>12} {:>10} {:>12} {:>9} {:>10} {:>12}\n",
            "Algorithm", "OK", "Avg Cost", "Std", "Best Cost", "Avg Gap%", "Avg Time", "Avg Calls"
        ));
        report.push_str("-".repeat(104).as_str());
        report.push('\n');

        for stat in &stats {
            let gap_str = stat
                .avg_gap
                .map(|g| format!("{:.2}%", g))
                .unwrap_or_else(|| "-".to_string());

            report.push_str(&format!(
                "{:<24} {:>8} {:>12.2} {:>10.2} {:>12.2} {:>9} {:>10.4} {:>12.0}\n",
                stat.algorithm,
                format!("{}/{}", stat.num_succeeded, stat.num_runs),
                stat.avg_cost,
                stat.std_cost,
                stat.best_cost,
                gap_str,
                stat.avg_time,
                stat.avg_calls
            ));
        }

        report.push_str("-".repeat(104).as_str());
        report.push('\n');

        let failures: Vec<&RunRecord> = self.records.iter().filter(|r| r.error.is_some()).collect();
        if !failures.is_empty() {
            report.push_str("\nFailed runs:\n");
            for record in failures {
                report.push_str(&format!(
                    "  {} seed {}: {}\n",
                    record.algorithm,
                    record.seed,
                    record.error.as_deref().unwrap_or_default()
                ));
            }
        }

        report.push_str("\nBest Solutions per Instance:\n");

        let mut instance_best: Vec<&RunRecord> = Vec::new();
        for record in self.records.iter().filter(|r| r.cost.is_some()) {
            match instance_best.iter().position(|b| b.instance == record.instance) {
                Some(i) if record.cost < instance_best[i].cost => instance_best[i] = record,
                Some(_) => {}
                None => instance_best.push(record),
            }
        }

        for best in instance_best {
            report.push_str(&format!(
                "  {}: {:.4} ({}, seed {})\n",
                best.instance,
                best.cost.unwrap_or(f64::NAN),
                best.algorithm,
                best.seed
            ));
        }

        report
    }

    /// Get all run records
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Get best known values set by hand
    pub fn best_known(&self) -> &HashMap<String, f64> {
        &self.best_known
    }
}
