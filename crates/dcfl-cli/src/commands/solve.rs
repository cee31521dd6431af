use std::path::Path;

use anyhow::{Context, Result};
use dcfl_algo::benders::{FacilityOutcome, PoolEntry};
use dcfl_algo::cluster::ClusterAssignment;
use dcfl_algo::{solve, BendersSolution, SolveStatus};
use serde::Serialize;
use tracing::info;

use super::util::{load_config, load_instance, resolve_threads, write_json};

#[derive(Serialize)]
struct SolveOutput<'a> {
    instance: &'a str,
    status: SolveStatus,
    optimal: bool,
    objective: f64,
    revenue: f64,
    fixed_cost: f64,
    best_bound: Option<f64>,
    gap: Option<f64>,
    levels: &'a [Option<usize>],
    facilities: &'a [FacilityOutcome],
    iterations: usize,
    cuts_added: usize,
    nodes: usize,
    explored: &'a [PoolEntry],
    clusters: Option<&'a ClusterAssignment>,
    solve_time_ms: f64,
}

impl<'a> SolveOutput<'a> {
    fn new(instance: &'a str, solution: &'a BendersSolution) -> Self {
        let finite = |v: f64| v.is_finite().then_some(v);
        Self {
            instance,
            status: solution.status,
            optimal: solution.optimal,
            objective: solution.objective,
            revenue: solution.revenue,
            fixed_cost: solution.fixed_cost,
            best_bound: finite(solution.best_bound),
            gap: finite(solution.gap),
            levels: &solution.levels,
            facilities: &solution.facilities,
            iterations: solution.iterations,
            cuts_added: solution.cuts_added,
            nodes: solution.nodes,
            explored: &solution.explored,
            clusters: solution.clusters.as_ref(),
            solve_time_ms: solution.solve_time.as_secs_f64() * 1000.0,
        }
    }
}

pub fn handle(
    instance_path: &Path,
    config_path: Option<&Path>,
    threads: Option<&str>,
    strategy: Option<usize>,
    out: Option<&Path>,
) -> Result<()> {
    let instance = load_instance(instance_path)?;
    let mut config = load_config(config_path)?;
    if let Some(value) = threads {
        config.threads = resolve_threads(value)?;
    }
    if strategy.is_some() {
        config.strategy = strategy;
    }

    info!(
        instance = %instance.name,
        facilities = instance.num_facilities(),
        customers = instance.num_customers(),
        scenarios = instance.num_scenarios(),
        threads = config.threads,
        "solving"
    );
    let solution = solve(&instance, &config).context("Benders solve failed")?;
    println!("{}", solution.summary());

    if let Some(path) = out {
        write_json(&SolveOutput::new(&instance.name, &solution), Some(path))?;
    }
    Ok(())
}
