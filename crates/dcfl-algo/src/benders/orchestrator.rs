//! Benders master/subproblem loop.
//!
//! ```text
//! Init → SolvingMaster ⇄ SolvingSubproblems → GeneratingCuts
//!      → Converged | InfeasibleMaster | LimitReached
//! ```
//!
//! The master holds one binary per priced option, assignment variables for
//! retained customer-scenario pairs, and one estimate `z_b` per decomposed
//! block. In the default lazy mode a single branch-and-cut tree is solved and
//! every integer incumbent goes through [`Separator`], which evaluates the
//! blocks exactly and returns the cuts that cut off overestimated `z`. The
//! iterative mode re-solves the master after each round instead.

use dcfl_core::Instance;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use web_time::Instant;

use super::blocks::BlockLayout;
use super::branch_and_cut::{BranchAndCut, BranchAndCutSettings};
use super::config::{BendersConfig, CutAggregation, MasterMode, PresolveInjection};
use super::cuts::{aggregate, disaggregate, BendersCut, BlockCut, CutGenerator, CutKind};
use super::master::{
    AcceptAll, LinearRow, MasterSolver, MasterStatus, ScopedRow, SeparationHooks, VarId,
};
use super::model::{ChoiceModel, Configuration};
use super::solution::{BendersSolution, FacilityOutcome, PoolEntry, SolutionPool, SolveStatus};
use super::subproblem::SubproblemSolver;
use crate::bounds::UtilityBounds;
use crate::error::{BendersError, BendersResult};
use crate::preprocess::CaptiveMap;

/// Orchestrator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    SolvingMaster,
    SolvingSubproblems,
    GeneratingCuts,
    Converged,
    InfeasibleMaster,
    LimitReached,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Converged | Phase::InfeasibleMaster | Phase::LimitReached
        )
    }
}

/// Mutable run state, owned by the orchestrator for one run.
#[derive(Debug)]
pub struct OrchestratorState {
    pub phase: Phase,
    pub iterations: usize,
    pub cuts_added: usize,
    pub pool: SolutionPool,
    /// Best exactly evaluated configuration and its objective
    pub best: Option<(Configuration, f64)>,
    lazy_pool: Vec<BendersCut>,
    started: Instant,
}

impl OrchestratorState {
    fn new(pool_capacity: usize) -> Self {
        Self {
            phase: Phase::Init,
            iterations: 0,
            cuts_added: 0,
            pool: SolutionPool::new(pool_capacity),
            best: None,
            lazy_pool: Vec::new(),
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            debug!(from = ?self.phase, to = ?next, "phase transition");
            self.phase = next;
        }
    }

    /// Pool an exactly evaluated configuration, reporting it if new.
    fn record(
        &mut self,
        config: &Configuration,
        levels: Vec<Option<usize>>,
        objective: f64,
        observer: &mut dyn FnMut(&PoolEntry),
    ) {
        if !self.pool.contains(config) {
            let entry = PoolEntry {
                levels,
                objective,
                configuration: config.clone(),
            };
            observer(&entry);
            self.pool.insert_entry(entry);
        }
        self.offer(config, objective);
    }

    fn offer(&mut self, config: &Configuration, objective: f64) {
        if self.best.as_ref().map_or(true, |(_, best)| objective > *best) {
            self.best = Some((config.clone(), objective));
        }
    }
}

/// Assignment variables of one retained pair, aligned with its ranking.
#[derive(Debug, Clone)]
struct RetainedVars {
    customer: usize,
    scenario: usize,
    fallback: VarId,
    ranked: Vec<VarId>,
}

/// Handles of every master variable.
#[derive(Debug, Clone)]
struct MasterVars {
    y: Vec<VarId>,
    z: Vec<VarId>,
    retained: Vec<RetainedVars>,
    n_vars: usize,
}

impl MasterVars {
    fn y_values(&self, values: &[f64]) -> Vec<f64> {
        self.y.iter().map(|v| values[v.index()]).collect()
    }

    fn z_values(&self, values: &[f64]) -> Vec<f64> {
        self.z.iter().map(|v| values[v.index()]).collect()
    }
}

/// Benders engine for one instance and configuration.
pub struct BendersOrchestrator<'a> {
    instance: &'a Instance,
    bounds: &'a UtilityBounds,
    model: ChoiceModel,
    layout: BlockLayout,
    config: BendersConfig,
    /// Blocks summed by each aggregate cut
    groups: Vec<Vec<usize>>,
    workers: rayon::ThreadPool,
}

impl<'a> BendersOrchestrator<'a> {
    pub fn new(
        instance: &'a Instance,
        bounds: &'a UtilityBounds,
        captive: &CaptiveMap,
        config: BendersConfig,
    ) -> BendersResult<Self> {
        config.validate()?;

        let strategy = match config.strategy {
            Some(s) => Some(instance.strategies.get(s).ok_or_else(|| {
                BendersError::InvalidConfig(format!(
                    "strategy {} requested, instance has {}",
                    s,
                    instance.strategies.len()
                ))
            })?),
            None => None,
        };
        let model = ChoiceModel::build(instance, captive, strategy)?;
        let layout = BlockLayout::build(
            instance.num_customers(),
            instance.num_scenarios(),
            config.granularity,
            &config.retention,
        )?;

        if config.aggregation == CutAggregation::None && !layout.is_monolithic() {
            return Err(BendersError::InvalidConfig(
                "aggregation 'none' requires every pair to be retained in the master".to_string(),
            ));
        }
        if let Some(groups) = &config.cut_groups {
            let expected = match groups.dimension {
                super::config::ClusterDimension::Scenario => instance.num_scenarios(),
                super::config::ClusterDimension::Customer => instance.num_customers(),
            };
            if groups.labels.len() != expected {
                return Err(BendersError::InvalidConfig(format!(
                    "cut groups carry {} labels, expected {}",
                    groups.labels.len(),
                    expected
                )));
            }
        }
        let groups = layout.groups(config.cut_groups.as_ref());

        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| BendersError::ThreadPool(e.to_string()))?;

        Ok(Self {
            instance,
            bounds,
            model,
            layout,
            config,
            groups,
            workers,
        })
    }

    pub fn model(&self) -> &ChoiceModel {
        &self.model
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    fn tolerance(&self, scale: f64) -> f64 {
        self.config.tolerance * (1.0 + scale.abs())
    }

    fn time_exceeded(&self, state: &OrchestratorState) -> bool {
        self.config
            .time_limit_secs
            .map_or(false, |limit| state.started.elapsed().as_secs_f64() >= limit)
    }

    /// Run the engine to termination.
    pub fn run(&self) -> BendersResult<BendersSolution> {
        self.run_observed(|_| {})
    }

    /// Run the engine, handing every newly pooled configuration to
    /// `observer` as soon as it has been evaluated. The pool itself keeps at
    /// most `pool_capacity` entries.
    pub fn run_observed<F>(&self, mut observer: F) -> BendersResult<BendersSolution>
    where
        F: FnMut(&PoolEntry),
    {
        let observer: &mut dyn FnMut(&PoolEntry) = &mut observer;
        let mut state = OrchestratorState::new(self.config.pool_capacity);
        info!(
            options = self.model.n_options(),
            retained_pairs = self.layout.retained.len(),
            blocks = self.layout.blocks.len(),
            mode = ?self.config.master_mode,
            "starting Benders run"
        );

        let mut master = BranchAndCut::new(BranchAndCutSettings {
            max_nodes: self.config.max_nodes,
            time_limit_secs: self.config.time_limit_secs,
            integrality_tol: self.config.tolerance,
            feasibility_tol: self.config.tolerance,
            ..BranchAndCutSettings::default()
        });
        let vars = self.build_master(&mut master);

        if self.config.presolve_cuts {
            self.add_presolve_cuts(&mut master, &vars, &mut state);
        }
        if self.config.warm_start {
            self.apply_warm_start(&mut master, &vars, &mut state, &mut *observer)?;
        }

        let status = match self.config.master_mode {
            MasterMode::Lazy => {
                master.set_fractional_separation(
                    self.config.separation_fractional,
                    self.config.fractional_rounds,
                );
                state.transition(Phase::SolvingMaster);
                let mut hooks = Separator {
                    engine: self,
                    vars: &vars,
                    state: &mut state,
                    observer: &mut *observer,
                    lazy: true,
                };
                master.solve(&mut hooks)?
            }
            MasterMode::Iterative => {
                self.run_iterative(&mut master, &vars, &mut state, &mut *observer)?
            }
        };

        self.finish(status, &master, &vars, state)
    }

    /// Variables, structural rows and objective of the master.
    fn build_master(&self, master: &mut dyn MasterSolver) -> MasterVars {
        let model = &self.model;
        let y: Vec<VarId> = (0..model.n_options())
            .map(|_| master.add_binary_variable())
            .collect();
        let mut objective: Vec<(VarId, f64)> = Vec::new();
        let mut constant = 0.0;

        for opts in &model.facility_options {
            if opts.len() > 1 {
                master.add_linear_constraint(LinearRow::le(
                    opts.iter().map(|&k| (y[k], 1.0)).collect(),
                    1.0,
                ));
            }
        }
        let all_y: Vec<(VarId, f64)> = y.iter().map(|v| (*v, 1.0)).collect();
        if model.min_open > 0 {
            master.add_linear_constraint(LinearRow::ge(all_y.clone(), model.min_open as f64));
        }
        if let Some(max_open) = model.max_open {
            master.add_linear_constraint(LinearRow::le(all_y, max_open as f64));
        }
        for (k, var) in y.iter().enumerate() {
            let cost = model.option_fixed_cost(k);
            if cost != 0.0 {
                objective.push((*var, -cost));
            }
        }

        let mut retained = Vec::new();
        for &(n, r) in &self.layout.retained {
            let ranking = model.ranking(n, r);
            let w = model.weight(n);
            if ranking.is_fixed() {
                constant += w * ranking.fallback_margin;
                continue;
            }
            let x_fb = master.add_continuous_variable(0.0, 1.0);
            let x_ranked: Vec<VarId> = ranking
                .ranked
                .iter()
                .map(|_| master.add_continuous_variable(0.0, 1.0))
                .collect();

            let mut assign = vec![(x_fb, 1.0)];
            assign.extend(x_ranked.iter().map(|v| (*v, 1.0)));
            master.add_linear_constraint(LinearRow::eq(assign, 1.0));

            // utility of the chosen alternative
            let mut chosen_u = vec![(x_fb, ranking.fallback_utility)];
            chosen_u.extend(
                x_ranked
                    .iter()
                    .zip(&ranking.ranked)
                    .map(|(v, ro)| (*v, ro.utility)),
            );
            let big_m = self.bounds.big_m(n, r);

            for (t, ro) in ranking.ranked.iter().enumerate() {
                let y_t = y[ro.option];
                master.add_linear_constraint(LinearRow::le(
                    vec![(x_ranked[t], 1.0), (y_t, -1.0)],
                    0.0,
                ));

                let mut row = chosen_u.clone();
                row.push((y_t, -big_m));
                master.add_linear_constraint(LinearRow::ge(row, ro.utility - big_m));

                // equal utility: the earlier alternative wins whenever it is open
                for (s, later) in ranking.ranked.iter().enumerate().skip(t + 1) {
                    if later.utility == ro.utility {
                        master.add_linear_constraint(LinearRow::le(
                            vec![(x_ranked[s], 1.0), (y_t, 1.0)],
                            1.0,
                        ));
                    }
                }
                if ranking.fallback_utility == ro.utility {
                    master.add_linear_constraint(LinearRow::le(vec![(x_fb, 1.0), (y_t, 1.0)], 1.0));
                }

                objective.push((x_ranked[t], w * ro.margin));
            }
            if ranking.fallback_margin != 0.0 {
                objective.push((x_fb, w * ranking.fallback_margin));
            }

            retained.push(RetainedVars {
                customer: n,
                scenario: r,
                fallback: x_fb,
                ranked: x_ranked,
            });
        }

        let mut z = Vec::with_capacity(self.layout.blocks.len());
        for block in &self.layout.blocks {
            let (mut lo, mut hi) = (0.0, 0.0);
            for &(n, r) in &block.pairs {
                let (min_m, max_m) = model.ranking(n, r).margin_range();
                lo += model.weight(n) * min_m;
                hi += model.weight(n) * max_m;
            }
            let var = master.add_continuous_variable(lo, hi);
            objective.push((var, 1.0));
            z.push(var);
        }

        master.set_objective(objective, constant);
        debug!(
            variables = master.num_variables(),
            constraints = master.num_constraints(),
            "master built"
        );
        MasterVars {
            y,
            z,
            retained,
            n_vars: master.num_variables(),
        }
    }

    fn cut_row(&self, vars: &MasterVars, cut: &BendersCut) -> LinearRow {
        let mut terms: Vec<(VarId, f64)> = cut.blocks.iter().map(|b| (vars.z[*b], 1.0)).collect();
        terms.extend(cut.coefs.iter().map(|(k, c)| (vars.y[*k], -c)));
        LinearRow::le(terms, cut.constant)
    }

    /// Shape block cuts according to the aggregation mode.
    fn shape_cuts(&self, cuts: &[BlockCut], presolve: bool) -> Vec<BendersCut> {
        let all: Vec<usize> = (0..cuts.len()).collect();
        match self.config.aggregation {
            CutAggregation::None => Vec::new(),
            CutAggregation::Disaggregate => {
                let kind = if presolve { CutKind::Presolve } else { CutKind::Disaggregate };
                disaggregate(cuts, &all, kind)
            }
            CutAggregation::Aggregate => {
                let kind = if presolve { CutKind::Presolve } else { CutKind::Aggregate };
                self.groups
                    .iter()
                    .filter_map(|group| {
                        let members: Vec<usize> = all
                            .iter()
                            .copied()
                            .filter(|&i| group.contains(&cuts[i].block))
                            .collect();
                        aggregate(cuts, &members, kind)
                    })
                    .collect()
            }
        }
    }

    /// Block cuts at an integer configuration for the listed blocks.
    fn integer_block_cuts(&self, y: &[f64], blocks: &[usize]) -> Vec<BlockCut> {
        let generator = CutGenerator::new(&self.model);
        self.workers.install(|| {
            blocks
                .par_iter()
                .map(|&b| generator.block_cut(&self.layout.blocks[b], y, true))
                .collect()
        })
    }

    fn block_values(&self, config: &Configuration) -> Vec<f64> {
        let solver = SubproblemSolver::new(&self.model);
        self.workers
            .install(|| solver.block_values(&self.layout.blocks, config))
    }

    /// Exact objective from block values plus the retained pairs.
    fn objective_from_blocks(&self, config: &Configuration, block_values: &[f64]) -> f64 {
        let solver = SubproblemSolver::new(&self.model);
        let retained: f64 = self
            .layout
            .retained
            .iter()
            .map(|&(n, r)| solver.pair_value(n, r, config))
            .sum();
        retained + block_values.iter().sum::<f64>() - self.model.fixed_cost(config)
    }

    fn presolve_configurations(&self) -> Vec<Configuration> {
        let n = self.model.n_options();
        let mut configs = vec![Configuration::closed(n)];
        for k in 0..n {
            let mut c = Configuration::closed(n);
            c.set(k, true);
            configs.push(c);
        }
        let max_levels = self
            .model
            .facility_options
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        for level in 0..max_levels {
            let mut c = Configuration::closed(n);
            for opts in &self.model.facility_options {
                if let Some(&k) = opts.get(level) {
                    c.set(k, true);
                }
            }
            if !configs.contains(&c) {
                configs.push(c);
            }
        }
        configs
    }

    fn add_presolve_cuts(
        &self,
        master: &mut dyn MasterSolver,
        vars: &MasterVars,
        state: &mut OrchestratorState,
    ) {
        if self.layout.is_monolithic() {
            return;
        }
        let all_blocks: Vec<usize> = (0..self.layout.blocks.len()).collect();
        let mut cuts = Vec::new();
        for config in self.presolve_configurations() {
            let y = config.as_values();
            let block_cuts = self.integer_block_cuts(&y, &all_blocks);
            cuts.extend(self.shape_cuts(&block_cuts, true));
        }
        match self.config.presolve_injection {
            PresolveInjection::Constraints => {
                for cut in &cuts {
                    master.add_linear_constraint(self.cut_row(vars, cut));
                }
                state.cuts_added += cuts.len();
            }
            PresolveInjection::LazyPool => state.lazy_pool.extend(cuts),
        }
        debug!(
            constraints = state.cuts_added,
            pooled = state.lazy_pool.len(),
            "presolve cuts generated"
        );
    }

    /// Greedy add heuristic: open the best single option while it pays off.
    fn greedy_configuration(&self) -> Configuration {
        let solver = SubproblemSolver::new(&self.model);
        let n = self.model.n_options();
        let mut current = Configuration::closed(n);
        let mut value = solver.evaluate(&current).objective;

        loop {
            if self
                .model
                .max_open
                .map_or(false, |max| current.num_open() >= max)
            {
                break;
            }
            let candidates: Vec<usize> = (0..n)
                .filter(|&k| {
                    let facility = self.model.options[k].facility;
                    !self.model.facility_options[facility]
                        .iter()
                        .any(|&o| current.is_open(o))
                })
                .collect();
            let scored: Vec<(usize, f64)> = self.workers.install(|| {
                candidates
                    .par_iter()
                    .map(|&k| {
                        let mut next = current.clone();
                        next.set(k, true);
                        (k, solver.evaluate(&next).objective)
                    })
                    .collect()
            });
            let Some(&(k, obj)) = scored
                .iter()
                .fold(None, |best: Option<&(usize, f64)>, c| match best {
                    Some(b) if b.1 >= c.1 => Some(b),
                    _ => Some(c),
                })
            else {
                break;
            };
            if obj > value || current.num_open() < self.model.min_open {
                current.set(k, true);
                value = obj;
            } else {
                break;
            }
        }
        current
    }

    fn warm_start_configuration(&self) -> BendersResult<Option<Configuration>> {
        let config = match &self.config.initial_configuration {
            Some(levels) => self.model.configuration_from_levels(levels)?,
            None => self.greedy_configuration(),
        };
        if self.model.is_feasible(&config) {
            Ok(Some(config))
        } else {
            warn!("warm start configuration violates the open limits, skipped");
            Ok(None)
        }
    }

    fn apply_warm_start(
        &self,
        master: &mut dyn MasterSolver,
        vars: &MasterVars,
        state: &mut OrchestratorState,
        observer: &mut dyn FnMut(&PoolEntry),
    ) -> BendersResult<()> {
        let Some(config) = self.warm_start_configuration()? else {
            return Ok(());
        };
        let block_values = self.block_values(&config);
        let objective = self.objective_from_blocks(&config, &block_values);
        state.record(&config, self.model.levels(&config), objective, observer);

        let y = config.as_values();
        let all_blocks: Vec<usize> = (0..self.layout.blocks.len()).collect();
        let cuts = self.shape_cuts(&self.integer_block_cuts(&y, &all_blocks), false);
        for cut in &cuts {
            master.add_linear_constraint(self.cut_row(vars, cut));
        }
        state.cuts_added += cuts.len();

        master.set_mip_start(self.start_values(vars, &config, &block_values));
        info!(objective, "warm start evaluated");
        Ok(())
    }

    /// Full master assignment for an integer configuration.
    fn start_values(
        &self,
        vars: &MasterVars,
        config: &Configuration,
        block_values: &[f64],
    ) -> Vec<f64> {
        let mut values = vec![0.0; vars.n_vars];
        for (k, var) in vars.y.iter().enumerate() {
            values[var.index()] = if config.is_open(k) { 1.0 } else { 0.0 };
        }
        for (b, var) in vars.z.iter().enumerate() {
            values[var.index()] = block_values[b];
        }
        for pair in &vars.retained {
            let ranking = self.model.ranking(pair.customer, pair.scenario);
            match ranking.first_open(config.as_slice()) {
                Some(t) => values[pair.ranked[t].index()] = 1.0,
                None => values[pair.fallback.index()] = 1.0,
            }
        }
        values
    }

    /// One-flip neighbours of a configuration that respect the limits.
    fn neighbours(&self, config: &Configuration) -> Vec<Configuration> {
        let mut out = Vec::new();
        for k in 0..self.model.n_options() {
            let mut next = config.clone();
            if next.is_open(k) {
                next.set(k, false);
            } else {
                let facility = self.model.options[k].facility;
                for &o in &self.model.facility_options[facility] {
                    next.set(o, false);
                }
                next.set(k, true);
            }
            if self.model.is_feasible(&next) && !out.contains(&next) && next != *config {
                out.push(next);
            }
        }
        out
    }

    /// Cuts mined from the best neighbours of the incumbent.
    fn extra_solution_cuts(
        &self,
        config: &Configuration,
        y: &[f64],
        z: &[f64],
        state: &mut OrchestratorState,
    ) -> Vec<BendersCut> {
        let n_blocks = self.layout.blocks.len();
        if n_blocks == 0 {
            return Vec::new();
        }
        let neighbours = self.neighbours(config);
        let mut scored: Vec<(Configuration, Vec<f64>, f64)> = neighbours
            .into_iter()
            .map(|c| {
                let values = self.block_values(&c);
                let obj = self.objective_from_blocks(&c, &values);
                (c, values, obj)
            })
            .collect();
        scored.sort_by(|a, b| b.2.total_cmp(&a.2));
        scored.truncate(self.config.extra_solutions_max);

        let all_blocks: Vec<usize> = (0..n_blocks).collect();
        let mut out = Vec::new();
        for (neighbour, _, obj) in scored {
            state.offer(&neighbour, obj);
            let ny = neighbour.as_values();
            let block_cuts = self.integer_block_cuts(&ny, &all_blocks);
            let violated: Vec<BlockCut> = block_cuts
                .into_iter()
                .filter(|c| z[c.block] > c.rhs(y) + self.tolerance(c.rhs(y)))
                .collect();
            let fraction = violated.len() as f64 / n_blocks as f64;
            if !violated.is_empty() && fraction >= self.config.extra_solutions_min_fraction {
                out.extend(self.shape_cuts(&violated, false));
            }
        }
        out
    }

    fn no_good_row(&self, vars: &MasterVars, y: &[f64]) -> LinearRow {
        let mut ones = 0.0;
        let terms = vars
            .y
            .iter()
            .zip(y)
            .map(|(var, v)| {
                if *v > 0.5 {
                    ones += 1.0;
                    (*var, -1.0)
                } else {
                    (*var, 1.0)
                }
            })
            .collect();
        LinearRow::ge(terms, 1.0 - ones)
    }

    fn run_iterative(
        &self,
        master: &mut dyn MasterSolver,
        vars: &MasterVars,
        state: &mut OrchestratorState,
        observer: &mut dyn FnMut(&PoolEntry),
    ) -> BendersResult<MasterStatus> {
        loop {
            if state.iterations >= self.config.max_iterations || self.time_exceeded(state) {
                return Ok(MasterStatus::LimitReached);
            }
            state.transition(Phase::SolvingMaster);
            let status = master.solve(&mut AcceptAll)?;
            if status != MasterStatus::Optimal {
                return Ok(status);
            }
            let Some(values) = master.incumbent().map(<[f64]>::to_vec) else {
                return Ok(MasterStatus::Infeasible);
            };

            let rows = {
                let mut separator = Separator {
                    engine: self,
                    vars,
                    state: &mut *state,
                    observer: &mut *observer,
                    lazy: false,
                };
                separator.on_integer_incumbent(&values)
            };
            let tol = self.config.tolerance;
            let violated = rows.iter().any(|r| r.row.is_violated(&values, tol));
            for scoped in rows {
                master.add_linear_constraint(scoped.row);
            }
            if !violated {
                return Ok(MasterStatus::Optimal);
            }
        }
    }

    fn finish(
        &self,
        status: MasterStatus,
        master: &BranchAndCut,
        vars: &MasterVars,
        mut state: OrchestratorState,
    ) -> BendersResult<BendersSolution> {
        if let Some(values) = master.incumbent() {
            let config = Configuration::from_values(&vars.y_values(values));
            let objective = SubproblemSolver::new(&self.model).evaluate(&config).objective;
            state.offer(&config, objective);
        }

        let solve_status = match status {
            MasterStatus::Optimal => SolveStatus::Converged,
            MasterStatus::Infeasible if self.config.enumeration && !state.pool.is_empty() => {
                SolveStatus::Converged
            }
            MasterStatus::Infeasible => {
                state.transition(Phase::InfeasibleMaster);
                return Err(BendersError::MasterInfeasible(
                    "no configuration satisfies the facility and open-limit constraints"
                        .to_string(),
                ));
            }
            MasterStatus::LimitReached => SolveStatus::LimitReached,
        };
        let Some((config, _)) = state.best.clone() else {
            state.transition(Phase::LimitReached);
            return Err(BendersError::NoIncumbent(
                "node, iteration or time".to_string(),
            ));
        };

        let eval = SubproblemSolver::new(&self.model).evaluate(&config);
        let (best_bound, gap) = match solve_status {
            SolveStatus::Converged => {
                state.transition(Phase::Converged);
                (eval.objective, 0.0)
            }
            SolveStatus::LimitReached => {
                state.transition(Phase::LimitReached);
                let bound = master.best_bound().max(eval.objective);
                (bound, bound - eval.objective)
            }
        };

        let levels = self.model.levels(&config);
        let total_population = self.instance.total_population();
        let facilities = self
            .instance
            .facilities
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let (open, price) = match (self.model.existing_prices[i], levels[i]) {
                    (Some(p), _) => (true, Some(p)),
                    (None, Some(level)) => {
                        let k = self.model.facility_options[i][level];
                        (true, Some(self.model.options[k].price))
                    }
                    (None, None) => (false, None),
                };
                let demand = eval.demand[i];
                FacilityOutcome {
                    facility: i,
                    name: f.name.clone(),
                    open,
                    price,
                    level: levels[i],
                    demand,
                    market_share: if total_population > 0.0 {
                        demand / total_population
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        let stats = master.stats();
        info!(
            status = ?solve_status,
            objective = eval.objective,
            iterations = state.iterations,
            cuts = state.cuts_added,
            nodes = stats.nodes,
            "Benders run finished"
        );

        let explored = if self.config.enumeration {
            state.pool.iter().cloned().collect()
        } else {
            Vec::new()
        };
        Ok(BendersSolution {
            status: solve_status,
            optimal: solve_status == SolveStatus::Converged,
            objective: eval.objective,
            revenue: eval.revenue,
            fixed_cost: eval.fixed_cost,
            best_bound,
            gap,
            facilities,
            levels,
            iterations: state.iterations,
            cuts_added: state.cuts_added,
            nodes: stats.nodes,
            explored,
            clusters: None,
            solve_time: state.started.elapsed(),
        })
    }
}

/// Separation callbacks bound to one run.
struct Separator<'e, 's> {
    engine: &'e BendersOrchestrator<'e>,
    vars: &'e MasterVars,
    state: &'s mut OrchestratorState,
    observer: &'s mut dyn FnMut(&PoolEntry),
    /// Enumeration no-goods are node-local inside a lazy tree
    lazy: bool,
}

impl SeparationHooks for Separator<'_, '_> {
    fn on_integer_incumbent(&mut self, values: &[f64]) -> Vec<ScopedRow> {
        let engine = self.engine;
        let vars = self.vars;
        self.state.iterations += 1;
        self.state.transition(Phase::SolvingSubproblems);

        let y = vars.y_values(values);
        let z = vars.z_values(values);
        let config = Configuration::from_values(&y);

        if !self.state.lazy_pool.is_empty() {
            let pooled = std::mem::take(&mut self.state.lazy_pool);
            let (hit, rest): (Vec<BendersCut>, Vec<BendersCut>) = pooled
                .into_iter()
                .partition(|cut| cut.violation(&z, &y) > engine.tolerance(cut.rhs(&y)));
            self.state.lazy_pool = rest;
            if !hit.is_empty() {
                debug!(cuts = hit.len(), "pooled presolve cuts violated");
                self.state.cuts_added += hit.len();
                self.state.transition(Phase::SolvingMaster);
                return hit
                    .iter()
                    .map(|cut| ScopedRow::global(engine.cut_row(vars, cut)))
                    .collect();
            }
        }

        let block_values = engine.block_values(&config);
        let objective = engine.objective_from_blocks(&config, &block_values);
        self.state
            .record(&config, engine.model.levels(&config), objective, &mut *self.observer);

        self.state.transition(Phase::GeneratingCuts);
        let violated: Vec<usize> = block_values
            .iter()
            .enumerate()
            .filter(|(b, v)| z[*b] > **v + engine.tolerance(**v))
            .map(|(b, _)| b)
            .collect();
        let selected: Vec<usize> = if engine.config.subset_cuts {
            violated.clone()
        } else {
            (0..block_values.len()).collect()
        };

        let mut cuts = if selected.is_empty() {
            Vec::new()
        } else {
            engine.shape_cuts(&engine.integer_block_cuts(&y, &selected), false)
        };
        if engine.config.extra_solutions && !violated.is_empty() {
            cuts.extend(engine.extra_solution_cuts(&config, &y, &z, self.state));
        }
        self.state.cuts_added += cuts.len();

        let mut rows: Vec<ScopedRow> = cuts
            .iter()
            .map(|cut| ScopedRow::global(engine.cut_row(vars, cut)))
            .collect();

        if engine.config.enumeration
            && self.state.pool.distinct_seen() < engine.config.min_enumerated_solutions
        {
            let row = engine.no_good_row(vars, &y);
            rows.push(if self.lazy {
                ScopedRow::node(row)
            } else {
                ScopedRow::global(row)
            });
        }

        debug!(
            iteration = self.state.iterations,
            objective,
            violated_blocks = violated.len(),
            rows = rows.len(),
            "integer incumbent separated"
        );
        self.state.transition(Phase::SolvingMaster);
        rows
    }

    fn on_fractional_node(&mut self, values: &[f64]) -> Vec<LinearRow> {
        let engine = self.engine;
        if engine.layout.is_monolithic() {
            return Vec::new();
        }
        let y = self.vars.y_values(values);
        let z = self.vars.z_values(values);
        let generator = CutGenerator::new(&engine.model);
        let block_cuts = engine
            .workers
            .install(|| generator.block_cuts(&engine.layout.blocks, &y, false));
        let violated: Vec<BlockCut> = block_cuts
            .into_iter()
            .filter(|c| {
                let rhs = c.rhs(&y);
                z[c.block] > rhs + engine.tolerance(rhs)
            })
            .collect();
        let cuts = engine.shape_cuts(&violated, false);
        self.state.cuts_added += cuts.len();
        cuts.iter().map(|cut| engine.cut_row(self.vars, cut)).collect()
    }

    fn should_terminate(&self) -> bool {
        self.state.iterations >= self.engine.config.max_iterations
            || self.engine.time_exceeded(&*self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benders::config::Retention;
    use crate::bounds::{BoundCalculator, PriceBounds};
    use crate::preprocess::choice_preprocess;
    use dcfl_core::{InstanceBuilder, UtilityTerms};

    /// Opt-out plus one candidate priced 1..5; best is price 3 for profit 8.
    fn toy() -> Instance {
        let wtp = [[2.5, 3.5, 4.5, 5.5], [1.5, 3.5, 3.6, 4.2]];
        let mut builder = InstanceBuilder::new("toy", 2);
        for n in 0..4 {
            builder = builder.customer(format!("c{}", n), 1.0);
        }
        builder
            .existing("opt-out", 1, 0.0)
            .candidate("site", 1.0, vec![1.0, 2.0, 3.0, 4.0, 5.0])
            .utilities(move |i, n, r| match i {
                0 => UtilityTerms::new(0.0, 0.0, 0.0),
                _ => UtilityTerms::new(wtp[r][n], -1.0, 0.0),
            })
            .build()
            .unwrap()
    }

    fn run(instance: &Instance, config: BendersConfig) -> BendersResult<BendersSolution> {
        let bounds =
            BoundCalculator::new().compute(instance, &PriceBounds::from_instance(instance))?;
        let captive = choice_preprocess(instance, &bounds);
        BendersOrchestrator::new(instance, &bounds, &captive, config)?.run()
    }

    fn assert_toy_optimum(solution: &BendersSolution) {
        assert_eq!(solution.status, SolveStatus::Converged);
        assert!((solution.objective - 8.0).abs() < 1e-6, "objective {}", solution.objective);
        assert_eq!(solution.levels, vec![None, Some(2)]);
        let site = &solution.facilities[1];
        assert!(site.open);
        assert_eq!(site.price, Some(3.0));
        assert!((site.demand - 3.0).abs() < 1e-9);
        assert!((site.market_share - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_lazy_default_finds_toy_optimum() {
        let solution = run(&toy(), BendersConfig::default()).unwrap();
        assert_toy_optimum(&solution);
        assert!(solution.iterations >= 1);
    }

    #[test]
    fn test_iterative_mode_matches_lazy() {
        let config = BendersConfig {
            master_mode: MasterMode::Iterative,
            warm_start: false,
            ..BendersConfig::default()
        };
        assert_toy_optimum(&run(&toy(), config).unwrap());
    }

    #[test]
    fn test_monolithic_master() {
        let config = BendersConfig {
            aggregation: CutAggregation::None,
            retention: Retention::All,
            ..BendersConfig::default()
        };
        assert_toy_optimum(&run(&toy(), config).unwrap());
    }

    #[test]
    fn test_no_aggregation_requires_retention() {
        let config = BendersConfig {
            aggregation: CutAggregation::None,
            ..BendersConfig::default()
        };
        assert!(matches!(run(&toy(), config), Err(BendersError::InvalidConfig(_))));
    }

    #[test]
    fn test_aggregate_presolve_and_extra_solutions() {
        let config = BendersConfig {
            aggregation: CutAggregation::Aggregate,
            presolve_cuts: true,
            presolve_injection: PresolveInjection::LazyPool,
            extra_solutions: true,
            warm_start: false,
            ..BendersConfig::default()
        };
        assert_toy_optimum(&run(&toy(), config).unwrap());
    }

    #[test]
    fn test_enumeration_records_distinct_solutions() {
        let config = BendersConfig {
            enumeration: true,
            min_enumerated_solutions: 4,
            warm_start: false,
            ..BendersConfig::default()
        };
        let solution = run(&toy(), config).unwrap();
        assert_toy_optimum(&solution);
        assert!(solution.explored.len() >= 4);
    }

    #[test]
    fn test_unreachable_open_limit_is_infeasible() {
        let instance = {
            let mut inst = toy();
            inst.open_limits.min_open = 2;
            inst
        };
        let config = BendersConfig {
            warm_start: false,
            ..BendersConfig::default()
        };
        assert!(matches!(
            run(&instance, config),
            Err(BendersError::MasterInfeasible(_))
        ));
    }

    #[test]
    fn test_greedy_respects_max_open() {
        let instance = {
            let mut inst = toy();
            inst.open_limits.max_open = Some(0);
            inst
        };
        let solution = run(&instance, BendersConfig::default()).unwrap();
        assert_eq!(solution.levels, vec![None, None]);
        assert_eq!(solution.objective, 0.0);
    }

    #[test]
    fn test_phase_terminal_states() {
        assert!(Phase::Converged.is_terminal());
        assert!(Phase::LimitReached.is_terminal());
        assert!(!Phase::GeneratingCuts.is_terminal());
    }
}
