//! Best-first branch-and-cut master backend.
//!
//! LP relaxations are solved with `good_lp` on the Clarabel backend. Binaries
//! fixed by branching are substituted as constants, so each node LP only
//! carries its free variables. Integer points are passed to
//! [`SeparationHooks::on_integer_incumbent`]; violated lazy rows are added and
//! the node is re-solved until the point is accepted or the node is pruned.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use good_lp::solvers::clarabel::clarabel;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use tracing::{debug, trace};
use web_time::Instant;

use super::master::{
    LinearRow, MasterSolver, MasterStats, MasterStatus, RowScope, SeparationHooks, Sense, VarId,
};
use crate::error::{BendersError, BendersResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Binary,
    Continuous,
}

#[derive(Debug, Clone, Copy)]
struct VarDef {
    kind: VarKind,
    lb: f64,
    ub: f64,
}

/// Search limits and tolerances.
#[derive(Debug, Clone)]
pub struct BranchAndCutSettings {
    pub max_nodes: usize,
    pub time_limit_secs: Option<f64>,
    /// A binary within this distance of 0 or 1 counts as integral.
    pub integrality_tol: f64,
    /// Relative row violation treated as infeasible.
    pub feasibility_tol: f64,
    /// Re-solves allowed at a single node before giving up.
    pub max_node_rounds: usize,
}

impl Default for BranchAndCutSettings {
    fn default() -> Self {
        Self {
            max_nodes: 100_000,
            time_limit_secs: None,
            integrality_tol: 1e-6,
            feasibility_tol: 1e-6,
            max_node_rounds: 1_000,
        }
    }
}

/// A node in the search tree.
#[derive(Debug, Clone)]
struct SearchNode {
    id: u64,
    depth: usize,
    /// Binary fixings accumulated from the root
    fixings: Vec<(usize, f64)>,
    /// Rows valid only in this subtree
    local_rows: Vec<LinearRow>,
    /// Parent LP bound
    bound: f64,
}

/// Heap entry: best bound first, newest node on ties.
struct QueuedNode(SearchNode);

impl PartialEq for QueuedNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedNode {}

impl PartialOrd for QueuedNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .bound
            .total_cmp(&other.0.bound)
            .then(self.0.id.cmp(&other.0.id))
    }
}

enum LpOutcome {
    Infeasible,
    Solved { values: Vec<f64>, objective: f64 },
}

/// Branch-and-cut over the binary variables of a maximization master.
#[derive(Debug, Clone, Default)]
pub struct BranchAndCut {
    settings: BranchAndCutSettings,
    vars: Vec<VarDef>,
    rows: Vec<LinearRow>,
    objective: Vec<(VarId, f64)>,
    objective_constant: f64,
    mip_start: Option<Vec<f64>>,
    fractional_separation: bool,
    fractional_rounds: usize,
    incumbent: Option<Vec<f64>>,
    incumbent_obj: f64,
    best_bound: f64,
    stats: MasterStats,
}

impl BranchAndCut {
    pub fn new(settings: BranchAndCutSettings) -> Self {
        Self {
            settings,
            incumbent_obj: f64::NEG_INFINITY,
            best_bound: f64::INFINITY,
            ..Self::default()
        }
    }

    fn objective_at(&self, values: &[f64]) -> f64 {
        self.objective_constant
            + self
                .objective
                .iter()
                .map(|(v, c)| c * values[v.index()])
                .sum::<f64>()
    }

    fn prune_tol(&self) -> f64 {
        self.settings.feasibility_tol * (1.0 + self.incumbent_obj.abs())
    }

    fn time_exceeded(&self, start: &Instant) -> bool {
        self.settings
            .time_limit_secs
            .map_or(false, |limit| start.elapsed().as_secs_f64() >= limit)
    }

    /// Solve the LP relaxation with the given fixings and extra rows.
    fn solve_lp(
        &mut self,
        fixings: &[(usize, f64)],
        local_rows: &[LinearRow],
    ) -> BendersResult<LpOutcome> {
        self.stats.lp_solves += 1;
        let n = self.vars.len();

        let mut fixed: Vec<Option<f64>> = self
            .vars
            .iter()
            .map(|d| if d.lb == d.ub { Some(d.lb) } else { None })
            .collect();
        for &(j, val) in fixings {
            fixed[j] = Some(val);
        }

        let mut problem = ProblemVariables::new();
        let lp_vars: Vec<Option<Variable>> = (0..n)
            .map(|j| match fixed[j] {
                Some(_) => None,
                None => Some(problem.add(variable().min(self.vars[j].lb).max(self.vars[j].ub))),
            })
            .collect();

        let tol = self.settings.feasibility_tol;
        let all_rows = self.rows.iter().chain(local_rows.iter());

        if lp_vars.iter().all(Option::is_none) {
            let values: Vec<f64> = fixed.iter().map(|v| v.unwrap_or(0.0)).collect();
            for row in all_rows {
                if row.is_violated(&values, tol) {
                    return Ok(LpOutcome::Infeasible);
                }
            }
            let objective = self.objective_at(&values);
            return Ok(LpOutcome::Solved { values, objective });
        }

        let mut objective = Expression::from(0.0);
        for (v, c) in &self.objective {
            if let Some(var) = lp_vars[v.index()] {
                objective += *c * var;
            }
        }
        let mut model = problem.maximise(objective).using(clarabel);

        for row in all_rows {
            let mut expr = Expression::from(0.0);
            let mut offset = 0.0;
            let mut has_free = false;
            for (v, c) in &row.terms {
                match (lp_vars[v.index()], fixed[v.index()]) {
                    (Some(var), _) => {
                        expr += *c * var;
                        has_free = true;
                    }
                    (None, Some(val)) => offset += c * val,
                    (None, None) => {}
                }
            }
            let rhs = row.rhs - offset;
            if !has_free {
                let slack_ok = match row.sense {
                    Sense::Le => rhs >= -tol * (1.0 + row.rhs.abs()),
                    Sense::Ge => rhs <= tol * (1.0 + row.rhs.abs()),
                    Sense::Eq => rhs.abs() <= tol * (1.0 + row.rhs.abs()),
                };
                if !slack_ok {
                    return Ok(LpOutcome::Infeasible);
                }
                continue;
            }
            model = match row.sense {
                Sense::Le => model.with(constraint!(expr <= rhs)),
                Sense::Ge => model.with(constraint!(expr >= rhs)),
                Sense::Eq => model.with(constraint!(expr == rhs)),
            };
        }

        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(ResolutionError::Infeasible) => return Ok(LpOutcome::Infeasible),
            Err(e) => return Err(BendersError::Solver(e.to_string())),
        };

        let values: Vec<f64> = (0..n)
            .map(|j| match (lp_vars[j], fixed[j]) {
                (Some(var), _) => solution.value(var).clamp(self.vars[j].lb, self.vars[j].ub),
                (None, Some(val)) => val,
                (None, None) => 0.0,
            })
            .collect();
        // Clarabel may report an almost-infeasible status as solved.
        let loose = tol.max(1e-4);
        if self
            .rows
            .iter()
            .chain(local_rows.iter())
            .any(|row| row.is_violated(&values, loose))
        {
            trace!("LP solution violates the model, treated as infeasible");
            return Ok(LpOutcome::Infeasible);
        }
        let objective = self.objective_at(&values);
        Ok(LpOutcome::Solved { values, objective })
    }

    /// Most fractional binary, ties to the lowest index.
    fn branching_candidate(&self, values: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (j, def) in self.vars.iter().enumerate() {
            if def.kind != VarKind::Binary {
                continue;
            }
            let frac = values[j].min(1.0 - values[j]);
            if frac > self.settings.integrality_tol && best.map_or(true, |(_, b)| frac > b) {
                best = Some((j, frac));
            }
        }
        best.map(|(j, _)| j)
    }

    fn round_binaries(&self, values: &mut [f64]) {
        for (j, def) in self.vars.iter().enumerate() {
            if def.kind == VarKind::Binary {
                values[j] = values[j].round();
            }
        }
    }

    /// Apply hook rows; returns whether any of them cuts off `values`.
    fn apply_rows(
        &mut self,
        rows: Vec<super::master::ScopedRow>,
        values: &[f64],
        local_rows: &mut Vec<LinearRow>,
    ) -> bool {
        let mut violated = false;
        for scoped in rows {
            if scoped.row.is_violated(values, self.settings.feasibility_tol) {
                violated = true;
            }
            self.stats.lazy_rows += 1;
            match scoped.scope {
                RowScope::Global => self.rows.push(scoped.row),
                RowScope::Node => local_rows.push(scoped.row),
            }
        }
        violated
    }

    fn try_mip_start(&mut self, hooks: &mut dyn SeparationHooks) -> Vec<LinearRow> {
        let mut root_rows = Vec::new();
        let Some(start) = self.mip_start.take() else {
            return root_rows;
        };
        if start.len() != self.vars.len() {
            debug!(len = start.len(), "ignoring MIP start of wrong length");
            return root_rows;
        }
        let integral = self.vars.iter().zip(&start).all(|(d, v)| {
            d.kind != VarKind::Binary || (*v == 0.0 || *v == 1.0)
        });
        let tol = self.settings.feasibility_tol;
        if !integral || self.rows.iter().any(|r| r.is_violated(&start, tol)) {
            debug!("MIP start violates the model, ignored");
            return root_rows;
        }
        let rows = hooks.on_integer_incumbent(&start);
        if !self.apply_rows(rows, &start, &mut root_rows) {
            let obj = self.objective_at(&start);
            if obj > self.incumbent_obj {
                self.incumbent_obj = obj;
                self.incumbent = Some(start);
                self.stats.incumbents += 1;
                debug!(objective = obj, "MIP start accepted as incumbent");
            }
        }
        root_rows
    }
}

impl MasterSolver for BranchAndCut {
    fn add_binary_variable(&mut self) -> VarId {
        self.vars.push(VarDef {
            kind: VarKind::Binary,
            lb: 0.0,
            ub: 1.0,
        });
        VarId::new(self.vars.len() - 1)
    }

    fn add_continuous_variable(&mut self, lb: f64, ub: f64) -> VarId {
        self.vars.push(VarDef {
            kind: VarKind::Continuous,
            lb,
            ub,
        });
        VarId::new(self.vars.len() - 1)
    }

    fn add_linear_constraint(&mut self, row: LinearRow) {
        self.rows.push(row);
    }

    fn set_objective(&mut self, terms: Vec<(VarId, f64)>, constant: f64) {
        self.objective = terms;
        self.objective_constant = constant;
    }

    fn set_mip_start(&mut self, values: Vec<f64>) {
        self.mip_start = Some(values);
    }

    fn set_fractional_separation(&mut self, enabled: bool, max_rounds: usize) {
        self.fractional_separation = enabled;
        self.fractional_rounds = max_rounds;
    }

    fn solve(&mut self, hooks: &mut dyn SeparationHooks) -> BendersResult<MasterStatus> {
        let start = Instant::now();
        self.incumbent = None;
        self.incumbent_obj = f64::NEG_INFINITY;

        let root_rows = self.try_mip_start(hooks);
        let mut heap = BinaryHeap::new();
        heap.push(QueuedNode(SearchNode {
            id: 0,
            depth: 0,
            fixings: Vec::new(),
            local_rows: root_rows,
            bound: f64::INFINITY,
        }));
        let mut next_id = 1u64;
        let mut processed = 0usize;
        let mut limit_bound: Option<f64> = None;

        while let Some(QueuedNode(mut node)) = heap.pop() {
            if self.incumbent.is_some() && node.bound <= self.incumbent_obj + self.prune_tol() {
                continue;
            }
            if processed >= self.settings.max_nodes
                || self.time_exceeded(&start)
                || hooks.should_terminate()
            {
                limit_bound = Some(node.bound);
                heap.push(QueuedNode(node));
                break;
            }
            processed += 1;
            self.stats.nodes += 1;

            let mut rounds = 0usize;
            let mut fractional_rounds = 0usize;
            loop {
                rounds += 1;
                if rounds > self.settings.max_node_rounds {
                    return Err(BendersError::Solver(format!(
                        "separation did not settle at node {} after {} rounds",
                        node.id, self.settings.max_node_rounds
                    )));
                }

                let (mut values, lp_obj) = match self.solve_lp(&node.fixings, &node.local_rows)? {
                    LpOutcome::Infeasible => {
                        trace!(node = node.id, "node LP infeasible");
                        break;
                    }
                    LpOutcome::Solved { values, objective } => (values, objective),
                };
                if self.incumbent.is_some() && lp_obj <= self.incumbent_obj + self.prune_tol() {
                    break;
                }

                match self.branching_candidate(&values) {
                    None => {
                        self.round_binaries(&mut values);
                        let rows = hooks.on_integer_incumbent(&values);
                        if self.apply_rows(rows, &values, &mut node.local_rows) {
                            if hooks.should_terminate() {
                                limit_bound = Some(lp_obj);
                                break;
                            }
                            continue;
                        }
                        let obj = self.objective_at(&values);
                        if obj > self.incumbent_obj {
                            debug!(node = node.id, objective = obj, "new incumbent");
                            self.incumbent_obj = obj;
                            self.incumbent = Some(values);
                            self.stats.incumbents += 1;
                        }
                        break;
                    }
                    Some(j) => {
                        if self.fractional_separation
                            && fractional_rounds < self.fractional_rounds
                        {
                            fractional_rounds += 1;
                            let tol = self.settings.feasibility_tol;
                            let cuts = hooks.on_fractional_node(&values);
                            let mut violated = false;
                            for row in cuts {
                                violated |= row.is_violated(&values, tol);
                                self.stats.user_rows += 1;
                                self.rows.push(row);
                            }
                            if violated {
                                continue;
                            }
                        }

                        trace!(node = node.id, var = j, value = values[j], "branching");
                        for val in [0.0, 1.0] {
                            let mut fixings = node.fixings.clone();
                            fixings.push((j, val));
                            heap.push(QueuedNode(SearchNode {
                                id: next_id,
                                depth: node.depth + 1,
                                fixings,
                                local_rows: node.local_rows.clone(),
                                bound: lp_obj,
                            }));
                            next_id += 1;
                        }
                        break;
                    }
                }
            }
            if limit_bound.is_some() {
                break;
            }
        }

        let status = match limit_bound {
            Some(bound) => {
                let open = heap.iter().map(|q| q.0.bound).fold(bound, f64::max);
                self.best_bound = open.max(self.incumbent_obj);
                MasterStatus::LimitReached
            }
            None if self.incumbent.is_some() => {
                self.best_bound = self.incumbent_obj;
                MasterStatus::Optimal
            }
            None => {
                self.best_bound = f64::NEG_INFINITY;
                MasterStatus::Infeasible
            }
        };
        debug!(
            ?status,
            nodes = processed,
            objective = self.incumbent_obj,
            bound = self.best_bound,
            "branch-and-cut finished"
        );
        Ok(status)
    }

    fn value(&self, var: VarId) -> f64 {
        self.incumbent
            .as_ref()
            .map_or(f64::NAN, |values| values[var.index()])
    }

    fn incumbent(&self) -> Option<&[f64]> {
        self.incumbent.as_deref()
    }

    fn objective_value(&self) -> f64 {
        self.incumbent_obj
    }

    fn best_bound(&self) -> f64 {
        self.best_bound
    }

    fn num_variables(&self) -> usize {
        self.vars.len()
    }

    fn num_constraints(&self) -> usize {
        self.rows.len()
    }

    fn stats(&self) -> &MasterStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benders::master::{AcceptAll, ScopedRow};

    /// Knapsack: max 5a + 4b + 3c, 2a + 3b + c ≤ 4 → a = c = 1, objective 8.
    fn knapsack() -> (BranchAndCut, Vec<VarId>) {
        let mut bc = BranchAndCut::new(BranchAndCutSettings::default());
        let vars: Vec<VarId> = (0..3).map(|_| bc.add_binary_variable()).collect();
        bc.add_linear_constraint(LinearRow::le(
            vec![(vars[0], 2.0), (vars[1], 3.0), (vars[2], 1.0)],
            4.0,
        ));
        bc.set_objective(vec![(vars[0], 5.0), (vars[1], 4.0), (vars[2], 3.0)], 0.0);
        (bc, vars)
    }

    #[test]
    fn test_small_knapsack() {
        let (mut bc, vars) = knapsack();
        let status = bc.solve(&mut AcceptAll).unwrap();
        assert_eq!(status, MasterStatus::Optimal);
        assert!((bc.objective_value() - 8.0).abs() < 1e-6);
        assert_eq!(bc.value(vars[0]), 1.0);
        assert_eq!(bc.value(vars[1]), 0.0);
        assert_eq!(bc.value(vars[2]), 1.0);
    }

    #[test]
    fn test_infeasible_master() {
        let mut bc = BranchAndCut::new(BranchAndCutSettings::default());
        let a = bc.add_binary_variable();
        let b = bc.add_binary_variable();
        bc.add_linear_constraint(LinearRow::ge(vec![(a, 1.0), (b, 1.0)], 3.0));
        bc.set_objective(vec![(a, 1.0)], 0.0);
        assert_eq!(bc.solve(&mut AcceptAll).unwrap(), MasterStatus::Infeasible);
        assert!(bc.incumbent().is_none());
    }

    /// Lazily forbids a = 1 the first time it is seen.
    struct ForbidA {
        a: VarId,
        calls: usize,
    }

    impl SeparationHooks for ForbidA {
        fn on_integer_incumbent(&mut self, values: &[f64]) -> Vec<ScopedRow> {
            self.calls += 1;
            if values[self.a.index()] > 0.5 {
                vec![ScopedRow::global(LinearRow::le(vec![(self.a, 1.0)], 0.0))]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn test_lazy_rows_reject_incumbents() {
        let (mut bc, vars) = knapsack();
        let mut hooks = ForbidA { a: vars[0], calls: 0 };
        let status = bc.solve(&mut hooks).unwrap();
        assert_eq!(status, MasterStatus::Optimal);
        // without a: b + c fits (3 + 1 ≤ 4) for 7
        assert!((bc.objective_value() - 7.0).abs() < 1e-6);
        assert_eq!(bc.value(vars[0]), 0.0);
        assert!(hooks.calls >= 2);
        assert!(bc.stats().lazy_rows >= 1);
    }

    #[test]
    fn test_mip_start_becomes_incumbent() {
        let (mut bc, vars) = knapsack();
        bc.set_mip_start(vec![1.0, 0.0, 1.0]);
        let status = bc.solve(&mut AcceptAll).unwrap();
        assert_eq!(status, MasterStatus::Optimal);
        assert!(bc.stats().incumbents >= 1);
        assert_eq!(bc.value(vars[2]), 1.0);
    }

    #[test]
    fn test_node_limit_reports_limit() {
        let mut bc = BranchAndCut::new(BranchAndCutSettings {
            max_nodes: 1,
            ..BranchAndCutSettings::default()
        });
        let vars: Vec<VarId> = (0..4).map(|_| bc.add_binary_variable()).collect();
        // fractional root: 2 of 4 items of weight 2 into capacity 3
        bc.add_linear_constraint(LinearRow::le(vars.iter().map(|v| (*v, 2.0)).collect(), 3.0));
        bc.set_objective(vars.iter().map(|v| (*v, 1.0)).collect(), 0.0);
        let status = bc.solve(&mut AcceptAll).unwrap();
        assert_eq!(status, MasterStatus::LimitReached);
        assert!(bc.best_bound() >= 1.0);
    }
}
