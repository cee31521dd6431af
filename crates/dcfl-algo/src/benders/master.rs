//! Mixed-integer master capability.
//!
//! The orchestrator talks to the master only through [`MasterSolver`]: it adds
//! variables and rows, sets a maximization objective, optionally provides a
//! MIP start, and hands a [`SeparationHooks`] implementation to `solve`. The
//! solver calls the hooks at integer incumbents (lazy constraints) and, when
//! enabled, at fractional nodes (user cuts). Hooks never touch the solver
//! directly; they return rows and the solver decides how to apply them.

use serde::Serialize;

use crate::error::BendersResult;

/// Handle of a master variable; its index into value vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn new(index: usize) -> Self {
        VarId(index)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Row sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// `Σ coef · var (sense) rhs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearRow {
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearRow {
    pub fn le(terms: Vec<(VarId, f64)>, rhs: f64) -> Self {
        Self {
            terms,
            sense: Sense::Le,
            rhs,
        }
    }

    pub fn ge(terms: Vec<(VarId, f64)>, rhs: f64) -> Self {
        Self {
            terms,
            sense: Sense::Ge,
            rhs,
        }
    }

    pub fn eq(terms: Vec<(VarId, f64)>, rhs: f64) -> Self {
        Self {
            terms,
            sense: Sense::Eq,
            rhs,
        }
    }

    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * values[v.index()]).sum()
    }

    /// Amount by which `values` violate the row (zero when satisfied).
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.activity(values);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }

    /// Violation scaled by the row's right-hand side magnitude.
    pub fn is_violated(&self, values: &[f64], tolerance: f64) -> bool {
        self.violation(values) > tolerance * (1.0 + self.rhs.abs())
    }
}

/// Lifetime of a row returned by a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowScope {
    /// Valid everywhere; added to the model.
    Global,
    /// Valid only in the subtree of the current node.
    Node,
}

/// A hook row and its scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedRow {
    pub row: LinearRow,
    pub scope: RowScope,
}

impl ScopedRow {
    pub fn global(row: LinearRow) -> Self {
        Self {
            row,
            scope: RowScope::Global,
        }
    }

    pub fn node(row: LinearRow) -> Self {
        Self {
            row,
            scope: RowScope::Node,
        }
    }
}

/// Callbacks invoked by the master solver.
pub trait SeparationHooks {
    /// Called with each integer-feasible point. Returning a row violated by
    /// `values` rejects the point; otherwise it becomes a candidate incumbent.
    fn on_integer_incumbent(&mut self, values: &[f64]) -> Vec<ScopedRow>;

    /// Called at fractional nodes when fractional separation is enabled.
    fn on_fractional_node(&mut self, _values: &[f64]) -> Vec<LinearRow> {
        Vec::new()
    }

    /// Ask the solver to stop at the next opportunity.
    fn should_terminate(&self) -> bool {
        false
    }
}

/// Hooks that accept every integer point.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl SeparationHooks for AcceptAll {
    fn on_integer_incumbent(&mut self, _values: &[f64]) -> Vec<ScopedRow> {
        Vec::new()
    }
}

/// Outcome of a master solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterStatus {
    Optimal,
    Infeasible,
    /// Node, time or hook-requested limit; an incumbent may exist.
    LimitReached,
}

/// Counters reported by a master solver.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MasterStats {
    pub nodes: usize,
    pub lp_solves: usize,
    pub lazy_rows: usize,
    pub user_rows: usize,
    pub incumbents: usize,
}

/// Mixed-integer master capability (maximization).
pub trait MasterSolver {
    fn add_binary_variable(&mut self) -> VarId;

    fn add_continuous_variable(&mut self, lb: f64, ub: f64) -> VarId;

    fn add_linear_constraint(&mut self, row: LinearRow);

    /// Objective `Σ coef · var + constant`, maximized.
    fn set_objective(&mut self, terms: Vec<(VarId, f64)>, constant: f64);

    /// Complete assignment tried before branching.
    fn set_mip_start(&mut self, values: Vec<f64>);

    /// Enable or disable calls to [`SeparationHooks::on_fractional_node`].
    fn set_fractional_separation(&mut self, enabled: bool, max_rounds: usize);

    fn solve(&mut self, hooks: &mut dyn SeparationHooks) -> BendersResult<MasterStatus>;

    /// Value of a variable in the incumbent.
    fn value(&self, var: VarId) -> f64;

    /// Incumbent assignment, if any.
    fn incumbent(&self) -> Option<&[f64]>;

    fn objective_value(&self) -> f64;

    /// Best proven upper bound on the objective.
    fn best_bound(&self) -> f64;

    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;

    fn stats(&self) -> &MasterStats;
}
