//! Benders decomposition for facility location and pricing
//!
//! The leader opens candidate facilities, each at one price level from its
//! menu, to maximize expected profit against customers who pick the
//! alternative of highest utility in every sampled scenario.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DISCRETE-CHOICE FACILITY LOCATION AND PRICING                           │
//! │  ──────────────────────────────────────────────                          │
//! │                                                                          │
//! │  Decide:                                                                 │
//! │    • y[k] ∈ {0,1} for each priced option k = (facility, level)          │
//! │                                                                          │
//! │  Maximize:                                                               │
//! │    Σ_n Σ_r (popN / R) · margin(choice(n, r, y)) − Σ_k fixed_k · y[k]    │
//! │                                                                          │
//! │  Subject to:                                                             │
//! │    • at most one price level per facility                               │
//! │    • min/max number of open candidates                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decomposition
//!
//! Customer-scenario pairs are either *retained* in the master, through
//! assignment variables and big-M utility rows, or grouped into *blocks*
//! whose contribution is estimated by a variable `z_b`. Blocks are evaluated
//! exactly by ranking the alternatives ([`SubproblemSolver`]), and each
//! evaluation yields a cut that is tight at the evaluated configuration
//! ([`CutGenerator`]).
//!
//! The master is solved by the in-crate [`BranchAndCut`] through the
//! [`MasterSolver`] trait, which calls back into the orchestrator at integer
//! incumbents and, optionally, at fractional nodes.
//!
//! ## Options
//!
//! [`BendersConfig`] controls the block granularity, retained pairs, cut
//! aggregation, warm start, presolve cuts, cuts mined from neighbouring
//! solutions, solution enumeration and the lazy or iterative master mode.

mod blocks;
mod branch_and_cut;
mod config;
mod cuts;
mod master;
mod model;
mod orchestrator;
mod solution;
mod subproblem;

pub use blocks::{Block, BlockLayout};
pub use branch_and_cut::{BranchAndCut, BranchAndCutSettings};
pub use config::{
    BendersConfig, ClusterDimension, ClusteringConfig, CutAggregation, CutGroups, Granularity,
    MasterMode, PresolveInjection, Retention,
};
pub use cuts::{
    aggregate, deepest_reference, disaggregate, pair_rhs, BendersCut, BlockCut, CutGenerator,
    CutKind,
};
pub use master::{
    AcceptAll, LinearRow, MasterSolver, MasterStats, MasterStatus, RowScope, ScopedRow,
    SeparationHooks, Sense, VarId,
};
pub use model::{ChoiceModel, ChoiceRanking, Configuration, PricedOption, RankedOption};
pub use orchestrator::{BendersOrchestrator, OrchestratorState, Phase};
pub use solution::{BendersSolution, FacilityOutcome, PoolEntry, SolutionPool, SolveStatus};
pub use subproblem::{Evaluation, SubproblemSolver};
