//! Engine configuration.
//!
//! Every option has a serde default, so a partial TOML table (as read by the
//! `dcfl` CLI) is enough:
//!
//! ```toml
//! aggregation = "aggregate"
//! granularity = "customer"
//! presolve_cuts = true
//! threads = 4
//!
//! [retention]
//! scenarios = [true, false, false, true]
//! ```

use serde::{Deserialize, Serialize};

use crate::bounds::SignConvention;
use crate::error::{BendersError, BendersResult};

/// How the master interacts with the cut generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterMode {
    /// One branch-and-cut tree, cuts injected at each integer incumbent.
    #[default]
    Lazy,
    /// Re-solve the master from scratch after each round of cuts.
    Iterative,
}

/// Shape of the optimality cuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutAggregation {
    /// One cut over the sum of all block estimates (per cluster when grouped).
    Aggregate,
    /// One cut per block.
    #[default]
    Disaggregate,
    /// No cuts; only valid when every pair is retained in the master.
    None,
}

/// How decomposed customer-scenario pairs are grouped into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One block per scenario.
    #[default]
    Scenario,
    /// One block per customer.
    Customer,
    /// One block per customer-scenario pair.
    ScenarioCustomer,
}

/// Which pairs keep their assignment variables in the master.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Full decomposition.
    #[default]
    None,
    /// Monolithic formulation.
    All,
    /// Retain the scenarios flagged `true`.
    Scenarios(Vec<bool>),
    /// Retain the customers flagged `true`.
    Customers(Vec<bool>),
}

impl Retention {
    pub fn retains(&self, customer: usize, scenario: usize) -> bool {
        match self {
            Retention::None => false,
            Retention::All => true,
            Retention::Scenarios(mask) => mask.get(scenario).copied().unwrap_or(false),
            Retention::Customers(mask) => mask.get(customer).copied().unwrap_or(false),
        }
    }
}

/// Where presolve cuts go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresolveInjection {
    /// Added to the master as ordinary constraints.
    #[default]
    Constraints,
    /// Held in a pool and added lazily once violated.
    LazyPool,
}

/// Index set a clustering runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterDimension {
    #[default]
    Scenario,
    Customer,
}

/// Cluster labels used to group aggregate cuts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutGroups {
    pub dimension: ClusterDimension,
    /// One label per scenario or customer.
    pub labels: Vec<usize>,
}

/// Clustering parameters for partial decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub enabled: bool,
    pub dimension: ClusterDimension,
    /// Scenario cluster count is `clamp(R / scenario_divisor, min, max)`.
    pub scenario_divisor: usize,
    pub scenario_min_clusters: usize,
    pub scenario_max_clusters: usize,
    /// Customer cluster count is `N / customer_divisor`.
    pub customer_divisor: usize,
    /// Below these sizes clustering falls back to the identity assignment.
    pub min_scenarios: usize,
    pub min_customers: usize,
    /// Cap on PAM swap passes.
    pub max_swap_passes: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dimension: ClusterDimension::Scenario,
            scenario_divisor: 5,
            scenario_min_clusters: 5,
            scenario_max_clusters: 10,
            customer_divisor: 4,
            min_scenarios: 10,
            min_customers: 8,
            max_swap_passes: 100,
        }
    }
}

/// Benders engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BendersConfig {
    /// Also separate cuts at fractional branch-and-cut nodes.
    pub separation_fractional: bool,
    /// Maximum separation rounds per fractional node.
    pub fractional_rounds: usize,

    pub aggregation: CutAggregation,

    /// Mine one-flip neighbours of each incumbent for extra cuts.
    pub extra_solutions: bool,
    /// Neighbour cuts are kept only if they cut off the current point in at
    /// least this fraction of decomposed blocks.
    pub extra_solutions_min_fraction: f64,
    pub extra_solutions_max: usize,

    pub warm_start: bool,
    /// Caller-provided start: chosen price level per facility (`None` = closed).
    pub initial_configuration: Option<Vec<Option<usize>>>,

    pub presolve_cuts: bool,
    pub presolve_injection: PresolveInjection,

    /// Record distinct integer solutions until `min_enumerated_solutions`.
    pub enumeration: bool,
    pub min_enumerated_solutions: usize,
    pub pool_capacity: usize,

    pub granularity: Granularity,
    /// Only add cuts for blocks whose estimate is violated.
    pub subset_cuts: bool,
    pub retention: Retention,
    /// Cluster labels grouping aggregate cuts.
    pub cut_groups: Option<CutGroups>,
    pub clustering: ClusteringConfig,

    /// Index into the instance strategy profiles; fixes every price.
    pub strategy: Option<usize>,

    /// Worker threads for subproblem evaluation.
    pub threads: usize,
    /// Violation tolerance for cuts and integrality.
    pub tolerance: f64,

    pub max_nodes: usize,
    pub max_iterations: usize,
    pub time_limit_secs: Option<f64>,

    pub master_mode: MasterMode,
    pub sign_convention: SignConvention,
}

impl Default for BendersConfig {
    fn default() -> Self {
        Self {
            separation_fractional: false,
            fractional_rounds: 5,
            aggregation: CutAggregation::Disaggregate,
            extra_solutions: false,
            extra_solutions_min_fraction: 0.5,
            extra_solutions_max: 3,
            warm_start: true,
            initial_configuration: None,
            presolve_cuts: false,
            presolve_injection: PresolveInjection::Constraints,
            enumeration: false,
            min_enumerated_solutions: 1,
            pool_capacity: 100,
            granularity: Granularity::Scenario,
            subset_cuts: true,
            retention: Retention::None,
            cut_groups: None,
            clustering: ClusteringConfig::default(),
            strategy: None,
            threads: 1,
            tolerance: 1e-6,
            max_nodes: 100_000,
            max_iterations: 1_000,
            time_limit_secs: None,
            master_mode: MasterMode::Lazy,
            sign_convention: SignConvention::NonPositive,
        }
    }
}

impl BendersConfig {
    /// Check option ranges that do not depend on the instance.
    pub fn validate(&self) -> BendersResult<()> {
        if self.threads == 0 {
            return Err(BendersError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(BendersError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(0.0..=1.0).contains(&self.extra_solutions_min_fraction) {
            return Err(BendersError::InvalidConfig(format!(
                "extra_solutions_min_fraction must lie in [0, 1], got {}",
                self.extra_solutions_min_fraction
            )));
        }
        if self.enumeration && self.pool_capacity < self.min_enumerated_solutions {
            return Err(BendersError::InvalidConfig(format!(
                "pool_capacity {} cannot hold {} enumerated solutions",
                self.pool_capacity, self.min_enumerated_solutions
            )));
        }
        if let Some(limit) = self.time_limit_secs {
            if !(limit > 0.0) {
                return Err(BendersError::InvalidConfig(format!(
                    "time_limit_secs must be positive, got {}",
                    limit
                )));
            }
        }
        if self.max_iterations == 0 || self.max_nodes == 0 {
            return Err(BendersError::InvalidConfig(
                "node and iteration limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
