//! # dcfl-algo: Benders Engine for Facility Location and Pricing
//!
//! Solves discrete-choice competitive facility location and pricing
//! problems defined by [`dcfl_core::Instance`].
//!
//! ## Pipeline
//!
//! | Stage | Entry point | Output |
//! |-------|-------------|--------|
//! | Utility bounds | [`BoundCalculator`] | [`UtilityBounds`] with big-M per pair |
//! | Captive preprocessing | [`choice_preprocess`] | [`CaptiveMap`] |
//! | Clustering (optional) | [`cluster::cluster`] | [`cluster::ClusterAssignment`] |
//! | Benders decomposition | [`BendersOrchestrator`] | [`BendersSolution`] |
//!
//! [`solve`] chains all stages using a single [`BendersConfig`].
//!
//! ## Example
//!
//! ```ignore
//! use dcfl_algo::{solve, BendersConfig};
//! use dcfl_core::Instance;
//!
//! let instance = Instance::from_json_path("market.json")?;
//! let solution = solve(&instance, &BendersConfig::default())?;
//! println!("{}", solution.summary());
//! ```

pub mod benders;
pub mod bounds;
pub mod cluster;
pub mod error;
pub mod pipeline;
pub mod preprocess;

pub use benders::{
    BendersConfig, BendersOrchestrator, BendersSolution, CutAggregation, Granularity, MasterMode,
    Retention, SolveStatus,
};
pub use bounds::{BoundCalculator, PriceBounds, SignConvention, UtilityBounds};
pub use error::{BendersError, BendersResult};
pub use pipeline::{clustered_config, prepare, solve, solve_observed, Prepared};
pub use preprocess::{
    choice_preprocess, choice_preprocess_strategies, choice_preprocess_strategy, CaptiveMap,
    ChoiceState,
};
