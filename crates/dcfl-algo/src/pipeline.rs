//! End-to-end solve: validation, bounds, captive preprocessing, optional
//! clustering, then the Benders engine.

use dcfl_core::Instance;
use tracing::{info, warn};

use crate::benders::{
    BendersConfig, BendersOrchestrator, BendersSolution, ClusterDimension, PoolEntry,
};
use crate::bounds::{BoundCalculator, PriceBounds, UtilityBounds};
use crate::cluster::{below_threshold, cluster, retention_from_medoids, ClusterAssignment};
use crate::error::{BendersError, BendersResult};
use crate::preprocess::{choice_preprocess, choice_preprocess_strategy, CaptiveMap};

/// Bounds and captive map the engine runs on.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub bounds: UtilityBounds,
    pub captive: CaptiveMap,
}

/// Compute utility bounds and the captive map, refined by the configured
/// strategy profile if any.
pub fn prepare(instance: &Instance, config: &BendersConfig) -> BendersResult<Prepared> {
    instance.validate()?;
    let bounds = BoundCalculator::new()
        .with_convention(config.sign_convention)
        .compute(instance, &PriceBounds::from_instance(instance))?;
    let mut captive = choice_preprocess(instance, &bounds);
    if let Some(s) = config.strategy {
        let profile = instance.strategies.get(s).ok_or_else(|| {
            BendersError::InvalidConfig(format!(
                "strategy {} requested, instance has {}",
                s,
                instance.strategies.len()
            ))
        })?;
        captive = choice_preprocess_strategy(instance, &captive, profile);
    }
    info!(
        captive_pairs = captive.captive_pairs(),
        excluded = captive.excluded_count(),
        "preprocessing complete"
    );
    Ok(Prepared { bounds, captive })
}

/// Engine configuration after clustering.
///
/// With clustering enabled the medoids become the retained indices and the
/// clusters the aggregate-cut groups. Instances below the clustering minimum
/// keep the configured retention and cut groups, and no assignment is
/// returned.
pub fn clustered_config(
    instance: &Instance,
    config: &BendersConfig,
) -> BendersResult<(BendersConfig, Option<ClusterAssignment>)> {
    let mut run_config = config.clone();
    if !config.clustering.enabled {
        return Ok((run_config, None));
    }
    let dimension = config.clustering.dimension;
    let n = match dimension {
        ClusterDimension::Scenario => instance.num_scenarios(),
        ClusterDimension::Customer => instance.num_customers(),
    };
    if below_threshold(&config.clustering, dimension, n) {
        warn!(
            ?dimension,
            n,
            "instance below the clustering minimum, keeping configured retention"
        );
        return Ok((run_config, None));
    }

    let assignment = cluster(instance, dimension, config)?;
    run_config.retention = retention_from_medoids(&assignment);
    run_config.cut_groups = Some(assignment.cut_groups());
    Ok((run_config, Some(assignment)))
}

/// Solve an instance.
pub fn solve(instance: &Instance, config: &BendersConfig) -> BendersResult<BendersSolution> {
    solve_observed(instance, config, |_| {})
}

/// Solve an instance, handing each newly pooled configuration to `observer`
/// as it is found.
pub fn solve_observed<F>(
    instance: &Instance,
    config: &BendersConfig,
    observer: F,
) -> BendersResult<BendersSolution>
where
    F: FnMut(&PoolEntry),
{
    config.validate()?;
    let prepared = prepare(instance, config)?;
    let (run_config, clusters) = clustered_config(instance, config)?;

    let engine =
        BendersOrchestrator::new(instance, &prepared.bounds, &prepared.captive, run_config)?;
    let mut solution = engine.run_observed(observer)?;
    solution.clusters = clusters;
    Ok(solution)
}
