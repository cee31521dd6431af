//! Scenario and customer clustering.
//!
//! Selects representative scenarios (or customers) whose pairs are retained
//! in the Benders master, and groups the remaining blocks for aggregate cuts.
//!
//! | Step | Function |
//! |------|----------|
//! | Optimum of every single-index sub-instance | [`block_optima`] |
//! | Opportunity-cost distances | [`opportunity_distances`] |
//! | k-medoids | [`pam`] |
//! | Master retention from the medoids | [`retention_from_medoids`] |
//!
//! Instances below the configured minimum size skip clustering and get the
//! identity assignment, every index its own cluster.

mod distance;
mod medoids;

pub use distance::{block_optima, opportunity_distances, DistanceMatrix, SliceOptimum};
pub use medoids::{pam, MedoidPartition};

use dcfl_core::Instance;
use serde::Serialize;
use tracing::info;

use crate::benders::{BendersConfig, ClusterDimension, ClusteringConfig, CutGroups, Retention};
use crate::error::BendersResult;

/// Partition of scenario or customer indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub dimension: ClusterDimension,
    /// Cluster of every index
    pub labels: Vec<usize>,
    /// Representative index of each cluster, ascending
    pub medoids: Vec<usize>,
}

impl ClusterAssignment {
    /// Every index in its own cluster.
    pub fn identity(dimension: ClusterDimension, n: usize) -> Self {
        Self {
            dimension,
            labels: (0..n).collect(),
            medoids: (0..n).collect(),
        }
    }

    pub fn n_clusters(&self) -> usize {
        self.medoids.len()
    }

    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == cluster)
            .map(|(i, _)| i)
            .collect()
    }

    /// Aggregate-cut groups following the clusters.
    pub fn cut_groups(&self) -> CutGroups {
        CutGroups {
            dimension: self.dimension,
            labels: self.labels.clone(),
        }
    }
}

/// Retain the pairs of every medoid in the master.
pub fn retention_from_medoids(assignment: &ClusterAssignment) -> Retention {
    let mut mask = vec![false; assignment.labels.len()];
    for &m in &assignment.medoids {
        mask[m] = true;
    }
    match assignment.dimension {
        ClusterDimension::Scenario => Retention::Scenarios(mask),
        ClusterDimension::Customer => Retention::Customers(mask),
    }
}

/// Number of clusters for `n` indices.
pub fn cluster_count(config: &ClusteringConfig, dimension: ClusterDimension, n: usize) -> usize {
    let k = match dimension {
        ClusterDimension::Scenario => {
            let max = config.scenario_max_clusters.max(config.scenario_min_clusters);
            (n / config.scenario_divisor.max(1)).clamp(config.scenario_min_clusters, max)
        }
        ClusterDimension::Customer => n / config.customer_divisor.max(1),
    };
    k.min(n).max(1)
}

/// True when `n` indices are too few to be worth clustering.
pub fn below_threshold(config: &ClusteringConfig, dimension: ClusterDimension, n: usize) -> bool {
    match dimension {
        ClusterDimension::Scenario => n < config.min_scenarios,
        ClusterDimension::Customer => n < config.min_customers,
    }
}

/// Cluster the instance along `dimension`.
pub fn cluster(
    instance: &Instance,
    dimension: ClusterDimension,
    config: &BendersConfig,
) -> BendersResult<ClusterAssignment> {
    let n = match dimension {
        ClusterDimension::Scenario => instance.num_scenarios(),
        ClusterDimension::Customer => instance.num_customers(),
    };
    let settings = &config.clustering;
    if below_threshold(settings, dimension, n) {
        info!(?dimension, n, "too few indices to cluster, using identity assignment");
        return Ok(ClusterAssignment::identity(dimension, n));
    }

    let optima = block_optima(instance, dimension, config)?;
    let distances = opportunity_distances(instance, dimension, config, &optima)?;
    let k = cluster_count(settings, dimension, n);
    let partition = pam(&distances, k, settings.max_swap_passes);
    info!(
        ?dimension,
        n,
        clusters = partition.medoids.len(),
        cost = partition.cost,
        "clustering complete"
    );

    Ok(ClusterAssignment {
        dimension,
        labels: partition.labels,
        medoids: partition.medoids,
    })
}
