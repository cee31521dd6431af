//! Opportunity-cost distances between scenarios or customers.
//!
//! Each index `s` defines a sub-instance with optimal value `OF[s]` at
//! configuration `y_s`. Two indices are close when each one's optimum costs
//! little in the other:
//!
//! ```text
//! D[s1,s2] = −((F_s2(y_s1) − OF[s2]) + (F_s1(y_s2) − OF[s1]))
//! ```

use dcfl_core::Instance;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::benders::{
    BendersConfig, ChoiceModel, ClusterDimension, CutAggregation, Retention, SubproblemSolver,
};
use crate::bounds::{BoundCalculator, PriceBounds};
use crate::error::{BendersError, BendersResult};
use crate::preprocess::{choice_preprocess, choice_preprocess_strategy};

/// Optimum of one single-scenario or single-customer sub-instance.
#[derive(Debug, Clone, Serialize)]
pub struct SliceOptimum {
    pub index: usize,
    pub objective: f64,
    pub levels: Vec<Option<usize>>,
}

/// Dense symmetric distance matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    /// Build from a pairwise function evaluated on the upper triangle.
    pub fn from_fn<F>(n: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> f64 + Sync,
    {
        let upper: Vec<(usize, usize, f64)> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| ((i + 1)..n).map(move |j| (i, j)).collect::<Vec<_>>())
            .map(|(i, j)| (i, j, f(i, j).max(0.0)))
            .collect();
        let mut data = vec![0.0; n * n];
        for (i, j, d) in upper {
            data[i * n + j] = d;
            data[j * n + i] = d;
        }
        Self { n, data }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }
}

fn slice(
    instance: &Instance,
    dimension: ClusterDimension,
    index: usize,
) -> BendersResult<Instance> {
    Ok(match dimension {
        ClusterDimension::Scenario => instance.scenario_slice(index)?,
        ClusterDimension::Customer => instance.customer_slice(index)?,
    })
}

fn count(instance: &Instance, dimension: ClusterDimension) -> usize {
    match dimension {
        ClusterDimension::Scenario => instance.num_scenarios(),
        ClusterDimension::Customer => instance.num_customers(),
    }
}

/// Settings for the per-slice engine runs.
fn slice_config(config: &BendersConfig) -> BendersConfig {
    let mut sub = config.clone();
    sub.clustering.enabled = false;
    sub.retention = Retention::None;
    sub.cut_groups = None;
    sub.initial_configuration = None;
    sub.enumeration = false;
    if sub.aggregation == CutAggregation::None {
        sub.aggregation = CutAggregation::Disaggregate;
    }
    sub
}

/// Solve every single-scenario (or single-customer) sub-instance.
pub fn block_optima(
    instance: &Instance,
    dimension: ClusterDimension,
    config: &BendersConfig,
) -> BendersResult<Vec<SliceOptimum>> {
    let sub = slice_config(config);
    (0..count(instance, dimension))
        .map(|s| {
            let part = slice(instance, dimension, s)?;
            let solution = crate::pipeline::solve(&part, &sub)?;
            debug!(index = s, objective = solution.objective, "slice solved");
            Ok(SliceOptimum {
                index: s,
                objective: solution.objective,
                levels: solution.levels,
            })
        })
        .collect()
}

/// Exact evaluator of one slice at arbitrary price levels.
struct SliceEvaluator {
    model: ChoiceModel,
}

impl SliceEvaluator {
    fn new(part: &Instance, config: &BendersConfig) -> BendersResult<Self> {
        let bounds = BoundCalculator::new()
            .with_convention(config.sign_convention)
            .compute(part, &PriceBounds::from_instance(part))?;
        let mut captive = choice_preprocess(part, &bounds);
        let strategy = match config.strategy {
            Some(s) => {
                let profile = part.strategies.get(s).ok_or_else(|| {
                    BendersError::InvalidConfig(format!("strategy {} not found", s))
                })?;
                captive = choice_preprocess_strategy(part, &captive, profile);
                Some(profile)
            }
            None => None,
        };
        Ok(Self {
            model: ChoiceModel::build(part, &captive, strategy)?,
        })
    }

    fn value(&self, levels: &[Option<usize>]) -> BendersResult<f64> {
        let config = self.model.configuration_from_levels(levels)?;
        Ok(SubproblemSolver::new(&self.model).evaluate(&config).objective)
    }
}

/// Opportunity-cost distances from the slice optima.
pub fn opportunity_distances(
    instance: &Instance,
    dimension: ClusterDimension,
    config: &BendersConfig,
    optima: &[SliceOptimum],
) -> BendersResult<DistanceMatrix> {
    let n = optima.len();
    let evaluators = (0..n)
        .map(|s| SliceEvaluator::new(&slice(instance, dimension, s)?, config))
        .collect::<BendersResult<Vec<_>>>()?;

    // cross[s2 * n + s1] = F_s2(y_s1) − OF[s2]
    let mut cross = vec![0.0; n * n];
    for (s2, evaluator) in evaluators.iter().enumerate() {
        let own = evaluator.value(&optima[s2].levels)?;
        for (s1, other) in optima.iter().enumerate() {
            if s1 != s2 {
                cross[s2 * n + s1] = evaluator.value(&other.levels)? - own;
            }
        }
    }
    Ok(DistanceMatrix::from_fn(n, |i, j| {
        -(cross[j * n + i] + cross[i * n + j])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_symmetric_and_clamped() {
        let d = DistanceMatrix::from_fn(4, |i, j| i as f64 - j as f64 - 0.5);
        for i in 0..4 {
            assert_eq!(d.get(i, i), 0.0);
            for j in 0..4 {
                assert_eq!(d.get(i, j), d.get(j, i));
                assert!(d.get(i, j) >= 0.0);
            }
        }
        // f(0, 3) is negative and clamps to zero
        assert_eq!(d.get(0, 3), 0.0);
        assert_eq!(d.row(1).len(), 4);
    }
}
