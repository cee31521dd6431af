//! Closed-form subproblem evaluation.
//!
//! With the configuration fixed, each customer-scenario pair simply picks the
//! first open option of its ranking (or the fallback), so block values need no
//! solver call.

use rayon::prelude::*;
use serde::Serialize;

use super::blocks::Block;
use super::model::{ChoiceModel, Configuration};

/// Exact evaluation of a full configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Revenue minus fixed cost
    pub objective: f64,
    pub revenue: f64,
    pub fixed_cost: f64,
    /// Expected demand captured by each facility
    pub demand: Vec<f64>,
}

/// Evaluates blocks and configurations against a [`ChoiceModel`].
#[derive(Debug, Clone, Copy)]
pub struct SubproblemSolver<'a> {
    model: &'a ChoiceModel,
}

impl<'a> SubproblemSolver<'a> {
    pub fn new(model: &'a ChoiceModel) -> Self {
        Self { model }
    }

    /// Facility chosen by one pair.
    #[inline]
    pub fn choice(&self, customer: usize, scenario: usize, config: &Configuration) -> usize {
        self.model
            .ranking(customer, scenario)
            .choice(config.as_slice(), &self.model.options)
    }

    /// Weighted margin earned from one pair.
    #[inline]
    pub fn pair_value(&self, customer: usize, scenario: usize, config: &Configuration) -> f64 {
        self.model.weight(customer)
            * self
                .model
                .ranking(customer, scenario)
                .margin(config.as_slice())
    }

    /// Weighted margin earned from a block.
    pub fn block_value(&self, block: &Block, config: &Configuration) -> f64 {
        block
            .pairs
            .iter()
            .map(|&(n, r)| self.pair_value(n, r, config))
            .sum()
    }

    /// Evaluate many blocks in parallel; results keep block order.
    pub fn block_values(&self, blocks: &[Block], config: &Configuration) -> Vec<f64> {
        blocks
            .par_iter()
            .map(|block| self.block_value(block, config))
            .collect()
    }

    /// Objective of a configuration over a set of pairs.
    pub fn objective_over(&self, pairs: &[(usize, usize)], config: &Configuration) -> f64 {
        let revenue: f64 = pairs.iter().map(|&(n, r)| self.pair_value(n, r, config)).sum();
        revenue - self.model.fixed_cost(config)
    }

    /// Full evaluation over every pair.
    pub fn evaluate(&self, config: &Configuration) -> Evaluation {
        let n_fac = self.model.facility_options.len();
        let mut demand = vec![0.0; n_fac];
        let mut revenue = 0.0;
        for n in 0..self.model.n_customers() {
            let w = self.model.weight(n);
            for r in 0..self.model.n_scenarios() {
                let ranking = self.model.ranking(n, r);
                demand[ranking.choice(config.as_slice(), &self.model.options)] += w;
                revenue += w * ranking.margin(config.as_slice());
            }
        }
        let fixed_cost = self.model.fixed_cost(config);
        Evaluation {
            objective: revenue - fixed_cost,
            revenue,
            fixed_cost,
            demand,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{BoundCalculator, PriceBounds};
    use crate::preprocess::choice_preprocess;
    use dcfl_core::{Instance, InstanceBuilder, UtilityTerms};

    fn market() -> Instance {
        InstanceBuilder::new("market", 2)
            .customer("north", 1.0)
            .customer("south", 3.0)
            .existing("opt-out", 1, 0.0)
            .existing("rival", 2, 2.0)
            .candidate("A", 2.0, vec![1.0, 3.0])
            .candidate("B", 1.0, vec![2.0])
            .utilities(|i, n, r| {
                let base = [0.0, 3.0, 4.0, 3.5][i];
                let endo = if i == 0 { 0.0 } else { -1.0 };
                UtilityTerms::new(base, endo, 0.3 * ((i + 2 * n + r) % 3) as f64)
            })
            .build()
            .unwrap()
    }

    /// Reference argmax over every open alternative.
    fn brute_choice(inst: &Instance, n: usize, r: usize, prices: &[Option<f64>]) -> usize {
        let mut best = None;
        for (i, p) in prices.iter().enumerate() {
            let Some(p) = p else { continue };
            let u = inst.utility(i, n, r, *p);
            if best.map_or(true, |(_, bu)| u > bu) {
                best = Some((i, u));
            }
        }
        best.unwrap().0
    }

    #[test]
    fn test_matches_brute_force_argmax() {
        let inst = market();
        let bounds = BoundCalculator::new()
            .compute(&inst, &PriceBounds::from_instance(&inst))
            .unwrap();
        let captive = choice_preprocess(&inst, &bounds);
        let model = ChoiceModel::build(&inst, &captive, None).unwrap();
        let solver = SubproblemSolver::new(&model);

        let menus: [Vec<Option<usize>>; 2] = [vec![None, Some(0), Some(1)], vec![None, Some(0)]];
        for a in &menus[0] {
            for b in &menus[1] {
                let config = model
                    .configuration_from_levels(&[None, None, *a, *b])
                    .unwrap();
                let prices = vec![
                    Some(0.0),
                    Some(2.0),
                    a.map(|l| inst.facilities[2].price_levels[l]),
                    b.map(|l| inst.facilities[3].price_levels[l]),
                ];
                for n in 0..2 {
                    for r in 0..2 {
                        assert_eq!(
                            solver.choice(n, r, &config),
                            brute_choice(&inst, n, r, &prices),
                            "config {:?}/{:?}, pair ({}, {})",
                            a,
                            b,
                            n,
                            r
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_evaluation_accounts_for_all_demand() {
        let inst = market();
        let bounds = BoundCalculator::new()
            .compute(&inst, &PriceBounds::from_instance(&inst))
            .unwrap();
        let captive = choice_preprocess(&inst, &bounds);
        let model = ChoiceModel::build(&inst, &captive, None).unwrap();
        let solver = SubproblemSolver::new(&model);

        let config = model
            .configuration_from_levels(&[None, None, Some(1), Some(0)])
            .unwrap();
        let eval = solver.evaluate(&config);
        let total: f64 = eval.demand.iter().sum();
        assert!((total - inst.total_population()).abs() < 1e-9);
        assert_eq!(eval.fixed_cost, 3.0);
        assert!((eval.objective - (eval.revenue - 3.0)).abs() < 1e-12);

        let pairs: Vec<(usize, usize)> = (0..2).flat_map(|n| (0..2).map(move |r| (n, r))).collect();
        assert!((solver.objective_over(&pairs, &config) - eval.objective).abs() < 1e-9);
    }
}
