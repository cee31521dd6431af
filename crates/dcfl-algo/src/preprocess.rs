//! Captive-choice preprocessing.
//!
//! A customer-scenario pair is *captive* when one facility dominates every
//! other under any feasible prices and any feasible configuration. The
//! preprocessor marks each (facility, customer, scenario) triple as forced,
//! excluded or unresolved; the master and the subproblem both skip the work
//! the marks make unnecessary.
//!
//! The dominance anchor `i*` is chosen among always-available (existing)
//! facilities only, since a closed candidate cannot capture anyone.

use dcfl_core::{Instance, StrategyProfile};
use serde::{Deserialize, Serialize};

use crate::bounds::UtilityBounds;

/// Preprocessing mark for one (facility, customer, scenario) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceState {
    Unresolved,
    /// Never the utility-maximizing choice
    Excluded,
    /// Always the utility-maximizing choice
    Forced,
}

impl ChoiceState {
    /// Numeric code: −1 unresolved, 0 excluded, 1 forced.
    pub fn code(self) -> i8 {
        match self {
            ChoiceState::Unresolved => -1,
            ChoiceState::Excluded => 0,
            ChoiceState::Forced => 1,
        }
    }
}

/// Captive map `w_pre`, laid out like the instance tensors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptiveMap {
    n_facilities: usize,
    n_customers: usize,
    n_scenarios: usize,
    states: Vec<ChoiceState>,
}

impl CaptiveMap {
    /// Map with every triple unresolved.
    pub fn unresolved(n_facilities: usize, n_customers: usize, n_scenarios: usize) -> Self {
        Self {
            n_facilities,
            n_customers,
            n_scenarios,
            states: vec![ChoiceState::Unresolved; n_facilities * n_customers * n_scenarios],
        }
    }

    #[inline]
    fn idx(&self, facility: usize, customer: usize, scenario: usize) -> usize {
        (facility * self.n_customers + customer) * self.n_scenarios + scenario
    }

    #[inline]
    pub fn get(&self, facility: usize, customer: usize, scenario: usize) -> ChoiceState {
        self.states[self.idx(facility, customer, scenario)]
    }

    /// Apply a monotone change: only unresolved triples move.
    fn mark(&mut self, facility: usize, customer: usize, scenario: usize, state: ChoiceState) {
        let k = self.idx(facility, customer, scenario);
        if self.states[k] == ChoiceState::Unresolved {
            self.states[k] = state;
        }
    }

    #[inline]
    pub fn is_excluded(&self, facility: usize, customer: usize, scenario: usize) -> bool {
        self.get(facility, customer, scenario) == ChoiceState::Excluded
    }

    /// The forced facility of a pair, if it is captive.
    pub fn forced(&self, customer: usize, scenario: usize) -> Option<usize> {
        (0..self.n_facilities).find(|&i| self.get(i, customer, scenario) == ChoiceState::Forced)
    }

    pub fn n_facilities(&self) -> usize {
        self.n_facilities
    }

    pub fn n_customers(&self) -> usize {
        self.n_customers
    }

    pub fn n_scenarios(&self) -> usize {
        self.n_scenarios
    }

    /// Number of captive customer-scenario pairs.
    pub fn captive_pairs(&self) -> usize {
        let mut count = 0;
        for n in 0..self.n_customers {
            for r in 0..self.n_scenarios {
                if self.forced(n, r).is_some() {
                    count += 1;
                }
            }
        }
        count
    }

    pub fn excluded_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| **s == ChoiceState::Excluded)
            .count()
    }
}

/// Compute the captive map from utility bounds.
///
/// For each pair, `LbMax` is the largest lower bound over existing facilities
/// (attained at `i*`) and `subUbMax` the largest upper bound over the others.
/// `LbMax > subUbMax` forces `i*` and excludes everything else; otherwise each
/// facility with `ub_U < LbMax` is excluded. Ties never dominate.
pub fn choice_preprocess(instance: &Instance, bounds: &UtilityBounds) -> CaptiveMap {
    let n_fac = instance.num_facilities();
    let n_cust = instance.num_customers();
    let n_scen = instance.num_scenarios();
    let mut map = CaptiveMap::unresolved(n_fac, n_cust, n_scen);

    for n in 0..n_cust {
        for r in 0..n_scen {
            let mut anchor: Option<(usize, f64)> = None;
            for (i, f) in instance.facilities.iter().enumerate() {
                if !f.is_existing() {
                    continue;
                }
                let lb = bounds.lb(i, n, r);
                if anchor.map_or(true, |(_, best)| lb > best) {
                    anchor = Some((i, lb));
                }
            }
            let Some((i_star, lb_max)) = anchor else {
                continue;
            };

            let sub_ub_max = (0..n_fac)
                .filter(|&i| i != i_star)
                .map(|i| bounds.ub(i, n, r))
                .fold(f64::NEG_INFINITY, f64::max);

            if lb_max > sub_ub_max {
                for i in 0..n_fac {
                    let state = if i == i_star {
                        ChoiceState::Forced
                    } else {
                        ChoiceState::Excluded
                    };
                    map.mark(i, n, r, state);
                }
            } else {
                for i in 0..n_fac {
                    if bounds.ub(i, n, r) < lb_max {
                        map.mark(i, n, r, ChoiceState::Excluded);
                    }
                }
            }
        }
    }
    map
}

/// Refine a captive map for one fixed-price strategy profile.
///
/// For every pair without a forced facility, each operator's unresolved
/// facilities are compared at the profile prices. When the best of them
/// (ties to the lowest index) is always available, its unresolved siblings
/// can never be chosen and are excluded.
pub fn choice_preprocess_strategy(
    instance: &Instance,
    base: &CaptiveMap,
    profile: &StrategyProfile,
) -> CaptiveMap {
    let mut map = base.clone();
    let operators = instance.operators();

    for n in 0..map.n_customers {
        for r in 0..map.n_scenarios {
            if map.forced(n, r).is_some() {
                continue;
            }
            for op in &operators {
                let block: Vec<usize> = instance
                    .facilities
                    .iter()
                    .enumerate()
                    .filter(|(i, f)| {
                        f.operator == *op && map.get(*i, n, r) == ChoiceState::Unresolved
                    })
                    .map(|(i, _)| i)
                    .collect();
                if block.len() < 2 {
                    continue;
                }

                let mut best = block[0];
                let mut best_u = instance.utility(best, n, r, profile.prices[best]);
                for &i in &block[1..] {
                    let u = instance.utility(i, n, r, profile.prices[i]);
                    if u > best_u {
                        best = i;
                        best_u = u;
                    }
                }

                if instance.facilities[best].is_existing() {
                    for &i in &block {
                        if i != best {
                            map.mark(i, n, r, ChoiceState::Excluded);
                        }
                    }
                }
            }
        }
    }
    map
}

/// Strategy-aware captive maps, one per instance strategy profile.
pub fn choice_preprocess_strategies(instance: &Instance, base: &CaptiveMap) -> Vec<CaptiveMap> {
    instance
        .strategies
        .iter()
        .map(|profile| choice_preprocess_strategy(instance, base, profile))
        .collect()
}
