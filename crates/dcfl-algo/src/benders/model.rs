//! Priced options and per-pair choice rankings.
//!
//! The master's binaries are indexed by [`PricedOption`]: one candidate
//! facility at one price. For every customer-scenario pair the model
//! precomputes a [`ChoiceRanking`]: the best always-available alternative
//! (the fallback) and the options strictly preferred over it, best first.
//! Under any configuration the customer picks the first open ranked option,
//! or the fallback when none is open.

use std::cmp::Ordering;

use dcfl_core::{Instance, StrategyProfile};
use serde::{Deserialize, Serialize};

use crate::error::{BendersError, BendersResult};
use crate::preprocess::{CaptiveMap, ChoiceState};

/// One candidate facility offered at one price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricedOption {
    pub facility: usize,
    /// Position in the facility's menu
    pub level: usize,
    pub price: f64,
}

/// A ranked option with its utility and leader margin for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedOption {
    pub option: usize,
    pub utility: f64,
    pub margin: f64,
}

/// Preference order of the alternatives that can matter for one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceRanking {
    /// Best always-available facility (the forced one for captive pairs)
    pub fallback: usize,
    pub fallback_utility: f64,
    pub fallback_margin: f64,
    /// Options strictly preferred over the fallback, best first
    pub ranked: Vec<RankedOption>,
}

impl ChoiceRanking {
    /// Position of the first open option.
    pub fn first_open(&self, open: &[bool]) -> Option<usize> {
        self.ranked.iter().position(|ro| open[ro.option])
    }

    /// Margin earned under a configuration.
    pub fn margin(&self, open: &[bool]) -> f64 {
        match self.first_open(open) {
            Some(t) => self.ranked[t].margin,
            None => self.fallback_margin,
        }
    }

    /// Facility chosen under a configuration.
    pub fn choice(&self, open: &[bool], options: &[PricedOption]) -> usize {
        match self.first_open(open) {
            Some(t) => options[self.ranked[t].option].facility,
            None => self.fallback,
        }
    }

    /// Smallest and largest attainable margin.
    pub fn margin_range(&self) -> (f64, f64) {
        self.ranked
            .iter()
            .fold((self.fallback_margin, self.fallback_margin), |(lo, hi), ro| {
                (lo.min(ro.margin), hi.max(ro.margin))
            })
    }

    pub fn is_fixed(&self) -> bool {
        self.ranked.is_empty()
    }
}

/// Open/closed state of every priced option.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    open: Vec<bool>,
}

impl Configuration {
    pub fn closed(n_options: usize) -> Self {
        Self {
            open: vec![false; n_options],
        }
    }

    /// Read a configuration from (near-)binary master values.
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            open: values.iter().map(|v| *v > 0.5).collect(),
        }
    }

    pub fn from_open(open: Vec<bool>) -> Self {
        Self { open }
    }

    #[inline]
    pub fn is_open(&self, option: usize) -> bool {
        self.open[option]
    }

    pub fn set(&mut self, option: usize, open: bool) {
        self.open[option] = open;
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.open
    }

    pub fn as_values(&self) -> Vec<f64> {
        self.open.iter().map(|o| if *o { 1.0 } else { 0.0 }).collect()
    }

    pub fn open_options(&self) -> impl Iterator<Item = usize> + '_ {
        self.open
            .iter()
            .enumerate()
            .filter(|(_, o)| **o)
            .map(|(k, _)| k)
    }

    pub fn num_open(&self) -> usize {
        self.open.iter().filter(|o| **o).count()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

/// Options, prices and rankings for one instance.
#[derive(Debug, Clone)]
pub struct ChoiceModel {
    pub options: Vec<PricedOption>,
    /// Option indices per facility (empty for existing facilities)
    pub facility_options: Vec<Vec<usize>>,
    /// Price charged by each existing facility
    pub existing_prices: Vec<Option<f64>>,
    pub fixed_costs: Vec<f64>,
    /// Demand weight `popN / R` per customer
    pub weights: Vec<f64>,
    pub min_open: usize,
    pub max_open: Option<usize>,
    n_customers: usize,
    n_scenarios: usize,
    rankings: Vec<ChoiceRanking>,
}

impl ChoiceModel {
    /// Build options and rankings. With a strategy profile every facility is
    /// priced by the profile and each candidate gets exactly one option.
    pub fn build(
        instance: &Instance,
        captive: &CaptiveMap,
        strategy: Option<&StrategyProfile>,
    ) -> BendersResult<Self> {
        let n_fac = instance.num_facilities();
        let n_cust = instance.num_customers();
        let n_scen = instance.num_scenarios();

        if captive.n_facilities() != n_fac
            || captive.n_customers() != n_cust
            || captive.n_scenarios() != n_scen
        {
            return Err(BendersError::InvalidConfig(
                "captive map does not match the instance dimensions".to_string(),
            ));
        }
        if let Some(profile) = strategy {
            if profile.prices.len() != n_fac {
                return Err(BendersError::InvalidConfig(format!(
                    "strategy '{}' prices {} facilities, instance has {}",
                    profile.name,
                    profile.prices.len(),
                    n_fac
                )));
            }
        }

        let mut options = Vec::new();
        let mut facility_options = vec![Vec::new(); n_fac];
        let mut existing_prices = vec![None; n_fac];
        for (i, f) in instance.facilities.iter().enumerate() {
            if f.is_existing() {
                existing_prices[i] = match strategy {
                    Some(profile) => Some(profile.prices[i]),
                    None => f.fixed_price(),
                };
                continue;
            }
            let menu: Vec<f64> = match strategy {
                Some(profile) => vec![profile.prices[i]],
                None => f.price_levels.clone(),
            };
            for (level, price) in menu.into_iter().enumerate() {
                facility_options[i].push(options.len());
                options.push(PricedOption {
                    facility: i,
                    level,
                    price,
                });
            }
        }

        let mut rankings = Vec::with_capacity(n_cust * n_scen);
        for n in 0..n_cust {
            for r in 0..n_scen {
                rankings.push(Self::rank_pair(
                    instance,
                    captive,
                    &options,
                    &existing_prices,
                    n,
                    r,
                )?);
            }
        }

        Ok(Self {
            options,
            facility_options,
            existing_prices,
            fixed_costs: instance.facilities.iter().map(|f| f.fixed_cost).collect(),
            weights: (0..n_cust).map(|n| instance.pair_weight(n)).collect(),
            min_open: instance.open_limits.min_open,
            max_open: instance.open_limits.max_open,
            n_customers: n_cust,
            n_scenarios: n_scen,
            rankings,
        })
    }

    fn rank_pair(
        instance: &Instance,
        captive: &CaptiveMap,
        options: &[PricedOption],
        existing_prices: &[Option<f64>],
        n: usize,
        r: usize,
    ) -> BendersResult<ChoiceRanking> {
        if let Some(forced) = captive.forced(n, r) {
            if let Some(price) = existing_prices[forced] {
                return Ok(ChoiceRanking {
                    fallback: forced,
                    fallback_utility: instance.utility(forced, n, r, price),
                    fallback_margin: instance.margin(forced, price),
                    ranked: Vec::new(),
                });
            }
        }

        let mut fallback: Option<(usize, f64, f64)> = None;
        for (i, price) in existing_prices.iter().enumerate() {
            let Some(price) = price else { continue };
            if captive.get(i, n, r) == ChoiceState::Excluded {
                continue;
            }
            let u = instance.utility(i, n, r, *price);
            if fallback.map_or(true, |(_, best, _)| u > best) {
                fallback = Some((i, u, instance.margin(i, *price)));
            }
        }
        let (fb, fb_u, fb_margin) = fallback.ok_or_else(|| {
            BendersError::InvalidConfig(format!(
                "customer {} in scenario {} has no available alternative",
                n, r
            ))
        })?;

        let mut ranked: Vec<RankedOption> = options
            .iter()
            .enumerate()
            .filter(|(_, o)| !captive.is_excluded(o.facility, n, r))
            .filter_map(|(k, o)| {
                let u = instance.utility(o.facility, n, r, o.price);
                let preferred = u > fb_u || (u == fb_u && o.facility < fb);
                preferred.then(|| RankedOption {
                    option: k,
                    utility: u,
                    margin: instance.margin(o.facility, o.price),
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.utility
                .partial_cmp(&a.utility)
                .unwrap_or(Ordering::Equal)
                .then(options[a.option].facility.cmp(&options[b.option].facility))
                .then(a.option.cmp(&b.option))
        });

        Ok(ChoiceRanking {
            fallback: fb,
            fallback_utility: fb_u,
            fallback_margin: fb_margin,
            ranked,
        })
    }

    #[inline]
    pub fn ranking(&self, customer: usize, scenario: usize) -> &ChoiceRanking {
        &self.rankings[customer * self.n_scenarios + scenario]
    }

    #[inline]
    pub fn weight(&self, customer: usize) -> f64 {
        self.weights[customer]
    }

    pub fn n_options(&self) -> usize {
        self.options.len()
    }

    pub fn n_customers(&self) -> usize {
        self.n_customers
    }

    pub fn n_scenarios(&self) -> usize {
        self.n_scenarios
    }

    /// Fixed cost paid when `option` is open.
    #[inline]
    pub fn option_fixed_cost(&self, option: usize) -> f64 {
        self.fixed_costs[self.options[option].facility]
    }

    pub fn fixed_cost(&self, config: &Configuration) -> f64 {
        config.open_options().map(|k| self.option_fixed_cost(k)).sum()
    }

    /// Whether a configuration respects one-option-per-facility and the
    /// operator's open limits.
    pub fn is_feasible(&self, config: &Configuration) -> bool {
        let per_facility_ok = self
            .facility_options
            .iter()
            .all(|opts| opts.iter().filter(|&&k| config.is_open(k)).count() <= 1);
        let n_open = config.num_open();
        per_facility_ok
            && n_open >= self.min_open
            && self.max_open.map_or(true, |max| n_open <= max)
    }

    /// Configuration from a chosen menu level per facility (`None` = closed).
    pub fn configuration_from_levels(
        &self,
        levels: &[Option<usize>],
    ) -> BendersResult<Configuration> {
        if levels.len() != self.facility_options.len() {
            return Err(BendersError::InvalidConfig(format!(
                "configuration lists {} facilities, instance has {}",
                levels.len(),
                self.facility_options.len()
            )));
        }
        let mut config = Configuration::closed(self.n_options());
        for (i, level) in levels.iter().enumerate() {
            let Some(level) = level else { continue };
            let option = self.facility_options[i].get(*level).ok_or_else(|| {
                BendersError::InvalidConfig(format!(
                    "facility {} has no price level {}",
                    i, level
                ))
            })?;
            config.set(*option, true);
        }
        Ok(config)
    }

    /// Chosen menu level per facility.
    pub fn levels(&self, config: &Configuration) -> Vec<Option<usize>> {
        self.facility_options
            .iter()
            .map(|opts| {
                opts.iter()
                    .find(|&&k| config.is_open(k))
                    .map(|&k| self.options[k].level)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{BoundCalculator, PriceBounds};
    use crate::preprocess::choice_preprocess;
    use dcfl_core::{InstanceBuilder, UtilityTerms};

    fn model_for(instance: &Instance) -> ChoiceModel {
        let bounds = BoundCalculator::new()
            .compute(instance, &PriceBounds::from_instance(instance))
            .unwrap();
        let captive = choice_preprocess(instance, &bounds);
        ChoiceModel::build(instance, &captive, None).unwrap()
    }

    fn two_sites() -> Instance {
        InstanceBuilder::new("two-sites", 1)
            .customer("c", 2.0)
            .existing("opt-out", 1, 0.0)
            .candidate("A", 1.0, vec![1.0, 2.0])
            .candidate("B", 1.0, vec![1.0])
            .utilities(|i, _, _| match i {
                0 => UtilityTerms::new(0.0, 0.0, 0.0),
                1 => UtilityTerms::new(3.0, -1.0, 0.0),
                _ => UtilityTerms::new(2.5, -1.0, 0.0),
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_options_and_ranking_order() {
        let inst = two_sites();
        let model = model_for(&inst);
        assert_eq!(model.n_options(), 3);
        assert_eq!(model.facility_options[1], vec![0, 1]);
        assert_eq!(model.facility_options[2], vec![2]);

        let ranking = model.ranking(0, 0);
        assert_eq!(ranking.fallback, 0);
        // A@1 (2.0), B@1 (1.5), A@2 (1.0)
        let order: Vec<usize> = ranking.ranked.iter().map(|ro| ro.option).collect();
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn test_first_open_choice() {
        let inst = two_sites();
        let model = model_for(&inst);
        let ranking = model.ranking(0, 0);

        let mut config = Configuration::closed(3);
        assert_eq!(ranking.choice(config.as_slice(), &model.options), 0);
        assert_eq!(ranking.margin(config.as_slice()), 0.0);

        config.set(1, true);
        config.set(2, true);
        assert_eq!(ranking.choice(config.as_slice(), &model.options), 2);
        assert_eq!(ranking.margin(config.as_slice()), 1.0);
    }

    #[test]
    fn test_levels_roundtrip_and_feasibility() {
        let inst = two_sites();
        let model = model_for(&inst);
        let config = model
            .configuration_from_levels(&[None, Some(1), Some(0)])
            .unwrap();
        assert!(config.is_open(1) && config.is_open(2));
        assert_eq!(model.levels(&config), vec![None, Some(1), Some(0)]);
        assert!(model.is_feasible(&config));
        assert_eq!(model.fixed_cost(&config), 2.0);

        let mut both_levels = Configuration::closed(3);
        both_levels.set(0, true);
        both_levels.set(1, true);
        assert!(!model.is_feasible(&both_levels));

        assert!(model.configuration_from_levels(&[None, Some(5), None]).is_err());
    }

    #[test]
    fn test_equal_utility_prefers_lower_index() {
        let inst = InstanceBuilder::new("tie", 1)
            .customer("c", 1.0)
            .existing("opt-out", 1, 0.0)
            .candidate("A", 0.0, vec![1.0])
            .utilities(|i, _, _| match i {
                0 => UtilityTerms::new(0.0, 0.0, 0.0),
                _ => UtilityTerms::new(1.0, -1.0, 0.0),
            })
            .build()
            .unwrap();
        let model = model_for(&inst);
        // option ties the opt-out at utility 0; the opt-out has the lower index
        assert!(model.ranking(0, 0).ranked.is_empty());
    }

    #[test]
    fn test_strategy_prices_everything() {
        let inst = InstanceBuilder::new("strategy", 1)
            .customer("c", 1.0)
            .existing_with_bounds("rival", 1, 2.0, 1.0, 3.0)
            .candidate("A", 0.0, vec![1.0, 2.0, 3.0])
            .strategy("profile", vec![1.5, 2.0])
            .utilities(|_, _, _| UtilityTerms::new(4.0, -1.0, 0.0))
            .build()
            .unwrap();
        let bounds = BoundCalculator::new()
            .compute(&inst, &PriceBounds::from_instance(&inst))
            .unwrap();
        let captive = choice_preprocess(&inst, &bounds);
        let model = ChoiceModel::build(&inst, &captive, Some(&inst.strategies[0])).unwrap();
        assert_eq!(model.n_options(), 1);
        assert_eq!(model.options[0].price, 2.0);
        assert_eq!(model.existing_prices[0], Some(1.5));
        // rival at 1.5 (2.5) beats A at 2.0 (2.0)
        assert!(model.ranking(0, 0).ranked.is_empty());
    }
}
