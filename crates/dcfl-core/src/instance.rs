//! Problem instance for competitive facility location and pricing.
//!
//! An [`Instance`] is immutable once built. Utilities follow a linear-in-price
//! random utility model:
//!
//! ```text
//! U[i,n,r](p) = exo_utility[i,n,r] + endo_coef[i,n,r] · p + xi[i,n,r]
//! ```
//!
//! with the three coefficient tensors stored flat, facility-major:
//! `index(i, n, r) = (i · N + n) · R + r`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DcflError, DcflResult};
use crate::{CustomerId, FacilityId, OperatorId};

/// Whether a facility is a location decision or part of the fixed landscape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityKind {
    /// Leader-owned site that may be opened, at one of its price levels.
    Candidate,
    /// Always-available alternative with a fixed price (competitors, opt-out).
    Existing,
}

/// A facility (alternative) customers may choose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    /// Owning operator
    pub operator: OperatorId,
    pub kind: FacilityKind,
    /// Cost incurred when a candidate is opened
    #[serde(default)]
    pub fixed_cost: f64,
    /// Per-unit cost subtracted from the price to obtain the margin
    #[serde(default)]
    pub unit_cost: f64,
    /// Lower price bound
    pub lb_price: f64,
    /// Upper price bound
    pub ub_price: f64,
    /// Discrete price menu. Existing facilities carry exactly one level.
    pub price_levels: Vec<f64>,
}

impl Facility {
    pub fn is_candidate(&self) -> bool {
        self.kind == FacilityKind::Candidate
    }

    pub fn is_existing(&self) -> bool {
        self.kind == FacilityKind::Existing
    }

    /// Price of an existing facility (its single level).
    pub fn fixed_price(&self) -> Option<f64> {
        match self.kind {
            FacilityKind::Existing => self.price_levels.first().copied(),
            FacilityKind::Candidate => None,
        }
    }
}

/// A customer segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    /// Population weight `popN`
    pub population: f64,
}

/// A complete fixed-price profile, one price per facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub name: String,
    pub prices: Vec<f64>,
}

/// Operator constraints on the number of candidates opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLimits {
    #[serde(default)]
    pub min_open: usize,
    #[serde(default)]
    pub max_open: Option<usize>,
}

/// Utility coefficients for one (facility, customer, scenario) triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtilityTerms {
    pub exo: f64,
    pub endo: f64,
    pub xi: f64,
}

impl UtilityTerms {
    pub fn new(exo: f64, endo: f64, xi: f64) -> Self {
        Self { exo, endo, xi }
    }
}

/// Immutable problem data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    /// Operator whose profit is maximized
    pub leader: OperatorId,
    pub facilities: Vec<Facility>,
    pub customers: Vec<Customer>,
    pub n_scenarios: usize,
    pub exo_utility: Vec<f64>,
    pub endo_coef: Vec<f64>,
    pub xi: Vec<f64>,
    #[serde(default)]
    pub strategies: Vec<StrategyProfile>,
    #[serde(default)]
    pub open_limits: OpenLimits,
}

impl Instance {
    /// Load an instance from a JSON file.
    pub fn from_json_path(path: impl AsRef<Path>) -> DcflResult<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> DcflResult<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json_string(&self) -> DcflResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn num_facilities(&self) -> usize {
        self.facilities.len()
    }

    pub fn num_customers(&self) -> usize {
        self.customers.len()
    }

    pub fn num_scenarios(&self) -> usize {
        self.n_scenarios
    }

    /// Flat index of the (facility, customer, scenario) triple.
    #[inline]
    pub fn index(&self, facility: usize, customer: usize, scenario: usize) -> usize {
        (facility * self.customers.len() + customer) * self.n_scenarios + scenario
    }

    #[inline]
    pub fn terms(&self, facility: usize, customer: usize, scenario: usize) -> UtilityTerms {
        let k = self.index(facility, customer, scenario);
        UtilityTerms::new(self.exo_utility[k], self.endo_coef[k], self.xi[k])
    }

    /// Utility of `facility` for `customer` in `scenario` at `price`.
    #[inline]
    pub fn utility(&self, facility: usize, customer: usize, scenario: usize, price: f64) -> f64 {
        let t = self.terms(facility, customer, scenario);
        t.exo + t.endo * price + t.xi
    }

    /// Probability weight of one scenario (uniform draws).
    #[inline]
    pub fn scenario_weight(&self) -> f64 {
        1.0 / self.n_scenarios as f64
    }

    /// Demand weight of a customer-scenario pair in the expected profit.
    #[inline]
    pub fn pair_weight(&self, customer: usize) -> f64 {
        self.customers[customer].population * self.scenario_weight()
    }

    pub fn is_leader(&self, facility: usize) -> bool {
        self.facilities[facility].operator == self.leader
    }

    /// Leader margin earned per unit of demand captured at `price`.
    pub fn margin(&self, facility: usize, price: f64) -> f64 {
        if self.is_leader(facility) {
            price - self.facilities[facility].unit_cost
        } else {
            0.0
        }
    }

    pub fn total_population(&self) -> f64 {
        self.customers.iter().map(|c| c.population).sum()
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Facility> {
        self.facilities.iter().filter(|f| f.is_candidate())
    }

    pub fn existing(&self) -> impl Iterator<Item = &Facility> {
        self.facilities.iter().filter(|f| f.is_existing())
    }

    /// Distinct operators in facility order of first appearance.
    pub fn operators(&self) -> Vec<OperatorId> {
        let mut ops: Vec<OperatorId> = Vec::new();
        for f in &self.facilities {
            if !ops.contains(&f.operator) {
                ops.push(f.operator);
            }
        }
        ops
    }

    /// Single-scenario sub-instance; customers keep their full population.
    pub fn scenario_slice(&self, scenario: usize) -> DcflResult<Instance> {
        if scenario >= self.n_scenarios {
            return Err(DcflError::Validation(format!(
                "scenario {} out of range ({} scenarios)",
                scenario, self.n_scenarios
            )));
        }
        let mut out = self.reshaped(self.customers.clone(), 1);
        for i in 0..self.facilities.len() {
            for n in 0..self.customers.len() {
                out.copy_terms(self, (i, n, scenario), (i, n, 0));
            }
        }
        Ok(out)
    }

    /// Single-customer sub-instance over all scenarios.
    pub fn customer_slice(&self, customer: usize) -> DcflResult<Instance> {
        let Some(c) = self.customers.get(customer) else {
            return Err(DcflError::Validation(format!(
                "customer {} out of range ({} customers)",
                customer,
                self.customers.len()
            )));
        };
        let mut only = c.clone();
        only.id = CustomerId::new(0);
        let mut out = self.reshaped(vec![only], self.n_scenarios);
        for i in 0..self.facilities.len() {
            for r in 0..self.n_scenarios {
                out.copy_terms(self, (i, customer, r), (i, 0, r));
            }
        }
        Ok(out)
    }

    fn reshaped(&self, customers: Vec<Customer>, n_scenarios: usize) -> Instance {
        let len = self.facilities.len() * customers.len() * n_scenarios;
        Instance {
            name: self.name.clone(),
            leader: self.leader,
            facilities: self.facilities.clone(),
            customers,
            n_scenarios,
            exo_utility: vec![0.0; len],
            endo_coef: vec![0.0; len],
            xi: vec![0.0; len],
            strategies: self.strategies.clone(),
            open_limits: self.open_limits,
        }
    }

    fn copy_terms(
        &mut self,
        from: &Instance,
        src: (usize, usize, usize),
        dst: (usize, usize, usize),
    ) {
        let s = from.index(src.0, src.1, src.2);
        let d = self.index(dst.0, dst.1, dst.2);
        self.exo_utility[d] = from.exo_utility[s];
        self.endo_coef[d] = from.endo_coef[s];
        self.xi[d] = from.xi[s];
    }

    /// Check structural consistency.
    ///
    /// Price bounds may still be infinite here; that degeneracy is reported
    /// when utility bounds are derived.
    pub fn validate(&self) -> DcflResult<()> {
        if self.n_scenarios == 0 {
            return Err(DcflError::Validation("instance has no scenarios".into()));
        }
        if self.facilities.is_empty() {
            return Err(DcflError::Validation("instance has no facilities".into()));
        }
        if self.customers.is_empty() {
            return Err(DcflError::Validation("instance has no customers".into()));
        }

        let expected = self.facilities.len() * self.customers.len() * self.n_scenarios;
        for (label, data) in [
            ("exo_utility", &self.exo_utility),
            ("endo_coef", &self.endo_coef),
            ("xi", &self.xi),
        ] {
            if data.len() != expected {
                return Err(DcflError::Validation(format!(
                    "{} has {} entries, expected {} (facilities × customers × scenarios)",
                    label,
                    data.len(),
                    expected
                )));
            }
        }

        for (i, f) in self.facilities.iter().enumerate() {
            if f.id.value() != i {
                return Err(DcflError::Validation(format!(
                    "facility '{}' has id {} but sits at position {}",
                    f.name,
                    f.id.value(),
                    i
                )));
            }
            if !(f.lb_price <= f.ub_price) {
                return Err(DcflError::Validation(format!(
                    "facility '{}' has price bounds [{}, {}]",
                    f.name, f.lb_price, f.ub_price
                )));
            }
            if f.price_levels.is_empty() {
                return Err(DcflError::Validation(format!(
                    "facility '{}' has no price levels",
                    f.name
                )));
            }
            for &p in &f.price_levels {
                if !p.is_finite() || p < f.lb_price || p > f.ub_price {
                    return Err(DcflError::Validation(format!(
                        "facility '{}' price level {} lies outside [{}, {}]",
                        f.name, p, f.lb_price, f.ub_price
                    )));
                }
            }
            match f.kind {
                FacilityKind::Candidate if f.operator != self.leader => {
                    return Err(DcflError::Validation(format!(
                        "candidate facility '{}' is not owned by the leader operator",
                        f.name
                    )));
                }
                FacilityKind::Existing if f.price_levels.len() != 1 => {
                    return Err(DcflError::Validation(format!(
                        "existing facility '{}' must have exactly one price level",
                        f.name
                    )));
                }
                _ => {}
            }
            if !f.fixed_cost.is_finite() || !f.unit_cost.is_finite() {
                return Err(DcflError::Validation(format!(
                    "facility '{}' has non-finite costs",
                    f.name
                )));
            }
        }

        if self.existing().next().is_none() {
            return Err(DcflError::Validation(
                "at least one existing (always available) alternative is required".into(),
            ));
        }

        for (n, c) in self.customers.iter().enumerate() {
            if c.id.value() != n {
                return Err(DcflError::Validation(format!(
                    "customer '{}' has id {} but sits at position {}",
                    c.name,
                    c.id.value(),
                    n
                )));
            }
            if !c.population.is_finite() || c.population < 0.0 {
                return Err(DcflError::Validation(format!(
                    "customer '{}' has invalid population {}",
                    c.name, c.population
                )));
            }
        }

        for s in &self.strategies {
            if s.prices.len() != self.facilities.len() {
                return Err(DcflError::Validation(format!(
                    "strategy '{}' prices {} facilities, instance has {}",
                    s.name,
                    s.prices.len(),
                    self.facilities.len()
                )));
            }
            for (f, &p) in self.facilities.iter().zip(&s.prices) {
                if !p.is_finite() || p < f.lb_price || p > f.ub_price {
                    return Err(DcflError::Validation(format!(
                        "strategy '{}' prices facility '{}' at {} outside [{}, {}]",
                        s.name, f.name, p, f.lb_price, f.ub_price
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Builder for constructing instances in code and tests.
pub struct InstanceBuilder {
    name: String,
    leader: OperatorId,
    n_scenarios: usize,
    facilities: Vec<Facility>,
    customers: Vec<Customer>,
    strategies: Vec<StrategyProfile>,
    open_limits: OpenLimits,
    utilities: Option<Box<dyn Fn(usize, usize, usize) -> UtilityTerms>>,
}

impl InstanceBuilder {
    pub fn new(name: impl Into<String>, n_scenarios: usize) -> Self {
        Self {
            name: name.into(),
            leader: OperatorId::new(0),
            n_scenarios,
            facilities: Vec::new(),
            customers: Vec::new(),
            strategies: Vec::new(),
            open_limits: OpenLimits::default(),
            utilities: None,
        }
    }

    /// Set the leader operator (defaults to operator 0)
    pub fn leader(mut self, operator: usize) -> Self {
        self.leader = OperatorId::new(operator);
        self
    }

    pub fn customer(mut self, name: impl Into<String>, population: f64) -> Self {
        let id = CustomerId::new(self.customers.len());
        self.customers.push(Customer {
            id,
            name: name.into(),
            population,
        });
        self
    }

    /// Add an always-available facility at a fixed price.
    pub fn existing(self, name: impl Into<String>, operator: usize, price: f64) -> Self {
        self.existing_with_bounds(name, operator, price, price, price)
    }

    /// Add an always-available facility whose price may move within bounds
    /// (strategy profiles, subgames).
    pub fn existing_with_bounds(
        mut self,
        name: impl Into<String>,
        operator: usize,
        price: f64,
        lb_price: f64,
        ub_price: f64,
    ) -> Self {
        let id = FacilityId::new(self.facilities.len());
        self.facilities.push(Facility {
            id,
            name: name.into(),
            operator: OperatorId::new(operator),
            kind: FacilityKind::Existing,
            fixed_cost: 0.0,
            unit_cost: 0.0,
            lb_price,
            ub_price,
            price_levels: vec![price],
        });
        self
    }

    /// Add a leader candidate whose price bounds span its levels.
    pub fn candidate(self, name: impl Into<String>, fixed_cost: f64, levels: Vec<f64>) -> Self {
        let lb = levels.iter().copied().fold(f64::INFINITY, f64::min);
        let ub = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.candidate_with_bounds(name, fixed_cost, levels, lb, ub)
    }

    pub fn candidate_with_bounds(
        mut self,
        name: impl Into<String>,
        fixed_cost: f64,
        levels: Vec<f64>,
        lb_price: f64,
        ub_price: f64,
    ) -> Self {
        let id = FacilityId::new(self.facilities.len());
        self.facilities.push(Facility {
            id,
            name: name.into(),
            operator: self.leader,
            kind: FacilityKind::Candidate,
            fixed_cost,
            unit_cost: 0.0,
            lb_price,
            ub_price,
            price_levels: levels,
        });
        self
    }

    /// Set the unit cost of the most recently added facility.
    pub fn with_unit_cost(mut self, unit_cost: f64) -> Self {
        if let Some(f) = self.facilities.last_mut() {
            f.unit_cost = unit_cost;
        }
        self
    }

    pub fn strategy(mut self, name: impl Into<String>, prices: Vec<f64>) -> Self {
        self.strategies.push(StrategyProfile {
            name: name.into(),
            prices,
        });
        self
    }

    pub fn open_limits(mut self, min_open: usize, max_open: Option<usize>) -> Self {
        self.open_limits = OpenLimits { min_open, max_open };
        self
    }

    /// Utility coefficients as a function of (facility, customer, scenario).
    pub fn utilities<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize, usize) -> UtilityTerms + 'static,
    {
        self.utilities = Some(Box::new(f));
        self
    }

    /// Materialize and validate the instance.
    pub fn build(self) -> DcflResult<Instance> {
        let n_fac = self.facilities.len();
        let n_cust = self.customers.len();
        let n_scen = self.n_scenarios;
        let len = n_fac * n_cust * n_scen;
        let mut exo_utility = vec![0.0; len];
        let mut endo_coef = vec![0.0; len];
        let mut xi = vec![0.0; len];

        let utilities = self
            .utilities
            .ok_or_else(|| DcflError::Validation("utility coefficients not provided".into()))?;
        for i in 0..n_fac {
            for n in 0..n_cust {
                for r in 0..n_scen {
                    let k = (i * n_cust + n) * n_scen + r;
                    let t = utilities(i, n, r);
                    exo_utility[k] = t.exo;
                    endo_coef[k] = t.endo;
                    xi[k] = t.xi;
                }
            }
        }

        let instance = Instance {
            name: self.name,
            leader: self.leader,
            facilities: self.facilities,
            customers: self.customers,
            n_scenarios: n_scen,
            exo_utility,
            endo_coef,
            xi,
            strategies: self.strategies,
            open_limits: self.open_limits,
        };
        instance.validate()?;
        Ok(instance)
    }
}
