//! Utility interval bounds and big-M constants.
//!
//! For every (facility, customer, scenario) triple the utility is affine in the
//! facility's price, so its range over `[lb_p, ub_p]` is attained at the price
//! bounds. Which end gives the lower bound depends on the sign of the price
//! coefficient:
//!
//! ```text
//! endo ≤ 0:  lb_U = exo + endo·ub_p + xi,   ub_U = exo + endo·lb_p + xi
//! endo > 0:  lb_U = exo + endo·lb_p + xi,   ub_U = exo + endo·ub_p + xi
//! ```
//!
//! Per (customer, scenario) the calculator also reports `lb_Umin`, `ub_Umax`
//! and the big-M gap `M = ub_Umax - lb_Umin` used by the master linearization.

use dcfl_core::Instance;
use serde::{Deserialize, Serialize};

use crate::error::{BendersError, BendersResult};

/// Which signs of the price coefficient are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Customers dislike higher prices: every coefficient must be `≤ 0`.
    #[default]
    NonPositive,
    /// Either sign is accepted and the bound mapping inverts for positive ones.
    Free,
}

/// Per-facility price intervals, whole-instance or restricted to a subgame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub lb: Vec<f64>,
    pub ub: Vec<f64>,
}

impl PriceBounds {
    /// Price bounds as declared on the instance facilities.
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            lb: instance.facilities.iter().map(|f| f.lb_price).collect(),
            ub: instance.facilities.iter().map(|f| f.ub_price).collect(),
        }
    }

    /// Narrow one facility's interval. The new interval must lie inside the
    /// current one.
    pub fn restrict(&mut self, facility: usize, lb: f64, ub: f64) -> BendersResult<()> {
        if facility >= self.lb.len() {
            return Err(BendersError::InvalidConfig(format!(
                "cannot restrict facility {}: only {} facilities",
                facility,
                self.lb.len()
            )));
        }
        if !(lb <= ub) || lb < self.lb[facility] || ub > self.ub[facility] {
            return Err(BendersError::InvalidConfig(format!(
                "restriction [{}, {}] for facility {} is not inside [{}, {}]",
                lb, ub, facility, self.lb[facility], self.ub[facility]
            )));
        }
        self.lb[facility] = lb;
        self.ub[facility] = ub;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lb.is_empty()
    }
}

/// Interval bounds on utility, laid out like the instance tensors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilityBounds {
    n_customers: usize,
    n_scenarios: usize,
    /// Per (i,n,r), index `(i·N + n)·R + r`
    pub lb_u: Vec<f64>,
    pub ub_u: Vec<f64>,
    /// Per (n,r), index `n·R + r`
    pub lb_umin: Vec<f64>,
    pub ub_umax: Vec<f64>,
    pub big_m: Vec<f64>,
}

impl UtilityBounds {
    #[inline]
    fn idx(&self, facility: usize, customer: usize, scenario: usize) -> usize {
        (facility * self.n_customers + customer) * self.n_scenarios + scenario
    }

    #[inline]
    pub fn lb(&self, facility: usize, customer: usize, scenario: usize) -> f64 {
        self.lb_u[self.idx(facility, customer, scenario)]
    }

    #[inline]
    pub fn ub(&self, facility: usize, customer: usize, scenario: usize) -> f64 {
        self.ub_u[self.idx(facility, customer, scenario)]
    }

    #[inline]
    pub fn lb_min(&self, customer: usize, scenario: usize) -> f64 {
        self.lb_umin[customer * self.n_scenarios + scenario]
    }

    #[inline]
    pub fn ub_max(&self, customer: usize, scenario: usize) -> f64 {
        self.ub_umax[customer * self.n_scenarios + scenario]
    }

    /// Big-M gap `ub_Umax - lb_Umin` for a customer-scenario pair.
    #[inline]
    pub fn big_m(&self, customer: usize, scenario: usize) -> f64 {
        self.big_m[customer * self.n_scenarios + scenario]
    }

    pub fn n_facilities(&self) -> usize {
        if self.n_customers == 0 || self.n_scenarios == 0 {
            0
        } else {
            self.lb_u.len() / (self.n_customers * self.n_scenarios)
        }
    }

    pub fn n_customers(&self) -> usize {
        self.n_customers
    }

    pub fn n_scenarios(&self) -> usize {
        self.n_scenarios
    }
}

/// Stateless bound derivation; may be re-invoked after restricting prices.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundCalculator {
    convention: SignConvention,
}

impl BoundCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_convention(mut self, convention: SignConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Derive utility bounds for the given price intervals.
    pub fn compute(
        &self,
        instance: &Instance,
        prices: &PriceBounds,
    ) -> BendersResult<UtilityBounds> {
        let n_fac = instance.num_facilities();
        let n_cust = instance.num_customers();
        let n_scen = instance.num_scenarios();

        if prices.len() != n_fac {
            return Err(BendersError::InvalidConfig(format!(
                "price bounds cover {} facilities, instance has {}",
                prices.len(),
                n_fac
            )));
        }
        for i in 0..n_fac {
            let (lb, ub) = (prices.lb[i], prices.ub[i]);
            if !lb.is_finite() || !ub.is_finite() {
                return Err(BendersError::DegenerateBounds(format!(
                    "facility {} has price bounds [{}, {}]",
                    i, lb, ub
                )));
            }
        }

        let len = n_fac * n_cust * n_scen;
        let mut lb_u = vec![0.0; len];
        let mut ub_u = vec![0.0; len];

        for i in 0..n_fac {
            let (p_lo, p_hi) = (prices.lb[i], prices.ub[i]);
            for n in 0..n_cust {
                for r in 0..n_scen {
                    let k = instance.index(i, n, r);
                    let t = instance.terms(i, n, r);
                    if !t.exo.is_finite() || !t.endo.is_finite() || !t.xi.is_finite() {
                        return Err(BendersError::DegenerateBounds(format!(
                            "non-finite utility terms for facility {}, customer {}, scenario {}",
                            i, n, r
                        )));
                    }
                    if t.endo > 0.0 && self.convention == SignConvention::NonPositive {
                        return Err(BendersError::InvalidCoefficient {
                            facility: i,
                            customer: n,
                            scenario: r,
                            value: t.endo,
                        });
                    }
                    // Same evaluation order as Instance::utility so sampled
                    // utilities never fall outside the interval.
                    let at_lo = t.exo + t.endo * p_lo + t.xi;
                    let at_hi = t.exo + t.endo * p_hi + t.xi;
                    if t.endo <= 0.0 {
                        lb_u[k] = at_hi;
                        ub_u[k] = at_lo;
                    } else {
                        lb_u[k] = at_lo;
                        ub_u[k] = at_hi;
                    }
                }
            }
        }

        let mut lb_umin = vec![f64::INFINITY; n_cust * n_scen];
        let mut ub_umax = vec![f64::NEG_INFINITY; n_cust * n_scen];
        for n in 0..n_cust {
            for r in 0..n_scen {
                let pair = n * n_scen + r;
                for i in 0..n_fac {
                    let k = instance.index(i, n, r);
                    lb_umin[pair] = lb_umin[pair].min(lb_u[k]);
                    ub_umax[pair] = ub_umax[pair].max(ub_u[k]);
                }
            }
        }
        let big_m: Vec<f64> = ub_umax
            .iter()
            .zip(&lb_umin)
            .map(|(hi, lo)| hi - lo)
            .collect();

        if let Some(pos) = big_m.iter().position(|m| !m.is_finite()) {
            return Err(BendersError::DegenerateBounds(format!(
                "big-M for customer {}, scenario {} is not finite",
                pos / n_scen,
                pos % n_scen
            )));
        }

        Ok(UtilityBounds {
            n_customers: n_cust,
            n_scenarios: n_scen,
            lb_u,
            ub_u,
            lb_umin,
            ub_umax,
            big_m,
        })
    }
}
