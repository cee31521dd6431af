//! Shared fixtures: seeded random instances and a brute-force reference.

#![allow(dead_code)]

use dcfl_core::{Instance, InstanceBuilder, UtilityTerms};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Shape of a generated instance.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub candidates: usize,
    pub levels: usize,
    pub customers: usize,
    pub scenarios: usize,
    /// Add a priced competitor next to the opt-out
    pub competitor: bool,
}

impl Shape {
    /// Opt-out plus two candidates: 3 facilities, 8 customers, 5 scenarios.
    pub fn small() -> Self {
        Self {
            candidates: 2,
            levels: 3,
            customers: 8,
            scenarios: 5,
            competitor: false,
        }
    }
}

/// Random instance: opt-out (and optional competitor) first, then candidates.
pub fn random_instance(seed: u64, shape: Shape) -> Instance {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_existing = if shape.competitor { 2 } else { 1 };
    let n_fac = n_existing + shape.candidates;

    let mut builder = InstanceBuilder::new(format!("random-{}", seed), shape.scenarios);
    for n in 0..shape.customers {
        builder = builder.customer(format!("c{}", n), rng.gen_range(1.0..5.0));
    }
    builder = builder.existing("opt-out", 1, 0.0);
    if shape.competitor {
        builder = builder.existing("rival", 1, rng.gen_range(1.5..3.0));
    }
    for j in 0..shape.candidates {
        let base: f64 = rng.gen_range(1.0..2.0);
        let levels: Vec<f64> = (0..shape.levels).map(|l| base + l as f64).collect();
        builder = builder
            .candidate(format!("site{}", j), rng.gen_range(0.5..3.0), levels)
            .with_unit_cost(rng.gen_range(0.0..0.5));
    }

    let len = n_fac * shape.customers * shape.scenarios;
    let mut terms = Vec::with_capacity(len);
    for i in 0..n_fac {
        for _ in 0..shape.customers {
            for _ in 0..shape.scenarios {
                let xi = rng.gen_range(-1.0..1.0);
                terms.push(match i {
                    0 => UtilityTerms::new(0.0, 0.0, xi),
                    1 if shape.competitor => UtilityTerms::new(rng.gen_range(2.0..4.0), -1.0, xi),
                    _ => UtilityTerms::new(rng.gen_range(2.0..6.0), rng.gen_range(-1.5..-0.5), xi),
                });
            }
        }
    }
    let (n_cust, n_scen) = (shape.customers, shape.scenarios);
    builder
        .utilities(move |i, n, r| terms[(i * n_cust + n) * n_scen + r])
        .build()
        .expect("generated instance is valid")
}

/// Profit of a level assignment computed straight from the instance.
pub fn profit(instance: &Instance, levels: &[Option<usize>]) -> f64 {
    let prices: Vec<Option<f64>> = instance
        .facilities
        .iter()
        .zip(levels)
        .map(|(f, level)| match f.fixed_price() {
            Some(p) => Some(p),
            None => level.map(|l| f.price_levels[l]),
        })
        .collect();
    let mut total = 0.0;
    for n in 0..instance.num_customers() {
        for r in 0..instance.num_scenarios() {
            let mut best: Option<(usize, f64)> = None;
            for (i, price) in prices.iter().enumerate() {
                let Some(p) = price else { continue };
                let u = instance.utility(i, n, r, *p);
                if best.map_or(true, |(_, b)| u > b) {
                    best = Some((i, u));
                }
            }
            if let Some((i, _)) = best {
                let p = prices[i].unwrap_or(0.0);
                total += instance.pair_weight(n) * instance.margin(i, p);
            }
        }
    }
    let fixed: f64 = instance
        .facilities
        .iter()
        .zip(levels)
        .filter(|(f, l)| f.is_candidate() && l.is_some())
        .map(|(f, _)| f.fixed_cost)
        .sum();
    total - fixed
}

/// Every feasible level assignment.
pub fn all_assignments(instance: &Instance) -> Vec<Vec<Option<usize>>> {
    let mut out: Vec<Vec<Option<usize>>> = vec![Vec::new()];
    for f in &instance.facilities {
        let choices: Vec<Option<usize>> = if f.is_candidate() {
            std::iter::once(None)
                .chain((0..f.price_levels.len()).map(Some))
                .collect()
        } else {
            vec![None]
        };
        out = out
            .into_iter()
            .flat_map(|prefix| {
                choices.iter().map(move |c| {
                    let mut next = prefix.clone();
                    next.push(*c);
                    next
                })
            })
            .collect();
    }
    let limits = instance.open_limits;
    out.retain(|levels| {
        let open = levels.iter().filter(|l| l.is_some()).count();
        open >= limits.min_open && limits.max_open.map_or(true, |m| open <= m)
    });
    out
}

/// Brute-force optimum: (objective, levels).
pub fn brute_force(instance: &Instance) -> (f64, Vec<Option<usize>>) {
    all_assignments(instance)
        .into_iter()
        .map(|levels| (profit(instance, &levels), levels))
        .fold((f64::NEG_INFINITY, Vec::new()), |best, cand| {
            if cand.0 > best.0 {
                cand
            } else {
                best
            }
        })
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() <= 1e-5 * (1.0 + expected.abs()),
        "expected {}, got {}",
        expected,
        actual
    );
}
