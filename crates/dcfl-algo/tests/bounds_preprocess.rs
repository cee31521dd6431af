//! Utility bounds and captive preprocessing checked against sampled prices.

mod common;

use common::{random_instance, Shape};
use dcfl_algo::{choice_preprocess, BoundCalculator, ChoiceState, PriceBounds};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn shape() -> Shape {
    Shape {
        candidates: 3,
        levels: 3,
        customers: 6,
        scenarios: 4,
        competitor: true,
    }
}

#[test]
fn sampled_prices_stay_within_bounds() {
    let instance = random_instance(3, shape());
    let prices = PriceBounds::from_instance(&instance);
    let bounds = BoundCalculator::new().compute(&instance, &prices).unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..200 {
        let i = rng.gen_range(0..instance.num_facilities());
        let n = rng.gen_range(0..instance.num_customers());
        let r = rng.gen_range(0..instance.num_scenarios());
        let p = if prices.lb[i] < prices.ub[i] {
            rng.gen_range(prices.lb[i]..=prices.ub[i])
        } else {
            prices.lb[i]
        };
        let u = instance.utility(i, n, r, p);
        assert!(u >= bounds.lb(i, n, r) - 1e-12 && u <= bounds.ub(i, n, r) + 1e-12);
        assert!(u >= bounds.lb_min(n, r) - 1e-12 && u <= bounds.ub_max(n, r) + 1e-12);
    }
}

#[test]
fn big_m_is_the_exact_gap() {
    let instance = random_instance(5, shape());
    let bounds = BoundCalculator::new()
        .compute(&instance, &PriceBounds::from_instance(&instance))
        .unwrap();
    for n in 0..instance.num_customers() {
        for r in 0..instance.num_scenarios() {
            let m = bounds.big_m(n, r);
            assert_eq!(m, bounds.ub_max(n, r) - bounds.lb_min(n, r));
            assert!(m >= 0.0);
        }
    }
}

#[test]
fn bound_calculation_is_idempotent() {
    let instance = random_instance(8, shape());
    let prices = PriceBounds::from_instance(&instance);
    let calc = BoundCalculator::new();
    let first = calc.compute(&instance, &prices).unwrap();
    let second = calc.compute(&instance, &prices).unwrap();
    assert_eq!(first, second);
    for (a, b) in first.big_m.iter().zip(&second.big_m) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

/// Forced facilities win, and excluded ones lose, at every price on a grid
/// with every candidate open.
#[test]
fn captive_marks_hold_on_price_grid() {
    for seed in [1u64, 2, 3, 4] {
        let instance = random_instance(seed, shape());
        let prices = PriceBounds::from_instance(&instance);
        let bounds = BoundCalculator::new().compute(&instance, &prices).unwrap();
        let captive = choice_preprocess(&instance, &bounds);

        let grid: Vec<Vec<f64>> = (0..instance.num_facilities())
            .map(|i| {
                let (lb, ub) = (prices.lb[i], prices.ub[i]);
                (0..4).map(|k| lb + (ub - lb) * k as f64 / 3.0).collect()
            })
            .collect();

        for step in 0..4 {
            let p: Vec<f64> = grid.iter().map(|g| g[step]).collect();
            // stagger candidate prices against each other
            let q: Vec<f64> = grid.iter().enumerate().map(|(i, g)| g[(step + i) % 4]).collect();
            for price in [&p, &q] {
                for n in 0..instance.num_customers() {
                    for r in 0..instance.num_scenarios() {
                        let utilities: Vec<f64> = (0..instance.num_facilities())
                            .map(|i| instance.utility(i, n, r, price[i]))
                            .collect();
                        let best = utilities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                        if let Some(forced) = captive.forced(n, r) {
                            assert_eq!(
                                utilities[forced], best,
                                "seed {} pair ({}, {})",
                                seed, n, r
                            );
                        }
                        for i in 0..instance.num_facilities() {
                            if captive.get(i, n, r) == ChoiceState::Excluded {
                                let beaten = instance
                                    .existing()
                                    .any(|f| {
                                        f.id.value() != i
                                            && utilities[f.id.value()] >= utilities[i]
                                    });
                                assert!(beaten, "excluded facility {} wins pair ({}, {})", i, n, r);
                            }
                        }
                    }
                }
            }
        }
    }
}
