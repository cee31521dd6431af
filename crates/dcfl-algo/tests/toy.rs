//! Small hand-checked instances.

mod common;

use common::{assert_close, brute_force, random_instance, Shape};
use dcfl_algo::benders::MasterMode;
use dcfl_algo::{
    solve, solve_observed, BendersConfig, BendersError, SignConvention, SolveStatus,
};
use dcfl_core::{Instance, InstanceBuilder, UtilityTerms};

/// Opt-out plus one candidate with fixed cost 1, prices 1..5, four customers
/// of population 1 and two scenarios of willingness to pay.
fn toy() -> Instance {
    let wtp = [[2.5, 3.5, 4.5, 5.5], [1.5, 3.5, 3.6, 4.2]];
    let mut builder = InstanceBuilder::new("toy", 2);
    for n in 0..4 {
        builder = builder.customer(format!("c{}", n), 1.0);
    }
    builder
        .existing("opt-out", 1, 0.0)
        .candidate("site", 1.0, vec![1.0, 2.0, 3.0, 4.0, 5.0])
        .utilities(move |i, n, r| match i {
            0 => UtilityTerms::new(0.0, 0.0, 0.0),
            _ => UtilityTerms::new(wtp[r][n], -1.0, 0.0),
        })
        .build()
        .unwrap()
}

#[test]
fn toy_revenue_maximizing_price() {
    let solution = solve(&toy(), &BendersConfig::default()).unwrap();
    assert_eq!(solution.status, SolveStatus::Converged);
    assert!(solution.optimal);
    assert!((solution.objective - 8.0).abs() < 1e-4);
    assert!((solution.revenue - 9.0).abs() < 1e-4);
    assert!((solution.fixed_cost - 1.0).abs() < 1e-12);
    assert_eq!(solution.gap, 0.0);

    let open: Vec<_> = solution.open_facilities().collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].name, "site");
    assert_eq!(open[0].price, Some(3.0));
    assert!((open[0].market_share - 0.75).abs() < 1e-4);
    assert!((solution.leader_demand() - 3.0).abs() < 1e-4);
    assert!(solution.summary().contains("[OPEN]   site @ 3.00"));
}

#[test]
fn enumeration_records_requested_count() {
    let config = BendersConfig {
        enumeration: true,
        min_enumerated_solutions: 5,
        ..BendersConfig::default()
    };
    let solution = solve(&toy(), &config).unwrap();
    assert!((solution.objective - 8.0).abs() < 1e-4);
    assert!(solution.explored.len() >= 5);

    let mut levels: Vec<_> = solution.explored.iter().map(|e| e.levels.clone()).collect();
    let before = levels.len();
    levels.sort();
    levels.dedup();
    assert_eq!(levels.len(), before, "explored solutions are distinct");
}

#[test]
fn observer_sees_every_pooled_configuration() {
    let config = BendersConfig {
        enumeration: true,
        min_enumerated_solutions: 3,
        pool_capacity: 3,
        master_mode: MasterMode::Iterative,
        ..BendersConfig::default()
    };
    let mut observed: Vec<(Vec<Option<usize>>, f64)> = Vec::new();
    let solution = solve_observed(&toy(), &config, |entry| {
        observed.push((entry.levels.clone(), entry.objective));
    })
    .unwrap();
    assert!((solution.objective - 8.0).abs() < 1e-4);
    assert!(solution.explored.len() <= 3);
    assert!(observed.len() >= solution.explored.len());
    for entry in &solution.explored {
        assert!(observed.iter().any(|(levels, _)| *levels == entry.levels));
    }
    let mut levels: Vec<_> = observed.iter().map(|(l, _)| l.clone()).collect();
    let before = levels.len();
    levels.sort();
    levels.dedup();
    assert_eq!(levels.len(), before, "each configuration reported once");
}

#[test]
fn enumeration_beyond_space_still_converges() {
    // six configurations exist; asking for more exhausts the master
    let config = BendersConfig {
        enumeration: true,
        min_enumerated_solutions: 10,
        master_mode: MasterMode::Iterative,
        ..BendersConfig::default()
    };
    let solution = solve(&toy(), &config).unwrap();
    assert_eq!(solution.status, SolveStatus::Converged);
    assert_eq!(solution.explored.len(), 6);
    assert!((solution.objective - 8.0).abs() < 1e-4);
}

#[test]
fn infeasible_open_limits() {
    let mut instance = toy();
    instance.open_limits.min_open = 2;
    let err = solve(&instance, &BendersConfig::default()).unwrap_err();
    assert!(matches!(err, BendersError::MasterInfeasible(_)));
}

#[test]
fn positive_price_coefficient_rejected() {
    let instance = InstanceBuilder::new("upward", 1)
        .customer("c", 1.0)
        .existing("opt-out", 1, 0.0)
        .candidate("site", 0.0, vec![1.0, 2.0])
        .utilities(|i, _, _| match i {
            0 => UtilityTerms::new(0.0, 0.0, 0.0),
            _ => UtilityTerms::new(1.0, 0.5, 0.0),
        })
        .build()
        .unwrap();
    let err = solve(&instance, &BendersConfig::default()).unwrap_err();
    assert!(matches!(err, BendersError::InvalidCoefficient { facility: 1, .. }));

    // a free sign convention accepts it; the highest price is then best
    let config = BendersConfig {
        sign_convention: SignConvention::Free,
        ..BendersConfig::default()
    };
    let solution = solve(&instance, &config).unwrap();
    assert_eq!(solution.levels, vec![None, Some(1)]);
    assert!((solution.objective - 2.0).abs() < 1e-6);
}

#[test]
fn strategy_profile_fixes_prices() {
    let instance = InstanceBuilder::new("profile", 1)
        .customer("c0", 1.0)
        .customer("c1", 1.0)
        .existing("opt-out", 1, 0.0)
        .existing_with_bounds("rival", 1, 2.0, 1.0, 3.0)
        .candidate("site", 0.5, vec![1.0, 2.0, 3.0])
        .strategy("cheap rival", vec![0.0, 1.0, 2.0])
        .utilities(|i, n, _| match i {
            0 => UtilityTerms::new(0.0, 0.0, 0.0),
            1 => UtilityTerms::new(2.5, -1.0, 0.0),
            _ => UtilityTerms::new(3.0 + n as f64, -1.0, 0.0),
        })
        .build()
        .unwrap();
    let config = BendersConfig {
        strategy: Some(0),
        ..BendersConfig::default()
    };
    let solution = solve(&instance, &config).unwrap();
    // rival at 1.0 gives utility 1.5; the site at 2.0 gives 1.0 and 2.0
    assert_eq!(solution.facilities[1].price, Some(1.0));
    assert_eq!(solution.facilities[2].price, Some(2.0));
    assert!((solution.objective - (2.0 * 1.0 - 0.5)).abs() < 1e-6);

    let missing = BendersConfig {
        strategy: Some(3),
        ..BendersConfig::default()
    };
    assert!(matches!(
        solve(&instance, &missing),
        Err(BendersError::InvalidConfig(_))
    ));
}

#[test]
fn iteration_limit_reports_best_found() {
    let instance = random_instance(17, Shape::small());
    let (expected, _) = brute_force(&instance);
    let config = BendersConfig {
        max_iterations: 1,
        ..BendersConfig::default()
    };
    let solution = solve(&instance, &config).unwrap();
    assert!(solution.objective <= expected + 1e-6);
    if solution.status == SolveStatus::LimitReached {
        assert!(!solution.optimal);
        assert!(solution.best_bound >= solution.objective);
    } else {
        assert_close(solution.objective, expected);
    }
}
