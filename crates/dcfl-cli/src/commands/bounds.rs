use std::path::Path;

use anyhow::{Context, Result};
use dcfl_algo::{prepare, CaptiveMap, PriceBounds, UtilityBounds};
use serde::Serialize;

use super::util::{load_config, load_instance, write_json};

#[derive(Serialize)]
struct BoundsOutput<'a> {
    instance: &'a str,
    price_lb: &'a [f64],
    price_ub: &'a [f64],
    /// Indexed customer-major, then scenario
    big_m: &'a [f64],
    lb_umin: &'a [f64],
    ub_umax: &'a [f64],
    captive_pairs: usize,
    excluded: usize,
    captive: &'a CaptiveMap,
}

fn big_m_stats(bounds: &UtilityBounds) -> (f64, f64, f64) {
    let n = bounds.big_m.len().max(1) as f64;
    let min = bounds.big_m.iter().copied().fold(f64::INFINITY, f64::min);
    let max = bounds.big_m.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = bounds.big_m.iter().sum::<f64>() / n;
    (min, mean, max)
}

pub fn handle(instance_path: &Path, config_path: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let instance = load_instance(instance_path)?;
    let config = load_config(config_path)?;
    let prepared = prepare(&instance, &config).context("computing utility bounds")?;

    let (min, mean, max) = big_m_stats(&prepared.bounds);
    let pairs = instance.num_customers() * instance.num_scenarios();
    println!("Instance: {}", instance.name);
    println!(
        "Facilities: {}, customers: {}, scenarios: {}",
        instance.num_facilities(),
        instance.num_customers(),
        instance.num_scenarios()
    );
    println!("Big-M: min {:.4}, mean {:.4}, max {:.4}", min, mean, max);
    println!(
        "Captive pairs: {} of {}",
        prepared.captive.captive_pairs(),
        pairs
    );
    println!("Excluded (facility, pair) entries: {}", prepared.captive.excluded_count());

    if let Some(path) = out {
        let prices = PriceBounds::from_instance(&instance);
        let output = BoundsOutput {
            instance: &instance.name,
            price_lb: &prices.lb,
            price_ub: &prices.ub,
            big_m: &prepared.bounds.big_m,
            lb_umin: &prepared.bounds.lb_umin,
            ub_umax: &prepared.bounds.ub_umax,
            captive_pairs: prepared.captive.captive_pairs(),
            excluded: prepared.captive.excluded_count(),
            captive: &prepared.captive,
        };
        write_json(&output, Some(path))?;
    }
    Ok(())
}
