use std::path::Path;

use anyhow::{Context, Result};
use dcfl_algo::benders::ClusterDimension;
use dcfl_algo::cluster::cluster;

use super::util::{load_config, load_instance, resolve_threads, write_json};

pub fn handle(
    instance_path: &Path,
    dimension: ClusterDimension,
    config_path: Option<&Path>,
    threads: Option<&str>,
    out: Option<&Path>,
) -> Result<()> {
    let instance = load_instance(instance_path)?;
    let mut config = load_config(config_path)?;
    if let Some(value) = threads {
        config.threads = resolve_threads(value)?;
    }

    let assignment = cluster(&instance, dimension, &config).context("clustering failed")?;

    println!("Dimension: {:?}", assignment.dimension);
    println!("Clusters: {}", assignment.n_clusters());
    for (c, medoid) in assignment.medoids.iter().enumerate() {
        println!("  {:>3}: medoid {:>4}, members {:?}", c, medoid, assignment.members(c));
    }

    if let Some(path) = out {
        write_json(&assignment, Some(path))?;
    }
    Ok(())
}
