//! Integration tests for the `dcfl` binary

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use dcfl_core::{InstanceBuilder, UtilityTerms};
use predicates::prelude::*;
use tempfile::TempDir;

/// One candidate priced 1..5 against an opt-out; optimum is price 3.
fn write_toy(dir: &Path) -> PathBuf {
    let wtp = [[2.5, 3.5, 4.5, 5.5], [1.5, 3.5, 3.6, 4.2]];
    let mut builder = InstanceBuilder::new("toy", 2);
    for n in 0..4 {
        builder = builder.customer(format!("c{}", n), 1.0);
    }
    let instance = builder
        .existing("opt-out", 1, 0.0)
        .candidate("site", 1.0, vec![1.0, 2.0, 3.0, 4.0, 5.0])
        .utilities(move |i, n, r| match i {
            0 => UtilityTerms::new(0.0, 0.0, 0.0),
            _ => UtilityTerms::new(wtp[r][n], -1.0, 0.0),
        })
        .build()
        .unwrap();
    let path = dir.join("toy.json");
    fs::write(&path, instance.to_json_string().unwrap()).unwrap();
    path
}

#[test]
fn test_help() {
    let mut cmd = cargo_bin_cmd!("dcfl");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("solve"))
        .stdout(predicate::str::contains("bounds"))
        .stdout(predicate::str::contains("cluster"));
}

#[test]
fn test_solve_toy() {
    let dir = TempDir::new().unwrap();
    let instance = write_toy(dir.path());
    let out = dir.path().join("solution.json");

    let mut cmd = cargo_bin_cmd!("dcfl");
    cmd.args(["solve", "--instance"])
        .arg(&instance)
        .args(["--threads", "2", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("[OPEN]   site @ 3.00"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["instance"], "toy");
    assert_eq!(json["status"], "converged");
    assert!((json["objective"].as_f64().unwrap() - 8.0).abs() < 1e-4);
    assert_eq!(json["levels"][1], 2);
}

#[test]
fn test_solve_with_config_file() {
    let dir = TempDir::new().unwrap();
    let instance = write_toy(dir.path());
    let config = dir.path().join("engine.toml");
    fs::write(
        &config,
        "master_mode = \"iterative\"\nenumeration = true\nmin_enumerated_solutions = 3\n",
    )
    .unwrap();

    let mut cmd = cargo_bin_cmd!("dcfl");
    cmd.args(["solve", "--instance"])
        .arg(&instance)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Explored solutions"));
}

#[test]
fn test_bounds_report() {
    let dir = TempDir::new().unwrap();
    let instance = write_toy(dir.path());
    let out = dir.path().join("bounds.json");

    let mut cmd = cargo_bin_cmd!("dcfl");
    cmd.args(["bounds", "--instance"])
        .arg(&instance)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Big-M"))
        .stdout(predicate::str::contains("Captive pairs"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["big_m"].as_array().unwrap().len(), 8);
    assert_eq!(json["price_ub"][1], 5.0);
}

#[test]
fn test_cluster_small_instance_is_identity() {
    let dir = TempDir::new().unwrap();
    let instance = write_toy(dir.path());

    let mut cmd = cargo_bin_cmd!("dcfl");
    cmd.args(["cluster", "--instance"])
        .arg(&instance)
        .args(["--dimension", "scenario"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Clusters: 2"));
}

#[test]
fn test_bad_config_fails() {
    let dir = TempDir::new().unwrap();
    let instance = write_toy(dir.path());
    let config = dir.path().join("bad.toml");
    fs::write(&config, "aggregation = \"Sideways\"\n").unwrap();

    let mut cmd = cargo_bin_cmd!("dcfl");
    cmd.args(["solve", "--instance"])
        .arg(&instance)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsing configuration"));
}

#[test]
fn test_missing_instance_fails() {
    let mut cmd = cargo_bin_cmd!("dcfl");
    cmd.args(["solve", "--instance", "/nonexistent/instance.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading instance"));
}
