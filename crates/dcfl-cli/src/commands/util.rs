use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use dcfl_algo::BendersConfig;
use dcfl_core::Instance;
use serde::Serialize;

/// `auto` resolves to the number of logical CPUs.
pub fn resolve_threads(value: &str) -> Result<usize> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get());
    }
    let count: usize = value
        .parse()
        .with_context(|| format!("invalid thread count '{}'", value))?;
    anyhow::ensure!(count > 0, "thread count must be at least 1");
    Ok(count)
}

pub fn load_instance(path: &Path) -> Result<Instance> {
    Instance::from_json_path(path)
        .with_context(|| format!("loading instance from {}", path.display()))
}

/// Read a TOML engine configuration; missing keys take their defaults.
pub fn load_config(path: Option<&Path>) -> Result<BendersConfig> {
    let Some(path) = path else {
        return Ok(BendersConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading configuration {}", path.display()))?;
    let config: BendersConfig = toml::from_str(&text)
        .with_context(|| format!("parsing configuration {}", path.display()))?;
    config.validate().context("validating configuration")?;
    Ok(config)
}

/// Pretty JSON to `out`, or to stdout when no path is given.
pub fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    match out {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_threads() {
        assert_eq!(resolve_threads("3").unwrap(), 3);
        assert!(resolve_threads("auto").unwrap() >= 1);
        assert!(resolve_threads("0").is_err());
        assert!(resolve_threads("many").is_err());
    }
}
