use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dcfl_algo::benders::ClusterDimension;

#[derive(Parser, Debug)]
#[command(
    name = "dcfl",
    author,
    version,
    about = "Benders decomposition for discrete-choice facility location and pricing",
    long_about = None
)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve an instance with the Benders engine
    Solve {
        /// Instance file (JSON)
        #[arg(long)]
        instance: PathBuf,
        /// Engine configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Threads: `auto` or numeric (overrides the configuration)
        #[arg(long)]
        threads: Option<String>,
        /// Strategy profile index (overrides the configuration)
        #[arg(long)]
        strategy: Option<usize>,
        /// Write the solution as JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Report utility bounds and captive-choice statistics
    Bounds {
        /// Instance file (JSON)
        #[arg(long)]
        instance: PathBuf,
        /// Engine configuration (TOML); sign convention and strategy apply
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write bounds and the captive map as JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Cluster scenarios or customers by opportunity cost
    Cluster {
        /// Instance file (JSON)
        #[arg(long)]
        instance: PathBuf,
        /// Index set to cluster
        #[arg(long, value_enum, default_value = "scenario")]
        dimension: DimensionArg,
        /// Engine configuration (TOML) used for the per-index solves
        #[arg(long)]
        config: Option<PathBuf>,
        /// Threads: `auto` or numeric (overrides the configuration)
        #[arg(long)]
        threads: Option<String>,
        /// Write the assignment as JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionArg {
    Scenario,
    Customer,
}

impl From<DimensionArg> for ClusterDimension {
    fn from(arg: DimensionArg) -> Self {
        match arg {
            DimensionArg::Scenario => ClusterDimension::Scenario,
            DimensionArg::Customer => ClusterDimension::Customer,
        }
    }
}
