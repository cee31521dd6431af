use std::io;

use clap::Parser;
use dcfl_cli::cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG directives refine the --log-level default
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(cli.log_level.into()))
        .with_writer(io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Solve {
            instance,
            config,
            threads,
            strategy,
            out,
        } => commands::solve::handle(
            instance,
            config.as_deref(),
            threads.as_deref(),
            *strategy,
            out.as_deref(),
        ),
        Commands::Bounds {
            instance,
            config,
            out,
        } => commands::bounds::handle(instance, config.as_deref(), out.as_deref()),
        Commands::Cluster {
            instance,
            dimension,
            config,
            threads,
            out,
        } => commands::cluster::handle(
            instance,
            (*dimension).into(),
            config.as_deref(),
            threads.as_deref(),
            out.as_deref(),
        ),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
