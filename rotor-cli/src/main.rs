mod cli;
mod commands;
mod config;
mod error;
mod locator;
mod publish;
mod status;

use std::process;

use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    config::AppConfig,
    error::Result,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Reconcile {
            playlist,
            preferred,
            dry_run,
            no_publish,
            annotate,
            status_file,
        } => {
            commands::run_reconcile(
                &config,
                playlist,
                preferred,
                dry_run,
                no_publish,
                annotate,
                status_file,
            )
            .await
        }

        Commands::Scan {
            playlist,
            sample_limit,
        } => commands::run_scan(&config, playlist, sample_limit).await,
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
