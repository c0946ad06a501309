//! extmgr CLI - manage sysext images from the command line.
//!
//! Most subcommands talk to extmgrd over its socket; the json file
//! utilities work offline for catalog authoring.

mod cli;
mod client;
mod commands;

use clap::Parser;
use owo_colors::OwoColorize;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::List(args) => commands::list::run(&cli, args).await,
        Commands::Check(args) => commands::check::run(&cli, args).await,
        Commands::Update(args) => commands::update::run(&cli, args).await,
        Commands::Install(args) => commands::install::run(&cli, args).await,
        Commands::Cleanup(args) => commands::cleanup::run(&cli, args).await,
        Commands::CreateJson(args) => commands::jsonutil::create_json(args),
        Commands::MergeJson(args) => commands::jsonutil::merge_json(args),
        Commands::DumpJson(args) => commands::jsonutil::dump_json(args),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "✗".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
