#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod commands;
mod logging;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "wick")]
#[command(version, about = "Fast npm-like package installer", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Project directory where node_modules resides
    #[arg(long, global = true, value_name = "PATH", default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Resolve, fetch and link packages (from requirements or wick.lock)
    Install {
        /// Requirements like "react", "lodash@^4.17.0", "@types/node@20"
        specs: Vec<String>,

        /// Install strictly from the lockfile; fail on any drift
        #[arg(long)]
        frozen_lockfile: bool,

        /// Parallel fetch/extract workers
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override the registry base URL
        #[arg(long, value_name = "URL")]
        registry: Option<String>,

        /// Override the package store directory
        #[arg(long, value_name = "PATH")]
        store_dir: Option<PathBuf>,
    },

    /// Re-resolve lockfile roots under a policy and reinstall
    Update {
        /// Roots to update, optionally pinned like "x@1.0.0" (empty = all)
        specs: Vec<String>,

        /// Update policy for roots without an explicit spec
        #[arg(long, default_value = "latest", value_parser = ["latest", "minor", "patch"])]
        policy: String,
    },

    /// Remove packages from the project (keeps the store)
    Remove {
        /// Package names to remove
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List roots and packages from wick.lock
    List {
        /// Output format
        #[arg(long, default_value = "table", value_parser = ["table", "json", "yaml"])]
        format: String,
    },

    /// Remove store entries not referenced by the project's lockfile
    Clean {
        /// Only print actions, delete nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify lockfile, store and project link consistency
    Validate,

    /// Write a default wick.json if absent
    Init {
        /// Default registry URL
        #[arg(long, value_name = "URL")]
        registry: Option<String>,

        /// Default store directory
        #[arg(long, value_name = "PATH")]
        store_dir: Option<PathBuf>,

        /// Default concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the wick version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Install {
            specs,
            frozen_lockfile,
            concurrency,
            registry,
            store_dir,
        } => {
            commands::install::run(
                &cli.dir,
                commands::install::InstallArgs {
                    specs,
                    frozen_lockfile,
                    concurrency,
                    registry,
                    store_dir,
                },
            )
            .await
        }
        Commands::Update { specs, policy } => {
            commands::update::run(&cli.dir, &specs, &policy).await
        }
        Commands::Remove { names } => commands::remove::run(&cli.dir, &names),
        Commands::List { format } => commands::list::run(&cli.dir, &format),
        Commands::Clean { dry_run } => commands::clean::run(&cli.dir, dry_run),
        Commands::Validate => commands::validate::run(&cli.dir),
        Commands::Init {
            registry,
            store_dir,
            concurrency,
        } => commands::init::run(&cli.dir, registry, store_dir, concurrency),
        Commands::Version => commands::version::run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
