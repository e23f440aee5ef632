use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::guard::GuardArgs;

#[derive(Parser, Debug)]
#[command(name = "sqlguard", version, about = "Validate and tenant-scope untrusted SQL")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Guard one SQL statement and print the rewritten query as JSON.
    Guard(GuardArgs),

    /// Validate a configuration file against its JSON Schema and semantic rules.
    Check {
        /// Path to the configuration file
        #[arg(
            long,
            short = 'c',
            env = "SQLGUARD_CONFIG",
            default_value = commands::DEFAULT_CONFIG_FILE
        )]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Guard(args) => commands::guard::run(&args),
        Command::Check { config } => {
            commands::check::run(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
