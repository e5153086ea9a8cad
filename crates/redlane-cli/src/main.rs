//! # redlane CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;

/// Red Lane offline tooling.
///
/// Calculates duty, converts currencies, and inspects feature flags using
/// the built-in reference data.
#[derive(Parser, Debug)]
#[command(name = "redlane", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Duty categories and duty calculation.
    Duty(redlane_cli::duty::DutyArgs),
    /// Exchange rates and conversion.
    Currency(redlane_cli::currency::CurrencyArgs),
    /// Feature-flag catalogue.
    Flags(redlane_cli::flags::FlagsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let output = match &cli.command {
        Commands::Duty(args) => redlane_cli::duty::run(args)?,
        Commands::Currency(args) => redlane_cli::currency::run(args)?,
        Commands::Flags(args) => redlane_cli::flags::run(args)?,
    };
    println!("{}", redlane_cli::render(&output)?);

    Ok(())
}
