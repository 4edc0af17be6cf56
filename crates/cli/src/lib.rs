pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "altura",
    about = "Altura operator CLI",
    long_about = "Check readiness of the rental sales bot, prepare its database, inspect configuration and price catalog items.",
    after_help = "Examples:\n  altura doctor --json\n  altura config\n  altura price --equipment 4 --equipment 7 --days 10"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the standard equipment catalog (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Telegram token, LLM key, PDF renderer and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Price catalog items for a rental period with the configured tiers and tax")]
    Price {
        #[arg(long = "equipment", required = true, num_args = 1.., help = "Catalog id; repeat for several items")]
        equipment: Vec<i64>,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..), help = "Rental days")]
        days: u32,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Price { equipment, days } => commands::price::run(&equipment, days),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
