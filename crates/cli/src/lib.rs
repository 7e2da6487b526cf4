pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "procura",
    about = "Procura operator CLI",
    long_about = "Operate Procura database migrations, demo fixtures, lifecycle sweeps, and readiness checks.",
    after_help = "Examples:\n  procura doctor --json\n  procura migrate\n  procura sweep"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo fixtures covering the request lifecycle stages")]
    Seed,
    #[command(about = "Run one lifecycle sweep pass: expire overdue requests, close expired ones")]
    Sweep,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate configuration, database connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Sweep => commands::sweep::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
