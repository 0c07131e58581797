pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "switchdesk",
    about = "Switchdesk operator CLI",
    long_about = "Inspect Switchdesk configuration, check Discord readiness, and print the slash-command manifest.",
    after_help = "Examples:\n  switchdesk doctor --json\n  switchdesk config\n  switchdesk commands > commands.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, the interactions key, Discord reachability and guild resources")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the slash-command manifest JSON for registration")]
    Commands,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Commands => commands::manifest::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
