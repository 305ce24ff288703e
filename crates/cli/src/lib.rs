pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "hark",
    about = "Hark operator CLI",
    long_about = "Operate the Hark voice assistant: migrations, readiness checks, and a text repl against a live workspace.",
    after_help = "Examples:\n  hark migrate\n  hark doctor --json\n  hark repl --workspace T0ACME"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Bring the conversation database schema up to date")]
    Migrate,
    #[command(about = "Check config, Slack token shape, and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit the report as JSON")]
        json: bool,
    },
    #[command(about = "Drive the assistant with typed utterances instead of audio")]
    Repl {
        #[arg(long, help = "Slack workspace id the session belongs to")]
        workspace: String,
        #[arg(long, help = "Path to a hark.toml config file")]
        config: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Repl { workspace, config } => commands::repl::run(&workspace, config),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
