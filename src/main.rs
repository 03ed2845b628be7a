use std::process::ExitCode;

use clap::{Parser, Subcommand};

use witness::commands;
use witness::commands::message::{AssessArgs, ClassifyArgs, InboxArgs, ParseArgs};
use witness::commands::names::NamesCommand;
use witness::commands::respawn::RespawnCommand;
use witness::error::ExitError;
use witness::telemetry;

#[derive(Debug, Parser)]
#[command(
    name = "witness",
    version,
    about = "Worker supervision: protocol mail, respawn breaker, and name pool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify a message subject line
    Classify(ClassifyArgs),
    /// Parse a protocol message into its typed payload
    Parse(ParseArgs),
    /// Triage a help request
    Assess(AssessArgs),
    /// Process a JSON inbox file, skipping duplicates
    Inbox(InboxArgs),
    /// Inspect and manage the bead respawn circuit breaker
    Respawn {
        #[command(subcommand)]
        command: RespawnCommand,
    },
    /// Allocate and manage worker names
    Names {
        #[command(subcommand)]
        command: NamesCommand,
    },
    /// Print the JSON Schema for settings/config.toml
    Schema,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Classify(_) => "classify",
            Self::Parse(_) => "parse",
            Self::Assess(_) => "assess",
            Self::Inbox(_) => "inbox",
            Self::Respawn { .. } => "respawn",
            Self::Names { .. } => "names",
            Self::Schema => "schema",
        }
    }
}

fn main() -> ExitCode {
    let _telemetry = telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Classify(args) => args.execute(),
        Commands::Parse(args) => args.execute(),
        Commands::Assess(args) => args.execute(),
        Commands::Inbox(args) => args.execute(),
        Commands::Respawn { command } => command.execute(),
        Commands::Names { command } => command.execute(),
        Commands::Schema => commands::schema::run_schema(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
