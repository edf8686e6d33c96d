// Gantry CLI
// Parses arguments and dispatches to the run, validate and plan commands

mod commands;
mod output;

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::Result;

use commands::plan::PlanArgs;
use commands::run::RunArgs;
use commands::validate::ValidateArgs;

/// Run GitHub Actions style workflows locally
#[derive(Parser, Debug)]
#[command(name = "gantry", version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a workflow
    Run(RunArgs),
    /// Parse and validate a workflow
    Validate(ValidateArgs),
    /// Print the planned job order
    Plan(PlanArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    workflow_engine::logging::init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Validate(args) => commands::validate::execute(args),
        Command::Plan(args) => commands::plan::execute(args),
    }
}
