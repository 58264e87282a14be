use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fip_cli::commands;

#[derive(Parser)]
#[command(name = "fip")]
#[command(about = "Flint Interop Protocol master", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse function signatures and print them as JSON
    Parse(commands::parse::ParseArgs),

    /// Run a master session
    Master(commands::master::MasterArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    fip_cli::logging::init_tracing();

    match cli.command {
        Commands::Parse(args) => {
            let ok = commands::parse::run(&args, &mut std::io::stdout(), &mut std::io::stderr())?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Master(args) => {
            commands::master::run(args).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
