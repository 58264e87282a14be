//! Demo interop module. Launched by the master with its spawn index.

use std::process::ExitCode;

use clap::Parser;
use fip::KillReason;
use tracing::Instrument;

#[derive(Parser)]
#[command(name = "fip-module")]
#[command(about = "Demo FIP interop module", long_about = None)]
#[command(version)]
struct Args {
    /// 1-based spawn index assigned by the master
    index: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    fip_cli::logging::init_tracing();

    let span = tracing::info_span!("fip", role = "module", id = args.index);
    let reason = fip_cli::demo::run_module(args.index).instrument(span).await?;

    Ok(match reason {
        KillReason::Finish => ExitCode::SUCCESS,
        KillReason::VersionMismatch => ExitCode::FAILURE,
    })
}
