//! `fip master`: run one session and print what the modules answered.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use fip::{CompileTarget, FRAME_SIZE, Master, MasterConfig, Message};
use fip_signature::parse_function_signature;
use tracing::Instrument;

use crate::session::{SessionPlan, run_session};

#[derive(Args, Debug)]
pub struct MasterArgs {
    /// JSON session file listing the modules to launch
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Socket path, overriding the session file
    #[arg(long, env = "FIP_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Symbol to look up, repeatable
    #[arg(long = "symbol", value_name = "SIGNATURE")]
    pub symbols: Vec<String>,

    /// Compile target as arch-sub-vendor-sys-abi
    #[arg(long)]
    pub target: Option<String>,

    /// Response window after each request, in milliseconds
    #[arg(long, default_value = "200")]
    pub window_ms: u64,
}

impl MasterArgs {
    fn master_config(&self) -> anyhow::Result<MasterConfig> {
        let mut config = match &self.config {
            Some(path) => MasterConfig::from_file(path)?,
            None => MasterConfig::default(),
        };
        if let Some(socket) = &self.socket {
            config = config.with_socket_path(socket);
        }
        Ok(config)
    }

    fn plan(&self) -> anyhow::Result<SessionPlan> {
        let symbols = self
            .symbols
            .iter()
            .map(|text| {
                let signature =
                    parse_function_signature(text).with_context(|| format!("--symbol {text}"))?;
                let needed = Message::symbol_request(signature.clone()).encoded_len();
                if needed > FRAME_SIZE {
                    anyhow::bail!(
                        "--symbol {}: request needs {needed} bytes but a frame holds {FRAME_SIZE}",
                        signature.name
                    );
                }
                Ok(signature)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut plan = SessionPlan::new(symbols).with_window(Duration::from_millis(self.window_ms));
        if let Some(target) = &self.target {
            let target: CompileTarget = target
                .parse()
                .with_context(|| format!("--target {target}"))?;
            plan = plan.with_target(target);
        }
        Ok(plan)
    }
}

pub async fn run(args: MasterArgs) -> anyhow::Result<()> {
    let config = args.master_config()?;
    let plan = args.plan()?;

    let span = tracing::info_span!("fip", role = "master", id = std::process::id());
    let report = async {
        let mut master = Master::bind(config).await?;
        run_session(&mut master, &plan).await
    }
    .instrument(span)
    .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: MasterArgs,
    }

    fn args(argv: &[&str]) -> MasterArgs {
        Harness::parse_from(std::iter::once("fip").chain(argv.iter().copied())).args
    }

    #[test]
    fn symbols_and_target_become_a_plan() {
        let plan = args(&[
            "--symbol",
            "foo()->i32",
            "--symbol",
            "bar(u64,f32)",
            "--target",
            "x86_64-none-pc-linux-gnu",
            "--window-ms",
            "50",
        ])
        .plan()
        .unwrap();

        let symbols: Vec<_> = plan.symbols.iter().map(|s| s.to_string()).collect();
        assert_eq!(symbols, vec!["foo()->i32", "bar(u64,f32)"]);
        assert_eq!(plan.window, Duration::from_millis(50));
        assert_eq!(
            plan.target.unwrap().to_string(),
            "x86_64-none-pc-linux-gnu"
        );
    }

    #[test]
    fn bad_symbol_names_the_flag() {
        let err = args(&["--symbol", "foo(int)"]).plan().unwrap_err();
        assert!(format!("{err:#}").contains("--symbol foo(int)"));
    }

    #[test]
    fn symbol_too_large_for_a_frame_is_rejected_up_front() {
        let types = vec!["u8"; 255].join(",");
        let oversized = format!("big({types})->{types}");
        let err = args(&["--symbol", "ok()", "--symbol", &oversized])
            .plan()
            .unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"--symbol big: request needs 1152 bytes but a frame holds 1024"
        );
    }

    #[test]
    fn socket_flag_overrides_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("session.json");
        std::fs::write(
            &session,
            r#"{ "socket_path": "/tmp/from-file.sock", "modules": [] }"#,
        )
        .unwrap();

        let config = args(&[
            "--config",
            session.to_str().unwrap(),
            "--socket",
            "/tmp/from-flag.sock",
        ])
        .master_config()
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/from-flag.sock"));
    }
}
