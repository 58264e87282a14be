//! `fip parse`: check signatures and print their typed form.

use std::io::Write;

use clap::Args;
use fip_signature::parse_function_signature;

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Signatures such as `add(i32,i32)->i32`
    #[arg(required = true)]
    pub signatures: Vec<String>,
}

/// Print one JSON line per valid signature to `out` and an error line per
/// invalid one to `err`. Returns whether every signature parsed.
pub fn run(args: &ParseArgs, out: &mut impl Write, err: &mut impl Write) -> anyhow::Result<bool> {
    let mut ok = true;
    for text in &args.signatures {
        match parse_function_signature(text) {
            Ok(signature) => writeln!(out, "{}", serde_json::to_string(&signature)?)?,
            Err(e) => {
                ok = false;
                writeln!(err, "{text}: {e}")?;
            }
        }
    }
    Ok(ok)
}
