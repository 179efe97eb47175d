use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use velostash_core::fingerprint::fingerprint_path;

#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// Recording file
    pub file: PathBuf,
}

pub fn run(args: FingerprintArgs) -> anyhow::Result<()> {
    let fingerprint = fingerprint_path(&args.file)
        .with_context(|| format!("Cannot read {}", args.file.display()))?;
    println!("{fingerprint}");
    Ok(())
}
