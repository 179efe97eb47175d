use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use chrono::DateTime;

use velostash_core::fingerprint::fingerprint_path;
use velostash_core::retention::RetentionPolicy;
use velostash_core::store::ParameterStore;
use velostash_core::types::ParameterSet;

use super::Globals;

#[derive(Args, Debug)]
pub struct ParamsArgs {
    #[command(subcommand)]
    pub action: ParamsAction,
}

#[derive(Subcommand, Debug)]
pub enum ParamsAction {
    /// Print the stored parameters for a recording
    Show {
        /// Recording file
        file: PathBuf,
    },
    /// Store parameters for a recording
    Save {
        /// Recording file
        file: PathBuf,
        /// JSON document with the parameter set
        params: PathBuf,
        /// Source name to record (default: the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// List stored parameter records, most recently used first
    List,
    /// Apply the retention policy
    Prune {
        /// Keep at most this many records (default from config)
        #[arg(long)]
        max_files: Option<usize>,
        /// Drop records unused for longer than this (default from config)
        #[arg(long)]
        max_age_days: Option<u32>,
    },
    /// Delete every parameter record
    Clear,
}

pub async fn run(args: ParamsArgs, globals: &Globals) -> anyhow::Result<()> {
    let (store, config) = super::open_store(globals).await?;
    let params = store.parameters();
    let mut policy = RetentionPolicy::from(&config.retention);

    match args.action {
        ParamsAction::Show { file } => {
            let fingerprint = fingerprint_of(&file)?;
            let Some(set) = params.load(&fingerprint).await? else {
                anyhow::bail!(
                    "No parameters found for {fingerprint} ({})",
                    file.display()
                );
            };
            println!("{}", serde_json::to_string_pretty(&set)?);
        }
        ParamsAction::Save { file, params: json, name } => {
            let fingerprint = fingerprint_of(&file)?;
            let set: ParameterSet = super::read_json(&json)?;
            let name = name.unwrap_or_else(|| display_name(&file));
            params.save(&fingerprint, &set, &name).await?;
            let report = params.prune(&policy).await?;
            println!("Saved parameters for {name} ({fingerprint})");
            if report.deleted > 0 {
                println!("Pruned {} stale record(s)", report.deleted);
            }
        }
        ParamsAction::List => {
            let records = params.list_all().await?;
            if records.is_empty() {
                println!("No parameter records");
            }
            for record in records {
                let used = DateTime::from_timestamp_millis(record.last_used_at)
                    .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
                println!(
                    "  {:<32} {:<30} {used}",
                    record.fingerprint, record.source_name
                );
            }
        }
        ParamsAction::Prune {
            max_files,
            max_age_days,
        } => {
            if let Some(n) = max_files {
                policy.max_files = n;
            }
            if let Some(d) = max_age_days {
                policy.max_age_days = d;
            }
            let report = params.prune(&policy).await?;
            println!(
                "Examined {}, deleted {}, kept {}",
                report.examined, report.deleted, report.kept
            );
            if report.failed > 0 {
                println!("  {} delete(s) failed; they will be retried next prune", report.failed);
            }
        }
        ParamsAction::Clear => {
            let removed = params.clear().await?;
            println!("Removed {removed} parameter record(s)");
        }
    }

    store.close().context("Failed to close database")?;
    Ok(())
}

fn fingerprint_of(file: &Path) -> anyhow::Result<String> {
    fingerprint_path(file).with_context(|| format!("Cannot read {}", file.display()))
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned())
}
