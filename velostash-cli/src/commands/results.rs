use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};

use velostash_core::artifact::{Artifact, DirectorySaver, FileSaver};
use velostash_core::export::{ExportOptions, ExportOutcome};
use velostash_core::store::ResultStore;
use velostash_core::types::AnalysisResultRecord;

use super::Globals;

#[derive(Args, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// Save an analysis result (replaces any result with the same source, laps and notes)
    Save {
        /// JSON document with the result
        result: PathBuf,
    },
    /// List saved results
    List {
        /// Only results for this source file, newest first
        #[arg(long)]
        source: Option<String>,
    },
    /// Export every result as CSV
    Export {
        /// Directory to write the file into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Delete every saved result
    Clear,
}

pub async fn run(args: ResultsArgs, globals: &Globals) -> anyhow::Result<()> {
    let (store, config) = super::open_store(globals).await?;
    let results = store.results();

    match args.action {
        ResultsAction::Save { result } => {
            let record: AnalysisResultRecord = super::read_json(&result)?;
            let stored = results.save_result(&record).await?;
            println!(
                "Saved result for {} (laps {}) at {}",
                stored.source_name,
                stored.lap_key,
                stored.saved_at.to_rfc3339()
            );
        }
        ResultsAction::List { source } => {
            let records = match &source {
                Some(name) => results.list_for_source(name).await?,
                None => results.list_all().await?,
            };
            if records.is_empty() {
                println!("No saved results");
            }
            for r in &records {
                let notes = if r.notes.is_empty() {
                    String::new()
                } else {
                    format!("  \"{}\"", r.notes)
                };
                println!(
                    "  {:<10} {:<30} laps {:<8} CdA {:.3}  Crr {:.4}{notes}",
                    if r.recording_date.is_empty() { "-" } else { r.recording_date.as_str() },
                    r.source_name,
                    r.lap_key,
                    r.cda,
                    r.crr,
                );
            }
        }
        ResultsAction::Export { out } => {
            let options = ExportOptions {
                file_prefix: config.export.file_prefix.clone(),
                ..ExportOptions::default()
            };
            let ExportOutcome::Ready(doc) = results.export_with(&options).await? else {
                anyhow::bail!("Nothing to export: the result collection is empty");
            };
            let rows = doc.row_count;
            let path = DirectorySaver::new(&out)
                .save(&Artifact::from(doc))
                .with_context(|| format!("Cannot write export into {}", out.display()))?;
            println!("Exported {rows} result(s) to {}", path.display());
        }
        ResultsAction::Clear => {
            let removed = results.clear().await?;
            println!("Removed {removed} result(s)");
        }
    }

    store.close().context("Failed to close database")?;
    Ok(())
}
