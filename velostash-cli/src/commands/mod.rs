pub mod fingerprint;
pub mod params;
pub mod region;
pub mod results;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use tracing::info;

use velostash_core::config::VelostashConfig;
use velostash_core::store::{LocalOpenReport, LocalStore, OpenPath, OpenReport};

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "velostash.toml";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the content fingerprint of a recording
    Fingerprint(fingerprint::FingerprintArgs),
    /// Manage per-recording analysis parameters
    Params(params::ParamsArgs),
    /// Manage saved analysis results
    Results(results::ResultsArgs),
    /// Summarize position and time over a slice of a track
    Region(region::RegionArgs),
    /// Show database location, schema versions and record counts
    Status(status::StatusArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub async fn run(cmd: Command, globals: &Globals) -> anyhow::Result<()> {
    match cmd {
        Command::Fingerprint(args) => fingerprint::run(args),
        Command::Params(args) => params::run(args, globals).await,
        Command::Results(args) => results::run(args, globals).await,
        Command::Region(args) => region::run(args),
        Command::Status(args) => status::run(args, globals).await,
    }
}

/// Load the configuration: `--config` must exist, the default file may not.
pub fn load_config(globals: &Globals) -> anyhow::Result<VelostashConfig> {
    match &globals.config {
        Some(path) => VelostashConfig::load(path)
            .with_context(|| format!("Cannot load config: {}", path.display())),
        None => VelostashConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE))
            .context("Cannot load config: velostash.toml"),
    }
}

/// Resolve the database path: `--db` wins over the config file.
pub fn resolve_db_path(globals: &Globals, config: &VelostashConfig) -> anyhow::Result<PathBuf> {
    if let Some(db) = &globals.db {
        return Ok(db.clone());
    }
    let cwd = std::env::current_dir().context("Cannot resolve working directory")?;
    Ok(config.db_path(&cwd))
}

/// Open the database and both collections, migrating as needed.
pub async fn open_store(globals: &Globals) -> anyhow::Result<(LocalStore, VelostashConfig)> {
    let config = load_config(globals)?;
    let db_path = resolve_db_path(globals, &config)?;
    let (store, report) = LocalStore::open_path(&db_path)
        .await
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;
    log_open(&report);
    Ok((store, config))
}

fn log_open(report: &LocalOpenReport) {
    for r in [&report.parameters, &report.results] {
        log_collection(r);
    }
}

fn log_collection(report: &OpenReport) {
    if report.path == OpenPath::Migrated && report.from_version.is_some() {
        info!(
            collection = report.collection,
            from = ?report.from_version,
            to = report.to_version,
            migrated = report.migrated,
            skipped = report.skipped,
            "Collection upgraded"
        );
    }
}

/// Read and parse a JSON input file.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}
