use std::path::PathBuf;

use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "velostash",
    version,
    about = "Inspect, migrate, prune and export local aero-analysis state"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Database file (default: .velostash/velostash.db, or [store] path from config)
    #[arg(long, global = true, env = "VELOSTASH_DB")]
    db: Option<PathBuf>,

    /// Config file (default: ./velostash.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
/// Exit codes:
///   0  success
///   1  general/unknown error
///   2  configuration error
///   3  input file or record not found
///   4  database error
///   5  invalid region / no valid positions
///   6  nothing to export
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}");
    let lower = msg.to_lowercase();

    // The outermost context names the failing step; paths after it must not
    // influence the code.
    if lower.starts_with("cannot load config") {
        return 2;
    }
    if lower.starts_with("cannot read") || lower.starts_with("database not found") {
        return 3;
    }
    if lower.starts_with("cannot open database") {
        return 4;
    }

    if lower.contains("nothing to export") {
        6
    } else if lower.contains("invalid region") || lower.contains("no valid position") {
        5
    } else if lower.contains("configuration error") || lower.contains("invalid config") {
        2
    } else if lower.contains("not found") {
        3
    } else if lower.contains("database")
        || lower.contains("sqlite")
        || lower.contains("store unavailable")
        || lower.contains("migration")
    {
        4
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    let globals = commands::Globals {
        db: cli.db,
        config: cli.config,
    };
    match runtime.block_on(commands::run(cli.command, &globals)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_nothing_to_export() {
        let err = anyhow::anyhow!("Nothing to export: the result collection is empty");
        assert_eq!(classify_exit_code(&err), 6);
    }

    #[test]
    fn exit_code_invalid_region() {
        let err = anyhow::anyhow!(
            "Invalid region: empty or inverted range (start 5, end 2)"
        );
        assert_eq!(classify_exit_code(&err), 5);
        let err = anyhow::anyhow!("No valid position data in region 0..=3");
        assert_eq!(classify_exit_code(&err), 5);
    }

    #[test]
    fn exit_code_config() {
        let err = anyhow::anyhow!("Cannot load config: Parse error: expected `=`");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_not_found() {
        let err = anyhow::anyhow!("Cannot read track.json: No such file or directory");
        assert_eq!(classify_exit_code(&err), 3);
        let err = anyhow::anyhow!("No parameters found for 1a_ride");
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_follows_outer_context_not_path() {
        let err = anyhow::anyhow!("No such file or directory")
            .context("Cannot read /home/rider/config/track.json");
        assert_eq!(classify_exit_code(&err), 3);
        let err = anyhow::anyhow!("unable to open database file")
            .context("Cannot open database: /srv/config/velostash.db");
        assert_eq!(classify_exit_code(&err), 4);
        let err = anyhow::anyhow!("Config file not found: /tmp/missing.toml")
            .context("Cannot load config: /tmp/missing.toml");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_database() {
        let err = anyhow::anyhow!("Cannot open database: /foo/.velostash/velostash.db");
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
