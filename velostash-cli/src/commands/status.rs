use anyhow::Context;
use clap::Args;

use velostash_core::store::{Database, LocalStore};

use super::Globals;

#[derive(Args, Debug)]
pub struct StatusArgs {}

pub async fn run(_args: StatusArgs, globals: &Globals) -> anyhow::Result<()> {
    let config = super::load_config(globals)?;
    let db_path = super::resolve_db_path(globals, &config)?;
    if !db_path.exists() {
        anyhow::bail!("Database not found: {}", db_path.display());
    }

    // Read-only view: report the persisted schema without migrating it.
    let db = Database::open(&db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;
    let store = LocalStore::new(db);
    let stats = store.stats().context("Failed to read store stats")?;

    println!("Velostash status");
    println!();
    println!("  Database: {}", db_path.display());
    if stats.db_size_bytes > 0 {
        println!("  Size:     {}", format_bytes(stats.db_size_bytes));
    }
    println!();

    println!("  {:<20} {:>8} {:>8}  Key", "Collection", "Schema", "Records");
    for c in &stats.collections {
        let version = c
            .schema_version
            .map_or_else(|| "-".to_string(), |v| format!("v{v}"));
        println!(
            "  {:<20} {:>8} {:>8}  {}",
            c.name,
            version,
            c.records,
            c.key_path.as_deref().unwrap_or("-")
        );
    }

    store.close().context("Failed to close database")?;
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
