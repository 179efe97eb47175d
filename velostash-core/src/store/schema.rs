/// Per-collection schema bookkeeping.
///
/// One row per collection: the schema version its documents were written with
/// and the key path its table is keyed by.
pub const META_SQL: &str = r"
CREATE TABLE IF NOT EXISTS velostash_meta (
    collection TEXT PRIMARY KEY,
    schema_version INTEGER NOT NULL,
    key_path TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Table name of the parameter collection.
pub const PARAMETERS_TABLE: &str = "file_parameters";

/// Current schema version of the parameter collection.
pub const PARAMETERS_VERSION: u32 = 1;

/// Key path of the parameter collection.
pub const PARAMETERS_KEY_PATH: &str = "fingerprint";

/// Parameter collection: one document per fingerprint.
pub const PARAMETERS_SQL: &str = r"
CREATE TABLE file_parameters (
    fingerprint TEXT PRIMARY KEY,
    source_name TEXT NOT NULL DEFAULT '',
    last_used_at INTEGER NOT NULL,
    doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_parameters_source_name ON file_parameters(source_name);
CREATE INDEX IF NOT EXISTS idx_file_parameters_last_used_at ON file_parameters(last_used_at);
";

/// Table name of the result collection.
pub const RESULTS_TABLE: &str = "analysis_results";

/// Current schema version of the result collection.
pub const RESULTS_VERSION: u32 = 5;

/// Oldest result schema that can be opened without migrating.
pub const RESULTS_MIN_VERSION: u32 = 5;

/// Key path of the result collection.
pub const RESULTS_KEY_PATH: &str = "sourceName+lapKey+notes";

/// Result collection: one document per (source, laps, notes).
pub const RESULTS_SQL: &str = r"
CREATE TABLE analysis_results (
    source_name TEXT NOT NULL,
    lap_key TEXT NOT NULL,
    notes TEXT NOT NULL,
    recording_date TEXT NOT NULL DEFAULT '',
    saved_at TEXT NOT NULL,
    doc TEXT NOT NULL,
    PRIMARY KEY (source_name, lap_key, notes)
);
CREATE INDEX IF NOT EXISTS idx_analysis_results_source_name ON analysis_results(source_name);
CREATE INDEX IF NOT EXISTS idx_analysis_results_saved_at ON analysis_results(saved_at);
";

/// Schema version assumed for a collection table that predates the meta table.
pub const LEGACY_VERSION: u32 = 1;

/// `SQLite` PRAGMAs for a local single-writer database.
pub const PRAGMAS_SQL: &str = r"
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_executes_on_in_memory_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(PRAGMAS_SQL).unwrap();
        conn.execute_batch(META_SQL).unwrap();
        conn.execute_batch(PARAMETERS_SQL).unwrap();
        conn.execute_batch(RESULTS_SQL).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            tables,
            vec![
                RESULTS_TABLE.to_string(),
                PARAMETERS_TABLE.to_string(),
                "velostash_meta".to_string(),
            ]
        );
    }

    #[test]
    fn secondary_indexes_exist() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(PARAMETERS_SQL).unwrap();
        conn.execute_batch(RESULTS_SQL).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            indexes,
            vec![
                "idx_analysis_results_saved_at",
                "idx_analysis_results_source_name",
                "idx_file_parameters_last_used_at",
                "idx_file_parameters_source_name",
            ]
        );
    }

    #[test]
    fn results_version_is_current() {
        assert_eq!(RESULTS_VERSION, 5);
        assert!(RESULTS_MIN_VERSION <= RESULTS_VERSION);
    }
}
