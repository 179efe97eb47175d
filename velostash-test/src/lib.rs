// Integration test utilities: databases in the shapes older releases wrote.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use serde_json::{Value, json};

use velostash_core::store::schema;

/// A temporary database file seeded with legacy collections.
#[derive(Debug)]
pub struct LegacyDb {
    pub dir: tempfile::TempDir,
    path: PathBuf,
}

impl LegacyDb {
    /// An empty database with only the meta table.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("velostash.db");
        let db = Self { dir, path };
        db.conn()
            .execute_batch(schema::META_SQL)
            .expect("create meta table");
        db
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A raw connection, bypassing the store.
    pub fn conn(&self) -> Connection {
        Connection::open(&self.path).expect("open fixture database")
    }

    /// Result collection as written at `version`, with a meta row.
    pub fn results_at(version: u32, docs: &[Value]) -> Self {
        let db = Self::empty();
        db.write_legacy_table(schema::RESULTS_TABLE, docs);
        db.stamp(schema::RESULTS_TABLE, version, legacy_result_key_path(version));
        db
    }

    /// Result collection from before the meta table existed.
    pub fn results_without_meta(docs: &[Value]) -> Self {
        let db = Self::empty();
        db.write_legacy_table(schema::RESULTS_TABLE, docs);
        db
    }

    /// Result collection in the current layout, stamped with `version`.
    pub fn results_current_layout(version: u32, docs: &[Value]) -> Self {
        let db = Self::empty();
        let conn = db.conn();
        conn.execute_batch(schema::RESULTS_SQL)
            .expect("create results table");
        for doc in docs {
            conn.execute(
                "INSERT INTO analysis_results (source_name, lap_key, notes, recording_date, saved_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    doc["sourceName"].as_str().unwrap_or_default(),
                    doc["lapKey"].as_str().unwrap_or("all"),
                    doc["notes"].as_str().unwrap_or_default(),
                    doc["recordingDate"].as_str().unwrap_or_default(),
                    doc["savedAt"].as_str().unwrap_or_default(),
                    doc.to_string()
                ],
            )
            .expect("insert current result");
        }
        db.stamp(schema::RESULTS_TABLE, version, schema::RESULTS_KEY_PATH);
        db
    }

    /// A result table whose rows cannot be read back as documents.
    pub fn unreadable_results() -> Self {
        let db = Self::empty();
        let conn = db.conn();
        conn.execute_batch(
            "CREATE TABLE analysis_results (id INTEGER PRIMARY KEY, payload BLOB);
             INSERT INTO analysis_results (payload) VALUES (x'00ff');",
        )
        .expect("create unreadable table");
        db.stamp(schema::RESULTS_TABLE, 2, legacy_result_key_path(2));
        db
    }

    /// Parameter collection from before the meta table existed.
    pub fn parameters_without_meta(docs: &[Value]) -> Self {
        let db = Self::empty();
        db.write_legacy_table(schema::PARAMETERS_TABLE, docs);
        db
    }

    /// Rows in `table`, counted through a raw connection.
    pub fn row_count(&self, table: &str) -> i64 {
        self.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .expect("count rows")
    }

    /// Persisted `(schema_version, key_path)` for `collection`.
    pub fn meta(&self, collection: &str) -> Option<(u32, String)> {
        self.conn()
            .query_row(
                "SELECT schema_version, key_path FROM velostash_meta WHERE collection = ?1",
                params![collection],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok()
    }

    fn write_legacy_table(&self, table: &str, docs: &[Value]) {
        let conn = self.conn();
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (id INTEGER PRIMARY KEY AUTOINCREMENT, doc TEXT NOT NULL)"
        ))
        .expect("create legacy table");
        for doc in docs {
            let raw = match doc {
                // Raw strings are stored verbatim so tests can plant invalid JSON.
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            conn.execute(&format!("INSERT INTO {table} (doc) VALUES (?1)"), params![raw])
                .expect("insert legacy doc");
        }
    }

    fn stamp(&self, collection: &str, version: u32, key_path: &str) {
        self.conn()
            .execute(
                "INSERT INTO velostash_meta (collection, schema_version, key_path, updated_at)
                 VALUES (?1, ?2, ?3, '2023-01-01T00:00:00Z')",
                params![collection, version, key_path],
            )
            .expect("stamp meta row");
    }
}

/// Key path the result collection used at `version`.
pub fn legacy_result_key_path(version: u32) -> &'static str {
    match version {
        1 => "fileName",
        2 => "fileName+lapKey",
        3 => "fileName+lapKey+notes",
        _ => schema::RESULTS_KEY_PATH,
    }
}

/// A result document in the shape written at `version` (1..=5).
pub fn legacy_result(version: u32, source: &str, lap_key: &str, notes: &str) -> Value {
    let mut doc = json!({
        "trimStart": 15,
        "trimEnd": 1800,
        "cda": 0.3125,
        "crr": 0.0042,
        "systemMass": 81.5,
        "rho": 1.19,
        "eta": 0.975,
        "r2": 0.97,
        "rmse": 0.51,
    });
    let map = doc.as_object_mut().expect("object literal");

    if version >= 4 {
        map.insert("sourceName".into(), json!(source));
        map.insert("savedAt".into(), json!("2023-09-10T07:30:00Z"));
        map.insert("veGain".into(), json!(42.0));
        map.insert("avgPower".into(), json!(231.0));
    } else {
        map.insert("fileName".into(), json!(source));
        map.insert("timestamp".into(), json!(1_694_331_000_000_i64));
    }
    if version >= 2 {
        map.insert("lapKey".into(), json!(lap_key));
        map.insert("windSource".into(), json!("manual"));
        map.insert("windSpeed".into(), json!(3.0));
        map.insert("windDirection".into(), json!(225.0));
    }
    if version >= 3 {
        map.insert("notes".into(), json!(notes));
    }
    if version >= 5 {
        map.insert("recordingDate".into(), json!("2023-09-09"));
    }
    doc
}

/// A parameter document as early releases wrote it: `fileId`, no `lastUsedAt`.
pub fn legacy_parameters(file_id: &str, system_mass: f64) -> Value {
    json!({
        "fileId": file_id,
        "parameters": {
            "systemMass": system_mass,
            "rho": 1.2,
            "windUnit": "km/h",
            "lapDetection": "auto"
        }
    })
}
