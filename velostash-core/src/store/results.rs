use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::types::{AnalysisResultRecord, ResultKey};

use super::migrate::{self, TransformError};
use super::schema;
use super::sqlite::Database;
use super::traits::ResultStore;
use super::versioned::{Collection, OpenReport, StoreState, VersionedStore};

/// The result collection: one document per (source name, lap key, notes).
#[derive(Debug)]
pub struct ResultCollection;

impl Collection for ResultCollection {
    type Record = AnalysisResultRecord;

    const NAME: &'static str = schema::RESULTS_TABLE;
    const VERSION: u32 = schema::RESULTS_VERSION;
    const MIN_VERSION: u32 = schema::RESULTS_MIN_VERSION;
    const KEY_PATH: &'static str = schema::RESULTS_KEY_PATH;
    const CREATE_SQL: &'static str = schema::RESULTS_SQL;

    fn upgrade(raw: &str, from_version: u32) -> Result<Self::Record, TransformError> {
        migrate::upgrade_result(raw, from_version)
    }

    fn upsert(conn: &Connection, record: &Self::Record) -> Result<(), StoreError> {
        let doc = serde_json::to_string(record)?;
        // Fixed-width UTC text so the saved_at index sorts chronologically.
        let saved_at = record.saved_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        conn.execute(
            "INSERT INTO analysis_results (source_name, lap_key, notes, recording_date, saved_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source_name, lap_key, notes) DO UPDATE SET
                recording_date = excluded.recording_date,
                saved_at = excluded.saved_at,
                doc = excluded.doc",
            params![
                record.source_name,
                record.lap_key.as_str(),
                record.notes,
                record.recording_date,
                saved_at,
                doc
            ],
        )
        .map_err(|e| StoreError::write(Self::NAME, e))?;
        Ok(())
    }
}

/// `SQLite`-backed [`ResultStore`].
#[derive(Debug)]
pub struct SqliteResultStore {
    inner: VersionedStore<ResultCollection>,
}

impl SqliteResultStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: VersionedStore::new(db),
        }
    }

    /// Upsert a record as-is, keeping its `savedAt` (imports, fixtures).
    pub fn put_record(&self, record: &AnalysisResultRecord) -> Result<(), StoreError> {
        self.inner
            .with_conn(|conn| ResultCollection::upsert(conn, record))
    }
}

fn query_docs(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<AnalysisResultRecord>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let docs = stmt
        .query_map(args, |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    docs.iter()
        .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
        .collect()
}

#[async_trait::async_trait]
impl ResultStore for SqliteResultStore {
    async fn open(&self) -> crate::error::Result<OpenReport> {
        Ok(self.inner.open()?)
    }

    fn close(&self) {
        self.inner.close();
    }

    fn state(&self) -> StoreState {
        self.inner.state()
    }

    async fn save_result(
        &self,
        record: &AnalysisResultRecord,
    ) -> crate::error::Result<AnalysisResultRecord> {
        let mut stored = record.clone();
        stored.saved_at = Utc::now();
        self.put_record(&stored)?;
        debug!(
            source = %stored.source_name,
            laps = %stored.lap_key,
            "Saved analysis result"
        );
        Ok(stored)
    }

    async fn get(&self, key: &ResultKey) -> crate::error::Result<Option<AnalysisResultRecord>> {
        let record = self.inner.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM analysis_results
                     WHERE source_name = ?1 AND lap_key = ?2 AND notes = ?3",
                    params![key.source_name, key.lap_key.as_str(), key.notes],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
                .transpose()
        })?;
        Ok(record)
    }

    async fn list_all(&self) -> crate::error::Result<Vec<AnalysisResultRecord>> {
        let records = self.inner.with_conn(|conn| {
            query_docs(
                conn,
                "SELECT doc FROM analysis_results ORDER BY source_name, lap_key, notes",
                [],
            )
        })?;
        Ok(records)
    }

    async fn list_for_source(
        &self,
        source_name: &str,
    ) -> crate::error::Result<Vec<AnalysisResultRecord>> {
        let records = self.inner.with_conn(|conn| {
            query_docs(
                conn,
                "SELECT doc FROM analysis_results WHERE source_name = ?1
                 ORDER BY saved_at DESC, lap_key, notes",
                params![source_name],
            )
        })?;
        Ok(records)
    }

    async fn delete(&self, key: &ResultKey) -> crate::error::Result<bool> {
        let changed = self.inner.with_conn(|conn| {
            conn.execute(
                "DELETE FROM analysis_results
                 WHERE source_name = ?1 AND lap_key = ?2 AND notes = ?3",
                params![key.source_name, key.lap_key.as_str(), key.notes],
            )
            .map_err(|e| StoreError::write(ResultCollection::NAME, e))
        })?;
        Ok(changed > 0)
    }

    async fn count(&self) -> crate::error::Result<u64> {
        let count: i64 = self.inner.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM analysis_results", [], |row| {
                row.get(0)
            })?)
        })?;
        Ok(count.unsigned_abs())
    }

    async fn clear(&self) -> crate::error::Result<u64> {
        let removed = self.inner.with_conn(|conn| {
            conn.execute("DELETE FROM analysis_results", [])
                .map_err(|e| StoreError::write(ResultCollection::NAME, e))
        })?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportOutcome;
    use crate::types::{LapKey, WindSource};
    use chrono::{Duration, TimeZone};

    async fn open_store() -> SqliteResultStore {
        let db = Arc::new(Database::in_memory().unwrap());
        let store = SqliteResultStore::new(db);
        store.open().await.unwrap();
        store
    }

    fn result(source: &str, laps: &[u32], notes: &str, cda: f64) -> AnalysisResultRecord {
        AnalysisResultRecord {
            source_name: source.to_string(),
            lap_key: LapKey::from_laps(laps),
            notes: notes.to_string(),
            trim_start: 0,
            trim_end: 600,
            cda,
            crr: 0.004,
            wind_source: WindSource::None,
            wind_speed: None,
            wind_direction: None,
            system_mass: 80.0,
            rho: 1.2,
            eta: 0.97,
            r2: Some(0.99),
            rmse: Some(0.3),
            ve_gain: None,
            actual_gain: None,
            avg_power: Some(250.0),
            avg_speed: Some(10.5),
            avg_temperature: None,
            recording_date: "2024-05-01".to_string(),
            saved_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn composite_key_keeps_variants_apart() {
        let store = open_store().await;
        store.save_result(&result("a.fit", &[], "", 0.30)).await.unwrap();
        store.save_result(&result("a.fit", &[1], "", 0.31)).await.unwrap();
        store
            .save_result(&result("a.fit", &[1], "helmet B", 0.29))
            .await
            .unwrap();
        store.save_result(&result("b.fit", &[], "", 0.35)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 4);
        let key = ResultKey::new("a.fit", LapKey::from_laps(&[1]), "helmet B");
        let found = store.get(&key).await.unwrap().unwrap();
        assert!((found.cda - 0.29).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn same_key_overwrites_and_stamps_saved_at() {
        let store = open_store().await;
        let before = Utc::now();
        store.save_result(&result("a.fit", &[2, 1], "", 0.30)).await.unwrap();
        let stored = store
            .save_result(&result("a.fit", &[1, 2], "", 0.28))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert!(stored.saved_at >= before);
        let found = store.get(&stored.key()).await.unwrap().unwrap();
        assert!((found.cda - 0.28).abs() < f64::EPSILON);
        assert_eq!(found.lap_key.as_str(), "1-2");
    }

    #[tokio::test]
    async fn decoded_lap_keys_share_one_identity() {
        let store = open_store().await;
        for lap_key in ["3-1", "1-3", "", "all"] {
            let mut doc = serde_json::to_value(result("a.fit", &[], "", 0.3)).unwrap();
            doc["lapKey"] = serde_json::json!(lap_key);
            let record: AnalysisResultRecord = serde_json::from_value(doc).unwrap();
            store.save_result(&record).await.unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 2);
        let key = ResultKey::new("a.fit", LapKey::from_laps(&[3, 1]), "");
        assert!(store.get(&key).await.unwrap().is_some());
        assert!(store
            .get(&ResultKey::new("a.fit", LapKey::all(), ""))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn list_for_source_is_newest_first() {
        let store = open_store().await;
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        for (i, laps) in [[1u32], [2], [3]].iter().enumerate() {
            let mut r = result("a.fit", laps, "", 0.3);
            r.saved_at = base + Duration::hours(i64::try_from(i).unwrap());
            store.put_record(&r).unwrap();
        }
        store.put_record(&result("other.fit", &[], "", 0.3)).unwrap();

        let laps: Vec<String> = store
            .list_for_source("a.fit")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.lap_key.to_string())
            .collect();
        assert_eq!(laps, vec!["3", "2", "1"]);
        assert!(store.list_for_source("missing.fit").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_by_key() {
        let store = open_store().await;
        let saved = store.save_result(&result("a.fit", &[], "", 0.3)).await.unwrap();
        assert!(store.delete(&saved.key()).await.unwrap());
        assert!(!store.delete(&saved.key()).await.unwrap());
        assert!(store.get(&saved.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn export_of_empty_store_is_empty() {
        let store = open_store().await;
        assert!(matches!(
            store.export_all().await.unwrap(),
            ExportOutcome::Empty
        ));
    }

    #[tokio::test]
    async fn export_counts_rows() {
        let store = open_store().await;
        store.save_result(&result("a.fit", &[], "", 0.3)).await.unwrap();
        store.save_result(&result("b.fit", &[], "", 0.3)).await.unwrap();
        let ExportOutcome::Ready(doc) = store.export_all().await.unwrap() else {
            panic!("expected an export document");
        };
        assert_eq!(doc.row_count, 2);
        assert_eq!(doc.mime_type, "text/csv");
        assert_eq!(doc.contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn clear_then_unavailable_after_close() {
        let store = open_store().await;
        store.save_result(&result("a.fit", &[], "", 0.3)).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 1);
        store.close();
        assert!(store.list_all().await.is_err());
    }
}
