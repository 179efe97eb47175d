use std::sync::Arc;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::types::{FileParameterRecord, ParameterSet};

use super::migrate::{self, TransformError};
use super::schema;
use super::sqlite::Database;
use super::traits::ParameterStore;
use super::versioned::{Collection, OpenReport, StoreState, VersionedStore};

/// The parameter collection: one document per content fingerprint.
#[derive(Debug)]
pub struct ParameterCollection;

impl Collection for ParameterCollection {
    type Record = FileParameterRecord;

    const NAME: &'static str = schema::PARAMETERS_TABLE;
    const VERSION: u32 = schema::PARAMETERS_VERSION;
    const MIN_VERSION: u32 = schema::PARAMETERS_VERSION;
    const KEY_PATH: &'static str = schema::PARAMETERS_KEY_PATH;
    const CREATE_SQL: &'static str = schema::PARAMETERS_SQL;

    fn upgrade(raw: &str, _from_version: u32) -> Result<Self::Record, TransformError> {
        migrate::upgrade_parameters(raw, Utc::now().timestamp_millis())
    }

    fn upsert(conn: &Connection, record: &Self::Record) -> Result<(), StoreError> {
        let doc = serde_json::to_string(record)?;
        conn.execute(
            "INSERT INTO file_parameters (fingerprint, source_name, last_used_at, doc)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(fingerprint) DO UPDATE SET
                source_name = excluded.source_name,
                last_used_at = excluded.last_used_at,
                doc = excluded.doc",
            params![
                record.fingerprint,
                record.source_name,
                record.last_used_at,
                doc
            ],
        )
        .map_err(|e| StoreError::write(Self::NAME, e))?;
        Ok(())
    }
}

/// `SQLite`-backed [`ParameterStore`].
#[derive(Debug)]
pub struct SqliteParameterStore {
    inner: VersionedStore<ParameterCollection>,
}

impl SqliteParameterStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: VersionedStore::new(db),
        }
    }
}

fn decode(doc: &str) -> Result<FileParameterRecord, StoreError> {
    Ok(serde_json::from_str(doc)?)
}

#[async_trait::async_trait]
impl ParameterStore for SqliteParameterStore {
    async fn open(&self) -> crate::error::Result<OpenReport> {
        Ok(self.inner.open()?)
    }

    fn close(&self) {
        self.inner.close();
    }

    fn state(&self) -> StoreState {
        self.inner.state()
    }

    async fn save(
        &self,
        fingerprint: &str,
        parameters: &ParameterSet,
        source_name_hint: &str,
    ) -> crate::error::Result<()> {
        let record = FileParameterRecord {
            fingerprint: fingerprint.to_string(),
            parameters: parameters.clone(),
            last_used_at: Utc::now().timestamp_millis(),
            source_name: source_name_hint.to_string(),
        };
        self.put_record(&record).await?;
        debug!(fingerprint, "Saved parameters");
        Ok(())
    }

    async fn put_record(&self, record: &FileParameterRecord) -> crate::error::Result<()> {
        self.inner
            .with_conn(|conn| ParameterCollection::upsert(conn, record))?;
        Ok(())
    }

    async fn load(&self, fingerprint: &str) -> crate::error::Result<Option<ParameterSet>> {
        Ok(self.get(fingerprint).await?.map(|r| r.parameters))
    }

    async fn get(&self, fingerprint: &str) -> crate::error::Result<Option<FileParameterRecord>> {
        let record = self.inner.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM file_parameters WHERE fingerprint = ?1",
                    params![fingerprint],
                    |row| row.get(0),
                )
                .optional()?;
            doc.as_deref().map(decode).transpose()
        })?;
        Ok(record)
    }

    async fn list_all(&self) -> crate::error::Result<Vec<FileParameterRecord>> {
        let records = self.inner.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT doc FROM file_parameters ORDER BY last_used_at DESC, fingerprint",
            )?;
            let docs = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            docs.iter().map(|d| decode(d)).collect()
        })?;
        Ok(records)
    }

    async fn delete(&self, fingerprint: &str) -> crate::error::Result<bool> {
        let changed = self.inner.with_conn(|conn| {
            conn.execute(
                "DELETE FROM file_parameters WHERE fingerprint = ?1",
                params![fingerprint],
            )
            .map_err(|e| StoreError::write(ParameterCollection::NAME, e))
        })?;
        Ok(changed > 0)
    }

    async fn count(&self) -> crate::error::Result<u64> {
        let count: i64 = self.inner.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM file_parameters", [], |row| {
                row.get(0)
            })?)
        })?;
        Ok(count.unsigned_abs())
    }

    async fn clear(&self) -> crate::error::Result<u64> {
        let removed = self.inner.with_conn(|conn| {
            conn.execute("DELETE FROM file_parameters", [])
                .map_err(|e| StoreError::write(ParameterCollection::NAME, e))
        })?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VelostashError;
    use crate::retention::RetentionPolicy;
    use chrono::{Duration, TimeZone};

    async fn open_store() -> SqliteParameterStore {
        let db = Arc::new(Database::in_memory().unwrap());
        let store = SqliteParameterStore::new(db);
        store.open().await.unwrap();
        store
    }

    fn record(fingerprint: &str, last_used_at: i64) -> FileParameterRecord {
        FileParameterRecord {
            fingerprint: fingerprint.to_string(),
            parameters: ParameterSet::default(),
            last_used_at,
            source_name: format!("{fingerprint}.fit"),
        }
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = open_store().await;
        let params = ParameterSet {
            system_mass: 74.0,
            fixed_cda: Some(0.29),
            ..ParameterSet::default()
        };
        store.save("1a_ride", &params, "ride.fit").await.unwrap();

        let loaded = store.load("1a_ride").await.unwrap().unwrap();
        assert_eq!(loaded, params);
        let record = store.get("1a_ride").await.unwrap().unwrap();
        assert_eq!(record.source_name, "ride.fit");
        assert!(record.last_used_at > 0);
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = open_store().await;
        let mut params = ParameterSet::default();
        store.save("1a_ride", &params, "ride.fit").await.unwrap();
        params.system_mass = 90.0;
        store.save("1a_ride", &params, "ride.fit").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let loaded = store.load("1a_ride").await.unwrap().unwrap();
        assert!((loaded.system_mass - 90.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let store = open_store().await;
        assert!(store.load("nope").await.unwrap().is_none());
        assert!(!store.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_before_open() {
        let db = Arc::new(Database::in_memory().unwrap());
        let store = SqliteParameterStore::new(db);
        let err = store.load("x").await.unwrap_err();
        assert!(matches!(
            err,
            VelostashError::Store(StoreError::Unavailable("file_parameters"))
        ));

        store.open().await.unwrap();
        store.close();
        assert_eq!(store.state(), StoreState::Unopened);
        assert!(store.count().await.is_err());
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let store = open_store().await;
        store.put_record(&record("old", 100)).await.unwrap();
        store.put_record(&record("new", 300)).await.unwrap();
        store.put_record(&record("mid", 200)).await.unwrap();

        let order: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.fingerprint)
            .collect();
        assert_eq!(order, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn prune_keeps_newest_within_cap() {
        let store = open_store().await;
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        for i in 0..60 {
            let used = now - Duration::minutes(i);
            store
                .put_record(&record(&format!("f{i:02}"), used.timestamp_millis()))
                .await
                .unwrap();
        }

        let report = store
            .prune_at(&RetentionPolicy::default(), now)
            .await
            .unwrap();
        assert_eq!(report.examined, 60);
        assert_eq!(report.deleted, 10);
        assert_eq!(report.kept, 50);
        assert_eq!(report.failed, 0);
        assert!(store.get("f00").await.unwrap().is_some());
        assert!(store.get("f49").await.unwrap().is_some());
        assert!(store.get("f50").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_drops_stale_records() {
        let store = open_store().await;
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        store
            .put_record(&record("fresh", (now - Duration::days(2)).timestamp_millis()))
            .await
            .unwrap();
        store
            .put_record(&record("stale", (now - Duration::days(45)).timestamp_millis()))
            .await
            .unwrap();

        let report = store
            .prune_at(&RetentionPolicy::default(), now)
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert!(store.get("stale").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_reports_removed() {
        let store = open_store().await;
        store.put_record(&record("a", 1)).await.unwrap();
        store.put_record(&record("b", 2)).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
