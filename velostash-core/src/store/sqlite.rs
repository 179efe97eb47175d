use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;

use super::parameters::{ParameterCollection, SqliteParameterStore};
use super::results::{ResultCollection, SqliteResultStore};
use super::schema;
use super::versioned::{OpenReport, VersionedStore};
use super::{ParameterStore, ResultStore};

/// The single SQLite connection both collections live in.
///
/// Created once per process and shared by reference counting; there is no
/// global handle.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(StoreError::Open)?;
        let db = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::Open)?;
        let db = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(schema::PRAGMAS_SQL)
            .map_err(StoreError::Open)?;
        // WAL is unavailable for in-memory databases; the pragma is a no-op there.
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");
        conn.execute_batch(schema::META_SQL)
            .map_err(StoreError::Open)?;
        debug!(path = ?self.path, "Database initialized");
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Size of the database file, 0 for in-memory databases.
    pub fn size_bytes(&self) -> u64 {
        self.path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map_or(0, |m| m.len())
    }

    /// Flush and close the connection.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

/// Schema facts and size of one collection, for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub name: &'static str,
    pub schema_version: Option<u32>,
    pub key_path: Option<String>,
    pub records: u64,
}

/// Summary statistics about the local store.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub db_path: Option<PathBuf>,
    pub db_size_bytes: u64,
    pub collections: Vec<CollectionStats>,
}

/// Open reports for both collections.
#[derive(Debug, Clone)]
pub struct LocalOpenReport {
    pub parameters: OpenReport,
    pub results: OpenReport,
}

/// Both collections over one database: the object callers construct once,
/// open before first use and close on shutdown.
#[derive(Debug)]
pub struct LocalStore {
    db: Arc<Database>,
    parameters: SqliteParameterStore,
    results: SqliteResultStore,
}

impl LocalStore {
    pub fn new(db: Database) -> Self {
        let db = Arc::new(db);
        Self {
            parameters: SqliteParameterStore::new(Arc::clone(&db)),
            results: SqliteResultStore::new(Arc::clone(&db)),
            db,
        }
    }

    /// Open the database file at `path` and both collections in it.
    pub async fn open_path(path: &Path) -> crate::error::Result<(Self, LocalOpenReport)> {
        let store = Self::new(Database::open(path)?);
        let report = store.open().await?;
        Ok((store, report))
    }

    /// Open an in-memory database and both collections (for testing).
    pub async fn in_memory() -> crate::error::Result<Self> {
        let store = Self::new(Database::in_memory()?);
        store.open().await?;
        Ok(store)
    }

    /// Open both collections. Idempotent.
    pub async fn open(&self) -> crate::error::Result<LocalOpenReport> {
        let parameters = self.parameters.open().await?;
        let results = self.results.open().await?;
        Ok(LocalOpenReport {
            parameters,
            results,
        })
    }

    pub fn parameters(&self) -> &SqliteParameterStore {
        &self.parameters
    }

    pub fn results(&self) -> &SqliteResultStore {
        &self.results
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persisted schema facts and record counts; works on unopened collections.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.db.lock();
        let parameters = collection_stats::<ParameterCollection>(&conn)?;
        let results = collection_stats::<ResultCollection>(&conn)?;
        drop(conn);
        Ok(StoreStats {
            db_path: self.db.path().map(Path::to_path_buf),
            db_size_bytes: self.db.size_bytes(),
            collections: vec![parameters, results],
        })
    }

    /// Close both collections and the connection.
    pub fn close(self) -> Result<(), StoreError> {
        self.parameters.close();
        self.results.close();
        let Self {
            db,
            parameters,
            results,
        } = self;
        drop(parameters);
        drop(results);
        match Arc::try_unwrap(db) {
            Ok(db) => db.close(),
            // Another handle still references the database; it closes on drop.
            Err(_) => Ok(()),
        }
    }
}

fn collection_stats<C: super::versioned::Collection>(
    conn: &Connection,
) -> Result<CollectionStats, StoreError> {
    let probe = VersionedStore::<C>::probe(conn)?;
    let records = if probe.table_exists {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", C::NAME), [], |row| {
            row.get::<_, i64>(0)
        })?
        .unsigned_abs()
    } else {
        0
    };
    Ok(CollectionStats {
        name: C::NAME,
        schema_version: probe.version,
        key_path: probe.key_path,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::versioned::{OpenPath, StoreState};

    #[tokio::test]
    async fn fresh_database_creates_both_collections() {
        let store = LocalStore::new(Database::in_memory().unwrap());
        let report = store.open().await.unwrap();
        assert_eq!(report.parameters.path, OpenPath::Migrated);
        assert_eq!(report.parameters.from_version, None);
        assert_eq!(report.results.to_version, schema::RESULTS_VERSION);
        assert_eq!(report.results.migrated, 0);

        let stats = store.stats().unwrap();
        assert_eq!(stats.collections.len(), 2);
        assert!(stats.collections.iter().all(|c| c.records == 0));
        assert_eq!(stats.collections[1].schema_version, Some(5));
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let store = LocalStore::in_memory().await.unwrap();
        let again = store.open().await.unwrap();
        assert_eq!(again.parameters.path, OpenPath::AlreadyOpen);
        assert_eq!(again.results.path, OpenPath::AlreadyOpen);
    }

    #[tokio::test]
    async fn reopening_file_is_direct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/velostash.db");

        let (store, first) = LocalStore::open_path(&path).await.unwrap();
        assert_eq!(first.results.path, OpenPath::Migrated);
        store.close().unwrap();

        let (store, second) = LocalStore::open_path(&path).await.unwrap();
        assert_eq!(second.parameters.path, OpenPath::Direct);
        assert_eq!(second.results.path, OpenPath::Direct);
        assert_eq!(second.results.from_version, Some(5));
        assert!(store.stats().unwrap().db_size_bytes > 0);
        store.close().unwrap();
    }

    #[tokio::test]
    async fn stats_work_before_open() {
        let store = LocalStore::new(Database::in_memory().unwrap());
        assert_eq!(store.parameters().state(), StoreState::Unopened);
        let stats = store.stats().unwrap();
        assert!(stats.collections.iter().all(|c| c.schema_version.is_none()));
    }
}
