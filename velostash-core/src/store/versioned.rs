// Versioned collection lifecycle: check the persisted schema, migrate in place
// when it is stale, and gate every other operation on readiness.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::StoreError;

use super::migrate::TransformError;
use super::schema;
use super::sqlite::Database;

/// Static description of one collection: its table, key shape, schema version
/// and how old documents are replayed into it.
pub trait Collection: Send + Sync + 'static {
    type Record: Send + Sync;

    /// Table name; also the collection's name in the meta table.
    const NAME: &'static str;
    /// Version written into the meta table after create/migrate.
    const VERSION: u32;
    /// Oldest persisted version that opens without migrating.
    const MIN_VERSION: u32;
    /// Field names forming the primary key, `+`-joined.
    const KEY_PATH: &'static str;
    /// DDL creating the table and its secondary indexes.
    const CREATE_SQL: &'static str;

    /// Field-defaulting transform from a stored document at `from_version`.
    fn upgrade(raw: &str, from_version: u32) -> Result<Self::Record, TransformError>;

    /// Insert or replace one record.
    fn upsert(conn: &Connection, record: &Self::Record) -> Result<(), StoreError>;
}

/// Sub-states of an in-place migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    BackupRead,
    Recreate,
    Replay,
}

/// Lifecycle of a collection within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreState {
    #[default]
    Unopened,
    Checking,
    DirectOpen,
    Migrating(MigrationPhase),
    Ready,
}

/// How a successful open reached `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenPath {
    /// The store was already open in this process.
    AlreadyOpen,
    /// Persisted schema matched; nothing was rewritten.
    Direct,
    /// The collection was (re)created and old records replayed.
    Migrated,
}

/// Outcome of [`VersionedStore::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReport {
    pub collection: &'static str,
    pub path: OpenPath,
    /// Persisted version before opening; `None` when the collection was absent.
    pub from_version: Option<u32>,
    pub to_version: u32,
    /// Records replayed into the recreated collection.
    pub migrated: usize,
    /// Records dropped because their transform or insert failed.
    pub skipped: usize,
}

/// What the meta table and catalog say about a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaProbe {
    pub table_exists: bool,
    pub version: Option<u32>,
    pub key_path: Option<String>,
}

enum Plan {
    Direct { version: u32 },
    Migrate { from: Option<u32> },
}

/// A named collection over a shared [`Database`].
///
/// Holds the lifecycle state; every read or write goes through
/// [`VersionedStore::with_conn`], which fails with
/// [`StoreError::Unavailable`] until `open` has succeeded.
#[derive(Debug)]
pub struct VersionedStore<C: Collection> {
    db: Arc<Database>,
    state: Mutex<StoreState>,
    _collection: PhantomData<fn() -> C>,
}

impl<C: Collection> VersionedStore<C> {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            state: Mutex::new(StoreState::Unopened),
            _collection: PhantomData,
        }
    }

    pub fn state(&self) -> StoreState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == StoreState::Ready
    }

    /// Open the collection, migrating it first if its schema is stale.
    ///
    /// Idempotent. On failure the store is left `Unopened` and the persisted
    /// data is untouched (the migration runs in one transaction).
    pub fn open(&self) -> Result<OpenReport, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == StoreState::Ready {
            return Ok(OpenReport {
                collection: C::NAME,
                path: OpenPath::AlreadyOpen,
                from_version: Some(C::VERSION),
                to_version: C::VERSION,
                migrated: 0,
                skipped: 0,
            });
        }

        *state = StoreState::Checking;
        let mut conn = self.db.lock();
        let outcome = Self::check_and_prepare(&mut conn, &mut state);
        match outcome {
            Ok(report) => {
                *state = StoreState::Ready;
                debug!(collection = C::NAME, path = ?report.path, "Collection ready");
                Ok(report)
            }
            Err(e) => {
                *state = StoreState::Unopened;
                warn!(collection = C::NAME, error = %e, "Failed to open collection");
                Err(e)
            }
        }
    }

    /// Tear the collection down to `Unopened`. The data stays on disk.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = StoreState::Unopened;
    }

    /// Run `f` against the connection, if the collection is ready.
    ///
    /// The state lock is held for the whole call, so operations on one
    /// collection never interleave with its migration or with each other.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != StoreState::Ready {
            return Err(StoreError::Unavailable(C::NAME));
        }
        let conn = self.db.lock();
        let out = f(&conn);
        drop(conn);
        drop(state);
        out
    }

    /// Read the persisted schema facts for this collection.
    pub fn probe(conn: &Connection) -> rusqlite::Result<SchemaProbe> {
        let table_exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![C::NAME],
            |row| row.get(0),
        )?;
        let meta: Option<(u32, String)> = conn
            .query_row(
                "SELECT schema_version, key_path FROM velostash_meta WHERE collection = ?1",
                params![C::NAME],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (version, key_path) = match meta {
            Some((v, k)) => (Some(v), Some(k)),
            None => (None, None),
        };
        Ok(SchemaProbe {
            table_exists,
            version,
            key_path,
        })
    }

    fn plan(probe: &SchemaProbe) -> Plan {
        if !probe.table_exists {
            return Plan::Migrate { from: None };
        }
        match (probe.version, probe.key_path.as_deref()) {
            (Some(version), Some(key)) if key == C::KEY_PATH && version >= C::MIN_VERSION => {
                Plan::Direct { version }
            }
            (Some(version), _) => Plan::Migrate {
                from: Some(version),
            },
            (None, _) => Plan::Migrate {
                from: Some(schema::LEGACY_VERSION),
            },
        }
    }

    fn check_and_prepare(
        conn: &mut Connection,
        state: &mut StoreState,
    ) -> Result<OpenReport, StoreError> {
        let probe = Self::probe(conn).map_err(StoreError::Open)?;
        match Self::plan(&probe) {
            Plan::Direct { version } => {
                *state = StoreState::DirectOpen;
                if version > C::VERSION {
                    warn!(
                        collection = C::NAME,
                        persisted = version,
                        current = C::VERSION,
                        "Collection written by a newer release; opening as-is"
                    );
                }
                Ok(OpenReport {
                    collection: C::NAME,
                    path: OpenPath::Direct,
                    from_version: Some(version),
                    to_version: C::VERSION,
                    migrated: 0,
                    skipped: 0,
                })
            }
            Plan::Migrate { from } => Self::migrate(conn, state, probe.table_exists, from),
        }
    }

    /// Backup-read, recreate and replay inside one transaction.
    ///
    /// Per-record failures are counted in `skipped`; only a failure to read
    /// the backup, recreate the table or commit aborts (and rolls back).
    fn migrate(
        conn: &mut Connection,
        state: &mut StoreState,
        table_exists: bool,
        from: Option<u32>,
    ) -> Result<OpenReport, StoreError> {
        let fail = |source| StoreError::Migration {
            collection: C::NAME,
            source,
        };
        let tx = conn.transaction().map_err(fail)?;

        *state = StoreState::Migrating(MigrationPhase::BackupRead);
        let backup: Vec<String> = if table_exists {
            read_documents(&tx, C::NAME).map_err(fail)?
        } else {
            Vec::new()
        };
        debug!(collection = C::NAME, records = backup.len(), "Backed up collection");

        *state = StoreState::Migrating(MigrationPhase::Recreate);
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", C::NAME))
            .map_err(fail)?;
        tx.execute_batch(C::CREATE_SQL).map_err(fail)?;

        *state = StoreState::Migrating(MigrationPhase::Replay);
        let from_version = from.unwrap_or(C::VERSION);
        let mut migrated = 0usize;
        let mut skipped = 0usize;
        for (index, raw) in backup.iter().enumerate() {
            let outcome = C::upgrade(raw, from_version)
                .map_err(|e| e.to_string())
                .and_then(|record| C::upsert(&tx, &record).map_err(|e| e.to_string()));
            match outcome {
                Ok(()) => migrated += 1,
                Err(reason) => {
                    skipped += 1;
                    warn!(collection = C::NAME, index, reason = %reason, "Skipped record during migration");
                }
            }
        }

        tx.execute(
            "INSERT INTO velostash_meta (collection, schema_version, key_path, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection) DO UPDATE SET
                schema_version = excluded.schema_version,
                key_path = excluded.key_path,
                updated_at = excluded.updated_at",
            params![C::NAME, C::VERSION, C::KEY_PATH, Utc::now().to_rfc3339()],
        )
        .map_err(fail)?;
        tx.commit().map_err(fail)?;

        if table_exists {
            info!(
                collection = C::NAME,
                from = from_version,
                to = C::VERSION,
                migrated,
                skipped,
                "Migrated collection"
            );
        } else {
            info!(collection = C::NAME, version = C::VERSION, "Created collection");
        }

        Ok(OpenReport {
            collection: C::NAME,
            path: OpenPath::Migrated,
            from_version: from,
            to_version: C::VERSION,
            migrated,
            skipped,
        })
    }
}

fn read_documents(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("SELECT doc FROM {table}"))?;
    let docs = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(docs)
}
