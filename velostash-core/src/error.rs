/// Top-level Velostash error type.
///
/// All fallible operations in `velostash-core` return [`Result<T, VelostashError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum VelostashError {
    /// Error from the local store layer (`SQLite` operations, migrations).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A requested track region could not be summarized.
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error handing an artifact to the file-save collaborator.
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Errors from the SQLite-backed versioned store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The collection was never opened, or its last open attempt failed.
    #[error("Store unavailable: collection '{0}' is not open")]
    Unavailable(&'static str),

    /// The engine refused to open the database or check its schema.
    #[error("Cannot open database: {0}")]
    Open(#[source] rusqlite::Error),

    /// Destroying or recreating a collection during migration failed.
    #[error("Migration of '{collection}' failed: {source}")]
    Migration {
        /// Collection being migrated.
        collection: &'static str,
        /// Engine error raised by the failing step.
        #[source]
        source: rusqlite::Error,
    },

    /// An upsert or delete was rejected by the engine.
    #[error("Write to '{collection}' failed: {source}")]
    Write {
        /// Collection being written.
        collection: &'static str,
        /// Engine error raised by the write.
        #[source]
        source: rusqlite::Error,
    },

    /// A read query failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database directory could not be created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV rendering of the export failed.
    #[error("Export error: {0}")]
    Export(#[from] csv::Error),
}

impl StoreError {
    pub(crate) fn write(collection: &'static str, source: rusqlite::Error) -> Self {
        Self::Write { collection, source }
    }
}

/// Reasons a track region cannot be summarized.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// The requested indices fall outside the series.
    #[error("Invalid region: index out of range (start {start}, end {end}, series length {len})")]
    OutOfRange { start: i64, end: i64, len: usize },

    /// `start >= end`.
    #[error("Invalid region: empty or inverted range (start {start}, end {end})")]
    EmptyOrInverted { start: usize, end: usize },

    /// Every sample in the range failed coordinate or timestamp validation.
    #[error("No valid position data in region {start}..={end}")]
    NoValidPositions { start: usize, end: usize },
}

impl RegionError {
    /// True for precondition failures on the requested indices.
    pub fn is_invalid_region(&self) -> bool {
        matches!(self, Self::OutOfRange { .. } | Self::EmptyOrInverted { .. })
    }
}

/// Errors in Velostash configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from the file-save boundary.
#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    /// The suggested file name is empty or escapes the target directory.
    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    /// Filesystem I/O error writing the artifact.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for `Result<T, VelostashError>`.
pub type Result<T> = std::result::Result<T, VelostashError>;
