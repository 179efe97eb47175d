use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory (relative to the working directory) holding local state.
pub const DATA_DIR: &str = ".velostash";

/// Default database file name inside [`DATA_DIR`].
pub const DB_FILE: &str = "velostash.db";

/// Top-level Velostash configuration, matching `velostash.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VelostashConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub retention: RetentionSection,
    #[serde(default)]
    pub export: ExportSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Database file. Defaults to `.velostash/velostash.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionSection {
    pub max_files: usize,
    pub max_age_days: u32,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            max_files: 50,
            max_age_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSection {
    pub file_prefix: String,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            file_prefix: "velostash_results".into(),
        }
    }
}

impl VelostashConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file is an error; use [`Self::load_or_default`]
    /// when the file is optional.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.display().to_string())
            } else {
                ConfigError::Invalid(format!("{}: {e}", path.display()))
            }
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retention.max_files == 0 {
            return Err(ConfigError::Invalid(
                "retention.max_files must be at least 1".into(),
            ));
        }
        if self.export.file_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "export.file_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Database location: the configured path, or the default under `base`.
    pub fn db_path(&self, base: &Path) -> PathBuf {
        match &self.store.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => base.join(p),
            None => base.join(DATA_DIR).join(DB_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = VelostashConfig::from_toml_str("").unwrap();
        assert_eq!(config, VelostashConfig::default());
        assert_eq!(config.retention.max_files, 50);
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(config.export.file_prefix, "velostash_results");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = VelostashConfig::from_toml_str(
            "[retention]\nmax_age_days = 7\n\n[store]\npath = \"data/aero.db\"\n",
        )
        .unwrap();
        assert_eq!(config.retention.max_age_days, 7);
        assert_eq!(config.retention.max_files, 50);
        assert_eq!(
            config.db_path(Path::new("/work")),
            PathBuf::from("/work/data/aero.db")
        );
    }

    #[test]
    fn default_db_path_is_under_data_dir() {
        let config = VelostashConfig::default();
        assert_eq!(
            config.db_path(Path::new("/work")),
            PathBuf::from("/work/.velostash/velostash.db")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = VelostashConfig::from_toml_str("[retention]\nmax_filez = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_max_files_is_invalid() {
        let err = VelostashConfig::from_toml_str("[retention]\nmax_files = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("velostash.toml");
        assert!(matches!(
            VelostashConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert_eq!(
            VelostashConfig::load_or_default(&path).unwrap(),
            VelostashConfig::default()
        );
    }
}
