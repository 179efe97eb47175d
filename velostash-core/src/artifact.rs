use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ArtifactError;
use crate::export::ExportDocument;
use crate::types::LapKey;

/// A blob handed to the file-save boundary with its suggested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Wrap captured chart pixels under the conventional screenshot name.
    pub fn screenshot(source_name: &str, lap_key: &LapKey, png: Vec<u8>) -> Self {
        Self {
            file_name: screenshot_file_name(source_name, lap_key),
            mime_type: "image/png",
            bytes: png,
        }
    }
}

impl From<ExportDocument> for Artifact {
    fn from(doc: ExportDocument) -> Self {
        Self {
            file_name: doc.file_name,
            mime_type: doc.mime_type,
            bytes: doc.contents.into_bytes(),
        }
    }
}

/// `{base}_lap{laps}_screenshot.png`, where `base` is the source name without
/// its extension.
pub fn screenshot_file_name(source_name: &str, lap_key: &LapKey) -> String {
    let base = Path::new(source_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source_name);
    format!("{base}_lap{lap_key}_screenshot.png")
}

/// Persists artifacts on the caller's behalf.
pub trait FileSaver {
    /// Save `artifact` and return where it went.
    fn save(&self, artifact: &Artifact) -> Result<PathBuf, ArtifactError>;
}

/// Writes artifacts as files into one directory.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSaver for DirectorySaver {
    fn save(&self, artifact: &Artifact) -> Result<PathBuf, ArtifactError> {
        let name = artifact.file_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(ArtifactError::InvalidName(name.to_string()));
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        std::fs::write(&path, &artifact.bytes)?;
        info!(path = %path.display(), bytes = artifact.bytes.len(), "Saved artifact");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_name_strips_extension() {
        let name = screenshot_file_name("2024-05-01 ride.fit", &LapKey::from_laps(&[3, 1]));
        assert_eq!(name, "2024-05-01 ride_lap1-3_screenshot.png");
        assert_eq!(
            screenshot_file_name("track", &LapKey::all()),
            "track_lapall_screenshot.png"
        );
    }

    #[test]
    fn directory_saver_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DirectorySaver::new(dir.path().join("out"));
        let artifact = Artifact::screenshot("a.fit", &LapKey::all(), vec![0x89, b'P', b'N', b'G']);

        let path = saver.save(&artifact).unwrap();
        assert_eq!(path, dir.path().join("out/a_lapall_screenshot.png"));
        assert_eq!(std::fs::read(path).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn directory_saver_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DirectorySaver::new(dir.path());
        for bad in ["", "..", "../x.csv", "a/b.csv"] {
            let artifact = Artifact {
                file_name: bad.into(),
                mime_type: "text/csv",
                bytes: Vec::new(),
            };
            assert!(matches!(
                saver.save(&artifact),
                Err(ArtifactError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn export_document_becomes_artifact() {
        let doc = ExportDocument {
            file_name: "velostash_results_2024-01-01.csv".into(),
            mime_type: "text/csv",
            contents: "a,b\n".into(),
            row_count: 0,
        };
        let artifact = Artifact::from(doc);
        assert_eq!(artifact.bytes, b"a,b\n");
        assert_eq!(artifact.mime_type, "text/csv");
    }
}
