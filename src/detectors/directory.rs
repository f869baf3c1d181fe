use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::{Detector, SourceError};
use crate::coords::{Coordinate, parse_coordinates};

pub const DEFAULT_EXTENSIONS: &[&str] = &["pos", "txt", "coords"];

/// Detector whose output is one coordinate file per image in a directory.
///
/// The image id is the file stem, so `picks/mic_001.pos` holds the
/// coordinates for image `mic_001`. Files appear as the picker finishes an
/// image; later calls to [`Detector::images`] see them.
#[derive(Debug, Clone)]
pub struct DirectoryDetector {
    name: String,
    sampling_rate: f64,
    dir: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryDetector {
    pub fn new(name: impl Into<String>, sampling_rate: f64, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            sampling_rate,
            dir: dir.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| Into::<String>::into(e).trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|known| known == ext))
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> SourceError {
        SourceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Detector for DirectoryDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn images(&self) -> Result<BTreeSet<String>, SourceError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| self.io_error(&self.dir, e))?;

        let mut images = BTreeSet::new();
        for entry in entries {
            let path = entry.map_err(|e| self.io_error(&self.dir, e))?.path();
            if !path.is_file() || !self.accepts(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                images.insert(stem.to_string());
            }
        }
        Ok(images)
    }

    fn coordinates(&self, image: &str) -> Result<Vec<Coordinate>, SourceError> {
        // First extension in the configured order wins.
        let path = self
            .extensions
            .iter()
            .map(|ext| self.dir.join(format!("{image}.{ext}")))
            .find(|p| p.is_file())
            .ok_or_else(|| SourceError::UnknownImage {
                detector: self.name.clone(),
                image: image.to_string(),
            })?;

        let content = fs::read_to_string(&path).map_err(|e| self.io_error(&path, e))?;
        parse_coordinates(&content).map_err(|source| SourceError::Format { path, source })
    }
}
