use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::coords::{Coordinate, FormatError};

pub mod directory;
pub mod memory;

pub use directory::DirectoryDetector;
pub use memory::InMemoryDetector;

/// One picking method's output across images.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    /// Physical units per pixel of this detector's coordinates.
    fn sampling_rate(&self) -> f64;
    /// Images this detector has finished picking.
    fn images(&self) -> Result<BTreeSet<String>, SourceError>;
    fn coordinates(&self, image: &str) -> Result<Vec<Coordinate>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    #[error("detector '{detector}' has no coordinates for image '{image}'")]
    UnknownImage { detector: String, image: String },
}

/// Coordinates one detector produced for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorCoordinateSet {
    pub detector: String,
    pub sampling_rate: f64,
    pub points: Vec<Coordinate>,
}

impl DetectorCoordinateSet {
    pub fn new(detector: impl Into<String>, sampling_rate: f64, points: Vec<Coordinate>) -> Self {
        Self {
            detector: detector.into(),
            sampling_rate,
            points,
        }
    }

    pub fn collect(detector: &dyn Detector, image: &str) -> Result<Self, SourceError> {
        Ok(Self {
            detector: detector.name().to_string(),
            sampling_rate: detector.sampling_rate(),
            points: detector.coordinates(image)?,
        })
    }
}
