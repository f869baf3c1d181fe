use std::collections::{BTreeMap, BTreeSet};

use super::{Detector, SourceError};
use crate::coords::Coordinate;

/// Detector backed by coordinates already held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDetector {
    name: String,
    sampling_rate: f64,
    images: BTreeMap<String, Vec<Coordinate>>,
}

impl InMemoryDetector {
    pub fn new(name: impl Into<String>, sampling_rate: f64) -> Self {
        Self {
            name: name.into(),
            sampling_rate,
            images: BTreeMap::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>, points: Vec<Coordinate>) -> Self {
        self.insert(image, points);
        self
    }

    pub fn insert(&mut self, image: impl Into<String>, points: Vec<Coordinate>) {
        self.images.insert(image.into(), points);
    }
}

impl Detector for InMemoryDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn images(&self) -> Result<BTreeSet<String>, SourceError> {
        Ok(self.images.keys().cloned().collect())
    }

    fn coordinates(&self, image: &str) -> Result<Vec<Coordinate>, SourceError> {
        self.images
            .get(image)
            .cloned()
            .ok_or_else(|| SourceError::UnknownImage {
                detector: self.name.clone(),
                image: image.to_string(),
            })
    }
}
