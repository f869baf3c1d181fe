use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consensus::ConsensusMatcher;
use crate::coords::write_coordinates;
use crate::detectors::{Detector, DetectorCoordinateSet, SourceError};
use crate::schema::{DetectorSummary, ImageOutcome, ImageReport};

pub const AGREEMENT_FILE: &str = "agreement.tsv";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no detectors registered")]
    NoDetectors,
    #[error("detector '{detector}': {source}")]
    Source {
        detector: String,
        #[source]
        source: SourceError,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where consensus coordinates are written.
#[derive(Debug, Clone)]
pub struct OutputSink {
    pub dir: PathBuf,
    pub write_empty: bool,
    pub with_votes: bool,
}

impl OutputSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_empty: false,
            with_votes: false,
        }
    }

    fn write_batch(&self, reports: &[ImageReport]) -> Result<(), EngineError> {
        fs::create_dir_all(&self.dir).map_err(|e| output_error(&self.dir, e))?;

        for report in reports {
            if report.is_failed() {
                continue;
            }
            let points = report.consensus_points();
            if points.is_empty() && !self.write_empty {
                continue;
            }
            let path = self.dir.join(format!("{}.pos", report.image));
            let file = fs::File::create(&path).map_err(|e| output_error(&path, e))?;
            let mut out = BufWriter::new(file);
            write_coordinates(&mut out, points, self.with_votes)
                .and_then(|_| out.flush())
                .map_err(|e| output_error(&path, e))?;
        }

        let path = self.dir.join(AGREEMENT_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| output_error(&path, e))?;
        for report in reports.iter().filter(|r| !r.is_failed()) {
            let ratio = report
                .agreement_ratio()
                .map_or_else(|| "nan".to_string(), |r| r.to_string());
            writeln!(file, "{}\t{}", report.image, ratio).map_err(|e| output_error(&path, e))?;
        }
        Ok(())
    }
}

fn output_error(path: &Path, source: io::Error) -> EngineError {
    EngineError::Output {
        path: path.to_path_buf(),
        source,
    }
}

/// Runs the consensus matcher for every image all registered detectors have
/// finished, remembering which images it already handled.
pub struct ConsensusEngine {
    matcher: ConsensusMatcher,
    detectors: Vec<Box<dyn Detector>>,
    processed: BTreeSet<String>,
    output: Option<OutputSink>,
}

impl ConsensusEngine {
    pub fn new(matcher: ConsensusMatcher) -> Self {
        Self {
            matcher,
            detectors: Vec::new(),
            processed: BTreeSet::new(),
            output: None,
        }
    }

    /// The first registered detector is the reference frame.
    pub fn register<D: Detector + 'static>(mut self, detector: D) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn register_boxed(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    pub fn matcher(&self) -> &ConsensusMatcher {
        &self.matcher
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn processed(&self) -> &BTreeSet<String> {
        &self.processed
    }

    pub fn reset(&mut self) {
        self.processed.clear();
    }

    /// Images every detector has output for and that were not processed yet.
    pub fn ready_images(&self) -> Result<BTreeSet<String>, EngineError> {
        let (first, rest) = self.detectors.split_first().ok_or(EngineError::NoDetectors)?;

        let mut ready = images_of(first.as_ref())?;
        for detector in rest {
            let images = images_of(detector.as_ref())?;
            ready.retain(|image| images.contains(image));
        }
        ready.retain(|image| !self.processed.contains(image));
        Ok(ready)
    }

    /// Match one image. Source and matching errors become a failed outcome.
    pub fn process_image(&self, image: &str) -> ImageReport {
        let mut sets = Vec::with_capacity(self.detectors.len());
        for detector in &self.detectors {
            match DetectorCoordinateSet::collect(detector.as_ref(), image) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    return failed_report(
                        image,
                        &sets,
                        format!("detector '{}': {}", detector.name(), e),
                    );
                }
            }
        }

        match self.matcher.run(&sets) {
            Ok(result) => {
                debug!(
                    "{}: {} consensus points from {} detectors",
                    image,
                    result.len(),
                    sets.len()
                );
                ImageReport {
                    image: image.to_string(),
                    detectors: sets.iter().map(DetectorSummary::from).collect(),
                    outcome: ImageOutcome::from(result),
                }
            }
            Err(e) => failed_report(image, &sets, e.to_string()),
        }
    }

    /// Process every ready image in parallel. Reports are ordered by image id.
    pub fn process_ready(&mut self) -> Result<Vec<ImageReport>, EngineError> {
        let ready: Vec<String> = self.ready_images()?.into_iter().collect();
        if ready.is_empty() {
            debug!("no new images ready");
            return Ok(Vec::new());
        }

        let engine = &*self;
        let reports: Vec<ImageReport> = ready
            .par_iter()
            .map(|image| engine.process_image(image))
            .collect();

        for report in reports.iter().filter(|r| r.is_failed()) {
            if let ImageOutcome::Failed { error } = &report.outcome {
                warn!("{}: {}", report.image, error);
            }
        }

        // A batch whose output could not be written stays ready.
        if let Some(sink) = &self.output {
            sink.write_batch(&reports)?;
        }
        self.processed.extend(ready);

        let failed = reports.iter().filter(|r| r.is_failed()).count();
        info!(
            "processed {} images ({} failed), {} total",
            reports.len(),
            failed,
            self.processed.len()
        );
        Ok(reports)
    }
}

fn images_of(detector: &dyn Detector) -> Result<BTreeSet<String>, EngineError> {
    detector.images().map_err(|source| EngineError::Source {
        detector: detector.name().to_string(),
        source,
    })
}

fn failed_report(image: &str, sets: &[DetectorCoordinateSet], error: String) -> ImageReport {
    ImageReport {
        image: image.to_string(),
        detectors: sets.iter().map(DetectorSummary::from).collect(),
        outcome: ImageOutcome::Failed { error },
    }
}
