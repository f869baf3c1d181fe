use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::{Deserialize, Serialize};

use crate::consensus::{ConsensusPoint, ConsensusResult};
use crate::detectors::DetectorCoordinateSet;

pub const SCHEMA_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectorSummary {
    pub name: String,
    pub sampling_rate: f64,
    pub points: usize,
}

impl From<&DetectorCoordinateSet> for DetectorSummary {
    fn from(set: &DetectorCoordinateSet) -> Self {
        Self {
            name: set.detector.clone(),
            sampling_rate: set.sampling_rate,
            points: set.points.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImageOutcome {
    Matched {
        points: Vec<ConsensusPoint>,
        /// Absent when no detector produced any point for the image.
        agreement_ratio: Option<f64>,
    },
    Failed {
        error: String,
    },
}

impl From<ConsensusResult> for ImageOutcome {
    fn from(result: ConsensusResult) -> Self {
        let agreement_ratio = result.agreement();
        ImageOutcome::Matched {
            points: result.points,
            agreement_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageReport {
    pub image: String,
    #[serde(default)]
    pub detectors: Vec<DetectorSummary>,
    pub outcome: ImageOutcome,
}

impl ImageReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ImageOutcome::Failed { .. })
    }

    pub fn consensus_points(&self) -> &[ConsensusPoint] {
        match &self.outcome {
            ImageOutcome::Matched { points, .. } => points,
            ImageOutcome::Failed { .. } => &[],
        }
    }

    pub fn agreement_ratio(&self) -> Option<f64> {
        match &self.outcome {
            ImageOutcome::Matched {
                agreement_ratio, ..
            } => *agreement_ratio,
            ImageOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BatchSummary {
    pub images: usize,
    pub matched: usize,
    pub failed: usize,
    pub consensus_points: usize,
    /// Mean agreement ratio over images where it is defined.
    pub mean_agreement: Option<f64>,
}

impl BatchSummary {
    pub fn from_reports(reports: &[ImageReport]) -> Self {
        let failed = reports.iter().filter(|r| r.is_failed()).count();
        let consensus_points = reports.iter().map(|r| r.consensus_points().len()).sum();
        let ratios: Vec<f64> = reports.iter().filter_map(|r| r.agreement_ratio()).collect();
        let mean_agreement = if ratios.is_empty() {
            None
        } else {
            Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
        };

        Self {
            images: reports.len(),
            matched: reports.len() - failed,
            failed,
            consensus_points,
            mean_agreement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub version: String,
    pub match_radius: f64,
    pub vote_threshold: i32,
    pub images: Vec<ImageReport>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn new(match_radius: f64, vote_threshold: i32, images: Vec<ImageReport>) -> Self {
        let summary = BatchSummary::from_reports(&images);
        Self {
            version: SCHEMA_VERSION.to_string(),
            match_radius,
            vote_threshold,
            images,
            summary,
        }
    }

    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(BatchReport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Coordinate;

    fn matched(image: &str, points: usize, ratio: Option<f64>) -> ImageReport {
        ImageReport {
            image: image.to_string(),
            detectors: Vec::new(),
            outcome: ImageOutcome::Matched {
                points: vec![
                    ConsensusPoint {
                        position: Coordinate::new(0.0, 0.0),
                        votes: 2
                    };
                    points
                ],
                agreement_ratio: ratio,
            },
        }
    }

    fn failed(image: &str) -> ImageReport {
        ImageReport {
            image: image.to_string(),
            detectors: Vec::new(),
            outcome: ImageOutcome::Failed {
                error: "boom".to_string(),
            },
        }
    }

    #[test]
    fn summary_counts_and_averages() {
        let reports = vec![
            matched("a", 2, Some(0.5)),
            matched("b", 1, Some(1.0)),
            matched("c", 0, None),
            failed("d"),
        ];
        let summary = BatchSummary::from_reports(&reports);
        assert_eq!(summary.images, 4);
        assert_eq!(summary.matched, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.consensus_points, 3);
        assert_eq!(summary.mean_agreement, Some(0.75));
    }

    #[test]
    fn empty_batch_has_no_mean() {
        let summary = BatchSummary::from_reports(&[]);
        assert_eq!(summary, BatchSummary::default());
    }

    #[test]
    fn outcome_is_tagged_by_status() {
        let json = serde_json::to_value(failed("x")).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["error"], "boom");

        let json = serde_json::to_value(matched("y", 1, None)).unwrap();
        assert_eq!(json["outcome"]["status"], "matched");
        assert!(json["outcome"]["agreement_ratio"].is_null());
    }

    #[test]
    fn nan_ratio_becomes_none() {
        let outcome = ImageOutcome::from(ConsensusResult {
            points: Vec::new(),
            agreement_ratio: f64::NAN,
        });
        assert_eq!(
            outcome,
            ImageOutcome::Matched {
                points: Vec::new(),
                agreement_ratio: None
            }
        );
    }

    #[test]
    fn undefined_ratio_reads_back_from_json() {
        let report = ImageReport {
            image: "mic_1".to_string(),
            detectors: Vec::new(),
            outcome: ImageOutcome::from(ConsensusResult {
                points: Vec::new(),
                agreement_ratio: f64::NAN,
            }),
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: ImageReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.agreement_ratio(), None);
    }

    #[test]
    fn batch_report_carries_version() {
        let report = BatchReport::new(10.0, -1, vec![matched("a", 1, Some(1.0))]);
        assert_eq!(report.version, SCHEMA_VERSION);
        assert_eq!(report.summary.images, 1);
    }

    #[test]
    fn json_schema_names_top_level_fields() {
        let schema = serde_json::to_value(BatchReport::json_schema()).unwrap();
        let props = schema["properties"].as_object().unwrap();
        for key in ["version", "match_radius", "vote_threshold", "images", "summary"] {
            assert!(props.contains_key(key), "missing {key}");
        }
    }
}
