//! Vote-based consensus of coordinate sets from independent detectors.
//!
//! Detector 0 is the frame of reference: every other detector is rescaled into
//! its pixel units, then folded point by point into the nearest existing
//! consensus point (greedy, no optimal assignment). Points that collect enough
//! votes survive.

mod accumulator;
mod error;
mod threshold;

pub use accumulator::ConsensusPoint;
pub use error::{ConfigurationError, InvalidInputError, MatchError};
pub use threshold::{ThresholdPolicy, required_votes};

use accumulator::Accumulator;
use schemars::JsonSchema;
use serde::Serialize;

use crate::coords::Coordinate;
use crate::detectors::DetectorCoordinateSet;

/// Vote threshold meaning "every detector must agree".
pub const ALL_DETECTORS: i32 = -1;

/// Serialize-only: an undefined ratio is written as `null`. Reports carry
/// [`crate::schema::ImageOutcome`], which reads back as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ConsensusResult {
    pub points: Vec<ConsensusPoint>,
    /// `kept / (raw points / detectors)`; NaN (serialized as `null`) when no
    /// detector produced any point.
    pub agreement_ratio: f64,
}

impl ConsensusResult {
    fn empty(agreement_ratio: f64) -> Self {
        Self {
            points: Vec::new(),
            agreement_ratio,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn agreement(&self) -> Option<f64> {
        if self.agreement_ratio.is_nan() {
            None
        } else {
            Some(self.agreement_ratio)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusMatcher {
    pub match_radius: f64,
    pub vote_threshold: i32,
    pub threshold_policy: ThresholdPolicy,
}

impl ConsensusMatcher {
    pub fn new(match_radius: f64, vote_threshold: i32) -> Self {
        Self {
            match_radius,
            vote_threshold,
            threshold_policy: ThresholdPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.threshold_policy = policy;
        self
    }

    pub fn run(&self, sets: &[DetectorCoordinateSet]) -> Result<ConsensusResult, MatchError> {
        let points: Vec<&[Coordinate]> = sets.iter().map(|s| s.points.as_slice()).collect();
        let rates: Vec<f64> = sets.iter().map(|s| s.sampling_rate).collect();
        self.match_sets(&points, &rates)
    }

    pub fn run_raw(
        &self,
        detector_points: &[Vec<Coordinate>],
        sampling_rates: &[f64],
    ) -> Result<ConsensusResult, MatchError> {
        let points: Vec<&[Coordinate]> = detector_points.iter().map(Vec::as_slice).collect();
        self.match_sets(&points, sampling_rates)
    }

    fn match_sets(
        &self,
        detector_points: &[&[Coordinate]],
        sampling_rates: &[f64],
    ) -> Result<ConsensusResult, MatchError> {
        validate(detector_points, sampling_rates, self.match_radius)?;

        let detectors = detector_points.len();
        let needed = required_votes(self.vote_threshold, detectors, self.threshold_policy)?;

        let total_raw: usize = detector_points.iter().map(|p| p.len()).sum();
        let agreement = |kept: usize| {
            if total_raw == 0 {
                f64::NAN
            } else {
                kept as f64 / (total_raw as f64 / detectors as f64)
            }
        };

        if detector_points[0].is_empty() && needed == detectors {
            return Ok(ConsensusResult::empty(agreement(0)));
        }

        let reference_rate = sampling_rates[0];
        let mut accumulator = Accumulator::seeded(detector_points[0]);
        let radius_squared = self.match_radius * self.match_radius;

        for (points, &rate) in detector_points.iter().zip(sampling_rates).skip(1) {
            let factor = rate / reference_rate;
            let scaled: Vec<Coordinate> = points.iter().map(|p| p.scaled(factor)).collect();
            accumulator.fold_detector(&scaled, radius_squared);
        }

        let kept: Vec<ConsensusPoint> = accumulator
            .into_entries()
            .into_iter()
            .filter(|p| p.votes >= needed)
            .collect();

        Ok(ConsensusResult {
            agreement_ratio: agreement(kept.len()),
            points: kept,
        })
    }
}

fn validate(
    detector_points: &[&[Coordinate]],
    sampling_rates: &[f64],
    match_radius: f64,
) -> Result<(), InvalidInputError> {
    if detector_points.is_empty() {
        return Err(InvalidInputError::NoDetectors);
    }
    if detector_points.len() != sampling_rates.len() {
        return Err(InvalidInputError::LengthMismatch {
            points: detector_points.len(),
            rates: sampling_rates.len(),
        });
    }
    if !(match_radius.is_finite() && match_radius > 0.0) {
        return Err(InvalidInputError::NonPositiveMatchRadius {
            radius: match_radius,
        });
    }
    for (detector, &rate) in sampling_rates.iter().enumerate() {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(InvalidInputError::NonPositiveSamplingRate { detector, rate });
        }
    }
    for (detector, points) in detector_points.iter().enumerate() {
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(InvalidInputError::NonFiniteCoordinate { detector, index });
        }
    }
    Ok(())
}

/// Merge per-detector coordinate lists into vote-weighted consensus points.
///
/// `vote_threshold <= 0` or `>= detector_points.len()` requires every
/// detector; anything in between relaxes the requirement to that many votes.
pub fn match_coordinates(
    detector_points: &[Vec<Coordinate>],
    sampling_rates: &[f64],
    match_radius: f64,
    vote_threshold: i32,
) -> Result<ConsensusResult, MatchError> {
    ConsensusMatcher::new(match_radius, vote_threshold).run_raw(detector_points, sampling_rates)
}
