use thiserror::Error;

/// Malformed matcher input. Raised before any matching work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInputError {
    #[error("at least one detector is required")]
    NoDetectors,
    #[error("{points} coordinate sets but {rates} sampling rates")]
    LengthMismatch { points: usize, rates: usize },
    #[error("detector {detector}: point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { detector: usize, index: usize },
    #[error("detector {detector}: sampling rate must be positive and finite (got {rate})")]
    NonPositiveSamplingRate { detector: usize, rate: f64 },
    #[error("match radius must be positive and finite (got {radius})")]
    NonPositiveMatchRadius { radius: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("vote threshold {threshold} is outside [0, {detectors}]")]
    VoteThresholdOutOfRange { threshold: i32, detectors: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
