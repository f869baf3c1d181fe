use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::error::ConfigurationError;

/// How out-of-range vote thresholds are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdPolicy {
    /// `t <= 0` or `t >= N` means every detector must vote.
    #[default]
    Relaxed,
    /// Same as relaxed inside `[0, N]`, rejects anything outside.
    Strict,
}

/// Resolve a configured threshold into the number of votes a consensus point needs.
pub fn required_votes(
    threshold: i32,
    detectors: usize,
    policy: ThresholdPolicy,
) -> Result<usize, ConfigurationError> {
    if policy == ThresholdPolicy::Strict
        && (threshold < 0 || threshold as i64 > detectors as i64)
    {
        return Err(ConfigurationError::VoteThresholdOutOfRange {
            threshold,
            detectors,
        });
    }

    if threshold <= 0 || threshold as usize >= detectors {
        Ok(detectors)
    } else {
        Ok(threshold as usize)
    }
}
