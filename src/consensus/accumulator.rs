use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::coords::Coordinate;

/// Running centroid of every detector point folded into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsensusPoint {
    pub position: Coordinate,
    pub votes: usize,
}

impl ConsensusPoint {
    pub fn seed(position: Coordinate) -> Self {
        Self { position, votes: 1 }
    }

    /// Weighted running mean: `(votes * old + p) / (votes + 1)`.
    fn fold(&mut self, point: Coordinate) {
        let weight = self.votes as f64;
        let total = weight + 1.0;
        self.position = Coordinate {
            x: (weight * self.position.x + point.x) / total,
            y: (weight * self.position.y + point.y) / total,
        };
        self.votes += 1;
    }
}

/// Greedy nearest-entry accumulator.
///
/// Each detector is folded against the entries that existed when that
/// detector started; entries it creates itself are not matched against.
/// An entry takes at most one point per detector, so votes never exceed the
/// number of detectors.
#[derive(Debug, Default)]
pub(crate) struct Accumulator {
    entries: Vec<ConsensusPoint>,
}

impl Accumulator {
    pub(crate) fn seeded(points: &[Coordinate]) -> Self {
        Self {
            entries: points.iter().copied().map(ConsensusPoint::seed).collect(),
        }
    }

    pub(crate) fn fold_detector(&mut self, points: &[Coordinate], radius_squared: f64) {
        let visible = self.entries.len();
        let mut claimed = vec![false; visible];

        for &point in points {
            match self.nearest(point, &claimed) {
                Some((idx, dist)) if dist < radius_squared => {
                    self.entries[idx].fold(point);
                    claimed[idx] = true;
                }
                _ => self.entries.push(ConsensusPoint::seed(point)),
            }
        }
    }

    /// First unclaimed entry at minimum distance among the visible ones.
    fn nearest(&self, point: Coordinate, claimed: &[bool]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in self.entries[..claimed.len()].iter().enumerate() {
            if claimed[idx] {
                continue;
            }
            let dist = entry.position.distance_squared(&point);
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((idx, dist)),
            }
        }
        best
    }

    pub(crate) fn into_entries(self) -> Vec<ConsensusPoint> {
        self.entries
    }
}
