pub mod config;
pub mod consensus;
pub mod coords;
pub mod detectors;
pub mod engine;
pub mod schema;

pub use consensus::{
    ALL_DETECTORS, ConsensusMatcher, ConsensusPoint, ConsensusResult, MatchError,
    match_coordinates,
};
pub use coords::Coordinate;
pub use detectors::{Detector, DetectorCoordinateSet};
pub use engine::ConsensusEngine;
