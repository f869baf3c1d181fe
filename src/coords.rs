use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use thiserror::Error;

use crate::consensus::ConsensusPoint;

/// A 2D position in pixel units of some detector's sampling.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Coordinate) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Isotropic rescale, no offset.
    pub fn scaled(&self, factor: f64) -> Coordinate {
        Coordinate {
            x: self.x * factor,
            y: self.y * factor,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("line {line}: expected at least two columns, found {found}")]
    MissingColumns { line: usize, found: usize },
    #[error("line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },
}

/// Parse a plain-text coordinate list.
///
/// Each non-blank line that does not start with `#` holds `x` and `y`,
/// separated by whitespace and/or commas. Columns after the second (box size,
/// score, ...) are ignored.
pub fn parse_coordinates(input: &str) -> Result<Vec<Coordinate>, FormatError> {
    let mut points = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let columns: Vec<&str> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect();

        if columns.len() < 2 {
            return Err(FormatError::MissingColumns {
                line: line_no,
                found: columns.len(),
            });
        }

        let x = parse_number(columns[0], line_no)?;
        let y = parse_number(columns[1], line_no)?;
        points.push(Coordinate { x, y });
    }

    Ok(points)
}

fn parse_number(value: &str, line: usize) -> Result<f64, FormatError> {
    value.parse::<f64>().map_err(|_| FormatError::InvalidNumber {
        line,
        value: value.to_string(),
    })
}

/// Write consensus points as `x y` (or `x y votes`) lines under a header comment.
pub fn write_coordinates<W: Write>(
    out: &mut W,
    points: &[ConsensusPoint],
    with_votes: bool,
) -> io::Result<()> {
    if with_votes {
        writeln!(out, "# x y votes")?;
    } else {
        writeln!(out, "# x y")?;
    }
    for point in points {
        if with_votes {
            writeln!(
                out,
                "{} {} {}",
                point.position.x, point.position.y, point.votes
            )?;
        } else {
            writeln!(out, "{} {}", point.position.x, point.position.y)?;
        }
    }
    Ok(())
}
