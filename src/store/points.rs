use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Point;

/// On-disk shape of a `points.json` file.
///
/// Most folders hold a bare array, but some older ones wrap the array in an
/// object with a `points` field (plus whatever else the original export
/// carried). Whichever shape a file was read in, it is written back in the
/// same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointsFile {
    Bare(Vec<Point>),
    Wrapped {
        points: Vec<Point>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl PointsFile {
    #[must_use]
    pub fn points(&self) -> &[Point] {
        match self {
            Self::Bare(points) | Self::Wrapped { points, .. } => points,
        }
    }

    pub fn append(&mut self, new_points: Vec<Point>) {
        match self {
            Self::Bare(points) | Self::Wrapped { points, .. } => points.extend(new_points),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        match self {
            Self::Bare(points) | Self::Wrapped { points, .. } => points,
        }
    }
}
