//! Indexed path with precomputed cumulative distances.

use serde::Serialize;

use crate::error::NavError;
use crate::geo::{self, GeoPoint};

/// A point of a loaded path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathPoint {
    pub point: GeoPoint,
    /// Position in the path (0-based, contiguous).
    pub index: usize,
    /// Distance to the preceding point in meters (0 for the first point).
    pub distance_to_previous: f64,
    /// Distance along the path from its start in meters.
    pub cumulative_distance: f64,
}

/// An ordered, immutable path. Rerouting produces a new `Path` rather
/// than mutating an existing one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    points: Vec<PathPoint>,
    total_length: f64,
}

impl Path {
    /// Build a path from an ordered list of coordinates.
    pub fn new(points: &[GeoPoint]) -> Result<Self, NavError> {
        if points.is_empty() {
            return Err(NavError::InvalidPath);
        }

        let mut indexed = Vec::with_capacity(points.len());
        let mut cumulative = 0.0;

        for (i, p) in points.iter().enumerate() {
            let step = if i == 0 { 0.0 } else { geo::distance(&points[i - 1], p) };
            cumulative += step;
            indexed.push(PathPoint {
                point: *p,
                index: i,
                distance_to_previous: step,
                cumulative_distance: cumulative,
            });
        }

        Ok(Self {
            points: indexed,
            total_length: cumulative,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a path holds at least one point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&PathPoint> {
        self.points.get(index)
    }

    pub fn first(&self) -> &PathPoint {
        &self.points[0]
    }

    pub fn last(&self) -> &PathPoint {
        &self.points[self.points.len() - 1]
    }

    pub fn last_index(&self) -> usize {
        self.points.len() - 1
    }

    /// Length of the whole path in meters.
    pub fn total_length(&self) -> f64 {
        self.total_length
    }

    /// Plain coordinates in path order.
    pub fn geo_points(&self) -> Vec<GeoPoint> {
        self.points.iter().map(|p| p.point).collect()
    }

    /// Index of the path point closest to `target`.
    pub fn nearest_index(&self, target: &GeoPoint) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for p in &self.points {
            let d = geo::distance(&p.point, target);
            if d < best_dist {
                best_dist = d;
                best = p.index;
            }
        }
        best
    }
}

impl std::ops::Index<usize> for Path {
    type Output = PathPoint;

    fn index(&self, index: usize) -> &PathPoint {
        &self.points[index]
    }
}
