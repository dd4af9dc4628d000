//! The closed trail of border coordinates.

use crate::error::ApiError;
use crate::types::PlanePoint;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::RangeInclusive;
use std::path::Path;

/// Ordered, closed sequence of plane coordinates. The last point repeats the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    points: Vec<PlanePoint>,
}

/// Trail length produced by one spacing choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurveyRow {
    /// Spacing is `1 / trail_len` plane units
    pub trail_len: u32,
    pub points: usize,
}

impl Trail {
    /// Wrap an already closed sequence of points
    pub fn from_points(points: Vec<PlanePoint>) -> Self {
        Self { points }
    }

    /// Spacing-filter an open path and close it
    pub fn closed_from_path(path: &[PlanePoint], min_spacing: f64) -> Self {
        let mut points: Vec<PlanePoint> = Vec::with_capacity(path.len() + 1);
        for &point in path {
            let keep = points
                .last()
                .map_or(true, |last| last.distance(&point) >= min_spacing);
            if keep {
                points.push(point);
            }
        }
        if let Some(&first) = points.first() {
            points.push(first);
        }
        Self { points }
    }

    pub fn points(&self) -> &[PlanePoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<PlanePoint> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First and last points coincide within `tolerance`
    pub fn is_closed(&self, tolerance: f64) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => first.distance(last) <= tolerance,
            _ => false,
        }
    }

    /// The trail without its closing point
    fn open_path(&self) -> &[PlanePoint] {
        match self.points.split_last() {
            Some((last, rest)) if self.points.len() > 1 && Some(last) == self.points.first() => {
                rest
            }
            _ => &self.points,
        }
    }

    /// Re-filter to a coarser spacing, keeping the trail closed
    pub fn respace(&self, min_spacing: f64) -> Trail {
        Trail::closed_from_path(self.open_path(), min_spacing)
    }

    /// How many points each spacing `1 / trail_len` would yield
    pub fn survey(&self, lengths: RangeInclusive<u32>) -> Vec<SurveyRow> {
        let path = self.open_path();
        lengths
            .filter(|&trail_len| trail_len > 0)
            .map(|trail_len| SurveyRow {
                trail_len,
                points: Trail::closed_from_path(path, 1.0 / trail_len as f64).len(),
            })
            .collect()
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ApiError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Trail, ApiError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
