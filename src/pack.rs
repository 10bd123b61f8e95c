//! Flat-packed wire buffers.
//!
//! Coordinates and halo-element payloads travel between partitions as flat
//! `f64` and `u64` vectors. Each buffer carries its own read cursor, so the
//! producing and consuming code never shares hidden counters.

use crate::error::CommError;
use nalgebra::Point;

/// A flat vector of `f64` entries with an explicit read cursor.
#[derive(Debug, Default, Clone)]
pub struct PackedDoubles {
    data: Vec<f64>,
    cursor: usize,
}

impl PackedDoubles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { data, cursor: 0 }
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries not yet consumed by [`next`](Self::next).
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn push(&mut self, value: f64) {
        self.data.push(value);
    }

    pub fn push_point<const D: usize>(&mut self, point: &Point<f64, D>) {
        self.data.extend(point.coords.iter());
    }

    pub fn push_slice(&mut self, values: &[f64]) {
        self.data.extend_from_slice(values);
    }

    pub fn next(&mut self) -> Result<f64, CommError> {
        let value = self.data.get(self.cursor).copied().ok_or(CommError::TruncatedMessage)?;
        self.cursor += 1;
        Ok(value)
    }

    pub fn next_point<const D: usize>(&mut self) -> Result<Point<f64, D>, CommError> {
        let mut point = Point::origin();
        for i in 0..D {
            point[i] = self.next()?;
        }
        Ok(point)
    }

    pub fn next_vec(&mut self, count: usize) -> Result<Vec<f64>, CommError> {
        (0..count).map(|_| self.next()).collect()
    }
}

/// A flat vector of `u64` entries with an explicit read cursor.
#[derive(Debug, Default, Clone)]
pub struct PackedIndices {
    data: Vec<u64>,
    cursor: usize,
}

impl PackedIndices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<u64>) -> Self {
        Self { data, cursor: 0 }
    }

    pub fn into_vec(self) -> Vec<u64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn push(&mut self, value: u64) {
        self.data.push(value);
    }

    pub fn push_usize(&mut self, value: usize) {
        self.data.push(value as u64);
    }

    pub fn next(&mut self) -> Result<u64, CommError> {
        let value = self.data.get(self.cursor).copied().ok_or(CommError::TruncatedMessage)?;
        self.cursor += 1;
        Ok(value)
    }

    pub fn next_usize(&mut self) -> Result<usize, CommError> {
        Ok(self.next()? as usize)
    }
}
