//! Axis-aligned bounding boxes used by the spatial index backends.

use nalgebra::{Point, SVector};
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in `D` dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAlignedBoundingBox<const D: usize> {
    min: SVector<f64, D>,
    max: SVector<f64, D>,
}

pub type AxisAlignedBoundingBox2d = AxisAlignedBoundingBox<2>;

impl<const D: usize> AxisAlignedBoundingBox<D> {
    /// The corners are taken as given. Inverted corners (some `min > max`)
    /// describe an empty box; configuration entry points reject them through
    /// validation rather than here.
    pub fn new(min: SVector<f64, D>, max: SVector<f64, D>) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> &SVector<f64, D> {
        &self.min
    }

    pub fn max(&self) -> &SVector<f64, D> {
        &self.max
    }

    pub fn extents(&self) -> SVector<f64, D> {
        &self.max - &self.min
    }

    pub fn center(&self) -> Point<f64, D> {
        Point::from((&self.min + &self.max) / 2.0)
    }

    /// The smallest box that contains both `self` and `other`.
    pub fn enclose(&self, other: &AxisAlignedBoundingBox<D>) -> Self {
        let min = self.min.zip_map(&other.min, f64::min);
        let max = self.max.zip_map(&other.max, f64::max);
        Self { min, max }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point<f64, D>>) -> Option<Self> {
        points
            .into_iter()
            .map(|p| Self::new(p.coords, p.coords))
            .fold(None, |aabb, next| match aabb {
                Some(aabb) => Some(aabb.enclose(&next)),
                None => Some(next),
            })
    }

    pub fn contains_point(&self, point: &Point<f64, D>) -> bool {
        (0..D).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    /// Grows the box on each side by the given fraction of the per-axis
    /// extent. A degenerate (zero-extent) axis is grown by the fraction
    /// itself so that the result always has positive volume.
    pub fn grow_by_fraction(&self, fraction: f64) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for i in 0..D {
            let extent = max[i] - min[i];
            let pad = if extent > 0.0 { fraction * extent } else { fraction };
            min[i] -= pad;
            max[i] += pad;
        }
        Self { min, max }
    }

    pub fn uniformly_scale(&self, scale: f64) -> Self {
        let center = self.center().coords;
        Self {
            min: &center + (&self.min - &center) * scale,
            max: &center + (&self.max - &center) * scale,
        }
    }

    /// Squared distance from the point to the closest point in the box.
    /// Zero if the point is contained.
    pub fn dist2_to(&self, point: &Point<f64, D>) -> f64 {
        let mut dist2 = 0.0;
        for i in 0..D {
            let d = if point[i] < self.min[i] {
                self.min[i] - point[i]
            } else if point[i] > self.max[i] {
                point[i] - self.max[i]
            } else {
                0.0
            };
            dist2 += d * d;
        }
        dist2
    }

    /// Squared distance from the point to the farthest point in the box.
    pub fn max_dist2_to(&self, point: &Point<f64, D>) -> f64 {
        let mut dist2 = 0.0;
        for i in 0..D {
            let d = f64::max((point[i] - self.min[i]).abs(), (point[i] - self.max[i]).abs());
            dist2 += d * d;
        }
        dist2
    }
}
