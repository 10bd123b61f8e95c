use crate::geometry::AxisAlignedBoundingBox;
use ::proptest::prelude::*;
use nalgebra::SVector;

/// Points constrained to the given bounding box, for exercising queries
/// that must hit the indexed region.
pub fn point_in_aabb<const D: usize>(
    aabb: AxisAlignedBoundingBox<D>,
) -> impl Strategy<Value = nalgebra::Point<f64, D>> {
    let ranges: [_; D] = std::array::from_fn(|axis| {
        let (lo, hi) = (aabb.min()[axis], aabb.max()[axis]);
        if lo < hi {
            lo..=hi
        } else {
            lo..=lo
        }
    });
    ranges.prop_map(|coords| SVector::<f64, D>::from(coords).into())
}
