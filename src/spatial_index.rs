//! Spatial binning structures for nearest-container queries.
//!
//! Given a target point, the index returns the subset of elements whose
//! bounding region could contain it, ordered so that the nearest candidates
//! are tested first. Three backends share this contract:
//!
//! - [`IndexBackend::UniformBins`]: a non-adaptive uniform grid, searched by
//!   an expanding "spiral" (shell) traversal around the query's bin.
//! - [`IndexBackend::AdaptiveBins`]: the same grid, but bins whose population
//!   exceeds a capacity are recursively subdivided.
//! - [`IndexBackend::RTree`]: an R-tree over element bounding boxes, provided
//!   by the `rstar` crate.
//!
//! The backend is selected at construction through a tagged variant; it is a
//! configuration option, not a behavioral difference. A miss yields an empty
//! candidate set. There is no implicit fallback to a full mesh scan beyond
//! the spiral bound.

use crate::element::GeometricElement;
use crate::error::ConfigurationError;
use crate::geometry::AxisAlignedBoundingBox;
use log::{debug, trace};
use nalgebra::Point;
use ordered_float::OrderedFloat;
use rstar::primitives::GeomWithData;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use rustc_hash::FxHashSet;
use std::time::Instant;

/// Which index backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    UniformBins,
    AdaptiveBins,
    RTree,
}

/// Parameters for the binning backends.
#[derive(Debug, Clone, PartialEq)]
pub struct BinParameters<const D: usize> {
    /// Number of bins along each axis.
    pub bins_per_axis: [usize; D],
    /// Extreme coordinates of the bin structure. When `None`, they are
    /// computed from the mesh extents with [`padding_fraction`](Self::padding_fraction) padding.
    pub bounds: Option<AxisAlignedBoundingBox<D>>,
    /// Fractional padding added to each side of auto-computed extents.
    pub padding_fraction: f64,
    /// Number of sample points per reference axis when populating bins.
    pub sample_density: usize,
    /// Number of spiral shells traversed per search round. A round's
    /// candidates are tested before the spiral expands further, so a small
    /// chunk keeps far-away bins out of queries that resolve nearby.
    pub spiral_chunk_size: usize,
    /// Adaptive backend only: bin population that triggers subdivision.
    pub bin_capacity: usize,
    /// Adaptive backend only: maximum subdivision depth.
    pub max_refinement_depth: usize,
}

impl<const D: usize> Default for BinParameters<D> {
    fn default() -> Self {
        Self {
            bins_per_axis: [10; D],
            bounds: None,
            padding_fraction: 0.05,
            sample_density: 3,
            spiral_chunk_size: 10,
            bin_capacity: 32,
            max_refinement_depth: 4,
        }
    }
}

/// Backend selector plus bin parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParameters<const D: usize> {
    pub backend: IndexBackend,
    pub bin: BinParameters<D>,
}

impl<const D: usize> Default for IndexParameters<D> {
    fn default() -> Self {
        Self {
            backend: IndexBackend::UniformBins,
            bin: BinParameters::default(),
        }
    }
}

impl<const D: usize> IndexParameters<D> {
    /// Rejects malformed parameters before any search structure is built.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let bin = &self.bin;
        for (axis, count) in bin.bins_per_axis.iter().enumerate() {
            if *count == 0 {
                return Err(ConfigurationError::EmptyBinAxis { axis });
            }
        }
        if bin.sample_density == 0 {
            return Err(ConfigurationError::ZeroSampleDensity);
        }
        if bin.spiral_chunk_size == 0 {
            return Err(ConfigurationError::ZeroSpiralChunk);
        }
        if !bin.padding_fraction.is_finite() || bin.padding_fraction < 0.0 {
            return Err(ConfigurationError::InvalidPadding {
                padding: bin.padding_fraction,
            });
        }
        if let Some(bounds) = &bin.bounds {
            for axis in 0..D {
                if bounds.min()[axis] > bounds.max()[axis] {
                    return Err(ConfigurationError::InvertedBounds { axis });
                }
            }
        }
        if bin.bin_capacity == 0 {
            return Err(ConfigurationError::ZeroBinCapacity);
        }
        Ok(())
    }
}

/// A spatial index over the elements of one mesh partition.
///
/// Read-only during search; rebuilt (by rebuilding the owning mesh view)
/// whenever the mesh is adapted or redistributed.
#[derive(Debug)]
pub enum SpatialIndex<const D: usize> {
    /// Index over an empty element set; every query misses.
    Empty,
    Uniform(BinArray<D>),
    Adaptive(AdaptiveBinArray<D>),
    RTree(RTreeIndex<D>),
}

impl<const D: usize> SpatialIndex<D> {
    pub fn build<E>(elements: &[E], params: &IndexParameters<D>) -> Result<Self, ConfigurationError>
    where
        E: GeometricElement<D>,
    {
        params.validate()?;
        if elements.is_empty() {
            return Ok(SpatialIndex::Empty);
        }

        let start = Instant::now();
        let bounds = match &params.bin.bounds {
            Some(bounds) => *bounds,
            None => auto_bounds(elements, params.bin.padding_fraction),
        };

        let index = match params.backend {
            IndexBackend::UniformBins => SpatialIndex::Uniform(BinArray::build(elements, bounds, &params.bin)),
            IndexBackend::AdaptiveBins => {
                SpatialIndex::Adaptive(AdaptiveBinArray::build(elements, bounds, &params.bin))
            }
            IndexBackend::RTree => SpatialIndex::RTree(RTreeIndex::build(elements)),
        };
        debug!(
            "built {:?} spatial index over {} elements in {:?}",
            params.backend,
            elements.len(),
            start.elapsed()
        );
        Ok(index)
    }

    /// Bounding region covered by the index, if any.
    pub fn bounds(&self) -> Option<&AxisAlignedBoundingBox<D>> {
        match self {
            SpatialIndex::Empty => None,
            SpatialIndex::Uniform(bins) => Some(&bins.bounds),
            SpatialIndex::Adaptive(bins) => Some(&bins.bounds),
            SpatialIndex::RTree(_) => None,
        }
    }

    /// Appends candidate elements for the target point to `out`, nearest
    /// bins first, without duplicates.
    pub fn candidates_for_point(&self, point: &Point<f64, D>, out: &mut Vec<usize>) {
        match self {
            SpatialIndex::Empty => {}
            SpatialIndex::Uniform(bins) => bins.candidates_for_point(point, out),
            SpatialIndex::Adaptive(bins) => bins.candidates_for_point(point, out),
            SpatialIndex::RTree(tree) => tree.candidates_for_point(point, out),
        }
    }

    /// Feeds duplicate-free candidate batches to `test`, nearest first, and
    /// returns the first `Some` it produces.
    ///
    /// For the binning backends each batch covers one search round of
    /// `spiral_chunk_size` shells, and the spiral stops expanding as soon as
    /// a batch satisfies `test`. The R-tree backend has no shell structure
    /// and presents its pruned candidate set as a single batch.
    pub fn search_chunked<R>(&self, point: &Point<f64, D>, mut test: impl FnMut(&[usize]) -> Option<R>) -> Option<R> {
        match self {
            SpatialIndex::Empty => None,
            SpatialIndex::Uniform(bins) => bins.search_chunked(point, &mut test),
            SpatialIndex::Adaptive(bins) => bins.search_chunked(point, &mut test),
            SpatialIndex::RTree(tree) => {
                let mut candidates = Vec::new();
                tree.candidates_for_point(point, &mut candidates);
                if candidates.is_empty() {
                    None
                } else {
                    test(&candidates)
                }
            }
        }
    }
}

fn auto_bounds<E, const D: usize>(elements: &[E], padding_fraction: f64) -> AxisAlignedBoundingBox<D>
where
    E: GeometricElement<D>,
{
    let mut boxes = elements.iter().map(|e| e.bounding_box());
    let first = boxes.next().expect("element set is non-empty");
    boxes
        .fold(first, |acc, bb| acc.enclose(&bb))
        .grow_by_fraction(padding_fraction)
}

/// Shared grid geometry of the binning backends.
#[derive(Debug, Clone)]
struct GridLayout<const D: usize> {
    bounds: AxisAlignedBoundingBox<D>,
    bins_per_axis: [usize; D],
}

impl<const D: usize> GridLayout<D> {
    /// Grid cell containing the point, clamped to the grid.
    fn cell_of(&self, point: &Point<f64, D>) -> [usize; D] {
        let mut cell = [0; D];
        for i in 0..D {
            let extent = self.bounds.max()[i] - self.bounds.min()[i];
            let n = self.bins_per_axis[i];
            let fraction = if extent > 0.0 {
                (point[i] - self.bounds.min()[i]) / extent
            } else {
                0.0
            };
            cell[i] = ((fraction * n as f64).floor() as i64).clamp(0, n as i64 - 1) as usize;
        }
        cell
    }

    fn flat_index(&self, cell: &[usize; D]) -> usize {
        let mut flat = 0;
        for i in 0..D {
            flat = flat * self.bins_per_axis[i] + cell[i];
        }
        flat
    }

    fn num_cells(&self) -> usize {
        self.bins_per_axis.iter().product()
    }

    /// Radius that guarantees the spiral covers the whole grid from any cell.
    fn covering_radius(&self) -> usize {
        self.bins_per_axis.iter().copied().max().unwrap_or(0)
    }

    /// Bounding box of one grid cell.
    fn cell_bounds(&self, cell: &[usize; D]) -> AxisAlignedBoundingBox<D> {
        let mut min = *self.bounds.min();
        let mut max = *self.bounds.max();
        for i in 0..D {
            let width = (self.bounds.max()[i] - self.bounds.min()[i]) / self.bins_per_axis[i] as f64;
            min[i] = self.bounds.min()[i] + cell[i] as f64 * width;
            max[i] = min[i] + width;
        }
        AxisAlignedBoundingBox::new(min, max)
    }

    /// Visits cells shell by shell around `center` in deterministic order
    /// (increasing Chebyshev radius, lexicographic within a shell). Each
    /// round covers up to `chunk_size` shells; the traversal ends when
    /// `round` returns `true` or the grid is exhausted.
    fn for_each_spiral_round(&self, center: &[usize; D], chunk_size: usize, mut round: impl FnMut(&[[usize; D]]) -> bool) {
        let max_radius = self.covering_radius() as i64;
        let mut cells = Vec::new();
        let mut radius = 0;
        while radius <= max_radius {
            let round_end = (radius + chunk_size as i64).min(max_radius + 1);
            cells.clear();
            for r in radius..round_end {
                let mut offset = [0i64; D];
                self.visit_shell(center, r, 0, &mut offset, &mut |cell: &[usize; D]| cells.push(*cell));
            }
            radius = round_end;
            if round(&cells) {
                trace!("spiral search satisfied within shell radius {}", radius);
                return;
            }
        }
    }

    fn visit_shell(
        &self,
        center: &[usize; D],
        radius: i64,
        axis: usize,
        offset: &mut [i64; D],
        visit: &mut impl FnMut(&[usize; D]),
    ) {
        if axis == D {
            let chebyshev = offset.iter().map(|o| o.abs()).max().unwrap_or(0);
            if chebyshev != radius {
                return;
            }
            let mut cell = [0; D];
            for i in 0..D {
                let c = center[i] as i64 + offset[i];
                if c < 0 || c >= self.bins_per_axis[i] as i64 {
                    return;
                }
                cell[i] = c as usize;
            }
            visit(&cell);
            return;
        }
        for o in -radius..=radius {
            offset[axis] = o;
            self.visit_shell(center, radius, axis + 1, offset, visit);
        }
    }
}

/// Non-adaptive uniform bin array.
#[derive(Debug)]
pub struct BinArray<const D: usize> {
    bounds: AxisAlignedBoundingBox<D>,
    layout: GridLayout<D>,
    spiral_chunk_size: usize,
    bins: Vec<Vec<usize>>,
}

impl<const D: usize> BinArray<D> {
    fn build<E>(elements: &[E], bounds: AxisAlignedBoundingBox<D>, params: &BinParameters<D>) -> Self
    where
        E: GeometricElement<D>,
    {
        let layout = GridLayout {
            bounds,
            bins_per_axis: params.bins_per_axis,
        };
        let mut bins = vec![Vec::new(); layout.num_cells()];
        for (element_index, element) in elements.iter().enumerate() {
            for sample in element.reference_sample_points(params.sample_density) {
                let x = element.map_reference_coords(&sample);
                let bin = &mut bins[layout.flat_index(&layout.cell_of(&x))];
                // Consecutive samples tend to land in the same bin
                if bin.last() != Some(&element_index) {
                    bin.push(element_index);
                }
            }
        }
        Self {
            bounds,
            layout,
            spiral_chunk_size: params.spiral_chunk_size,
            bins,
        }
    }

    fn candidates_for_point(&self, point: &Point<f64, D>, out: &mut Vec<usize>) {
        self.search_chunked::<()>(point, &mut |batch| {
            out.extend_from_slice(batch);
            None
        });
    }

    fn search_chunked<R>(&self, point: &Point<f64, D>, test: &mut dyn FnMut(&[usize]) -> Option<R>) -> Option<R> {
        let center = self.layout.cell_of(point);
        let mut seen = FxHashSet::default();
        let mut batch = Vec::new();
        let mut result = None;
        self.layout.for_each_spiral_round(&center, self.spiral_chunk_size, |cells| {
            batch.clear();
            for cell in cells {
                for &element in &self.bins[self.layout.flat_index(cell)] {
                    if seen.insert(element) {
                        batch.push(element);
                    }
                }
            }
            if batch.is_empty() {
                return false;
            }
            result = test(&batch);
            result.is_some()
        });
        result
    }
}

/// Adaptively refined bin array: overfull bins subdivide into `2^D` children.
#[derive(Debug)]
pub struct AdaptiveBinArray<const D: usize> {
    bounds: AxisAlignedBoundingBox<D>,
    layout: GridLayout<D>,
    spiral_chunk_size: usize,
    cells: Vec<AdaptiveCell<D>>,
}

#[derive(Debug)]
enum AdaptiveCell<const D: usize> {
    Leaf(Vec<(usize, Point<f64, D>)>),
    Split(Vec<AdaptiveCell<D>>),
}

impl<const D: usize> AdaptiveBinArray<D> {
    fn build<E>(elements: &[E], bounds: AxisAlignedBoundingBox<D>, params: &BinParameters<D>) -> Self
    where
        E: GeometricElement<D>,
    {
        let layout = GridLayout {
            bounds,
            bins_per_axis: params.bins_per_axis,
        };
        let mut cells: Vec<AdaptiveCell<D>> = (0..layout.num_cells()).map(|_| AdaptiveCell::Leaf(Vec::new())).collect();
        for (element_index, element) in elements.iter().enumerate() {
            for sample in element.reference_sample_points(params.sample_density) {
                let x = element.map_reference_coords(&sample);
                let cell = layout.cell_of(&x);
                let cell_bounds = layout.cell_bounds(&cell);
                cells[layout.flat_index(&cell)].insert(
                    (element_index, x),
                    &cell_bounds,
                    0,
                    params.bin_capacity,
                    params.max_refinement_depth,
                );
            }
        }
        Self {
            bounds,
            layout,
            spiral_chunk_size: params.spiral_chunk_size,
            cells,
        }
    }

    fn candidates_for_point(&self, point: &Point<f64, D>, out: &mut Vec<usize>) {
        self.search_chunked::<()>(point, &mut |batch| {
            out.extend_from_slice(batch);
            None
        });
    }

    fn search_chunked<R>(&self, point: &Point<f64, D>, test: &mut dyn FnMut(&[usize]) -> Option<R>) -> Option<R> {
        let center = self.layout.cell_of(point);
        let mut seen = FxHashSet::default();
        let mut batch = Vec::new();
        let mut result = None;
        self.layout.for_each_spiral_round(&center, self.spiral_chunk_size, |cells| {
            batch.clear();
            for cell in cells {
                let cell_bounds = self.layout.cell_bounds(cell);
                self.cells[self.layout.flat_index(cell)].collect_candidates(point, &cell_bounds, &mut seen, &mut batch);
            }
            if batch.is_empty() {
                return false;
            }
            result = test(&batch);
            result.is_some()
        });
        result
    }
}

impl<const D: usize> AdaptiveCell<D> {
    fn insert(
        &mut self,
        sample: (usize, Point<f64, D>),
        bounds: &AxisAlignedBoundingBox<D>,
        depth: usize,
        capacity: usize,
        max_depth: usize,
    ) {
        match self {
            AdaptiveCell::Leaf(samples) => {
                samples.push(sample);
                if samples.len() > capacity && depth < max_depth {
                    let samples = std::mem::take(samples);
                    let mut children: Vec<AdaptiveCell<D>> = (0..1usize << D).map(|_| AdaptiveCell::Leaf(Vec::new())).collect();
                    let center = bounds.center();
                    for (element, position) in samples {
                        let child = child_of(&position, &center);
                        children[child].insert(
                            (element, position),
                            &child_bounds(bounds, child),
                            depth + 1,
                            capacity,
                            max_depth,
                        );
                    }
                    *self = AdaptiveCell::Split(children);
                }
            }
            AdaptiveCell::Split(children) => {
                let center = bounds.center();
                let child = child_of(&sample.1, &center);
                children[child].insert(sample, &child_bounds(bounds, child), depth + 1, capacity, max_depth);
            }
        }
    }

    /// Collects the subtree's elements, nearest child boxes first.
    fn collect_candidates(
        &self,
        point: &Point<f64, D>,
        bounds: &AxisAlignedBoundingBox<D>,
        seen: &mut FxHashSet<usize>,
        out: &mut Vec<usize>,
    ) {
        match self {
            AdaptiveCell::Leaf(samples) => {
                for (element, _) in samples {
                    if seen.insert(*element) {
                        out.push(*element);
                    }
                }
            }
            AdaptiveCell::Split(children) => {
                let mut order: Vec<usize> = (0..children.len()).collect();
                order.sort_by_key(|&child| OrderedFloat(child_bounds(bounds, child).dist2_to(point)));
                for child in order {
                    children[child].collect_candidates(point, &child_bounds(bounds, child), seen, out);
                }
            }
        }
    }
}

fn child_of<const D: usize>(point: &Point<f64, D>, center: &Point<f64, D>) -> usize {
    let mut child = 0;
    for i in 0..D {
        if point[i] >= center[i] {
            child |= 1 << i;
        }
    }
    child
}

fn child_bounds<const D: usize>(bounds: &AxisAlignedBoundingBox<D>, child: usize) -> AxisAlignedBoundingBox<D> {
    let mut min = *bounds.min();
    let mut max = *bounds.max();
    for i in 0..D {
        let mid = (min[i] + max[i]) / 2.0;
        if child & (1 << i) != 0 {
            min[i] = mid;
        } else {
            max[i] = mid;
        }
    }
    AxisAlignedBoundingBox::new(min, max)
}

/// R-tree backend over element bounding boxes.
#[derive(Debug)]
pub struct RTreeIndex<const D: usize> {
    tree: RTree<GeomWithData<ElementEnvelope<D>, usize>>,
}

#[derive(Debug, Clone)]
struct ElementEnvelope<const D: usize> {
    aabb: AxisAlignedBoundingBox<D>,
}

/// Adapter implementing `rstar::Point` for an arbitrary `D`; `rstar` only
/// provides the trait for fixed-size arrays up to nine dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexPoint<const D: usize>([f64; D]);

impl<const D: usize> rstar::Point for IndexPoint<D> {
    type Scalar = f64;
    const DIMENSIONS: usize = D;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        Self(std::array::from_fn(|i| generator(i)))
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.0[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.0[index]
    }
}

impl<const D: usize> RTreeObject for ElementEnvelope<D> {
    type Envelope = AABB<IndexPoint<D>>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            IndexPoint((*self.aabb.min()).into()),
            IndexPoint((*self.aabb.max()).into()),
        )
    }
}

impl<const D: usize> PointDistance for ElementEnvelope<D> {
    fn distance_2(&self, point: &IndexPoint<D>) -> f64 {
        self.aabb.dist2_to(&Point::from(point.0))
    }

    fn contains_point(&self, point: &IndexPoint<D>) -> bool {
        self.aabb.contains_point(&Point::from(point.0))
    }
}

impl<const D: usize> RTreeIndex<D> {
    fn build<E>(elements: &[E]) -> Self
    where
        E: GeometricElement<D>,
    {
        let geometries = elements
            .iter()
            .enumerate()
            .map(|(i, element)| {
                // Make the box slightly larger than necessary to accommodate
                // floating point errors in the envelope tests.
                let aabb = element.bounding_box().uniformly_scale(1.01);
                GeomWithData::new(ElementEnvelope { aabb }, i)
            })
            .collect();
        Self {
            tree: RTree::bulk_load(geometries),
        }
    }

    fn candidates_for_point(&self, point: &Point<f64, D>, out: &mut Vec<usize>) {
        let target = IndexPoint(point.coords.into());
        let mut iter = self
            .tree
            .nearest_neighbor_iter(&target)
            .map(|geom| (&geom.geom().aabb, geom.data))
            .peekable();

        // First find the maximum possible distance to any point in the first
        // box; any subsequent box can be excluded if its closest point is
        // farther away than that.
        let d2_max = iter
            .peek()
            .map(|(aabb, _)| aabb.max_dist2_to(point))
            .unwrap_or(f64::NAN);
        out.extend(
            iter.take_while(move |(aabb, _)| aabb.dist2_to(point) <= d2_max)
                .map(|(_, index)| index),
        );
    }
}
