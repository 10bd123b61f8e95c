//! Geometric element adapters.
//!
//! An element here is purely geometric: it can evaluate its shape functions,
//! map reference coordinates to physical space and invert that map. The
//! physics layers that attach degrees of freedom to elements are outside
//! this crate; they consume located elements through the coupling results.

use crate::geometry::AxisAlignedBoundingBox;
use log::trace;
use nalgebra::{Matrix2, Point, Point1, Point2, Vector2};

/// Settings for the Newton-type solve used to invert the reference map.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InversionSettings {
    /// Convergence threshold on the residual norm `|x(xi) - x|`.
    pub tolerance: f64,
    /// Iteration cap. Non-convergence is treated as "the element does not
    /// contain the point", never as a hard error.
    pub max_iterations: usize,
}

impl Default for InversionSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 30,
        }
    }
}

/// A mesh element viewed as a geometric object with a reference domain.
pub trait GeometricElement<const D: usize> {
    /// Returns the number of nodes in the element.
    fn num_nodes(&self) -> usize;

    fn vertex(&self, index: usize) -> &Point<f64, D>;

    /// Evaluates each shape function at the given reference coordinates.
    ///
    /// # Panics
    /// Panics if `basis_values` does not have exactly `num_nodes` entries.
    fn populate_basis(&self, basis_values: &mut [f64], reference_coords: &Point<f64, D>);

    /// Maps reference coordinates to physical coordinates.
    fn map_reference_coords(&self, reference_coords: &Point<f64, D>) -> Point<f64, D>;

    /// Whether the reference coordinates lie inside the element's reference
    /// domain, up to the given tolerance.
    fn reference_domain_contains(&self, reference_coords: &Point<f64, D>, tol: f64) -> bool;

    /// Attempts to find reference coordinates that map to the given physical
    /// point. Returns `None` if the solve does not converge within the
    /// settings' budget; the caller must treat this as "not contained".
    /// The returned coordinates are *not* guaranteed to lie in the reference
    /// domain; combine with [`reference_domain_contains`](Self::reference_domain_contains).
    fn invert_reference_coords(
        &self,
        point: &Point<f64, D>,
        settings: &InversionSettings,
    ) -> Option<Point<f64, D>>;

    fn bounding_box(&self) -> AxisAlignedBoundingBox<D>;

    /// Sample points spread through the reference domain, used to populate
    /// spatial bins. `density` is the number of samples per reference axis.
    fn reference_sample_points(&self, density: usize) -> Vec<Point<f64, D>>;
}

/// A two-node segment element in 1D with reference domain `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentElement {
    vertices: [Point1<f64>; 2],
}

impl SegmentElement {
    pub fn from_vertices(vertices: [Point1<f64>; 2]) -> Self {
        Self { vertices }
    }
}

impl GeometricElement<1> for SegmentElement {
    fn num_nodes(&self) -> usize {
        2
    }

    fn vertex(&self, index: usize) -> &Point1<f64> {
        &self.vertices[index]
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &Point1<f64>) {
        assert_eq!(basis_values.len(), 2);
        basis_values[0] = (1.0 - xi.x) / 2.0;
        basis_values[1] = (1.0 + xi.x) / 2.0;
    }

    fn map_reference_coords(&self, xi: &Point1<f64>) -> Point1<f64> {
        let [a, b] = &self.vertices;
        Point1::new(a.x * (1.0 - xi.x) / 2.0 + b.x * (1.0 + xi.x) / 2.0)
    }

    fn reference_domain_contains(&self, xi: &Point1<f64>, tol: f64) -> bool {
        xi.x >= -1.0 - tol && xi.x <= 1.0 + tol
    }

    fn invert_reference_coords(
        &self,
        point: &Point1<f64>,
        _settings: &InversionSettings,
    ) -> Option<Point1<f64>> {
        let [a, b] = &self.vertices;
        let length = b.x - a.x;
        if length == 0.0 {
            return None;
        }
        Some(Point1::new(2.0 * (point.x - a.x) / length - 1.0))
    }

    fn bounding_box(&self) -> AxisAlignedBoundingBox<1> {
        AxisAlignedBoundingBox::from_points(&self.vertices).unwrap()
    }

    fn reference_sample_points(&self, density: usize) -> Vec<Point1<f64>> {
        reference_grid_1d(density)
    }
}

/// A linear triangle element in 2D.
///
/// The reference triangle has corners `(-1, -1)`, `(1, -1)` and `(-1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tri3d2Element {
    vertices: [Point2<f64>; 3],
}

impl Tri3d2Element {
    pub fn from_vertices(vertices: [Point2<f64>; 3]) -> Self {
        Self { vertices }
    }
}

impl GeometricElement<2> for Tri3d2Element {
    fn num_nodes(&self) -> usize {
        3
    }

    fn vertex(&self, index: usize) -> &Point2<f64> {
        &self.vertices[index]
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &Point2<f64>) {
        assert_eq!(basis_values.len(), 3);
        basis_values[0] = -(xi.x + xi.y) / 2.0;
        basis_values[1] = (1.0 + xi.x) / 2.0;
        basis_values[2] = (1.0 + xi.y) / 2.0;
    }

    fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64> {
        let [a, b, c] = &self.vertices;
        let mut phi = [0.0; 3];
        self.populate_basis(&mut phi, xi);
        Point2::from(a.coords * phi[0] + b.coords * phi[1] + c.coords * phi[2])
    }

    fn reference_domain_contains(&self, xi: &Point2<f64>, tol: f64) -> bool {
        xi.x >= -1.0 - tol && xi.y >= -1.0 - tol && xi.x + xi.y <= tol
    }

    fn invert_reference_coords(
        &self,
        point: &Point2<f64>,
        _settings: &InversionSettings,
    ) -> Option<Point2<f64>> {
        // The map is affine, so a single linear solve inverts it exactly.
        let [a, b, c] = &self.vertices;
        let jacobian = Matrix2::from_columns(&[(b - a) / 2.0, (c - a) / 2.0]);
        let origin = self.map_reference_coords(&Point2::new(0.0, 0.0));
        let rhs = point - origin;
        let inverse = jacobian.try_inverse()?;
        Some(Point2::from(inverse * rhs))
    }

    fn bounding_box(&self) -> AxisAlignedBoundingBox<2> {
        AxisAlignedBoundingBox::from_points(&self.vertices).unwrap()
    }

    fn reference_sample_points(&self, density: usize) -> Vec<Point2<f64>> {
        if density <= 1 {
            // Reference centroid
            return vec![Point2::new(-1.0 / 3.0, -1.0 / 3.0)];
        }
        let mut points = Vec::new();
        for i in 0..density {
            for j in 0..density - i {
                let xi = -1.0 + 2.0 * i as f64 / (density - 1) as f64;
                let eta = -1.0 + 2.0 * j as f64 / (density - 1) as f64;
                points.push(Point2::new(xi, eta));
            }
        }
        points
    }
}

/// A bilinear quadrilateral element in 2D with reference domain `[-1, 1]^2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad4d2Element {
    vertices: [Point2<f64>; 4],
}

impl Quad4d2Element {
    pub fn from_vertices(vertices: [Point2<f64>; 4]) -> Self {
        Self { vertices }
    }

    /// Jacobian of the reference map at the given reference coordinates.
    pub fn reference_jacobian(&self, xi: &Point2<f64>) -> Matrix2<f64> {
        let [a, b, c, d] = &self.vertices;
        let (x, y) = (xi.x, xi.y);
        let d_dx = (-a.coords * (1.0 - y) + b.coords * (1.0 - y) + c.coords * (1.0 + y)
            - d.coords * (1.0 + y))
            / 4.0;
        let d_dy = (-a.coords * (1.0 - x) - b.coords * (1.0 + x)
            + c.coords * (1.0 + x)
            + d.coords * (1.0 - x))
            / 4.0;
        Matrix2::from_columns(&[d_dx, d_dy])
    }
}

impl GeometricElement<2> for Quad4d2Element {
    fn num_nodes(&self) -> usize {
        4
    }

    fn vertex(&self, index: usize) -> &Point2<f64> {
        &self.vertices[index]
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &Point2<f64>) {
        assert_eq!(basis_values.len(), 4);
        let (x, y) = (xi.x, xi.y);
        basis_values[0] = (1.0 - x) * (1.0 - y) / 4.0;
        basis_values[1] = (1.0 + x) * (1.0 - y) / 4.0;
        basis_values[2] = (1.0 + x) * (1.0 + y) / 4.0;
        basis_values[3] = (1.0 - x) * (1.0 + y) / 4.0;
    }

    fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64> {
        let mut phi = [0.0; 4];
        self.populate_basis(&mut phi, xi);
        let mut coords = Vector2::zeros();
        for (phi_i, v) in phi.iter().zip(&self.vertices) {
            coords += v.coords * *phi_i;
        }
        Point2::from(coords)
    }

    fn reference_domain_contains(&self, xi: &Point2<f64>, tol: f64) -> bool {
        xi.x.abs() <= 1.0 + tol && xi.y.abs() <= 1.0 + tol
    }

    fn invert_reference_coords(
        &self,
        point: &Point2<f64>,
        settings: &InversionSettings,
    ) -> Option<Point2<f64>> {
        // Newton iteration on x(xi) - x = 0, starting from the reference
        // center. The map is bilinear, so convergence is fast whenever the
        // element is not degenerate.
        let mut xi = Point2::new(0.0, 0.0);
        for iteration in 0..settings.max_iterations {
            let residual = self.map_reference_coords(&xi) - point;
            if residual.norm() <= settings.tolerance {
                trace!("quad inverse map converged after {} iterations", iteration);
                return Some(xi);
            }
            let jacobian = self.reference_jacobian(&xi);
            let step = jacobian.try_inverse()? * residual;
            xi -= step;
        }
        // Non-convergence means "this element does not contain the point".
        None
    }

    fn bounding_box(&self) -> AxisAlignedBoundingBox<2> {
        AxisAlignedBoundingBox::from_points(&self.vertices).unwrap()
    }

    fn reference_sample_points(&self, density: usize) -> Vec<Point2<f64>> {
        let line = reference_grid_1d(density);
        let mut points = Vec::with_capacity(density * density);
        for x in &line {
            for y in &line {
                points.push(Point2::new(x.x, y.x));
            }
        }
        points
    }
}

fn reference_grid_1d(density: usize) -> Vec<Point1<f64>> {
    if density <= 1 {
        return vec![Point1::new(0.0)];
    }
    (0..density)
        .map(|i| Point1::new(-1.0 + 2.0 * i as f64 / (density - 1) as f64))
        .collect()
}
