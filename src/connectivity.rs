//! Index-based element connectivities.

use crate::element::{Quad4d2Element, SegmentElement, Tri3d2Element};
use nalgebra::Point;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A connectivity that can produce a geometric element from a vertex slice.
pub trait ElementConnectivity<const D: usize>: Clone + Debug {
    type Element: crate::element::GeometricElement<D>;

    fn vertex_indices(&self) -> &[usize];

    /// Builds the geometric element from the global vertex slice. Returns
    /// `None` if the connectivity references vertices out of bounds; users
    /// of the mesh treat that as a caller contract violation.
    fn element(&self, vertices: &[Point<f64, D>]) -> Option<Self::Element>;
}

/// Connectivity for a two-node segment element in 1D.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment2d1Connectivity(pub [usize; 2]);

impl ElementConnectivity<1> for Segment2d1Connectivity {
    type Element = SegmentElement;

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }

    fn element(&self, vertices: &[Point<f64, 1>]) -> Option<SegmentElement> {
        let Segment2d1Connectivity([a, b]) = self;
        Some(SegmentElement::from_vertices([
            *vertices.get(*a)?,
            *vertices.get(*b)?,
        ]))
    }
}

/// Connectivity for a linear triangle element in 2D.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tri3d2Connectivity(pub [usize; 3]);

impl ElementConnectivity<2> for Tri3d2Connectivity {
    type Element = Tri3d2Element;

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }

    fn element(&self, vertices: &[Point<f64, 2>]) -> Option<Tri3d2Element> {
        let Tri3d2Connectivity([a, b, c]) = self;
        Some(Tri3d2Element::from_vertices([
            *vertices.get(*a)?,
            *vertices.get(*b)?,
            *vertices.get(*c)?,
        ]))
    }
}

/// Connectivity for a bilinear quadrilateral element in 2D.
///
/// The schematic below demonstrates the node numbering.
///
/// ```text
/// 3_________2
/// |         |
/// |         |
/// 0_________1
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quad4d2Connectivity(pub [usize; 4]);

impl ElementConnectivity<2> for Quad4d2Connectivity {
    type Element = Quad4d2Element;

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }

    fn element(&self, vertices: &[Point<f64, 2>]) -> Option<Quad4d2Element> {
        let Quad4d2Connectivity(indices) = self;
        let mut corners = [Point::origin(); 4];
        for (corner, index) in corners.iter_mut().zip(indices) {
            *corner = *vertices.get(*index)?;
        }
        Some(Quad4d2Element::from_vertices(corners))
    }
}
