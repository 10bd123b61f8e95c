//! Index-based mesh data structure.
//!
//! The mesh is the collaborator boundary of this crate: the physics layer
//! supplies meshes, and the coupling subsystem only relies on the accessors
//! defined here (element connectivity, vertex positions and history, nodal
//! field values and hanging-node master relations).

use crate::connectivity::ElementConnectivity;
use nalgebra::Point;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub mod procedural;

/// Index-based data structure for a mesh of geometric elements.
///
/// Beyond vertices and connectivity, a mesh optionally carries per-vertex
/// position history (for queries at previous timesteps), per-node field
/// values and hanging-node master relations. All of these travel with halo
/// elements during distributed coupling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "C: Serialize", deserialize = "C: Deserialize<'de>"))]
pub struct Mesh<const D: usize, C> {
    vertices: Vec<Point<f64, D>>,
    connectivity: Vec<C>,
    /// history[t][v] is the position of vertex `v`, `t + 1` timesteps ago.
    history: Vec<Vec<Point<f64, D>>>,
    /// Per-node field values; empty when the mesh carries no fields.
    node_values: Vec<Vec<f64>>,
    /// Hanging-node constraints: node index -> (master node index, weight).
    masters: FxHashMap<usize, Vec<(usize, f64)>>,
}

impl<const D: usize, C> Mesh<D, C> {
    /// Construct a mesh from vertices and connectivity.
    ///
    /// The provided connectivity is expected only to return valid (i.e.
    /// in-bounds) indices, but this can not be trusted; consumers check and
    /// report out-of-bounds connectivity as a contract violation.
    pub fn from_vertices_and_connectivity(vertices: Vec<Point<f64, D>>, connectivity: Vec<C>) -> Self {
        Self {
            vertices,
            connectivity,
            history: Vec::new(),
            node_values: Vec::new(),
            masters: FxHashMap::default(),
        }
    }

    pub fn vertices(&self) -> &[Point<f64, D>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[C] {
        &self.connectivity
    }

    pub fn num_elements(&self) -> usize {
        self.connectivity.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of stored previous timesteps.
    pub fn num_history_levels(&self) -> usize {
        self.history.len()
    }

    /// Position of a vertex at timestep `t`: `t = 0` is the current
    /// position, `t > 0` reaches `t` timesteps into the stored history.
    ///
    /// # Panics
    /// Panics if `t` exceeds the stored history depth.
    pub fn vertex_at_timestep(&self, t: usize, vertex: usize) -> &Point<f64, D> {
        if t == 0 {
            &self.vertices[vertex]
        } else {
            &self.history[t - 1][vertex]
        }
    }

    /// Replaces the stored position history. `history[t]` must hold one
    /// position per vertex for timestep `t + 1` steps ago.
    pub fn set_vertex_history(&mut self, history: Vec<Vec<Point<f64, D>>>) {
        for level in &history {
            assert_eq!(level.len(), self.vertices.len());
        }
        self.history = history;
    }

    /// Field values carried by the given node; empty if the mesh has none.
    pub fn node_field_values(&self, node: usize) -> &[f64] {
        self.node_values.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_node_field_values(&mut self, node_values: Vec<Vec<f64>>) {
        assert_eq!(node_values.len(), self.vertices.len());
        self.node_values = node_values;
    }

    /// Master relations constraining the given (hanging) node.
    pub fn node_masters(&self, node: usize) -> &[(usize, f64)] {
        self.masters.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_node_masters(&mut self, node: usize, masters: Vec<(usize, f64)>) {
        self.masters.insert(node, masters);
    }

    /// Applies the transformation to every vertex of the mesh.
    pub fn transform_vertices<F>(&mut self, mut transformation: F)
    where
        F: FnMut(&mut Point<f64, D>),
    {
        for p in &mut self.vertices {
            transformation(p);
        }
    }
}

impl<const D: usize, C> Mesh<D, C>
where
    C: ElementConnectivity<D>,
{
    pub fn get_element(&self, index: usize) -> Option<C::Element> {
        self.connectivity
            .get(index)
            .and_then(|conn| conn.element(&self.vertices))
    }

    /// Vertex indices of the given element.
    pub fn element_vertices(&self, index: usize) -> &[usize] {
        self.connectivity[index].vertex_indices()
    }
}

pub type Mesh1d<C> = Mesh<1, C>;
pub type Mesh2d<C> = Mesh<2, C>;

pub type SegmentMesh1d = Mesh1d<crate::connectivity::Segment2d1Connectivity>;
pub type TriangleMesh2d = Mesh2d<crate::connectivity::Tri3d2Connectivity>;
pub type QuadMesh2d = Mesh2d<crate::connectivity::Quad4d2Connectivity>;
