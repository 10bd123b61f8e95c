//! Construction of external ("halo") element proxies.
//!
//! When a query point is located on another partition, the searching
//! partition ships back everything needed to reconstruct the located element
//! locally: element id, local coordinates, node ids, node positions, nodal
//! field values, and any hanging-node master relations. The
//! [`ExternalElementBinder`] on the requesting side materializes these
//! payloads into halo node/element arenas, deduplicating shared remote nodes
//! through an explicit `(partition, remote node id)` registry so that a
//! given remote node maps to exactly one local proxy.

use crate::connectivity::ElementConnectivity;
use crate::error::CommError;
use crate::mesh::Mesh;
use crate::pack::{PackedDoubles, PackedIndices};
use nalgebra::Point;
use rustc_hash::{FxHashMap, FxHashSet};

/// Whether a located element must be created on the requesting partition,
/// already exists there, or was not found on the searching partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaloElementStatus {
    New,
    Exists,
    NotFound,
}

impl HaloElementStatus {
    pub fn to_wire(self) -> u64 {
        match self {
            HaloElementStatus::NotFound => 0,
            HaloElementStatus::Exists => 1,
            HaloElementStatus::New => 2,
        }
    }

    pub fn from_wire(code: u64) -> Result<Self, CommError> {
        match code {
            0 => Ok(HaloElementStatus::NotFound),
            1 => Ok(HaloElementStatus::Exists),
            2 => Ok(HaloElementStatus::New),
            _ => Err(CommError::ProtocolViolation),
        }
    }
}

/// Local proxy for a node owned by another partition.
#[derive(Debug, Clone, PartialEq)]
pub struct HaloNode<const D: usize> {
    pub owner: usize,
    pub remote_index: usize,
    pub position: Point<f64, D>,
    pub field_values: Vec<f64>,
    /// Hanging-node constraint: (halo node arena index, weight) per master.
    pub masters: Vec<(usize, f64)>,
}

/// Local proxy for an element owned by another partition.
#[derive(Debug, Clone, PartialEq)]
pub struct HaloElement<const D: usize> {
    pub owner: usize,
    pub remote_index: usize,
    /// Halo node arena indices, in the remote element's node order.
    pub nodes: Vec<usize>,
}

/// Materializes located-element payloads into halo proxies.
///
/// The registries live for one coupling setup; a new setup starts from a
/// fresh binder.
#[derive(Debug, Default)]
pub struct ExternalElementBinder<const D: usize> {
    nodes: Vec<HaloNode<D>>,
    elements: Vec<HaloElement<D>>,
    node_registry: FxHashMap<(usize, usize), usize>,
    element_registry: FxHashMap<(usize, usize), usize>,
}

impl<const D: usize> ExternalElementBinder<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn halo_nodes(&self) -> &[HaloNode<D>] {
        &self.nodes
    }

    pub fn halo_elements(&self) -> &[HaloElement<D>] {
        &self.elements
    }

    /// Arena index of the proxy for a remote node, if it has been built.
    pub fn node_proxy(&self, owner: usize, remote_index: usize) -> Option<usize> {
        self.node_registry.get(&(owner, remote_index)).copied()
    }

    /// Arena index of the proxy for a remote element, if it has been built.
    pub fn element_proxy(&self, owner: usize, remote_index: usize) -> Option<usize> {
        self.element_registry.get(&(owner, remote_index)).copied()
    }

    /// Consumes one located-element entry from the wire buffers.
    ///
    /// Returns the halo element arena index and the local coordinates of the
    /// located point within it, or `None` when the entry reports
    /// [`HaloElementStatus::NotFound`].
    pub fn bind_next(
        &mut self,
        owner: usize,
        indices: &mut PackedIndices,
        doubles: &mut PackedDoubles,
    ) -> Result<Option<(usize, Point<f64, D>)>, CommError> {
        let status = HaloElementStatus::from_wire(indices.next()?)?;
        match status {
            HaloElementStatus::NotFound => Ok(None),
            HaloElementStatus::Exists => {
                let local_coords = doubles.next_point()?;
                let remote_index = indices.next_usize()?;
                let element = self
                    .element_proxy(owner, remote_index)
                    .ok_or(CommError::ProtocolViolation)?;
                Ok(Some((element, local_coords)))
            }
            HaloElementStatus::New => {
                let local_coords = doubles.next_point()?;
                let remote_index = indices.next_usize()?;
                let num_nodes = indices.next_usize()?;
                let mut element_nodes = Vec::with_capacity(num_nodes);
                for _ in 0..num_nodes {
                    let node = self.bind_node(owner, indices, doubles)?;
                    element_nodes.push(node);
                }
                let element = self.elements.len();
                self.elements.push(HaloElement {
                    owner,
                    remote_index,
                    nodes: element_nodes,
                });
                self.element_registry.insert((owner, remote_index), element);
                Ok(Some((element, local_coords)))
            }
        }
    }

    fn bind_node(
        &mut self,
        owner: usize,
        indices: &mut PackedIndices,
        doubles: &mut PackedDoubles,
    ) -> Result<usize, CommError> {
        let remote_index = indices.next_usize()?;
        let num_values = indices.next_usize()?;
        let num_masters = indices.next_usize()?;
        let position = doubles.next_point()?;
        let field_values = doubles.next_vec(num_values)?;

        let mut masters = Vec::with_capacity(num_masters);
        for _ in 0..num_masters {
            let master_remote = indices.next_usize()?;
            let master_num_values = indices.next_usize()?;
            let weight = doubles.next()?;
            let master_position = doubles.next_point()?;
            let master_values = doubles.next_vec(master_num_values)?;
            // Masters are plain data-bearing nodes; they go through the same
            // dedup registry as element nodes.
            let master = self.intern_node(owner, master_remote, master_position, master_values, Vec::new());
            masters.push((master, weight));
        }

        Ok(self.intern_node(owner, remote_index, position, field_values, masters))
    }

    /// Registry-deduplicated node insertion: a remote node already bound on
    /// this partition keeps its existing proxy.
    fn intern_node(
        &mut self,
        owner: usize,
        remote_index: usize,
        position: Point<f64, D>,
        field_values: Vec<f64>,
        masters: Vec<(usize, f64)>,
    ) -> usize {
        if let Some(&existing) = self.node_registry.get(&(owner, remote_index)) {
            return existing;
        }
        let index = self.nodes.len();
        self.nodes.push(HaloNode {
            owner,
            remote_index,
            position,
            field_values,
            masters,
        });
        self.node_registry.insert((owner, remote_index), index);
        index
    }
}

/// Encodes one located element for shipment back to the requesting
/// partition.
///
/// The searching partition keeps an export registry per destination: an
/// element that has already been shipped to `origin` is sent as
/// [`HaloElementStatus::Exists`] with its id only, otherwise as
/// [`HaloElementStatus::New`] with the full node payload (positions, field
/// values and master relations).
pub fn encode_located_element<const D: usize, C>(
    mesh: &Mesh<D, C>,
    element_index: usize,
    local_coords: &Point<f64, D>,
    origin: usize,
    exported: &mut FxHashSet<(usize, usize)>,
    indices: &mut PackedIndices,
    doubles: &mut PackedDoubles,
) where
    C: ElementConnectivity<D>,
{
    if !exported.insert((origin, element_index)) {
        indices.push(HaloElementStatus::Exists.to_wire());
        doubles.push_point(local_coords);
        indices.push_usize(element_index);
        return;
    }

    indices.push(HaloElementStatus::New.to_wire());
    doubles.push_point(local_coords);
    indices.push_usize(element_index);
    let vertex_indices = mesh.element_vertices(element_index);
    indices.push_usize(vertex_indices.len());
    for &node in vertex_indices {
        let masters = mesh.node_masters(node);
        let field_values = mesh.node_field_values(node);
        indices.push_usize(node);
        indices.push_usize(field_values.len());
        indices.push_usize(masters.len());
        doubles.push_point(&mesh.vertices()[node]);
        doubles.push_slice(field_values);
        for &(master, weight) in masters {
            let master_values = mesh.node_field_values(master);
            indices.push_usize(master);
            indices.push_usize(master_values.len());
            doubles.push(weight);
            doubles.push_point(&mesh.vertices()[master]);
            doubles.push_slice(master_values);
        }
    }
}

/// Marks a query as unresolved on this partition.
pub fn encode_not_found(indices: &mut PackedIndices) {
    indices.push(HaloElementStatus::NotFound.to_wire());
}
