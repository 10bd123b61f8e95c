//! A mesh viewed as a continuous geometric object.
//!
//! [`MeshAsGeometry`] adapts a finite element mesh into an object queryable
//! by continuous coordinate: it owns one geometric adapter per mesh element
//! and a spatial index over them, and exposes point location
//! ([`locate_zeta`](MeshAsGeometry::locate_zeta)) and parametrised positions,
//! including positions at previous timesteps. The view borrows the mesh;
//! rebuilding the mesh means rebuilding the view, strictly between coupling
//! setups.

use crate::comm::Communicator;
use crate::connectivity::ElementConnectivity;
use crate::element::{GeometricElement, InversionSettings};
use crate::error::{ConfigurationError, MultiDomainError};
use crate::mesh::Mesh;
use crate::spatial_index::{IndexParameters, SpatialIndex};
use itertools::izip;
use log::debug;
use nalgebra::{Point, SVector};

/// Tolerances for containment decisions in [`MeshAsGeometry::locate_zeta`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LocateSettings {
    pub inversion: InversionSettings,
    /// Slack on the reference-domain bounds when deciding containment, so
    /// that points on inter-element boundaries are claimed by the first
    /// element tested.
    pub containment_tolerance: f64,
}

impl Default for LocateSettings {
    fn default() -> Self {
        Self {
            inversion: InversionSettings::default(),
            containment_tolerance: 1e-10,
        }
    }
}

/// A finite element mesh wrapped as a continuous geometric object.
pub struct MeshAsGeometry<'a, const D: usize, C>
where
    C: ElementConnectivity<D>,
{
    mesh: &'a Mesh<D, C>,
    elements: Vec<C::Element>,
    index: SpatialIndex<D>,
    settings: LocateSettings,
    /// Intrinsic (parametric) dimension, max-reduced across partitions.
    lagrangian_dim: usize,
    /// Ambient dimension, max-reduced across partitions.
    eulerian_dim: usize,
}

impl<'a, const D: usize, C> MeshAsGeometry<'a, D, C>
where
    C: ElementConnectivity<D>,
{
    /// Builds the view for a single-partition (serial) setting.
    pub fn new(mesh: &'a Mesh<D, C>, params: &IndexParameters<D>) -> Result<Self, MultiDomainError> {
        let (lagrangian, eulerian) = local_dimensions(mesh);
        Self::build(mesh, params, lagrangian, eulerian)
    }

    /// Builds the view in a distributed setting. The intrinsic and ambient
    /// dimensions are max-reduced across all partitions so that partitions
    /// with zero local elements still agree on them.
    pub fn new_distributed(
        mesh: &'a Mesh<D, C>,
        params: &IndexParameters<D>,
        comm: &impl Communicator,
    ) -> Result<Self, MultiDomainError> {
        let (lagrangian, eulerian) = local_dimensions(mesh);
        let reduced = comm.all_reduce_max(&[lagrangian as u64, eulerian as u64])?;
        let (reduced_lagrangian, reduced_eulerian) = (reduced[0] as usize, reduced[1] as usize);
        if lagrangian != 0 && lagrangian != reduced_lagrangian {
            return Err(ConfigurationError::DimensionMismatch {
                local: lagrangian,
                reduced: reduced_lagrangian,
            }
            .into());
        }
        if eulerian != 0 && eulerian != reduced_eulerian {
            return Err(ConfigurationError::DimensionMismatch {
                local: eulerian,
                reduced: reduced_eulerian,
            }
            .into());
        }
        Self::build(mesh, params, reduced_lagrangian, reduced_eulerian)
    }

    fn build(
        mesh: &'a Mesh<D, C>,
        params: &IndexParameters<D>,
        lagrangian_dim: usize,
        eulerian_dim: usize,
    ) -> Result<Self, MultiDomainError> {
        let mut elements = Vec::with_capacity(mesh.num_elements());
        for (element_index, conn) in mesh.connectivity().iter().enumerate() {
            let element = conn
                .element(mesh.vertices())
                .ok_or(MultiDomainError::ElementCast { element_index })?;
            elements.push(element);
        }
        let index = SpatialIndex::build(&elements, params)?;
        debug!(
            "mesh view ready: {} elements, lagrangian dim {}, eulerian dim {}",
            elements.len(),
            lagrangian_dim,
            eulerian_dim
        );
        Ok(Self {
            mesh,
            elements,
            index,
            settings: LocateSettings::default(),
            lagrangian_dim,
            eulerian_dim,
        })
    }

    pub fn with_settings(mut self, settings: LocateSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn mesh(&self) -> &'a Mesh<D, C> {
        self.mesh
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, index: usize) -> &C::Element {
        &self.elements[index]
    }

    pub fn lagrangian_dim(&self) -> usize {
        self.lagrangian_dim
    }

    pub fn eulerian_dim(&self) -> usize {
        self.eulerian_dim
    }

    pub fn spatial_index(&self) -> &SpatialIndex<D> {
        &self.index
    }

    /// Finds the element and local coordinate therein that correspond to the
    /// intrinsic coordinate `zeta`.
    ///
    /// Candidates arrive from the spatial index one search round at a time,
    /// nearest first, and each round is tested before the search widens; the
    /// first element whose local-coordinate solve converges within tolerance
    /// and lands inside the reference domain wins. Returns `None` when the
    /// spiral search budget is exhausted without a match. Repeated calls on
    /// an unmodified mesh return identical results.
    pub fn locate_zeta(&self, zeta: &Point<f64, D>) -> Option<(usize, Point<f64, D>)> {
        self.index.search_chunked(zeta, |candidates| {
            for &element_index in candidates {
                let element = &self.elements[element_index];
                // A failed or non-convergent inverse solve means this element
                // does not contain the point, nothing more.
                if let Some(xi) = element.invert_reference_coords(zeta, &self.settings.inversion) {
                    if element.reference_domain_contains(&xi, self.settings.containment_tolerance) {
                        return Some((element_index, xi));
                    }
                }
            }
            None
        })
    }

    /// Position as a function of the intrinsic coordinate at the current
    /// timestep. `None` if no element contains `zeta`.
    pub fn position(&self, zeta: &Point<f64, D>) -> Option<Point<f64, D>> {
        self.position_at_timestep(0, zeta)
    }

    /// Position at a previous timestep: `t = 0` is the current time, `t > 0`
    /// reaches into the mesh's stored history. The spatial index stores only
    /// current-time geometry, so the location step always uses the current
    /// configuration and the matched element interpolates its own history.
    pub fn position_at_timestep(&self, t: usize, zeta: &Point<f64, D>) -> Option<Point<f64, D>> {
        let (element_index, xi) = self.locate_zeta(zeta)?;
        let element = &self.elements[element_index];
        let mut basis = vec![0.0; element.num_nodes()];
        element.populate_basis(&mut basis, &xi);

        let mut position = SVector::<f64, D>::zeros();
        let vertex_indices = self.mesh.element_vertices(element_index);
        for (phi, vertex) in izip!(&basis, vertex_indices) {
            position += self.mesh.vertex_at_timestep(t, *vertex).coords * *phi;
        }
        Some(Point::from(position))
    }
}

fn local_dimensions<const D: usize, C>(mesh: &Mesh<D, C>) -> (usize, usize) {
    // Intrinsic dimension from the first element, ambient dimension from the
    // first node; both zero when the mesh is empty.
    let lagrangian = if mesh.num_elements() == 0 { 0 } else { D };
    let eulerian = if mesh.num_vertices() == 0 { 0 } else { D };
    (lagrangian, eulerian)
}
