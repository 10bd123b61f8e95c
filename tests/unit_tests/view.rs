use matrixcompare::assert_matrix_eq;
use multidomain::comm::{channel_comm_group, Communicator, SerialComm};
use multidomain::connectivity::{ElementConnectivity, Segment2d1Connectivity};
use multidomain::element::GeometricElement;
use multidomain::error::{ConfigurationError, MultiDomainError};
use multidomain::geometry::AxisAlignedBoundingBox2d;
use multidomain::mesh::procedural::{
    create_uniform_segment_mesh_1d, create_unit_square_uniform_quad_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d,
};
use multidomain::mesh::SegmentMesh1d;
use multidomain::proptest::point_in_aabb;
use multidomain::spatial_index::{IndexBackend, IndexParameters};
use multidomain::view::MeshAsGeometry;
use nalgebra::{Point1, Point2, Vector2};
use proptest::prelude::*;
use std::thread;

#[test]
fn two_segment_mesh_locates_interior_point() {
    // Two unit segments covering [0, 2].
    let mesh = create_uniform_segment_mesh_1d(2, 0.0, 2.0);
    let view = MeshAsGeometry::new(&mesh, &IndexParameters::default()).unwrap();

    let (element, xi) = view.locate_zeta(&Point1::new(0.5)).unwrap();
    assert_eq!(element, 0);
    // The midpoint of the first segment is the center of its reference
    // domain.
    assert_matrix_eq!(xi.coords, Point1::new(0.0).coords, comp = abs, tol = 1e-12);

    assert!(view.locate_zeta(&Point1::new(2.5)).is_none());

    // The view's index covers the padded mesh extents.
    let bounds = view.spatial_index().bounds().unwrap();
    assert!(bounds.min().x < 0.0 && bounds.max().x > 2.0);
}

#[test]
fn locate_is_idempotent() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(4);
    let view = MeshAsGeometry::new(&mesh, &IndexParameters::default()).unwrap();
    let zeta = Point2::new(0.37, 0.81);
    let first = view.locate_zeta(&zeta).unwrap();
    for _ in 0..5 {
        assert_eq!(view.locate_zeta(&zeta), Some(first));
    }
}

#[test]
fn located_points_reproduce_their_physical_position() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(6);
    let view = MeshAsGeometry::new(&mesh, &IndexParameters::default()).unwrap();

    for conn in mesh.connectivity() {
        let element = conn.element(mesh.vertices()).unwrap();
        let x = element.map_reference_coords(&Point2::new(-1.0 / 3.0, -1.0 / 3.0));
        let position = view.position(&x).unwrap();
        assert_matrix_eq!(position.coords, x.coords, comp = abs, tol = 1e-10);
    }
}

#[test]
fn position_at_timestep_uses_stored_history() {
    let mut mesh = create_uniform_segment_mesh_1d(2, 0.0, 2.0);
    // Previous configuration: the whole mesh shifted left by 0.25.
    let shifted = mesh.vertices().iter().map(|v| Point1::new(v.x - 0.25)).collect();
    mesh.set_vertex_history(vec![shifted]);

    let view = MeshAsGeometry::new(&mesh, &IndexParameters::default()).unwrap();
    let current = view.position_at_timestep(0, &Point1::new(0.5)).unwrap();
    let previous = view.position_at_timestep(1, &Point1::new(0.5)).unwrap();
    assert_matrix_eq!(current.coords, Point1::new(0.5).coords, comp = abs, tol = 1e-12);
    assert_matrix_eq!(previous.coords, Point1::new(0.25).coords, comp = abs, tol = 1e-12);
}

#[test]
fn out_of_bounds_connectivity_is_a_cast_error() {
    let mesh = SegmentMesh1d::from_vertices_and_connectivity(
        vec![Point1::new(0.0), Point1::new(1.0)],
        vec![Segment2d1Connectivity([0, 7])],
    );
    let err = MeshAsGeometry::new(&mesh, &IndexParameters::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        MultiDomainError::ElementCast { element_index: 0 }
    ));
}

#[test]
fn serial_distributed_view_keeps_local_dimensions() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2);
    let comm = SerialComm;
    let view = MeshAsGeometry::new_distributed(&mesh, &IndexParameters::default(), &comm).unwrap();
    assert_eq!(view.lagrangian_dim(), 2);
    assert_eq!(view.eulerian_dim(), 2);
}

/// The wire format of the dimension reduce is untyped, so partitions built
/// with different compile-time dimensions can share one exchange. The
/// lower-dimensional partition must reject the reconciled result.
#[test]
fn distributed_views_reject_irreconcilable_dimensions() {
    let comms = channel_comm_group(2);
    let mut handles = Vec::new();
    for comm in comms {
        handles.push(thread::spawn(move || {
            if comm.rank() == 0 {
                let mesh = create_uniform_segment_mesh_1d(2, 0.0, 1.0);
                MeshAsGeometry::new_distributed(&mesh, &IndexParameters::default(), &comm).err()
            } else {
                let mesh = create_unit_square_uniform_quad_mesh_2d(2);
                MeshAsGeometry::new_distributed(&mesh, &IndexParameters::default(), &comm).err()
            }
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(matches!(
        results[0],
        Some(MultiDomainError::Configuration(
            ConfigurationError::DimensionMismatch { local: 1, reduced: 2 }
        ))
    ));
    assert!(results[1].is_none());
}

#[test]
fn backends_agree_on_located_elements() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(5);
    let queries = [
        Point2::new(0.11, 0.91),
        Point2::new(0.53, 0.47),
        Point2::new(0.999, 0.001),
        Point2::new(1.5, 0.5),
    ];
    let views: Vec<_> = [
        IndexBackend::UniformBins,
        IndexBackend::AdaptiveBins,
        IndexBackend::RTree,
    ]
    .map(|backend| {
        let params = IndexParameters {
            backend,
            ..Default::default()
        };
        MeshAsGeometry::new(&mesh, &params).unwrap()
    })
    .into_iter()
    .collect();

    for zeta in &queries {
        let located: Vec<_> = views.iter().map(|view| view.locate_zeta(zeta).map(|(e, _)| e)).collect();
        assert_eq!(located[0], located[1]);
        assert_eq!(located[1], located[2]);
    }
}

proptest! {
    #[test]
    fn interior_points_are_always_located(
        zeta in point_in_aabb(AxisAlignedBoundingBox2d::new(
            Vector2::new(0.001, 0.001),
            Vector2::new(0.999, 0.999),
        ))
    ) {
        let mesh = create_unit_square_uniform_quad_mesh_2d(3);
        let view = MeshAsGeometry::new(&mesh, &IndexParameters::default()).unwrap();
        let (element, xi) = view.locate_zeta(&zeta).unwrap();
        prop_assert!(element < mesh.num_elements());
        let mapped = view.element(element).map_reference_coords(&xi);
        prop_assert!((mapped - zeta).norm() < 1e-9);
    }
}
