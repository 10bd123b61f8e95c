use multidomain::connectivity::Quad4d2Connectivity;
use multidomain::mesh::procedural::{
    create_rectangular_uniform_quad_mesh_2d, create_uniform_segment_mesh_1d,
    create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d,
};
use multidomain::mesh::QuadMesh2d;
use nalgebra::{Point1, Point2};

#[test]
fn segment_mesh_vertices_are_uniform() {
    let mesh = create_uniform_segment_mesh_1d(4, 0.0, 2.0);
    assert_eq!(mesh.num_vertices(), 5);
    assert_eq!(mesh.num_elements(), 4);
    for (i, v) in mesh.vertices().iter().enumerate() {
        assert_eq!(*v, Point1::new(0.5 * i as f64));
    }
    for (i, conn) in mesh.connectivity().iter().enumerate() {
        assert_eq!(conn.0, [i, i + 1]);
    }
}

#[test]
fn transforming_vertices_moves_every_vertex() {
    let mut mesh = create_uniform_segment_mesh_1d(4, 0.0, 2.0);
    mesh.transform_vertices(|v| v.x += 3.0);
    for (i, v) in mesh.vertices().iter().enumerate() {
        assert_eq!(*v, Point1::new(3.0 + 0.5 * i as f64));
    }
}

#[test]
fn rectangular_quad_mesh_has_expected_topology() {
    let mesh = create_rectangular_uniform_quad_mesh_2d(3, 2, &Point2::new(1.0, -1.0), 0.5);
    assert_eq!(mesh.num_vertices(), 4 * 3);
    assert_eq!(mesh.num_elements(), 6);
    assert_eq!(mesh.vertices()[0], Point2::new(1.0, -1.0));
    assert_eq!(mesh.vertices()[11], Point2::new(2.5, 0.0));
    // First cell, counter-clockwise.
    assert_eq!(mesh.connectivity()[0], Quad4d2Connectivity([0, 1, 5, 4]));
}

#[test]
fn unit_square_tri_mesh_splits_each_quad() {
    let quads = create_unit_square_uniform_quad_mesh_2d(4);
    let tris = create_unit_square_uniform_tri_mesh_2d(4);
    assert_eq!(tris.num_vertices(), quads.num_vertices());
    assert_eq!(tris.num_elements(), 2 * quads.num_elements());
}

#[test]
fn vertex_history_defaults_to_current_position() {
    let mut mesh = create_uniform_segment_mesh_1d(2, 0.0, 1.0);
    assert_eq!(mesh.num_history_levels(), 0);
    assert_eq!(*mesh.vertex_at_timestep(0, 1), Point1::new(0.5));

    mesh.set_vertex_history(vec![vec![
        Point1::new(0.1),
        Point1::new(0.6),
        Point1::new(1.1),
    ]]);
    assert_eq!(mesh.num_history_levels(), 1);
    assert_eq!(*mesh.vertex_at_timestep(0, 1), Point1::new(0.5));
    assert_eq!(*mesh.vertex_at_timestep(1, 1), Point1::new(0.6));
}

#[test]
#[should_panic]
fn vertex_history_past_depth_panics() {
    let mesh = create_uniform_segment_mesh_1d(2, 0.0, 1.0);
    mesh.vertex_at_timestep(1, 0);
}

#[test]
fn mesh_serde_round_trip() -> eyre::Result<()> {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d(2);
    mesh.set_node_field_values(vec![vec![1.0, 2.0]; mesh.num_vertices()]);
    mesh.set_node_masters(3, vec![(0, 0.5), (1, 0.5)]);

    let json = serde_json::to_string(&mesh)?;
    let recovered: QuadMesh2d = serde_json::from_str(&json)?;
    assert_eq!(recovered, mesh);
    Ok(())
}
