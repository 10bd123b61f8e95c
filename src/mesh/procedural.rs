//! Procedural mesh generation for simple domains.

use crate::connectivity::{Quad4d2Connectivity, Segment2d1Connectivity, Tri3d2Connectivity};
use crate::mesh::{QuadMesh2d, SegmentMesh1d, TriangleMesh2d};
use nalgebra::{Point1, Point2};

/// Creates a uniform mesh of `cells` segment elements spanning `[a, b]`.
pub fn create_uniform_segment_mesh_1d(cells: usize, a: f64, b: f64) -> SegmentMesh1d {
    assert!(cells > 0, "mesh must have at least one cell");
    assert!(b > a);
    let h = (b - a) / cells as f64;
    let vertices = (0..=cells).map(|i| Point1::new(a + i as f64 * h)).collect();
    let connectivity = (0..cells).map(|i| Segment2d1Connectivity([i, i + 1])).collect();
    SegmentMesh1d::from_vertices_and_connectivity(vertices, connectivity)
}

/// Creates a uniform quadrilateral mesh of the unit square `[0, 1]^2`
/// with `cells_per_dim` cells along each axis.
pub fn create_unit_square_uniform_quad_mesh_2d(cells_per_dim: usize) -> QuadMesh2d {
    create_rectangular_uniform_quad_mesh_2d(cells_per_dim, cells_per_dim, &Point2::new(0.0, 0.0), 1.0 / cells_per_dim as f64)
}

/// Creates a uniform quadrilateral mesh of a rectangle with lower-left
/// corner `origin`, `nx` by `ny` cells of side length `h`.
pub fn create_rectangular_uniform_quad_mesh_2d(
    nx: usize,
    ny: usize,
    origin: &Point2<f64>,
    h: f64,
) -> QuadMesh2d {
    assert!(nx > 0 && ny > 0, "mesh must have at least one cell");
    assert!(h > 0.0);

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push(Point2::new(
                origin.x + i as f64 * h,
                origin.y + j as f64 * h,
            ));
        }
    }

    // Counter-clockwise corner ordering, as expected by the quad element.
    let vertex_index = |i: usize, j: usize| j * (nx + 1) + i;
    let mut connectivity = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            connectivity.push(Quad4d2Connectivity([
                vertex_index(i, j),
                vertex_index(i + 1, j),
                vertex_index(i + 1, j + 1),
                vertex_index(i, j + 1),
            ]));
        }
    }

    QuadMesh2d::from_vertices_and_connectivity(vertices, connectivity)
}

/// Creates a uniform triangle mesh of the unit square, splitting each cell
/// of the corresponding quad mesh into two triangles.
pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> TriangleMesh2d {
    let quads = create_unit_square_uniform_quad_mesh_2d(cells_per_dim);
    let triangles = quads
        .connectivity()
        .iter()
        .flat_map(|Quad4d2Connectivity([a, b, c, d])| {
            [Tri3d2Connectivity([*a, *b, *c]), Tri3d2Connectivity([*a, *c, *d])]
        })
        .collect();
    TriangleMesh2d::from_vertices_and_connectivity(quads.vertices().to_vec(), triangles)
}
