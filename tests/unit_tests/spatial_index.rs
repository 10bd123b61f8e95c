use multidomain::connectivity::ElementConnectivity;
use multidomain::error::ConfigurationError;
use multidomain::geometry::AxisAlignedBoundingBox;
use multidomain::mesh::procedural::{create_uniform_segment_mesh_1d, create_unit_square_uniform_quad_mesh_2d};
use multidomain::spatial_index::{BinParameters, IndexBackend, IndexParameters, SpatialIndex};
use nalgebra::{Point1, Point2, Vector2};

fn unit_square_elements(cells_per_dim: usize) -> Vec<multidomain::element::Quad4d2Element> {
    let mesh = create_unit_square_uniform_quad_mesh_2d(cells_per_dim);
    mesh.connectivity()
        .iter()
        .map(|conn| conn.element(mesh.vertices()).unwrap())
        .collect()
}

#[test]
fn validation_rejects_malformed_parameters() {
    let cases: Vec<(IndexParameters<2>, ConfigurationError)> = vec![
        (
            IndexParameters {
                bin: BinParameters {
                    bins_per_axis: [10, 0],
                    ..Default::default()
                },
                ..Default::default()
            },
            ConfigurationError::EmptyBinAxis { axis: 1 },
        ),
        (
            IndexParameters {
                bin: BinParameters {
                    sample_density: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            ConfigurationError::ZeroSampleDensity,
        ),
        (
            IndexParameters {
                bin: BinParameters {
                    spiral_chunk_size: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            ConfigurationError::ZeroSpiralChunk,
        ),
        (
            IndexParameters {
                bin: BinParameters {
                    padding_fraction: -0.1,
                    ..Default::default()
                },
                ..Default::default()
            },
            ConfigurationError::InvalidPadding { padding: -0.1 },
        ),
        (
            IndexParameters {
                bin: BinParameters {
                    bounds: Some(AxisAlignedBoundingBox::new(
                        Vector2::new(1.0, 0.0),
                        Vector2::new(0.0, 1.0),
                    )),
                    ..Default::default()
                },
                ..Default::default()
            },
            ConfigurationError::InvertedBounds { axis: 0 },
        ),
        (
            IndexParameters {
                bin: BinParameters {
                    bin_capacity: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            ConfigurationError::ZeroBinCapacity,
        ),
    ];

    for (params, expected) in cases {
        let elements = unit_square_elements(2);
        let err = SpatialIndex::build(&elements, &params).unwrap_err();
        assert_eq!(err, expected);
    }
}

#[test]
fn empty_element_set_yields_no_candidates() {
    let elements: Vec<multidomain::element::Quad4d2Element> = Vec::new();
    let index = SpatialIndex::<2>::build(&elements, &IndexParameters::default()).unwrap();
    assert!(index.bounds().is_none());
    let mut candidates = Vec::new();
    index.candidates_for_point(&Point2::new(0.5, 0.5), &mut candidates);
    assert!(candidates.is_empty());
}

#[test]
fn auto_bounds_pad_the_mesh_extents() {
    let elements = unit_square_elements(4);
    let index = SpatialIndex::build(&elements, &IndexParameters::default()).unwrap();
    let bounds = index.bounds().unwrap();
    assert!(bounds.min().x < 0.0 && bounds.min().y < 0.0);
    assert!(bounds.max().x > 1.0 && bounds.max().y > 1.0);
    assert!(bounds.min().x > -0.1 && bounds.max().x < 1.1);
}

/// Each backend must return a candidate set containing the element that
/// actually holds the query point.
#[test]
fn all_backends_cover_the_containing_element() {
    let cells = 5;
    let elements = unit_square_elements(cells);

    // Query deep inside each cell, where the containing element is
    // unambiguous.
    let h = 1.0 / cells as f64;
    let mut queries = Vec::new();
    for j in 0..cells {
        for i in 0..cells {
            let containing = j * cells + i;
            queries.push((
                Point2::new((i as f64 + 0.5) * h, (j as f64 + 0.5) * h),
                containing,
            ));
        }
    }

    for backend in [
        IndexBackend::UniformBins,
        IndexBackend::AdaptiveBins,
        IndexBackend::RTree,
    ] {
        let params = IndexParameters {
            backend,
            ..Default::default()
        };
        let index = SpatialIndex::build(&elements, &params).unwrap();
        let mut candidates = Vec::new();
        for (point, containing) in &queries {
            candidates.clear();
            index.candidates_for_point(point, &mut candidates);
            assert!(
                candidates.contains(containing),
                "backend {:?} missed element {} for {:?}",
                backend,
                containing,
                point
            );
        }
    }
}

#[test]
fn candidate_sets_contain_no_duplicates() {
    let elements = unit_square_elements(4);
    for backend in [
        IndexBackend::UniformBins,
        IndexBackend::AdaptiveBins,
        IndexBackend::RTree,
    ] {
        let params = IndexParameters {
            backend,
            ..Default::default()
        };
        let index = SpatialIndex::build(&elements, &params).unwrap();
        let mut candidates = Vec::new();
        index.candidates_for_point(&Point2::new(0.5, 0.5), &mut candidates);
        let mut deduped = candidates.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), candidates.len());
    }
}

/// A tiny bin capacity must force the adaptive backend to subdivide without
/// losing any elements.
#[test]
fn adaptive_backend_subdivides_under_small_capacity() {
    let elements = unit_square_elements(8);
    let params = IndexParameters {
        backend: IndexBackend::AdaptiveBins,
        bin: BinParameters {
            bins_per_axis: [1, 1],
            bin_capacity: 2,
            max_refinement_depth: 6,
            ..Default::default()
        },
    };
    let index = SpatialIndex::build(&elements, &params).unwrap();
    let h = 1.0 / 8.0;
    let mut candidates = Vec::new();
    for j in 0..8 {
        for i in 0..8 {
            candidates.clear();
            let point = Point2::new((i as f64 + 0.5) * h, (j as f64 + 0.5) * h);
            index.candidates_for_point(&point, &mut candidates);
            assert!(candidates.contains(&(j * 8 + i)));
        }
    }
}

/// `rstar` only implements its point trait for fixed-size arrays of two or
/// more dimensions, so a one-dimensional mesh exercises the adapter.
#[test]
fn rtree_backend_handles_one_dimensional_meshes() {
    let mesh = create_uniform_segment_mesh_1d(4, 0.0, 2.0);
    let elements: Vec<multidomain::element::SegmentElement> = mesh
        .connectivity()
        .iter()
        .map(|conn| conn.element(mesh.vertices()).unwrap())
        .collect();
    let params = IndexParameters {
        backend: IndexBackend::RTree,
        ..Default::default()
    };
    let index = SpatialIndex::build(&elements, &params).unwrap();
    let mut candidates = Vec::new();
    index.candidates_for_point(&Point1::new(1.25), &mut candidates);
    // [1.0, 1.5] is the third segment.
    assert!(candidates.contains(&2));
}

#[test]
fn spiral_chunk_size_bounds_each_search_round() {
    let elements = unit_square_elements(6);
    // Well outside the binned region, so the spiral has to expand from the
    // clamped edge cell across the grid.
    let far_query = Point2::new(4.0, 0.5);

    let index_with_chunk = |chunk: usize| {
        let params = IndexParameters {
            bin: BinParameters {
                spiral_chunk_size: chunk,
                ..Default::default()
            },
            ..Default::default()
        };
        SpatialIndex::build(&elements, &params).unwrap()
    };

    // A chunk covering the whole grid presents every element in one round.
    let coarse = index_with_chunk(100);
    let mut round_sizes = Vec::new();
    coarse.search_chunked(&far_query, |batch| {
        round_sizes.push(batch.len());
        None::<()>
    });
    assert_eq!(round_sizes, vec![elements.len()]);

    // Single-shell rounds reach the same elements over several rounds.
    let fine = index_with_chunk(1);
    let mut round_sizes = Vec::new();
    fine.search_chunked(&far_query, |batch| {
        round_sizes.push(batch.len());
        None::<()>
    });
    assert!(round_sizes.len() > 1);
    assert_eq!(round_sizes.iter().sum::<usize>(), elements.len());

    // A satisfied round stops the spiral before the rest of the grid is
    // visited.
    let mut tested = 0;
    let found = fine.search_chunked(&far_query, |batch| {
        tested += batch.len();
        Some(batch[0])
    });
    assert!(found.is_some());
    assert!(tested < elements.len());
}

#[test]
fn queries_outside_the_bounds_spiral_to_nearby_elements() {
    let elements = unit_square_elements(3);
    let index = SpatialIndex::build(&elements, &IndexParameters::default()).unwrap();
    let mut candidates = Vec::new();
    index.candidates_for_point(&Point2::new(1.5, 0.5), &mut candidates);
    // The nearest column of cells must be among the candidates.
    assert!(candidates.contains(&5));
}
