//! Multi-domain interaction support for partitioned finite element meshes.
//!
//! The crate treats a mesh as a geometric object that can be queried by
//! coordinates: [`view::MeshAsGeometry`] locates the element containing a
//! given point through a [`spatial_index::SpatialIndex`], and
//! [`search::locate_coupling_points`] extends the query to a group of
//! partitions connected by a [`comm::Communicator`], building external
//! element proxies through [`halo::ExternalElementBinder`] for points that
//! land on other partitions.

pub mod comm;
pub mod connectivity;
pub mod element;
pub mod error;
pub mod geometry;
pub mod halo;
pub mod mesh;
pub mod pack;
pub mod search;
pub mod spatial_index;
pub mod view;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
