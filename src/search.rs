//! Distributed zeta (coupling-point) search over a ring of partitions.
//!
//! Every partition holds a batch of query points that must be matched
//! against elements that may live on any partition. Resolution proceeds in
//! phases: each partition first searches its own mesh, then the still
//! unresolved zeta batch travels one hop around the ring per step. The
//! partition that receives a travel batch searches its local mesh, sends
//! the located payloads point-to-point back to the batch's origin, and
//! forwards whatever it could not locate to the next rank. After
//! `num_partitions - 1` steps every batch has visited every partition, so
//! any query still unresolved cannot be located anywhere and is reported in
//! bulk.

use crate::comm::Communicator;
use crate::connectivity::ElementConnectivity;
use crate::error::MultiDomainError;
use crate::halo::{encode_located_element, encode_not_found, ExternalElementBinder};
use crate::pack::{PackedDoubles, PackedIndices};
use crate::view::MeshAsGeometry;
use log::{debug, trace};
use nalgebra::{Point, SVector};
use rustc_hash::FxHashSet;

/// Phase of the per-partition search state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    LocalSearch,
    Exchange,
    RemoteSearch,
    Merge,
    Done,
}

/// Resolution of a single query point.
#[derive(Debug, Clone, PartialEq)]
pub enum PointLocation<const D: usize> {
    /// Contained in an element of this partition's own mesh.
    Local {
        element: usize,
        local_coords: Point<f64, D>,
    },
    /// Contained in an element of another partition, materialized here as a
    /// halo proxy.
    External {
        halo_element: usize,
        owner: usize,
        local_coords: Point<f64, D>,
    },
    /// Not contained in any element on any partition.
    Unresolved,
}

/// Outcome of [`locate_coupling_points`]: one location per query, the halo
/// proxies built along the way, and the unresolved queries in bulk.
#[derive(Debug)]
pub struct CouplingResolution<const D: usize> {
    pub locations: Vec<PointLocation<D>>,
    pub binder: ExternalElementBinder<D>,
    /// Query indices that no partition could locate.
    pub unresolved: Vec<usize>,
}

/// All mutable state of one partition's search, passed explicitly through
/// the phases. Owns the per-destination export registry, the halo binder,
/// and the bookkeeping that ties traveling zeta batches back to query
/// indices.
struct SearchContext<const D: usize> {
    rank: usize,
    phase: SearchPhase,
    locations: Vec<PointLocation<D>>,
    binder: ExternalElementBinder<D>,
    /// Elements already shipped, keyed by (destination rank, element index).
    exported: FxHashSet<(usize, usize)>,
    /// Indices of our own queries still traveling the ring, in batch order.
    own_queries: Vec<usize>,
    /// The flat-packed zeta batch this rank forwards next step. At step one
    /// it is our own unresolved batch; afterwards it is whatever part of
    /// the incoming batch we could not locate, relayed onward.
    travel: Vec<f64>,
}

impl<const D: usize> SearchContext<D> {
    fn new(rank: usize, num_queries: usize) -> Self {
        Self {
            rank,
            phase: SearchPhase::LocalSearch,
            locations: vec![PointLocation::Unresolved; num_queries],
            binder: ExternalElementBinder::new(),
            exported: FxHashSet::default(),
            own_queries: Vec::new(),
            travel: Vec::new(),
        }
    }

    fn enter(&mut self, phase: SearchPhase) {
        self.phase = phase;
        trace!("rank {}: phase {:?}", self.rank, phase);
    }

    fn local_search<C>(&mut self, view: &MeshAsGeometry<'_, D, C>, queries: &[Point<f64, D>])
    where
        C: ElementConnectivity<D>,
    {
        self.enter(SearchPhase::LocalSearch);
        for (q, zeta) in queries.iter().enumerate() {
            match view.locate_zeta(zeta) {
                Some((element, local_coords)) => {
                    self.locations[q] = PointLocation::Local {
                        element,
                        local_coords,
                    };
                }
                None => self.own_queries.push(q),
            }
        }
        debug!(
            "rank {}: local search resolved {} of {} queries",
            self.rank,
            queries.len() - self.own_queries.len(),
            queries.len()
        );
        self.travel = flatten_zetas(&self.own_queries, queries);
    }

    /// Forwards our travel batch one hop and receives the batch that is due
    /// here this step.
    fn exchange(&mut self, comm: &impl Communicator) -> Result<Vec<f64>, MultiDomainError> {
        self.enter(SearchPhase::Exchange);
        comm.send_doubles(comm.next_rank(), std::mem::take(&mut self.travel))?;
        Ok(comm.recv_doubles(comm.previous_rank())?)
    }

    /// Searches the incoming batch against the local mesh and answers its
    /// origin point-to-point. Whatever was not located becomes the next
    /// travel batch.
    fn remote_search<C>(
        &mut self,
        comm: &impl Communicator,
        view: &MeshAsGeometry<'_, D, C>,
        incoming: &[f64],
        origin: usize,
    ) -> Result<(), MultiDomainError>
    where
        C: ElementConnectivity<D>,
    {
        self.enter(SearchPhase::RemoteSearch);
        let mut located_indices = PackedIndices::new();
        let mut located_doubles = PackedDoubles::new();
        let mut still_unresolved = Vec::new();
        for zeta_flat in incoming.chunks_exact(D) {
            let zeta = Point::from(SVector::<f64, D>::from_column_slice(zeta_flat));
            match view.locate_zeta(&zeta) {
                Some((element, local_coords)) => {
                    encode_located_element(
                        view.mesh(),
                        element,
                        &local_coords,
                        origin,
                        &mut self.exported,
                        &mut located_indices,
                        &mut located_doubles,
                    );
                }
                None => {
                    encode_not_found(&mut located_indices);
                    still_unresolved.extend_from_slice(zeta_flat);
                }
            }
        }
        comm.send_indices(origin, located_indices.into_vec())?;
        comm.send_doubles(origin, located_doubles.into_vec())?;
        self.travel = still_unresolved;
        Ok(())
    }

    /// Receives the answers for our own batch from the rank currently
    /// holding it and binds located elements into halo proxies.
    fn merge(&mut self, comm: &impl Communicator, holder: usize) -> Result<(), MultiDomainError> {
        self.enter(SearchPhase::Merge);
        let mut answer_indices = PackedIndices::from_vec(comm.recv_indices(holder)?);
        let mut answer_doubles = PackedDoubles::from_vec(comm.recv_doubles(holder)?);
        let mut remaining = Vec::new();
        for &q in &self.own_queries {
            match self
                .binder
                .bind_next(holder, &mut answer_indices, &mut answer_doubles)?
            {
                Some((halo_element, local_coords)) => {
                    self.locations[q] = PointLocation::External {
                        halo_element,
                        owner: holder,
                        local_coords,
                    };
                }
                None => remaining.push(q),
            }
        }
        debug!(
            "rank {}: resolved {} queries on rank {}",
            self.rank,
            self.own_queries.len() - remaining.len(),
            holder
        );
        // The holder drops located queries from the batch before forwarding
        // it, so the pending indices shrink in lockstep with the batch.
        self.own_queries = remaining;
        Ok(())
    }

    fn finish(mut self) -> CouplingResolution<D> {
        self.enter(SearchPhase::Done);
        let unresolved: Vec<_> = self
            .locations
            .iter()
            .enumerate()
            .filter_map(|(q, loc)| matches!(loc, PointLocation::Unresolved).then_some(q))
            .collect();
        if !unresolved.is_empty() {
            debug!(
                "rank {}: {} queries unresolved after full ring traversal",
                self.rank,
                unresolved.len()
            );
        }
        CouplingResolution {
            locations: self.locations,
            binder: self.binder,
            unresolved,
        }
    }
}

fn flatten_zetas<const D: usize>(queries: &[usize], zeta: &[Point<f64, D>]) -> Vec<f64> {
    let mut flat = Vec::with_capacity(queries.len() * D);
    for &q in queries {
        flat.extend_from_slice(zeta[q].coords.as_slice());
    }
    flat
}

/// Locates every query point in the union of all partitions' meshes.
///
/// On a single partition this degenerates to a plain local search. With
/// multiple partitions, every rank must call this collectively with its own
/// query batch; the ring exchange runs in lockstep, with empty messages
/// keeping the schedule aligned when a partition has nothing left to send.
pub fn locate_coupling_points<const D: usize, C>(
    comm: &impl Communicator,
    view: &MeshAsGeometry<'_, D, C>,
    queries: &[Point<f64, D>],
) -> Result<CouplingResolution<D>, MultiDomainError>
where
    C: ElementConnectivity<D>,
{
    let num_partitions = comm.num_partitions();
    let mut context = SearchContext::new(comm.rank(), queries.len());

    context.local_search(view, queries);

    for step in 1..num_partitions {
        // The batch received this step originated `step` hops back; our own
        // batch is currently held `step` hops ahead.
        let origin = (comm.rank() + num_partitions - step) % num_partitions;
        let holder = (comm.rank() + step) % num_partitions;

        let incoming = context.exchange(comm)?;
        context.remote_search(comm, view, &incoming, origin)?;
        context.merge(comm, holder)?;
    }

    Ok(context.finish())
}
