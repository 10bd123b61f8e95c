//! Distributed-process abstraction.
//!
//! The search is expressed purely through message-passing rounds between a
//! fixed set of cooperating partitions, each single-threaded internally. The
//! [`Communicator`] trait is the seam towards the parallel runtime: it only
//! requires rank/size information, blocking point-to-point transfers of
//! `f64`/`u64` payloads, and a max all-reduce. [`SerialComm`] covers the
//! single-partition case; [`channel_comm_group`] wires up an in-process
//! group over channels, used by multi-partition tests and embedded runs.

use crate::error::CommError;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Blocking point-to-point and collective communication between partitions.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn num_partitions(&self) -> usize;

    /// Rank of the next partition on the ring.
    fn next_rank(&self) -> usize {
        (self.rank() + 1) % self.num_partitions()
    }

    /// Rank of the previous partition on the ring.
    fn previous_rank(&self) -> usize {
        (self.rank() + self.num_partitions() - 1) % self.num_partitions()
    }

    fn send_doubles(&self, to: usize, payload: Vec<f64>) -> Result<(), CommError>;

    /// Blocks until a `f64` payload from the given partition arrives.
    fn recv_doubles(&self, from: usize) -> Result<Vec<f64>, CommError>;

    fn send_indices(&self, to: usize, payload: Vec<u64>) -> Result<(), CommError>;

    /// Blocks until a `u64` payload from the given partition arrives.
    fn recv_indices(&self, from: usize) -> Result<Vec<u64>, CommError>;

    /// Element-wise maximum of `values` over all partitions. Collective:
    /// every partition must call this with a slice of the same length.
    fn all_reduce_max(&self, values: &[u64]) -> Result<Vec<u64>, CommError>;
}

/// The degenerate single-partition communicator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn num_partitions(&self) -> usize {
        1
    }

    fn send_doubles(&self, to: usize, _payload: Vec<f64>) -> Result<(), CommError> {
        Err(CommError::NoSuchPeer { rank: to })
    }

    fn recv_doubles(&self, from: usize) -> Result<Vec<f64>, CommError> {
        Err(CommError::NoSuchPeer { rank: from })
    }

    fn send_indices(&self, to: usize, _payload: Vec<u64>) -> Result<(), CommError> {
        Err(CommError::NoSuchPeer { rank: to })
    }

    fn recv_indices(&self, from: usize) -> Result<Vec<u64>, CommError> {
        Err(CommError::NoSuchPeer { rank: from })
    }

    fn all_reduce_max(&self, values: &[u64]) -> Result<Vec<u64>, CommError> {
        Ok(values.to_vec())
    }
}

enum Payload {
    Doubles(Vec<f64>),
    Indices(Vec<u64>),
}

/// One partition's endpoint of an in-process communicator group.
///
/// Sends are buffered and never block; receives block until the matching
/// send has happened. Messages between a given pair of partitions arrive in
/// the order they were sent, which is all the strictly sequenced ring search
/// requires.
pub struct ChannelComm {
    rank: usize,
    senders: Vec<Sender<Payload>>,
    receivers: Vec<Receiver<Payload>>,
}

/// Creates a fully connected group of `num_partitions` in-process
/// communicators. The returned endpoints are meant to be moved onto one
/// thread (or task) per partition.
pub fn channel_comm_group(num_partitions: usize) -> Vec<ChannelComm> {
    assert!(num_partitions > 0);
    // senders[from][to] feeds receivers[to][from]
    let mut senders: Vec<Vec<Sender<Payload>>> = (0..num_partitions).map(|_| Vec::new()).collect();
    let mut receivers: Vec<Vec<Receiver<Payload>>> = (0..num_partitions).map(|_| Vec::new()).collect();
    for to in 0..num_partitions {
        for from in 0..num_partitions {
            let (sender, receiver) = channel();
            senders[from].push(sender);
            receivers[to].push(receiver);
        }
    }
    senders
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(rank, (senders, receivers))| ChannelComm {
            rank,
            senders,
            receivers,
        })
        .collect()
}

impl ChannelComm {
    fn send(&self, to: usize, payload: Payload) -> Result<(), CommError> {
        let sender = self.senders.get(to).ok_or(CommError::NoSuchPeer { rank: to })?;
        sender.send(payload).map_err(|_| CommError::Disconnected { peer: to })
    }

    fn recv(&self, from: usize) -> Result<Payload, CommError> {
        let receiver = self
            .receivers
            .get(from)
            .ok_or(CommError::NoSuchPeer { rank: from })?;
        receiver.recv().map_err(|_| CommError::Disconnected { peer: from })
    }
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_partitions(&self) -> usize {
        self.senders.len()
    }

    fn send_doubles(&self, to: usize, payload: Vec<f64>) -> Result<(), CommError> {
        self.send(to, Payload::Doubles(payload))
    }

    fn recv_doubles(&self, from: usize) -> Result<Vec<f64>, CommError> {
        match self.recv(from)? {
            Payload::Doubles(payload) => Ok(payload),
            Payload::Indices(_) => Err(CommError::PayloadMismatch { from }),
        }
    }

    fn send_indices(&self, to: usize, payload: Vec<u64>) -> Result<(), CommError> {
        self.send(to, Payload::Indices(payload))
    }

    fn recv_indices(&self, from: usize) -> Result<Vec<u64>, CommError> {
        match self.recv(from)? {
            Payload::Indices(payload) => Ok(payload),
            Payload::Doubles(_) => Err(CommError::PayloadMismatch { from }),
        }
    }

    fn all_reduce_max(&self, values: &[u64]) -> Result<Vec<u64>, CommError> {
        // Buffered sends cannot deadlock, so broadcast first, then gather.
        for peer in 0..self.num_partitions() {
            if peer != self.rank {
                self.send_indices(peer, values.to_vec())?;
            }
        }
        let mut reduced = values.to_vec();
        for peer in 0..self.num_partitions() {
            if peer != self.rank {
                let received = self.recv_indices(peer)?;
                if received.len() != reduced.len() {
                    return Err(CommError::TruncatedMessage);
                }
                for (r, v) in reduced.iter_mut().zip(received) {
                    *r = (*r).max(v);
                }
            }
        }
        Ok(reduced)
    }
}
