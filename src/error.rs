//! Error taxonomy for coupling setup.
//!
//! Fatal errors (configuration, caller contract violations, broken
//! communication) are surfaced through [`MultiDomainError`] and abort the
//! whole coupling setup. Per-point location failures are *not* errors: they
//! are collected and reported in bulk by the search (see
//! [`CouplingResolution`](crate::search::CouplingResolution)), so that the
//! caller sees the complete set of unresolved points in one pass.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// A fatal error raised during construction or execution of a coupling setup.
#[derive(Debug)]
pub enum MultiDomainError {
    /// Malformed configuration, detected before any search begins.
    Configuration(ConfigurationError),
    /// A mesh element cannot be treated as a geometric element
    /// (e.g. its connectivity references vertices out of bounds).
    /// This indicates a caller contract violation.
    ElementCast { element_index: usize },
    /// A communication step failed or produced a malformed message.
    Comm(CommError),
}

impl Display for MultiDomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            MultiDomainError::Configuration(err) => {
                write!(f, "invalid configuration: {}", err)
            }
            MultiDomainError::ElementCast { element_index } => {
                write!(
                    f,
                    "element {} cannot be represented as a geometric element",
                    element_index
                )
            }
            MultiDomainError::Comm(err) => {
                write!(f, "communication failure: {}", err)
            }
        }
    }
}

impl Error for MultiDomainError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MultiDomainError::Configuration(err) => Some(err),
            MultiDomainError::Comm(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for MultiDomainError {
    fn from(err: ConfigurationError) -> Self {
        MultiDomainError::Configuration(err)
    }
}

impl From<CommError> for MultiDomainError {
    fn from(err: CommError) -> Self {
        MultiDomainError::Comm(err)
    }
}

/// Invalid parameters supplied to the spatial index or the mesh view.
///
/// These are raised immediately at construction, before any search begins.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A bin count along some axis is zero.
    EmptyBinAxis { axis: usize },
    /// The per-element sample point density is zero.
    ZeroSampleDensity,
    /// The spiral chunk size is zero, so the search could never make progress.
    ZeroSpiralChunk,
    /// The padding fraction is negative or not finite.
    InvalidPadding { padding: f64 },
    /// A user-supplied bounding box has `min > max` along some axis.
    InvertedBounds { axis: usize },
    /// The adaptive backend was configured with a zero bin capacity.
    ZeroBinCapacity,
    /// Partitions could not agree on the mesh dimensions: this partition's
    /// non-empty mesh reports a dimension different from the max-reduced one.
    DimensionMismatch { local: usize, reduced: usize },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConfigurationError::EmptyBinAxis { axis } => {
                write!(f, "number of bins along axis {} is zero", axis)
            }
            ConfigurationError::ZeroSampleDensity => {
                write!(f, "per-element sample point density is zero")
            }
            ConfigurationError::ZeroSpiralChunk => {
                write!(f, "spiral chunk size is zero")
            }
            ConfigurationError::InvalidPadding { padding } => {
                write!(f, "padding fraction {} is negative or not finite", padding)
            }
            ConfigurationError::InvertedBounds { axis } => {
                write!(f, "bounding box has min > max along axis {}", axis)
            }
            ConfigurationError::ZeroBinCapacity => {
                write!(f, "adaptive bin capacity is zero")
            }
            ConfigurationError::DimensionMismatch { local, reduced } => {
                write!(
                    f,
                    "local mesh dimension {} disagrees with max-reduced dimension {}",
                    local, reduced
                )
            }
        }
    }
}

impl Error for ConfigurationError {}

/// Failure at a point-to-point or collective communication step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// The peer's end of the channel has been dropped.
    Disconnected { peer: usize },
    /// There is no partition with the given rank.
    NoSuchPeer { rank: usize },
    /// A message of one payload type arrived where another was expected.
    PayloadMismatch { from: usize },
    /// A flat-packed message ended before all expected entries were read.
    TruncatedMessage,
    /// A message referenced a remote element that was never bound on this
    /// partition, or carried an unknown status code.
    ProtocolViolation,
}

impl Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            CommError::Disconnected { peer } => {
                write!(f, "partition {} has disconnected", peer)
            }
            CommError::NoSuchPeer { rank } => {
                write!(f, "no partition with rank {}", rank)
            }
            CommError::PayloadMismatch { from } => {
                write!(f, "unexpected payload type in message from partition {}", from)
            }
            CommError::TruncatedMessage => {
                write!(f, "flat-packed message ended prematurely")
            }
            CommError::ProtocolViolation => {
                write!(f, "malformed located-element message")
            }
        }
    }
}

impl Error for CommError {}
