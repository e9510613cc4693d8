//! Error types for grid construction, partitioning, and halo exchange.

use thiserror::Error;

use crate::algs::halo::FieldId;
use crate::partition::Strategy;
use crate::topology::CellId;

/// Error type for all fallible grid operations.
#[derive(Debug, Error)]
pub enum GridError {
    /// Grid geometry rejected at construction.
    #[error("invalid grid geometry {dims:?}: {reason}")]
    InvalidGeometry {
        dims: [u32; 3],
        reason: &'static str,
    },

    /// A live cell has no owner recorded in the directory.
    #[error("directory has no owner for cell {0}")]
    DirectoryMiss(CellId),

    /// The directory does not cover the whole domain.
    #[error("directory covers {got} of {expected} cells")]
    DirectoryIncomplete { expected: u64, got: u64 },

    /// The payload type has no field with this id.
    #[error("payload has no field {0}")]
    UnknownField(FieldId),

    /// A cell expected in the local store is absent.
    #[error("cell {0} not found in local store")]
    MissingCell(CellId),

    /// A cell's payload was used before allocation.
    #[error("payload of cell {0} is not allocated")]
    PayloadUnallocated(CellId),

    /// A halo round was started while another is still in flight.
    #[error("exchange for field {active} still in flight")]
    ExchangeInFlight { active: FieldId },

    /// Wait was called with no round in flight.
    #[error("no exchange in flight")]
    NoExchangeInFlight,

    /// A received message does not match the field's wire size.
    #[error("cell {cell}: expected {expected} bytes on the wire, got {got}")]
    WireSizeMismatch {
        cell: CellId,
        expected: usize,
        got: usize,
    },

    /// A point-to-point or collective operation failed.
    #[error("communication error with rank {neighbor}: {detail}")]
    CommError { neighbor: usize, detail: String },

    /// Local and ghost stores disagree with the exchange lists.
    #[error("store inconsistency: {0}")]
    StoreMismatch(String),

    /// The partitioning backend rejected its input.
    #[error("{strategy} partitioning failed: {reason}")]
    Partition { strategy: Strategy, reason: String },
}
