//! Halo-exchange engine: posts and tracks non-blocking sends/receives for a
//! single named field across the send/receive lists, with a blocking
//! wait-all that fills ghost payloads and releases transport state.
//!
//! The wire descriptor of a round ([`FieldLayout`]) is a per-call parameter,
//! but only one round may be in flight at a time; callers serialize rounds
//! through [`HaloExchange::wait_all`].

use std::collections::BTreeMap;
use std::fmt;

use bytemuck::{Pod, Zeroable};
use log::{debug, trace};
use static_assertions::const_assert_eq;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::exchange::ExchangeLists;
use crate::grid_error::GridError;
use crate::topology::{Cell, CellId};

/// Identifier of one named field of the user payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u32);

impl FieldId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        FieldId(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static wire descriptor of one field: `count` elements of `elem_size`
/// bytes each, stored contiguously.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub count: usize,
    pub elem_size: usize,
}

impl FieldLayout {
    /// Layout of `count` contiguous elements of type `T`.
    pub const fn of<T>(count: usize) -> Self {
        Self {
            count,
            elem_size: std::mem::size_of::<T>(),
        }
    }

    #[inline]
    pub const fn byte_len(self) -> usize {
        self.count * self.elem_size
    }
}

/// Contract the user payload must satisfy so the engine can move fields
/// without knowing their types: a static layout per named field and the
/// in-memory buffer backing it.
pub trait CellPayload: Default + Send + 'static {
    /// Wire descriptor for `field`, or `None` if the payload has no such field.
    fn layout(field: FieldId) -> Option<FieldLayout>;
    /// Read view of the field buffer, `byte_len()` bytes.
    fn field_bytes(&self, field: FieldId) -> Option<&[u8]>;
    /// Write view of the field buffer, `byte_len()` bytes.
    fn field_bytes_mut(&mut self, field: FieldId) -> Option<&mut [u8]>;
}

/// Fixed wire record for the ghost metadata round: base-grid indices and the
/// cell-corner coordinates of one cell.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CellMeta {
    pub indices: [u32; 3],
    _pad: u32,
    pub corner: [f64; 3],
}

const_assert_eq!(std::mem::size_of::<CellMeta>(), 40);

impl CellMeta {
    pub fn new(indices: [u32; 3], corner: [f64; 3]) -> Self {
        Self {
            indices,
            _pad: 0,
            corner,
        }
    }
}

/// Non-blocking halo round tracker for one communicator.
pub struct HaloExchange<C: Communicator> {
    pending_recv: Vec<(CellId, usize, C::RecvHandle)>,
    pending_send: Vec<C::SendHandle>,
    in_flight: Option<(FieldId, FieldLayout)>,
}

impl<C: Communicator> Default for HaloExchange<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Communicator> HaloExchange<C> {
    pub fn new() -> Self {
        Self {
            pending_recv: Vec::new(),
            pending_send: Vec::new(),
            in_flight: None,
        }
    }

    /// True when no round is in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Post one receive per receive-list entry and one send per send-list
    /// entry for `field`, tagged by the cell's global id salted with `epoch`.
    ///
    /// Posting continues past per-entry failures (missing cells, unallocated
    /// payloads); the aggregate result reports the first one. A round is in
    /// flight after this call either way, so `wait_all` must still be called.
    pub fn start<P: CellPayload>(
        &mut self,
        comm: &C,
        field: FieldId,
        lists: &ExchangeLists,
        local: &BTreeMap<CellId, Cell<P>>,
        epoch: u32,
    ) -> Result<(), GridError> {
        if let Some((active, _)) = self.in_flight {
            return Err(GridError::ExchangeInFlight { active });
        }
        let layout = P::layout(field).ok_or(GridError::UnknownField(field))?;
        debug!(
            "rank {}: halo round for field {field} ({} recvs, {} sends, {} B/cell)",
            comm.rank(),
            lists.recv_len(),
            lists.send_len(),
            layout.byte_len()
        );

        for (id, src) in lists.recv_iter() {
            let handle = comm.irecv(src, CommTag::for_cell(epoch, id), layout.byte_len());
            self.pending_recv.push((id, src, handle));
        }

        let mut first_err = None;
        for (id, dest) in lists.send_iter() {
            let bytes = match local.get(&id) {
                Some(cell) => match &cell.payload {
                    Some(payload) => payload.field_bytes(field),
                    None => {
                        first_err.get_or_insert(GridError::PayloadUnallocated(id));
                        continue;
                    }
                },
                None => {
                    first_err.get_or_insert(GridError::MissingCell(id));
                    continue;
                }
            };
            let Some(bytes) = bytes else {
                first_err.get_or_insert(GridError::UnknownField(field));
                continue;
            };
            trace!("rank {}: send cell {id} -> rank {dest}", comm.rank());
            self.pending_send
                .push(comm.isend(dest, CommTag::for_cell(epoch, id), bytes));
        }

        self.in_flight = Some((field, layout));
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Block until every posted receive completes, verify lengths, copy each
    /// message into the ghost cell's field buffer, and release all transport
    /// state. Sends of the round are drained as well.
    pub fn wait_all<P: CellPayload>(
        &mut self,
        remote: &mut BTreeMap<CellId, Cell<P>>,
    ) -> Result<(), GridError> {
        let (field, layout) = self.in_flight.take().ok_or(GridError::NoExchangeInFlight)?;
        let mut first_err = None;

        for (id, src, handle) in self.pending_recv.drain(..) {
            let Some(data) = handle.wait() else {
                first_err.get_or_insert(GridError::CommError {
                    neighbor: src,
                    detail: format!("receive for cell {id} yielded no data"),
                });
                continue;
            };
            if data.len() != layout.byte_len() {
                first_err.get_or_insert(GridError::WireSizeMismatch {
                    cell: id,
                    expected: layout.byte_len(),
                    got: data.len(),
                });
                continue;
            }
            let slot = remote
                .get_mut(&id)
                .and_then(|cell| cell.payload.as_mut())
                .and_then(|p| p.field_bytes_mut(field));
            match slot {
                Some(buf) => buf.copy_from_slice(&data),
                None => {
                    first_err.get_or_insert(GridError::MissingCell(id));
                }
            }
        }
        for s in self.pending_send.drain(..) {
            let _ = s.wait();
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
