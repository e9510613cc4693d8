//! Point-to-point all-gather used by the directory rebuild.
//!
//! Two stages, each with its own tag: every rank first exchanges the byte
//! count of its contribution with every peer, then the contributions
//! themselves. All handles are drained before returning, even on error, and
//! only the first failure is reported.

use bytemuck::{Pod, Zeroable};

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::grid_error::GridError;

/// Tags for the two stages of one all-gather epoch.
#[derive(Copy, Clone, Debug)]
pub struct GatherTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl GatherTags {
    /// Derive both stage tags from a collective epoch.
    pub fn for_epoch(epoch: u32) -> Self {
        Self {
            sizes: CommTag::collective(epoch, 0),
            data: CommTag::collective(epoch, 1),
        }
    }
}

#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct WireCount(u64);

/// Gather every rank's `payload` onto every rank.
///
/// Returns one byte blob per rank, indexed by rank; slot `comm.rank()` is a
/// copy of `payload`. Equivalent to an all-gather-v over the group.
pub fn all_gather_bytes<C: Communicator>(
    comm: &C,
    payload: &[u8],
    tags: GatherTags,
) -> Result<Vec<Vec<u8>>, GridError> {
    let me = comm.rank();
    let n = comm.size();
    let mut out: Vec<Vec<u8>> = vec![Vec::new(); n];
    out[me] = payload.to_vec();
    if n == 1 {
        return Ok(out);
    }

    let peers: Vec<usize> = (0..n).filter(|&r| r != me).collect();

    // Stage 1: byte counts.
    let count_recvs: Vec<(usize, C::RecvHandle)> = peers
        .iter()
        .map(|&peer| {
            (
                peer,
                comm.irecv(peer, tags.sizes, std::mem::size_of::<WireCount>()),
            )
        })
        .collect();
    let my_count = [WireCount(payload.len() as u64)];
    let count_sends: Vec<C::SendHandle> = peers
        .iter()
        .map(|&peer| comm.isend(peer, tags.sizes, bytemuck::cast_slice(&my_count)))
        .collect();

    let mut first_err = None;
    let mut counts = vec![0usize; n];
    for (peer, h) in count_recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                let mut cnt = WireCount(0);
                bytemuck::bytes_of_mut(&mut cnt).copy_from_slice(&data);
                counts[peer] = cnt.0 as usize;
            }
            Some(data) => {
                first_err.get_or_insert(GridError::CommError {
                    neighbor: peer,
                    detail: format!(
                        "expected {} bytes for size header, got {}",
                        std::mem::size_of::<WireCount>(),
                        data.len()
                    ),
                });
            }
            None => {
                first_err.get_or_insert(GridError::CommError {
                    neighbor: peer,
                    detail: "failed to receive size header".into(),
                });
            }
        }
    }
    for s in count_sends {
        let _ = s.wait();
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    // Stage 2: contributions.
    let data_recvs: Vec<(usize, C::RecvHandle)> = peers
        .iter()
        .map(|&peer| (peer, comm.irecv(peer, tags.data, counts[peer])))
        .collect();
    let data_sends: Vec<C::SendHandle> = peers
        .iter()
        .map(|&peer| comm.isend(peer, tags.data, payload))
        .collect();

    for (peer, h) in data_recvs {
        match h.wait() {
            Some(data) if data.len() == counts[peer] => {
                if first_err.is_none() {
                    out[peer] = data;
                }
            }
            Some(data) => {
                first_err.get_or_insert(GridError::CommError {
                    neighbor: peer,
                    detail: format!("expected {} bytes, got {}", counts[peer], data.len()),
                });
            }
            None => {
                first_err.get_or_insert(GridError::CommError {
                    neighbor: peer,
                    detail: "failed to receive contribution".into(),
                });
            }
        }
    }
    for s in data_sends {
        let _ = s.wait();
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}
