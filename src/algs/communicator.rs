//! Thin façade over the process group: rank/size/barrier plus non-blocking
//! point-to-point message passing.
//!
//! Messages are contiguous byte slices. All handles are waitable but
//! non-blocking; callers must `.wait()` before trusting a receive buffer.
//! Three backends: [`NoComm`] for serial unit tests, [`LocalComm`] groups
//! that stand in for ranks inside one test process, and `MpiComm` behind the
//! `mpi-support` feature for real multi-process runs.

use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::topology::CellId;

/// Message tag. Wide enough to carry a collective epoch in the high bits and
/// a cell id or stage number in the low bits, so no two in-flight rounds can
/// collide.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(u64);

const COLLECTIVE_BIT: u64 = 1 << 63;
const CELL_TAG_BITS: u32 = 40;

impl CommTag {
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Tag for one stage of a collective operation in a given epoch.
    #[inline]
    pub fn collective(epoch: u32, stage: u16) -> Self {
        CommTag(COLLECTIVE_BIT | (epoch as u64) << 16 | stage as u64)
    }

    /// Tag for a per-cell point-to-point message in a given epoch.
    #[inline]
    pub fn for_cell(epoch: u32, cell: CellId) -> Self {
        debug_assert!(cell.get() < 1 << CELL_TAG_BITS, "cell id overflows tag space");
        CommTag((epoch as u64) << CELL_TAG_BITS | cell.get())
    }
}

/// Anything that can be waited on. Waiting a receive yields the message
/// bytes; waiting a send yields `None`.
pub trait Wait {
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait + Send;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait + Send;

    /// Rank of this process within the group.
    fn rank(&self) -> usize;
    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Post a non-blocking send of `buf` to `peer`.
    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle;
    /// Post a non-blocking receive of `len` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: CommTag, len: usize) -> Self::RecvHandle;

    /// Block until every member of the group reaches this call.
    fn barrier(&self);

    /// True for the serial no-op backend.
    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Compile-time no-op comm for pure serial unit tests: one rank, no wire.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: CommTag, _len: usize) {}
    fn barrier(&self) {}
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- LocalComm: thread-backed ranks inside one process -----------------------

type MailboxKey = (usize, usize, u64); // (src, dst, tag)

/// Shared state of one `LocalComm` group. Group-scoped rather than
/// process-global so independent tests can run in parallel.
struct LocalGroup {
    size: usize,
    mailbox: DashMap<MailboxKey, Bytes>,
    barrier: std::sync::Barrier,
}

/// One rank of an in-process communicator group. Each rank is expected to
/// live on its own thread; the mailbox provides the asynchrony.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    group: Arc<LocalGroup>,
}

impl LocalComm {
    /// Create a group of `size` connected ranks.
    pub fn group(size: usize) -> Vec<LocalComm> {
        assert!(size > 0, "empty communicator group");
        let group = Arc::new(LocalGroup {
            size,
            mailbox: DashMap::new(),
            barrier: std::sync::Barrier::new(size),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                group: Arc::clone(&group),
            })
            .collect()
    }
}

/// Receive handle of [`LocalComm`]: a polling thread that claims the matching
/// mailbox entry.
pub struct LocalHandle {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.slot.lock().take()
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) {
        debug_assert!(peer < self.group.size);
        let key = (self.rank, peer, tag.get());
        let stale = self.group.mailbox.insert(key, Bytes::copy_from_slice(buf));
        debug_assert!(stale.is_none(), "tag reuse within an epoch: {key:?}");
    }

    fn irecv(&self, peer: usize, tag: CommTag, _len: usize) -> LocalHandle {
        let key = (peer, self.rank, tag.get());
        let slot = Arc::new(Mutex::new(None));
        let slot_in_thread = Arc::clone(&slot);
        let group = Arc::clone(&self.group);
        let handle = std::thread::spawn(move || {
            loop {
                if let Some((_, bytes)) = group.mailbox.remove(&key) {
                    *slot_in_thread.lock() = Some(bytes.to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            slot,
            handle: Some(handle),
        }
    }

    fn barrier(&self) {
        self.group.barrier.wait();
    }
}

// --- MPI backend (feature = "mpi-support") -----------------------------------

#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommTag, Communicator, Wait};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    // MPI tags are 31-bit; fold the wide tag down and rely on the epoch in
    // the high bits changing every round.
    fn mpi_tag(tag: CommTag) -> i32 {
        (tag.get() % 0x3FFF_FFFF) as i32
    }

    /// MPI-backed communicator. rsmpi ties request lifetimes to borrowed
    /// buffers, so both directions run as helper threads over owned buffers;
    /// requires `MPI_THREAD_MULTIPLE`.
    pub struct MpiComm {
        _universe: mpi::environment::Universe,
        world: std::sync::Arc<SimpleCommunicator>,
    }

    impl MpiComm {
        pub fn new() -> Option<Self> {
            let (universe, threading) =
                mpi::initialize_with_threading(mpi::Threading::Multiple)?;
            if threading != mpi::Threading::Multiple {
                return None;
            }
            let world = std::sync::Arc::new(universe.world());
            Some(Self {
                _universe: universe,
                world,
            })
        }
    }

    /// Helper-thread handle; a send resolves to `None`, a receive to the
    /// message bytes.
    pub struct MpiHandle(Option<std::thread::JoinHandle<Option<Vec<u8>>>>);

    impl Wait for MpiHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            self.0.take().and_then(|h| h.join().ok()).flatten()
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> MpiHandle {
            let world = std::sync::Arc::clone(&self.world);
            let data = buf.to_vec();
            let tag = mpi_tag(tag);
            let handle = std::thread::spawn(move || {
                world
                    .process_at_rank(peer as i32)
                    .synchronous_send_with_tag(&data[..], tag);
                None
            });
            MpiHandle(Some(handle))
        }

        fn irecv(&self, peer: usize, tag: CommTag, _len: usize) -> MpiHandle {
            let world = std::sync::Arc::clone(&self.world);
            let tag = mpi_tag(tag);
            let handle = std::thread::spawn(move || {
                let (data, _status) = world
                    .process_at_rank(peer as i32)
                    .receive_vec_with_tag::<u8>(tag);
                Some(data)
            });
            MpiHandle(Some(handle))
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_comm_is_nop() {
        let comm = NoComm;
        assert!(comm.is_no_comm());
        assert_eq!((comm.rank(), comm.size()), (0, 1));
        let h = comm.irecv(0, CommTag::collective(0, 0), 8);
        assert!(h.wait().is_none());
    }

    #[test]
    fn local_roundtrip_two_ranks() {
        let comms = LocalComm::group(2);
        let tag = CommTag::collective(1, 7);

        let rx = comms[1].irecv(0, tag, 4);
        comms[0].isend(1, tag, &[1, 2, 3, 4]);

        let data = rx.wait().expect("expected data from rank 0");
        assert_eq!(&data, &[1, 2, 3, 4]);
    }

    #[test]
    fn local_tags_are_isolated() {
        let comms = LocalComm::group(2);
        let tag_a = CommTag::for_cell(1, CellId::new(3));
        let tag_b = CommTag::for_cell(1, CellId::new(4));

        let rxa = comms[1].irecv(0, tag_a, 1);
        let rxb = comms[1].irecv(0, tag_b, 1);
        comms[0].isend(1, tag_b, &[0xBB]);
        comms[0].isend(1, tag_a, &[0xAA]);

        assert_eq!(rxa.wait().unwrap(), vec![0xAA]);
        assert_eq!(rxb.wait().unwrap(), vec![0xBB]);
    }

    #[test]
    fn epochs_keep_cell_tags_distinct() {
        assert_ne!(
            CommTag::for_cell(1, CellId::new(9)),
            CommTag::for_cell(2, CellId::new(9)),
        );
        assert_ne!(
            CommTag::collective(1, 0),
            CommTag::for_cell(1, CellId::new(0)),
        );
    }
}
