//! Communication abstraction for intra-process (threaded) and inter-process
//! (MPI) message passing.
//!
//! The exchange core never talks to a transport directly; everything goes
//! through [`Communicator`], a minimal non-blocking send/receive seam. Three
//! implementations are provided:
//!
//! - [`NoComm`]: a single-rank no-op transport for serial runs and unit tests.
//! - [`ThreadComm`]: an intra-process transport where each rank is a thread
//!   and messages pass through a shared mailbox. [`ThreadComm::split`] makes
//!   a fresh, isolated group of ranks.
//! - `MpiComm` (behind the `mpi-support` feature): real MPI ranks.
//!
//! Wire conventions for protocols layered on top: all integers are
//! little-endian fixed width, and payloads are `bytemuck::Pod`-safe byte
//! slices. Receivers size their buffers from a preceding count message.

pub mod collective;

use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface.
///
/// Implementors provide asynchronous send/receive operations and waitable
/// handles. The `buf` passed to [`Communicator::irecv`] only sizes the
/// receive; the received bytes are returned by [`Wait::wait`].
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of ranks in the group.
    fn size(&self) -> usize;

    /// Synchronization barrier (default: no-op for single-rank transports).
    fn barrier(&self) {}
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    /// Create a new tag from a raw `u16`.
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Return the underlying `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

/// Compile-time no-op transport for single-rank groups.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- ThreadComm: one rank per thread, mailbox transport ---

/// Mailbox key. The group component keeps concurrently running groups (for
/// example, parallel test binaries' thread groups) fully isolated.
type Key = (u64, usize, usize, u16); // (group, src, dst, tag)

#[derive(Default)]
struct Slot {
    q: VecDeque<Vec<u8>>,
}

struct Mailbox {
    map: Mutex<HashMap<Key, Arc<(Mutex<Slot>, Condvar)>>>,
}

static MAILBOX: Lazy<Mailbox> = Lazy::new(|| Mailbox {
    map: Mutex::new(HashMap::new()),
});

static NEXT_GROUP: AtomicU64 = AtomicU64::new(1);

fn mailbox_entry(key: Key) -> Arc<(Mutex<Slot>, Condvar)> {
    let mut g = MAILBOX.map.lock().expect("mailbox poisoned");
    g.entry(key)
        .or_insert_with(|| Arc::new((Mutex::new(Slot::default()), Condvar::new())))
        .clone()
}

struct BarrierState {
    arrived: usize,
    epoch: usize,
}

static BARRIERS: Lazy<Mutex<HashMap<u64, Arc<(Mutex<BarrierState>, Condvar)>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn barrier_entry(group: u64) -> Arc<(Mutex<BarrierState>, Condvar)> {
    let mut g = BARRIERS.lock().expect("barrier registry poisoned");
    g.entry(group)
        .or_insert_with(|| {
            Arc::new((
                Mutex::new(BarrierState {
                    arrived: 0,
                    epoch: 0,
                }),
                Condvar::new(),
            ))
        })
        .clone()
}

pub struct ThreadSendHandle;

impl Wait for ThreadSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

pub struct ThreadRecvHandle {
    cell: Arc<(Mutex<Slot>, Condvar)>,
    want_len: usize,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.cell;
        let mut slot = lock.lock().expect("mailbox slot poisoned");
        while slot.q.is_empty() {
            slot = cv.wait(slot).expect("mailbox condvar poisoned");
        }
        let mut msg = slot.q.pop_front().expect("queue non-empty");
        msg.truncate(self.want_len.min(msg.len()));
        Some(msg)
    }
}

/// Intra-process communicator; every rank of a group lives on its own thread.
///
/// Messages between a fixed `(src, dst, tag)` are delivered in FIFO order.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    group: u64,
    rank: usize,
    size: usize,
}

impl ThreadComm {
    /// Create a fresh group of `size` ranks. Hand one communicator to each
    /// rank's thread; the group shares no state with any other group.
    pub fn split(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a communicator group needs at least one rank");
        let group = NEXT_GROUP.fetch_add(1, Ordering::Relaxed);
        (0..size).map(|rank| ThreadComm { group, rank, size }).collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ThreadSendHandle;
    type RecvHandle = ThreadRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let entry = mailbox_entry((self.group, self.rank, peer, tag));
        let (lock, cv) = &*entry;
        {
            let mut slot = lock.lock().expect("mailbox slot poisoned");
            slot.q.push_back(buf.to_vec());
        }
        cv.notify_all();
        ThreadSendHandle
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        ThreadRecvHandle {
            cell: mailbox_entry((self.group, peer, self.rank, tag)),
            want_len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        let entry = barrier_entry(self.group);
        let (lock, cv) = &*entry;
        let mut st = lock.lock().expect("barrier poisoned");
        let e = st.epoch;
        st.arrived += 1;
        if st.arrived == self.size {
            st.arrived = 0;
            st.epoch += 1;
            cv.notify_all();
        } else {
            while e == st.epoch {
                st = cv.wait(st).expect("barrier condvar poisoned");
            }
        }
    }
}

// --- MPI backend ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use core::ptr::NonNull;
    use mpi::collective::CommunicatorCollectives;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::topology::{Communicator as _, SimpleCommunicator};

    /// MPI-backed communicator over `MPI_COMM_WORLD`.
    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        /// Initialize MPI and wrap the world communicator. Returns `None` if
        /// MPI was already initialized in this process.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            use mpi::request::StaticScope;
            // The request borrows the buffer for 'static, so hand it a leaked
            // box and reclaim it at wait time.
            let boxed = buf.to_vec().into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice: &[u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, slice, tag as i32);
            MpiSendHandle {
                req: Some(req),
                buf: Some(unsafe { NonNull::new_unchecked(raw) }),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, template: &mut [u8]) -> Self::RecvHandle {
            use mpi::request::StaticScope;
            let len = template.len();
            let boxed = vec![0u8; len].into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice_mut: &mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, slice_mut, tag as i32);
            MpiRecvHandle {
                req: Some(req),
                buf: Some(unsafe { NonNull::new_unchecked(raw) }),
                len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }

    pub struct MpiSendHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<NonNull<[u8]>>,
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
            None
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.test();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }

    pub struct MpiRecvHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<NonNull<[u8]>>,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            let ptr = self.buf.take()?;
            let boxed: Box<[u8]> = unsafe { Box::from_raw(ptr.as_ptr()) };
            let mut v = Vec::from(boxed);
            v.truncate(self.len);
            Some(v)
        }
    }

    impl Drop for MpiRecvHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.test();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
