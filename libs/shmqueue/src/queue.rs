//! The shared-memory segment backing one worker's queue: a fixed header
//! followed by `capacity` [`Entry`] slots (spec.md §3, §4.1).
//!
//! The loader creates this segment; the worker process attaches to it by
//! name afterwards. Because the two sides run in independent address
//! spaces (no `fork()` inheritance), every cross-entry reference inside
//! the segment is an index, never a pointer, and the segment's own base
//! address is never stored in it.

use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::entry::Entry;
use crate::error::ShmQueueError;
use crate::list::FifoList;
use crate::shmobj;

const MAGIC_UNINIT: u32 = 0;
const MAGIC_READY: u32 = 0x5157_4531; // "QWE1"

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[repr(C)]
pub struct WorkerQueueHeader {
    magic: AtomicU32,
    capacity: u32,
    worker_id: u32,
    pub free: FifoList,
    pub ready: FifoList,
    pub completed: FifoList,
}

/// Offset of the first `Entry` slot within the segment, respecting
/// `Entry`'s alignment.
fn entries_offset() -> usize {
    let header_size = size_of::<WorkerQueueHeader>();
    let align = align_of::<Entry>();
    (header_size + align - 1) & !(align - 1)
}

fn segment_len(capacity: u32) -> usize {
    entries_offset() + capacity as usize * size_of::<Entry>()
}

/// Sealed so only `Created`/`Attached` can ever appear as `WorkerQueueShm`'s
/// type parameter. `OWNS_SEGMENT` decides, per-state, whether dropping a
/// handle unlinks the backing shared-memory object.
pub trait QueueState {
    const OWNS_SEGMENT: bool;
}

/// Typestate marker: this handle created the segment and owns its
/// `shm_unlink` on drop.
pub struct Created;
impl QueueState for Created {
    const OWNS_SEGMENT: bool = true;
}

/// Typestate marker: this handle attached to a segment created elsewhere.
pub struct Attached;
impl QueueState for Attached {
    const OWNS_SEGMENT: bool = false;
}

/// A mapped worker-queue segment. `State` tracks whether this handle is
/// the creator (and therefore responsible for `shm_unlink`) or a joiner.
pub struct WorkerQueueShm<State> {
    name: String,
    fd: RawFd,
    ptr: *mut u8,
    len: usize,
    capacity: u32,
    _state: PhantomData<State>,
}

// Safety: the segment is shared memory; all mutable access through it
// goes through atomics or the per-entry ownership protocol in spec.md §3.
unsafe impl<State> Send for WorkerQueueShm<State> {}
unsafe impl<State> Sync for WorkerQueueShm<State> {}

impl<State> WorkerQueueShm<State> {
    fn header(&self) -> &WorkerQueueHeader {
        // Safety: `ptr` is a live mapping of at least `size_of::<WorkerQueueHeader>()`
        // bytes, established in `create`/`attach` and torn down only by `Drop`.
        unsafe { &*(self.ptr as *const WorkerQueueHeader) }
    }

    pub fn entries(&self) -> &[Entry] {
        // Safety: the region starting at `entries_offset()` holds exactly
        // `capacity` initialized `Entry` values, per `create`'s layout.
        unsafe {
            let base = self.ptr.add(entries_offset()) as *const Entry;
            std::slice::from_raw_parts(base, self.capacity as usize)
        }
    }

    pub fn free(&self) -> &FifoList {
        &self.header().free
    }

    pub fn ready(&self) -> &FifoList {
        &self.header().ready
    }

    pub fn completed(&self) -> &FifoList {
        &self.header().completed
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn worker_id(&self) -> u32 {
        self.header().worker_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl WorkerQueueShm<Created> {
    /// Create a new worker-queue segment named `name`, owned by
    /// `worker_id`, with room for `capacity` entries, all initially on the
    /// free list.
    pub fn create(name: &str, worker_id: u32, capacity: u32) -> Result<Self, ShmQueueError> {
        let len = segment_len(capacity);
        let fd = shmobj::create_sized(name, len, true)?;
        let ptr = unsafe { shmobj::map_rw(fd, len)? };

        unsafe {
            std::ptr::write(
                ptr as *mut WorkerQueueHeader,
                WorkerQueueHeader {
                    magic: AtomicU32::new(MAGIC_UNINIT),
                    capacity,
                    worker_id,
                    free: FifoList::new(),
                    ready: FifoList::new(),
                    completed: FifoList::new(),
                },
            );
        }
        let header = unsafe { &*(ptr as *const WorkerQueueHeader) };

        let entries_base = unsafe { ptr.add(entries_offset()) as *mut Entry };
        for i in 0..capacity as usize {
            unsafe { std::ptr::write(entries_base.add(i), Entry::new()) };
        }
        let entries_ro: &[Entry] =
            unsafe { std::slice::from_raw_parts(entries_base as *const Entry, capacity as usize) };
        for idx in 0..capacity {
            entries_ro[idx as usize].owner.store(worker_id, Ordering::Relaxed);
            header.free.push(entries_ro, idx);
        }

        header.magic.store(MAGIC_READY, Ordering::Release);

        Ok(Self {
            name: name.to_string(),
            fd,
            ptr,
            len,
            capacity,
            _state: PhantomData,
        })
    }
}

impl WorkerQueueShm<Attached> {
    /// Attach to a segment created by [`WorkerQueueShm::create`] elsewhere,
    /// spin-waiting briefly for it to finish initializing.
    pub fn attach(name: &str) -> Result<Self, ShmQueueError> {
        let fd = shmobj::open_existing(name)?;
        let len = shmobj::size_of(fd)?;
        let ptr = unsafe { shmobj::map_rw(fd, len)? };

        let header = unsafe { &*(ptr as *const WorkerQueueHeader) };
        let deadline = Instant::now() + JOIN_TIMEOUT;
        while header.magic.load(Ordering::Acquire) != MAGIC_READY {
            if Instant::now() > deadline {
                unsafe { shmobj::unmap(ptr, len) };
                return Err(ShmQueueError::JoinTimeout(name.to_string()));
            }
            std::thread::yield_now();
        }

        let capacity = header.capacity;
        if len != segment_len(capacity) {
            unsafe { shmobj::unmap(ptr, len) };
            return Err(ShmQueueError::BadMagic);
        }

        Ok(Self {
            name: name.to_string(),
            fd,
            ptr,
            len,
            capacity,
            _state: PhantomData,
        })
    }
}

impl<State: QueueState> Drop for WorkerQueueShm<State> {
    fn drop(&mut self) {
        unsafe { shmobj::unmap(self.ptr, self.len) };
        let _ = nix::unistd::close(self.fd);
        if State::OWNS_SEGMENT {
            let _ = shmobj::unlink(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_attach_round_trip() {
        let name = format!("/shmqueue-queue-test-{}", std::process::id());
        let creator = WorkerQueueShm::<Created>::create(&name, 0, 4).unwrap();
        assert_eq!(creator.capacity(), 4);
        assert_eq!(creator.worker_id(), 0);

        let idx = creator.free().pop(creator.entries()).unwrap();
        creator.entries()[idx as usize].set_path(b"/tmp/a");
        creator.ready().push(creator.entries(), idx);

        let joiner = WorkerQueueShm::<Attached>::attach(&name).unwrap();
        assert_eq!(joiner.capacity(), 4);
        let popped = joiner.ready().pop(joiner.entries()).unwrap();
        assert_eq!(joiner.entries()[popped as usize].path(), b"/tmp/a");
    }
}
